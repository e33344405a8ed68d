//! Axum middleware that authenticates control-surface requests by API key
//! and attaches the resolved `Principal` to request extensions.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::config::{ControlPlaneAuthConfig, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    ApiKey,
}

#[derive(Debug, Clone)]
pub struct Principal {
    pub supervisor_id: String,
    pub role: Role,
    pub method: AuthMethod,
}

pub trait PrincipalExt {
    fn principal(&self) -> Option<&Principal>;
}

impl PrincipalExt for Request {
    fn principal(&self) -> Option<&Principal> {
        self.extensions().get::<Principal>()
    }
}

#[derive(Clone)]
pub struct ControlPlaneAuthState {
    pub config: Arc<ControlPlaneAuthConfig>,
}

pub async fn control_plane_auth_middleware(
    State(state): State<ControlPlaneAuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let key = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let entry = state
        .config
        .authenticate(key)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(Principal {
        supervisor_id: entry.supervisor_id.clone(),
        role: entry.role,
        method: AuthMethod::ApiKey,
    });

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKeyEntry;

    #[test]
    fn principal_not_present_on_plain_request() {
        let req = Request::builder().body(axum::body::Body::empty()).unwrap();
        assert!(req.principal().is_none());
    }

    #[test]
    fn role_can_supervise_for_both_roles() {
        let entry = ApiKeyEntry::new("sup-1", Role::Admin, "k");
        assert!(entry.role.can_supervise());
    }
}
