//! Control surface (spec §4.7, §6): HTTP endpoints for dashboards plus the
//! WebSocket upgrade handlers that hand a connection off to a session loop
//! or the supervisor registry.

mod handlers;
mod ws;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use mediation_auth::{ControlPlaneAuthConfig, ControlPlaneAuthState};
use mediation_storage::SummaryStorage;

use crate::analytics::AnalyticsProvider;
use crate::config::Config;
use crate::session::SessionManager;
use crate::supervisor::SupervisorRegistry;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub registry: Arc<SupervisorRegistry>,
    pub provider: Arc<dyn AnalyticsProvider>,
    pub storage: Arc<dyn SummaryStorage>,
    pub config: Arc<Config>,
}

/// Builds the full axum router: unauthenticated health/customer-websocket
/// routes, and a supervisor-authenticated group for everything else. The
/// auth middleware carries its own state independent of `AppState`
/// (`from_fn_with_state` captures it directly rather than via `FromRef`).
pub fn build_router(state: AppState, auth_config: ControlPlaneAuthConfig) -> Router {
    let auth_state = ControlPlaneAuthState {
        config: Arc::new(auth_config),
    };

    let supervised = Router::new()
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/{id}", get(handlers::get_session))
        .route("/summaries", get(handlers::list_summaries))
        .route("/summary/{id}", get(handlers::get_summary))
        .route("/coaching", post(handlers::coaching))
        .route("/analyze", post(handlers::analyze))
        .route("/summary", post(handlers::generate_summary))
        .route("/ws/supervisor", get(ws::supervisor_ws))
        .route_layer(middleware::from_fn_with_state(
            auth_state,
            mediation_auth::control_plane_auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws/customer", get(ws::customer_ws))
        .merge(supervised)
        .with_state(state)
}
