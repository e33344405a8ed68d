//! Authentication and audit logging for the voice mediation control plane.
//!
//! Supervisor transports and the HTTP control surface authenticate with a
//! static API key that resolves to a `Role`. There is no external IDP
//! integration here: the mediation server is single-process (spec
//! Non-goals, §1), so a JWT/JWKS layer would add surface with nothing to
//! validate against.

mod audit;
mod config;
mod middleware;

pub use audit::{AuditEvent, AuditLogger, AuditOutcome};
pub use config::{ApiKeyEntry, ControlPlaneAuthConfig, Role};
pub use middleware::{
    control_plane_auth_middleware, AuthMethod, ControlPlaneAuthState, Principal, PrincipalExt,
};
