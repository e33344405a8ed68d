//! Audit trail for control-plane commands (takeover, handback, end-call, ...).

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Allowed,
    Denied,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at: DateTime<Utc>,
    pub supervisor_id: String,
    pub command: String,
    pub session_id: Option<String>,
    pub outcome: AuditOutcome,
    pub detail: Option<String>,
}

/// Emits audit events as structured `tracing` records. A real deployment
/// would also fan these out to a durable audit sink; that sink is outside
/// this crate's scope (spec §1, "out of scope: persistence store DDL").
#[derive(Debug, Clone, Default)]
pub struct AuditLogger;

impl AuditLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn record(&self, event: AuditEvent) {
        info!(
            target: "control_plane.audit",
            supervisor_id = %event.supervisor_id,
            command = %event.command,
            session_id = event.session_id.as_deref().unwrap_or(""),
            outcome = ?event.outcome,
            detail = event.detail.as_deref().unwrap_or(""),
            "control plane command"
        );
    }
}
