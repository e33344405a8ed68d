//! WebSocket upgrade handlers: customer connections spawn a new session,
//! supervisor connections attach to the registry and dispatch commands.

use axum::{
    extract::{ws::WebSocketUpgrade, Extension, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mediation_auth::{AuditEvent, AuditLogger, AuditOutcome, Principal};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::transport::wire::{CustomerOutbound, SupervisorCommand, SupervisorEvent};
use crate::transport::WsTransport;

use super::AppState;

pub async fn customer_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (transport, customer_rx) = WsTransport::<CustomerOutbound>::spawn(
            socket,
            state.config.customer_outbox_capacity,
            state.config.drain_timeout(),
        );
        let session_id = state.manager.spawn_session(transport, customer_rx);
        info!(session_id = %session_id, "customer attached");
    })
}

#[derive(Debug, Deserialize)]
pub struct SupervisorQuery {
    #[serde(rename = "supervisorId")]
    supervisor_id: Option<String>,
}

/// The authenticated `Principal` (attached by the control-plane auth
/// middleware ahead of this route) is the source of truth for which
/// supervisor this connection belongs to; an `?supervisorId=` query
/// parameter is accepted only as a sanity check and must agree with it.
pub async fn supervisor_ws(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<SupervisorQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(claimed) = &query.supervisor_id {
        if claimed != &principal.supervisor_id {
            return (StatusCode::FORBIDDEN, "supervisorId does not match the authenticated key").into_response();
        }
    }
    let supervisor_id = principal.supervisor_id;

    ws.on_upgrade(move |socket| async move {
        let (transport, mut command_rx) = WsTransport::<String>::spawn::<SupervisorCommand>(
            socket,
            state.config.supervisor_outbox_capacity,
            state.config.drain_timeout(),
        );
        let connection_id = Uuid::new_v4();
        state
            .registry
            .attach(connection_id, supervisor_id.clone(), transport.clone(), state.manager.session_snapshots());
        let audit = AuditLogger::new();

        while let Some(command) = command_rx.recv().await {
            let command_name = command_label(&command);
            let session_id = command_session_id(&command);
            let reply_event = match state.manager.dispatch_command(command).await {
                Ok(ack) => {
                    audit.record(AuditEvent {
                        at: chrono::Utc::now(),
                        supervisor_id: supervisor_id.clone(),
                        command: command_name.to_string(),
                        session_id: session_id.clone(),
                        outcome: AuditOutcome::Allowed,
                        detail: None,
                    });
                    match ack {
                        crate::session::CommandAck::Ack => SupervisorEvent::Ack { command: command_name },
                        crate::session::CommandAck::SessionsList(sessions) => SupervisorEvent::SessionsList { sessions },
                        crate::session::CommandAck::ContextInjected => SupervisorEvent::ContextInjected {
                            session_id: session_id.unwrap_or_default(),
                        },
                    }
                }
                Err(e) => {
                    audit.record(AuditEvent {
                        at: chrono::Utc::now(),
                        supervisor_id: supervisor_id.clone(),
                        command: command_name.to_string(),
                        session_id: session_id.clone(),
                        outcome: AuditOutcome::Error,
                        detail: Some(e.to_string()),
                    });
                    SupervisorEvent::Error {
                        session_id,
                        message: format!("{}: {e}", e.code()),
                    }
                }
            };
            if let Ok(text) = serde_json::to_string(&reply_event) {
                let _ = transport.send(text);
            }
        }

        state.registry.detach(&connection_id);
        info!(supervisor_id = %supervisor_id, "supervisor detached");
    })
}

fn command_session_id(command: &SupervisorCommand) -> Option<String> {
    match command {
        SupervisorCommand::Takeover { session_id, .. }
        | SupervisorCommand::Handback { session_id, .. }
        | SupervisorCommand::InjectContext { session_id, .. }
        | SupervisorCommand::SupervisorMessage { session_id, .. }
        | SupervisorCommand::SupervisorAudio { session_id, .. }
        | SupervisorCommand::EndCall { session_id } => Some(session_id.clone()),
        SupervisorCommand::GetSessions => None,
    }
}

fn command_label(command: &SupervisorCommand) -> &'static str {
    match command {
        SupervisorCommand::Takeover { .. } => "takeover",
        SupervisorCommand::Handback { .. } => "handback",
        SupervisorCommand::InjectContext { .. } => "injectContext",
        SupervisorCommand::SupervisorMessage { .. } => "supervisorMessage",
        SupervisorCommand::SupervisorAudio { .. } => "supervisorAudio",
        SupervisorCommand::EndCall { .. } => "endCall",
        SupervisorCommand::GetSessions => "getSessions",
    }
}
