//! Registry of attached supervisor transports and the broadcast fan-out
//! (spec §4.6). Serializes each event exactly once and enqueues the same
//! text to every attached supervisor's outbox; a full outbox drops the
//! event for that supervisor only and never blocks the caller.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::transport::{TransportError, WsTransport};
use crate::transport::wire::SupervisorEvent;

struct SupervisorHandle {
    supervisor_id: String,
    transport: WsTransport<String>,
    dropped: AtomicU64,
}

#[derive(Default)]
pub struct SupervisorRegistry {
    supervisors: DashMap<Uuid, SupervisorHandle>,
}

impl SupervisorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a supervisor connection, synchronously sending it a
    /// `sessionsList` snapshot of every currently known session.
    pub fn attach(&self, connection_id: Uuid, supervisor_id: String, transport: WsTransport<String>, sessions: Vec<Value>) {
        let snapshot = SupervisorEvent::SessionsList { sessions };
        if let Ok(text) = serde_json::to_string(&snapshot) {
            let _ = transport.send(text);
        }
        self.supervisors.insert(
            connection_id,
            SupervisorHandle {
                supervisor_id,
                transport,
                dropped: AtomicU64::new(0),
            },
        );
    }

    pub fn detach(&self, connection_id: &Uuid) {
        self.supervisors.remove(connection_id);
    }

    pub fn is_controller_attached(&self, supervisor_id: &str) -> bool {
        self.supervisors.iter().any(|h| h.supervisor_id == supervisor_id)
    }

    /// Broadcasts to every attached supervisor. On serialization failure,
    /// broadcasts a degraded `error` event instead (spec §4.6).
    pub fn broadcast(&self, event: &SupervisorEvent) {
        let text = match serde_json::to_string(event) {
            Ok(t) => t,
            Err(e) => {
                debug!(error = %e, "supervisor event serialization failed");
                let degraded = serde_json::json!({
                    "type": "error",
                    "sessionId": event.session_id(),
                    "error": "serialization",
                });
                degraded.to_string()
            }
        };
        // Non-audio events evict the oldest queued event to make room;
        // audio events never displace something else already waiting
        // (spec §5, asymmetric supervisor outbox overflow policy).
        let evict_oldest = !event.is_audio();
        for entry in self.supervisors.iter() {
            match entry.value().transport.send_with_priority(text.clone(), evict_oldest) {
                Ok(()) => {}
                Err(TransportError::PeerSlow) => {
                    entry.value().dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TransportError::PeerGone) => {}
            }
        }
    }

    /// Unicasts to every connection belonging to one supervisor identity
    /// (a supervisor may have more than one dashboard tab attached).
    pub fn send_to(&self, supervisor_id: &str, event: &SupervisorEvent) {
        let Ok(text) = serde_json::to_string(event) else {
            return;
        };
        let evict_oldest = !event.is_audio();
        for entry in self.supervisors.iter() {
            if entry.value().supervisor_id == supervisor_id {
                let _ = entry.value().transport.send_with_priority(text.clone(), evict_oldest);
            }
        }
    }

    pub fn dropped_count(&self, connection_id: &Uuid) -> u64 {
        self.supervisors
            .get(connection_id)
            .map(|h| h.dropped.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn attached_count(&self) -> usize {
        self.supervisors.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A real `WsTransport` requires a live axum `WebSocket`, which isn't
    // constructible outside an actual connection upgrade; the registry's
    // own bookkeeping is covered directly instead, and the broadcast path
    // is exercised end-to-end in the crate's integration tests.
    #[test]
    fn empty_registry_has_no_attachments() {
        let registry = SupervisorRegistry::new();
        assert_eq!(registry.attached_count(), 0);
        assert!(!registry.is_controller_attached("sup1"));
        assert_eq!(registry.dropped_count(&Uuid::new_v4()), 0);
    }

    #[test]
    fn detach_of_unknown_connection_is_a_no_op() {
        let registry = SupervisorRegistry::new();
        registry.detach(&Uuid::new_v4());
        assert_eq!(registry.attached_count(), 0);
    }
}
