//! Transport adapter (spec §4.1): one duplex connection per customer or
//! supervisor peer. The adapter owns exactly one close callback, exposes a
//! non-blocking `send`, and decodes inbound frames into a closed variant set.

pub mod wire;
pub mod ws;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("peer outbox is full")]
    PeerSlow,
    #[error("peer connection is gone")]
    PeerGone,
}

/// Why a transport was closed, surfaced to the customer as `sessionEnded`
/// and used internally to decide whether the session itself should end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    CustomerDetached,
    SupervisorDetached,
    CustomerCongested,
    SessionEnded,
    AiUnavailable,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::CustomerDetached => "customerDetached",
            CloseReason::SupervisorDetached => "supervisorDetached",
            CloseReason::CustomerCongested => "customerCongested",
            CloseReason::SessionEnded => "sessionEnded",
            CloseReason::AiUnavailable => "aiUnavailable",
        }
    }
}

pub use ws::WsTransport;
