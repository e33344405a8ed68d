//! The session loop's single inbound event channel (spec §5: "every producer
//! sends tagged events to this loop via bounded channels").

use serde_json::Value;
use tokio::sync::oneshot;

use crate::ai::AiEvent;
use crate::analytics::AnalyticsResult;
use crate::error::CommandError;
use crate::transport::wire::{CustomerInbound, SupervisorCommand};

/// One tagged event arriving at a session loop, from whichever producer sent it.
#[derive(Debug)]
pub enum SessionEvent {
    Customer(CustomerInbound),
    /// The customer transport's receive pump observed `PEER_GONE`.
    CustomerClosed,
    Ai(AiEvent),
    /// A supervisor command, paired with the reply channel for its outcome.
    Supervisor(SupervisorCommand, oneshot::Sender<CommandReply>),
    Analytics(AnalyticsResult),
}

/// Successful outcomes of a supervisor command (spec §4.7).
#[derive(Debug, Clone)]
pub enum CommandAck {
    Ack,
    SessionsList(Vec<Value>),
    ContextInjected,
}

pub type CommandReply = Result<CommandAck, CommandError>;
