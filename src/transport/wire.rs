//! Tagged wire messages exchanged with customer and supervisor transports
//! (spec §6, "External interfaces"). Inbound messages decode into a closed
//! variant set; unknown tags are protocol violations (spec §9).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages a customer transport sends to the server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CustomerInbound {
    /// `data` is base64(pcm_s16le_16k_mono).
    Audio { data: String },
    Text { content: String },
    /// Client-side caption; never forwarded to the AI (spec §4.4 rule 3).
    Transcript { content: String },
}

/// Messages the server sends to a customer transport.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CustomerOutbound {
    SessionInit {
        session_id: String,
        mode: &'static str,
    },
    /// `data` is base64(pcm_s16le_24k_mono).
    Audio {
        data: String,
    },
    AiResponse {
        data: AiResponseData,
    },
    CustomerTranscription {
        content: String,
    },
    SupervisorMessage {
        content: String,
    },
    ModeChange {
        mode: &'static str,
        message: String,
    },
    SessionEnded {
        message: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct AiResponseData {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub content: String,
}

/// Commands a supervisor transport sends to the server (spec §4.7).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SupervisorCommand {
    Takeover {
        session_id: String,
        supervisor_id: String,
    },
    Handback {
        session_id: String,
        #[serde(default)]
        context: Option<String>,
    },
    InjectContext {
        session_id: String,
        context: String,
    },
    SupervisorMessage {
        session_id: String,
        content: String,
    },
    SupervisorAudio {
        session_id: String,
        data: String,
    },
    EndCall {
        session_id: String,
    },
    GetSessions,
}

/// Events broadcast to supervisor transports (spec §3, "Supervisor event").
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SupervisorEvent {
    SessionsList {
        sessions: Vec<Value>,
    },
    SessionUpdate {
        session_id: String,
        seq: u64,
        snapshot: Value,
    },
    AiResponse {
        session_id: String,
        seq: u64,
        content: String,
    },
    CustomerMessage {
        session_id: String,
        seq: u64,
        content: String,
    },
    CustomerAudio {
        session_id: String,
        seq: u64,
        data: String,
    },
    FrustrationUpdate {
        session_id: String,
        seq: u64,
        score: f64,
        sentiment: String,
        reason: String,
    },
    AnalyticsUpdate {
        session_id: String,
        seq: u64,
        payload: Value,
    },
    CoachingUpdate {
        session_id: String,
        seq: u64,
        payload: Value,
    },
    EscalationAlert {
        session_id: String,
        seq: u64,
        reason: String,
    },
    SessionEnded {
        session_id: String,
        seq: u64,
        status: &'static str,
    },
    Error {
        session_id: Option<String>,
        message: String,
    },
    /// Acknowledges a command that has no richer reply of its own
    /// (takeover/handback/supervisorMessage/supervisorAudio/endCall).
    Ack {
        command: &'static str,
    },
    ContextInjected {
        session_id: String,
    },
}

impl SupervisorEvent {
    pub fn session_id(&self) -> Option<&str> {
        use SupervisorEvent::*;
        match self {
            SessionsList { .. } => None,
            SessionUpdate { session_id, .. }
            | AiResponse { session_id, .. }
            | CustomerMessage { session_id, .. }
            | CustomerAudio { session_id, .. }
            | FrustrationUpdate { session_id, .. }
            | AnalyticsUpdate { session_id, .. }
            | CoachingUpdate { session_id, .. }
            | EscalationAlert { session_id, .. }
            | SessionEnded { session_id, .. } => Some(session_id),
            ContextInjected { session_id, .. } => Some(session_id),
            Error { session_id, .. } => session_id.as_deref(),
            Ack { .. } => None,
        }
    }

    /// True for audio events, which get "drop newest" overflow semantics
    /// instead of "drop oldest non-audio" (spec §5, Backpressure).
    pub fn is_audio(&self) -> bool {
        matches!(self, SupervisorEvent::CustomerAudio { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_audio_frame() {
        let raw = r#"{"type":"audio","data":"AAA="}"#;
        let msg: CustomerInbound = serde_json::from_str(raw).unwrap();
        assert!(matches!(msg, CustomerInbound::Audio { data } if data == "AAA="));
    }

    #[test]
    fn decodes_takeover_command() {
        let raw = r#"{"type":"takeover","sessionId":"s1","supervisorId":"sup1"}"#;
        let cmd: SupervisorCommand = serde_json::from_str(raw).unwrap();
        assert!(matches!(cmd, SupervisorCommand::Takeover { session_id, supervisor_id }
            if session_id == "s1" && supervisor_id == "sup1"));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let raw = r#"{"type":"nonsense"}"#;
        let result: Result<CustomerInbound, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }

    #[test]
    fn escalation_alert_session_id() {
        let ev = SupervisorEvent::EscalationAlert {
            session_id: "s1".into(),
            seq: 3,
            reason: "repeated complaints".into(),
        };
        assert_eq!(ev.session_id(), Some("s1"));
        assert!(!ev.is_audio());
    }
}
