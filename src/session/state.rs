//! Per-session mutable record (spec §3, §4.3). Owned exclusively by that
//! session's loop (see [`crate::session::manager`]); every other reader goes
//! through [`SessionState::snapshot`] or [`SessionState::full_transcript`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::ai::AiState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Waiting,
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Ai,
    Human,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    Customer,
    Ai,
    Supervisor,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub seq: u64,
    pub role: TranscriptRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Frustration {
    pub score: f64,
    pub sentiment: String,
    pub reason: String,
    pub max: f64,
    pub samples: u64,
}

impl Default for Frustration {
    fn default() -> Self {
        Self {
            score: 0.0,
            sentiment: "neutral".to_string(),
            reason: String::new(),
            max: 0.0,
            samples: 0,
        }
    }
}

impl Frustration {
    pub fn avg(&self, running_total: f64) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            running_total / self.samples as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct Controller {
    pub supervisor_id: String,
    pub taken_over_at: DateTime<Utc>,
}

/// A serializable view omitting transport handles and the AI binding itself
/// (spec §4.3, open question #3: no unserializable handles by construction).
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub mode: SessionMode,
    pub customer_connected: bool,
    pub controller_id: Option<String>,
    pub transcript_length: usize,
    pub last_message: Option<String>,
    pub frustration: Frustration,
}

/// Invariants (spec §3) enforced by the session loop that owns this struct,
/// not by the struct itself: at most one customer transport; `mode=HUMAN`
/// implies a controller and a paused AI binding; transcript is append-only.
pub struct SessionState {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub mode: SessionMode,
    pub customer_connected: bool,
    pub controller: Option<Controller>,
    pub ai_state: AiState,
    pub transcript: Vec<TranscriptEntry>,
    pub frustration: Frustration,
    pub frustration_total: f64,
    pub supervisor_interventions: u64,
    pub escalation_alerts: Vec<Value>,
    next_seq: u64,
}

impl SessionState {
    pub fn new(id: String) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            ended_at: None,
            status: SessionStatus::Waiting,
            mode: SessionMode::Ai,
            customer_connected: false,
            controller: None,
            ai_state: AiState::Connecting,
            transcript: Vec::new(),
            frustration: Frustration::default(),
            frustration_total: 0.0,
            supervisor_interventions: 0,
            escalation_alerts: Vec::new(),
            next_seq: 1,
        }
    }

    /// Assigns the next per-session sequence number (spec §3, invariant 6).
    pub fn next_sequence(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Appends a transcript entry, assigning it the next sequence number.
    pub fn append(&mut self, role: TranscriptRole, content: impl Into<String>) -> u64 {
        let seq = self.next_sequence();
        self.transcript.push(TranscriptEntry {
            seq,
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
        seq
    }

    pub fn record_frustration(&mut self, score: f64, sentiment: String, reason: String) {
        self.frustration_total += score;
        self.frustration.samples += 1;
        self.frustration.score = score;
        self.frustration.sentiment = sentiment;
        self.frustration.reason = reason;
        if score > self.frustration.max {
            self.frustration.max = score;
        }
    }

    pub fn last_message(&self) -> Option<String> {
        self.transcript.last().map(|e| e.content.clone())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            created_at: self.created_at,
            status: self.status,
            mode: self.mode,
            customer_connected: self.customer_connected,
            controller_id: self.controller.as_ref().map(|c| c.supervisor_id.clone()),
            transcript_length: self.transcript.len(),
            last_message: self.last_message(),
            frustration: self.frustration.clone(),
        }
    }

    pub fn full_transcript(&self) -> Vec<TranscriptEntry> {
        self.transcript.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_increasing_sequence_numbers() {
        let mut s = SessionState::new("s1".into());
        let a = s.append(TranscriptRole::Customer, "hi");
        let b = s.append(TranscriptRole::Ai, "hello");
        assert!(b > a);
        assert_eq!(s.transcript.len(), 2);
    }

    #[test]
    fn snapshot_omits_transcript_content_but_keeps_length() {
        let mut s = SessionState::new("s1".into());
        s.append(TranscriptRole::Customer, "hi there");
        let snap = s.snapshot();
        assert_eq!(snap.transcript_length, 1);
        assert_eq!(snap.last_message.as_deref(), Some("hi there"));
    }

    #[test]
    fn record_frustration_tracks_running_max() {
        let mut s = SessionState::new("s1".into());
        s.record_frustration(40.0, "neutral".into(), "ok".into());
        s.record_frustration(85.0, "angry".into(), "repeated complaints".into());
        s.record_frustration(20.0, "neutral".into(), "calmed down".into());
        assert_eq!(s.frustration.max, 85.0);
        assert_eq!(s.frustration.samples, 3);
    }
}
