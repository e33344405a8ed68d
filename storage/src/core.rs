//! Core types for post-call summary persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One persisted row per ended session (spec §6, "Persisted summary record fields").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryRecord {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_secs: i64,
    pub sentiment: String,
    pub intent: String,
    pub resolution_status: String,
    pub key_topics: Vec<String>,
    pub action_items: Vec<String>,
    pub frustration_avg: f64,
    pub frustration_max: f64,
    pub frustration_trend: String,
    pub escalation_count: u32,
    pub escalation_alerts: Vec<Value>,
    pub supervisor_interventions: u32,
    pub supervisor_id: Option<String>,
    pub supervisor_takeover_duration_secs: Option<i64>,
    pub full_summary: String,
    pub insights: Vec<String>,
    pub transcript: Value,
    pub first_message_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Pagination/filter/sort parameters for `GET /summaries`.
#[derive(Debug, Clone, Default)]
pub struct SummaryQuery {
    pub limit: usize,
    pub offset: usize,
    pub sentiment: Option<String>,
    pub intent: Option<String>,
    pub resolution: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Desc,
    Asc,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryPage {
    pub records: Vec<SummaryRecord>,
    pub total: usize,
}

pub type SummaryResult<T> = Result<T, SummaryStorageError>;

#[derive(Debug, thiserror::Error)]
pub enum SummaryStorageError {
    #[error("summary already exists for session: {0}")]
    Duplicate(String),
    #[error("summary not found: {0}")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Storage interface for end-of-call summaries. This trait is just the
/// backend; the caller is responsible for serializing writes through a
/// single writer task with a bounded queue (spec §5) before calling
/// `insert` — see `mediation::summary::SummaryWriter`.
#[async_trait::async_trait]
pub trait SummaryStorage: Send + Sync + 'static {
    /// Insert one row. `session_id` is unique; a second insert for the same
    /// id must return `Duplicate` rather than overwrite (spec §8,
    /// "no double-write of the summary row, enforced by sessionId UNIQUE").
    async fn insert(&self, record: SummaryRecord) -> SummaryResult<()>;

    async fn get(&self, session_id: &str) -> SummaryResult<Option<SummaryRecord>>;

    async fn list(&self, query: SummaryQuery) -> SummaryResult<SummaryPage>;
}

#[cfg(test)]
pub(crate) fn sample_record(session_id: &str) -> SummaryRecord {
    let now = Utc::now();
    SummaryRecord {
        session_id: session_id.to_string(),
        created_at: now,
        ended_at: now,
        duration_secs: 42,
        sentiment: "neutral".into(),
        intent: "support".into(),
        resolution_status: "resolved".into(),
        key_topics: vec!["billing".into()],
        action_items: vec![],
        frustration_avg: 10.0,
        frustration_max: 25.0,
        frustration_trend: "stable".into(),
        escalation_count: 0,
        escalation_alerts: vec![],
        supervisor_interventions: 0,
        supervisor_id: None,
        supervisor_takeover_duration_secs: None,
        full_summary: "Customer's billing question was resolved.".into(),
        insights: vec![],
        transcript: serde_json::json!([]),
        first_message_at: Some(now),
        last_message_at: Some(now),
    }
}
