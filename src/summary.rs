//! End-of-call summary computation and persistence (spec §4.7, §7).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mediation_storage::{SummaryRecord, SummaryStorage};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use crate::analytics::{AnalyticsProvider, SummaryAnalysis};
use crate::session::state::{SessionState, TranscriptEntry};

fn neutral_placeholder() -> SummaryAnalysis {
    SummaryAnalysis {
        sentiment: "neutral".into(),
        intent: "unknown".into(),
        resolution_status: "unresolved".into(),
        key_topics: Vec::new(),
        action_items: Vec::new(),
        frustration_trend: "stable".into(),
        full_text: String::new(),
        insights: Vec::new(),
    }
}

fn transcript_text(transcript: &[TranscriptEntry]) -> String {
    transcript
        .iter()
        .map(|e| format!("{:?}: {}", e.role, e.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn transcript_json(transcript: &[TranscriptEntry]) -> Value {
    serde_json::json!(transcript
        .iter()
        .map(|e| serde_json::json!({
            "seq": e.seq,
            "role": format!("{:?}", e.role).to_lowercase(),
            "content": e.content,
            "timestamp": e.timestamp,
        }))
        .collect::<Vec<_>>())
}

/// Computes the summary by invoking the analysis collaborator over the full
/// transcript; on failure, a neutral placeholder is returned instead.
pub async fn compute_summary(provider: &dyn AnalyticsProvider, transcript: &[TranscriptEntry]) -> SummaryAnalysis {
    let text = transcript_text(transcript);
    match provider.summarize(&text).await {
        Ok(summary) => summary,
        Err(e) => {
            warn!(error = %e, "summary collaborator failed, using neutral placeholder");
            let mut placeholder = neutral_placeholder();
            placeholder.full_text = text;
            placeholder
        }
    }
}

/// Builds the persisted row from session state and the computed summary.
pub fn build_record(session: &SessionState, summary: SummaryAnalysis, ended_at: DateTime<Utc>) -> SummaryRecord {
    let duration_secs = (ended_at - session.created_at).num_seconds().max(0);
    let frustration_avg = if session.frustration.samples > 0 {
        session.frustration_total / session.frustration.samples as f64
    } else {
        0.0
    };

    SummaryRecord {
        session_id: session.id.clone(),
        created_at: session.created_at,
        ended_at,
        duration_secs,
        sentiment: summary.sentiment,
        intent: summary.intent,
        resolution_status: summary.resolution_status,
        key_topics: summary.key_topics,
        action_items: summary.action_items,
        frustration_avg,
        frustration_max: session.frustration.max,
        frustration_trend: summary.frustration_trend,
        escalation_count: session.escalation_alerts.len() as u32,
        escalation_alerts: session.escalation_alerts.clone(),
        supervisor_interventions: session.supervisor_interventions as u32,
        supervisor_id: session.controller.as_ref().map(|c| c.supervisor_id.clone()),
        supervisor_takeover_duration_secs: session
            .controller
            .as_ref()
            .map(|c| (ended_at - c.taken_over_at).num_seconds().max(0)),
        full_summary: summary.full_text,
        insights: summary.insights,
        transcript: transcript_json(&session.transcript),
        first_message_at: session.transcript.first().map(|e| e.timestamp),
        last_message_at: session.transcript.last().map(|e| e.timestamp),
    }
}

/// Persists with bounded retry and exponential backoff (at most 3 attempts),
/// then drops the row (spec §7, "Persistence failure on summary").
pub async fn persist_with_retry(storage: &dyn SummaryStorage, record: SummaryRecord) {
    let mut attempt = 0;
    let mut delay = Duration::from_millis(100);
    loop {
        match storage.insert(record.clone()).await {
            Ok(()) => return,
            Err(e) => {
                attempt += 1;
                warn!(error = %e, attempt, session_id = %record.session_id, "summary persistence failed");
                if attempt >= 3 {
                    warn!(session_id = %record.session_id, "dropping summary after exhausting retries");
                    return;
                }
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}

/// Single writer task that every session loop feeds instead of calling the
/// storage backend directly (spec §5, "persistence store is shared; writes
/// are serialized via a single writer task with a bounded queue"). A session
/// loop's `enqueue` returns as soon as the record is queued; the backend
/// write itself, retries included, happens on the writer task.
pub struct SummaryWriter {
    tx: mpsc::Sender<SummaryRecord>,
}

impl SummaryWriter {
    pub fn spawn(storage: Arc<dyn SummaryStorage>, queue_capacity: usize) -> Arc<Self> {
        let (tx, mut rx) = mpsc::channel(queue_capacity);
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                persist_with_retry(storage.as_ref(), record).await;
            }
        });
        Arc::new(Self { tx })
    }

    /// Queues a record for persistence. If the writer task's queue is full,
    /// this waits rather than dropping the record silently; a session loop
    /// that can't make progress without the summary write is the same
    /// backpressure shape the spec's bounded queue describes.
    pub async fn enqueue(&self, record: SummaryRecord) {
        if self.tx.send(record).await.is_err() {
            warn!(session_id = %record.session_id, "summary writer task is gone, dropping record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mediation_storage::{MemorySummaryStorage, SummaryStorageError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_record(session_id: &str) -> SummaryRecord {
        let now = Utc::now();
        SummaryRecord {
            session_id: session_id.to_string(),
            created_at: now,
            ended_at: now,
            duration_secs: 10,
            sentiment: "neutral".into(),
            intent: "support".into(),
            resolution_status: "resolved".into(),
            key_topics: vec![],
            action_items: vec![],
            frustration_avg: 0.0,
            frustration_max: 0.0,
            frustration_trend: "stable".into(),
            escalation_count: 0,
            escalation_alerts: vec![],
            supervisor_interventions: 0,
            supervisor_id: None,
            supervisor_takeover_duration_secs: None,
            full_summary: "resolved".into(),
            insights: vec![],
            transcript: serde_json::json!([]),
            first_message_at: None,
            last_message_at: None,
        }
    }

    struct FailNTimes {
        remaining: AtomicUsize,
        inner: MemorySummaryStorage,
    }

    #[async_trait]
    impl SummaryStorage for FailNTimes {
        async fn insert(&self, record: SummaryRecord) -> Result<(), SummaryStorageError> {
            if self.remaining.load(Ordering::SeqCst) > 0 {
                self.remaining.fetch_sub(1, Ordering::SeqCst);
                return Err(SummaryStorageError::Backend("transient".into()));
            }
            self.inner.insert(record).await
        }

        async fn get(&self, session_id: &str) -> Result<Option<SummaryRecord>, SummaryStorageError> {
            self.inner.get(session_id).await
        }

        async fn list(
            &self,
            query: mediation_storage::SummaryQuery,
        ) -> Result<mediation_storage::SummaryPage, SummaryStorageError> {
            self.inner.list(query).await
        }
    }

    #[tokio::test]
    async fn persist_with_retry_succeeds_after_transient_failures() {
        let storage = FailNTimes {
            remaining: AtomicUsize::new(2),
            inner: MemorySummaryStorage::default(),
        };
        let record = test_record("s1");
        persist_with_retry(&storage, record.clone()).await;
        assert!(storage.get("s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn persist_with_retry_gives_up_after_three_attempts() {
        let storage = FailNTimes {
            remaining: AtomicUsize::new(10),
            inner: MemorySummaryStorage::default(),
        };
        let record = test_record("s2");
        persist_with_retry(&storage, record).await;
        assert!(storage.get("s2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn compute_summary_falls_back_to_neutral_placeholder() {
        struct AlwaysFails;
        #[async_trait]
        impl AnalyticsProvider for AlwaysFails {
            async fn sentiment(&self, _: &str, _: &[String]) -> anyhow::Result<crate::analytics::SentimentResult> {
                anyhow::bail!("down")
            }
            async fn analysis(&self, _: &str) -> anyhow::Result<crate::analytics::AnalysisResult> {
                anyhow::bail!("down")
            }
            async fn coaching(&self, _: &[String], _: &str) -> anyhow::Result<crate::analytics::CoachingResult> {
                anyhow::bail!("down")
            }
            async fn summarize(&self, _: &str) -> anyhow::Result<SummaryAnalysis> {
                anyhow::bail!("down")
            }
        }
        let provider = AlwaysFails;
        let summary = compute_summary(&provider, &[]).await;
        assert_eq!(summary.sentiment, "neutral");
        assert_eq!(summary.resolution_status, "unresolved");
    }

    #[tokio::test]
    async fn summary_writer_persists_enqueued_records_in_order() {
        let storage: Arc<dyn SummaryStorage> = Arc::new(MemorySummaryStorage::default());
        let writer = SummaryWriter::spawn(storage.clone(), 8);
        writer.enqueue(test_record("s1")).await;
        writer.enqueue(test_record("s2")).await;

        for _ in 0..20 {
            if storage.get("s2").await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(storage.get("s1").await.unwrap().is_some());
        assert!(storage.get("s2").await.unwrap().is_some());
    }
}
