//! Per-session analytics dispatcher (spec §4.5). Each kind (sentiment,
//! conversation analysis, coaching) runs on its own worker task with a
//! `watch` channel as the trigger: a `watch::Sender` only ever holds the
//! latest value, so a new trigger arriving while one task is in flight
//! naturally replaces the queued one instead of piling up (the "latest-wins"
//! requirement in spec §4.5).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tracing::warn;

use super::keyword::classify_intent;
use super::provider::{AnalyticsProvider, AnalysisResult, CoachingResult, SentimentResult};

#[derive(Debug, Clone)]
pub struct SentimentInput {
    pub latest: String,
    pub recent: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub transcript: String,
}

#[derive(Debug, Clone)]
pub struct CoachingInput {
    pub recent: Vec<String>,
    pub triggering: String,
}

#[derive(Debug, Clone)]
pub enum AnalyticsResult {
    Sentiment { session_id: String, result: SentimentResult },
    Analysis { session_id: String, result: AnalysisResult },
    Coaching { session_id: String, result: CoachingResult },
}

pub struct AnalyticsDispatcher {
    sentiment_tx: watch::Sender<Option<SentimentInput>>,
    analysis_tx: watch::Sender<Option<AnalysisInput>>,
    coaching_tx: watch::Sender<Option<CoachingInput>>,
}

impl AnalyticsDispatcher {
    pub fn spawn(
        provider: Arc<dyn AnalyticsProvider>,
        analytics_timeout: Duration,
        results_tx: mpsc::Sender<AnalyticsResult>,
        session_id: String,
    ) -> Self {
        let (sentiment_tx, sentiment_rx) = watch::channel(None);
        let (analysis_tx, analysis_rx) = watch::channel(None);
        let (coaching_tx, coaching_rx) = watch::channel(None);

        tokio::spawn(sentiment_worker(
            provider.clone(),
            analytics_timeout,
            results_tx.clone(),
            session_id.clone(),
            sentiment_rx,
        ));
        tokio::spawn(analysis_worker(
            provider.clone(),
            analytics_timeout,
            results_tx.clone(),
            session_id.clone(),
            analysis_rx,
        ));
        tokio::spawn(coaching_worker(provider, analytics_timeout, results_tx, session_id, coaching_rx));

        Self {
            sentiment_tx,
            analysis_tx,
            coaching_tx,
        }
    }

    pub fn trigger_sentiment(&self, input: SentimentInput) {
        let _ = self.sentiment_tx.send(Some(input));
    }

    pub fn trigger_analysis(&self, input: AnalysisInput) {
        let _ = self.analysis_tx.send(Some(input));
    }

    pub fn trigger_coaching(&self, input: CoachingInput) {
        let _ = self.coaching_tx.send(Some(input));
    }
}

async fn sentiment_worker(
    provider: Arc<dyn AnalyticsProvider>,
    analytics_timeout: Duration,
    results_tx: mpsc::Sender<AnalyticsResult>,
    session_id: String,
    mut rx: watch::Receiver<Option<SentimentInput>>,
) {
    while rx.changed().await.is_ok() {
        let Some(input) = rx.borrow_and_update().clone() else {
            continue;
        };
        let outcome = timeout(analytics_timeout, provider.sentiment(&input.latest, &input.recent)).await;
        let result = match outcome {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                warn!(error = %e, "sentiment analytics failed");
                neutral_sentiment()
            }
            Err(_) => {
                warn!("sentiment analytics timed out");
                neutral_sentiment()
            }
        };
        let _ = results_tx
            .send(AnalyticsResult::Sentiment {
                session_id: session_id.clone(),
                result,
            })
            .await;
    }
}

fn neutral_sentiment() -> SentimentResult {
    SentimentResult {
        score: 0.0,
        sentiment: "neutral".into(),
        reason: "analytics unavailable".into(),
        should_escalate: false,
    }
}

async fn analysis_worker(
    provider: Arc<dyn AnalyticsProvider>,
    analytics_timeout: Duration,
    results_tx: mpsc::Sender<AnalyticsResult>,
    session_id: String,
    mut rx: watch::Receiver<Option<AnalysisInput>>,
) {
    while rx.changed().await.is_ok() {
        let Some(input) = rx.borrow_and_update().clone() else {
            continue;
        };
        let outcome = timeout(analytics_timeout, provider.analysis(&input.transcript)).await;
        let result = match outcome {
            Ok(Ok(r)) => Some(r),
            Ok(Err(e)) => {
                warn!(error = %e, "conversation analysis failed");
                fallback_analysis(&input.transcript)
            }
            Err(_) => {
                warn!("conversation analysis timed out");
                fallback_analysis(&input.transcript)
            }
        };
        if let Some(result) = result {
            let _ = results_tx
                .send(AnalyticsResult::Analysis {
                    session_id: session_id.clone(),
                    result,
                })
                .await;
        }
    }
}

fn fallback_analysis(transcript: &str) -> Option<AnalysisResult> {
    if transcript.trim().is_empty() {
        return None;
    }
    Some(AnalysisResult {
        intent: classify_intent(transcript).to_string(),
        sentiment: "neutral".into(),
        sentiment_score: 0.0,
        escalation_risk: "unknown".into(),
        key_issues: Vec::new(),
    })
}

async fn coaching_worker(
    provider: Arc<dyn AnalyticsProvider>,
    analytics_timeout: Duration,
    results_tx: mpsc::Sender<AnalyticsResult>,
    session_id: String,
    mut rx: watch::Receiver<Option<CoachingInput>>,
) {
    while rx.changed().await.is_ok() {
        let Some(input) = rx.borrow_and_update().clone() else {
            continue;
        };
        let outcome = timeout(
            analytics_timeout,
            provider.get_supervisor_coaching(&input.recent, &input.triggering),
        )
        .await;
        match outcome {
            Ok(Ok(result)) => {
                let _ = results_tx
                    .send(AnalyticsResult::Coaching {
                        session_id: session_id.clone(),
                        result,
                    })
                    .await;
            }
            Ok(Err(e)) => warn!(error = %e, "coaching analytics failed"),
            Err(_) => warn!("coaching analytics timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AnalyticsProvider for FlakyProvider {
        async fn sentiment(&self, _latest: &str, _recent: &[String]) -> anyhow::Result<SentimentResult> {
            anyhow::bail!("boom")
        }

        async fn analysis(&self, transcript: &str) -> anyhow::Result<AnalysisResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("boom: {transcript}")
        }

        async fn coaching(&self, _recent: &[String], _triggering: &str) -> anyhow::Result<CoachingResult> {
            anyhow::bail!("boom")
        }

        async fn summarize(&self, _transcript: &str) -> anyhow::Result<super::provider::SummaryAnalysis> {
            anyhow::bail!("boom")
        }
    }

    #[tokio::test]
    async fn sentiment_failure_emits_neutral_fallback() {
        let provider: Arc<dyn AnalyticsProvider> = Arc::new(FlakyProvider { calls: AtomicUsize::new(0) });
        let (tx, mut rx) = mpsc::channel(4);
        let dispatcher = AnalyticsDispatcher::spawn(provider, Duration::from_millis(200), tx, "s1".into());
        dispatcher.trigger_sentiment(SentimentInput {
            latest: "I am upset".into(),
            recent: vec![],
        });
        match rx.recv().await {
            Some(AnalyticsResult::Sentiment { result, .. }) => {
                assert_eq!(result.sentiment, "neutral");
                assert!(!result.should_escalate);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn analysis_failure_falls_back_to_keyword_classifier() {
        let provider: Arc<dyn AnalyticsProvider> = Arc::new(FlakyProvider { calls: AtomicUsize::new(0) });
        let (tx, mut rx) = mpsc::channel(4);
        let dispatcher = AnalyticsDispatcher::spawn(provider, Duration::from_millis(200), tx, "s1".into());
        dispatcher.trigger_analysis(AnalysisInput {
            transcript: "I want to cancel my subscription".into(),
        });
        match rx.recv().await {
            Some(AnalyticsResult::Analysis { result, .. }) => assert_eq!(result.intent, "cancellation"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
