//! The analysis collaborator contract (spec §4.5) and an HTTP-based
//! implementation. The prompt strings and the collaborator's own API shape
//! are an external concern; this crate only needs the three result shapes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentResult {
    pub score: f64,
    pub sentiment: String,
    pub reason: String,
    pub should_escalate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub intent: String,
    pub sentiment: String,
    pub sentiment_score: f64,
    pub escalation_risk: String,
    pub key_issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachingResult {
    pub coaching_tip: String,
    pub suggested_responses: Vec<String>,
    pub tone: String,
    pub priority: String,
}

/// The end-of-call summary payload (spec §4.7, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryAnalysis {
    pub sentiment: String,
    pub intent: String,
    pub resolution_status: String,
    pub key_topics: Vec<String>,
    pub action_items: Vec<String>,
    pub frustration_trend: String,
    pub full_text: String,
    pub insights: Vec<String>,
}

/// Open question #1: the source references both `getCoachingSuggestions`
/// and `getSupervisorCoaching` as the name for the same call. Both are
/// exposed here rather than guessing which is canonical.
#[async_trait]
pub trait AnalyticsProvider: Send + Sync {
    async fn sentiment(&self, latest: &str, recent: &[String]) -> anyhow::Result<SentimentResult>;
    async fn analysis(&self, transcript: &str) -> anyhow::Result<AnalysisResult>;
    async fn coaching(&self, recent: &[String], triggering: &str) -> anyhow::Result<CoachingResult>;
    async fn summarize(&self, transcript: &str) -> anyhow::Result<SummaryAnalysis>;

    async fn get_coaching_suggestions(&self, recent: &[String], triggering: &str) -> anyhow::Result<CoachingResult> {
        self.coaching(recent, triggering).await
    }

    async fn get_supervisor_coaching(&self, recent: &[String], triggering: &str) -> anyhow::Result<CoachingResult> {
        self.coaching(recent, triggering).await
    }
}

/// Calls a REST-ish analysis collaborator over HTTP. Endpoint paths and
/// payload shapes are the collaborator's own concern (out of scope per
/// spec §1); this just needs *a* working HTTP client, so it reuses the
/// process's `reqwest` client.
pub struct HttpAnalyticsProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpAnalyticsProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct SentimentRequest<'a> {
    model: &'a str,
    latest: &'a str,
    recent: &'a [String],
}

#[derive(Serialize)]
struct AnalysisRequest<'a> {
    model: &'a str,
    transcript: &'a str,
}

#[derive(Serialize)]
struct CoachingRequest<'a> {
    model: &'a str,
    recent: &'a [String],
    triggering: &'a str,
}

#[async_trait]
impl AnalyticsProvider for HttpAnalyticsProvider {
    async fn sentiment(&self, latest: &str, recent: &[String]) -> anyhow::Result<SentimentResult> {
        let resp = self
            .client
            .post(self.url("/sentiment"))
            .bearer_auth(&self.api_key)
            .json(&SentimentRequest {
                model: &self.model,
                latest,
                recent,
            })
            .send()
            .await?
            .error_for_status()?
            .json::<SentimentResult>()
            .await?;
        Ok(resp)
    }

    async fn analysis(&self, transcript: &str) -> anyhow::Result<AnalysisResult> {
        let resp = self
            .client
            .post(self.url("/analyze"))
            .bearer_auth(&self.api_key)
            .json(&AnalysisRequest {
                model: &self.model,
                transcript,
            })
            .send()
            .await?
            .error_for_status()?
            .json::<AnalysisResult>()
            .await?;
        Ok(resp)
    }

    async fn coaching(&self, recent: &[String], triggering: &str) -> anyhow::Result<CoachingResult> {
        let resp = self
            .client
            .post(self.url("/coaching"))
            .bearer_auth(&self.api_key)
            .json(&CoachingRequest {
                model: &self.model,
                recent,
                triggering,
            })
            .send()
            .await?
            .error_for_status()?
            .json::<CoachingResult>()
            .await?;
        Ok(resp)
    }

    async fn summarize(&self, transcript: &str) -> anyhow::Result<SummaryAnalysis> {
        let resp = self
            .client
            .post(self.url("/summary"))
            .bearer_auth(&self.api_key)
            .json(&AnalysisRequest {
                model: &self.model,
                transcript,
            })
            .send()
            .await?
            .error_for_status()?
            .json::<SummaryAnalysis>()
            .await?;
        Ok(resp)
    }
}
