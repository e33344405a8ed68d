//! Integration tests for the HTTP control surface (spec §6), spun up
//! end-to-end against a bound local port with an in-memory storage backend
//! and a stub analytics collaborator.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use mediation::analytics::{AnalysisResult, AnalyticsProvider, CoachingResult, SentimentResult, SummaryAnalysis};
use mediation::config::Config;
use mediation::control::{build_router, AppState};
use mediation::session::SessionManager;
use mediation::summary::SummaryWriter;
use mediation::supervisor::SupervisorRegistry;
use mediation_auth::{ApiKeyEntry, ControlPlaneAuthConfig, Role};
use mediation_storage::MemorySummaryStorage;

struct StubProvider;

#[async_trait]
impl AnalyticsProvider for StubProvider {
    async fn sentiment(&self, _latest: &str, _recent: &[String]) -> anyhow::Result<SentimentResult> {
        Ok(SentimentResult {
            score: 0.0,
            sentiment: "neutral".into(),
            reason: "stub".into(),
            should_escalate: false,
        })
    }

    async fn analysis(&self, _transcript: &str) -> anyhow::Result<AnalysisResult> {
        Ok(AnalysisResult {
            intent: "support".into(),
            sentiment: "neutral".into(),
            sentiment_score: 0.0,
            escalation_risk: "low".into(),
            key_issues: vec![],
        })
    }

    async fn coaching(&self, _recent: &[String], _triggering: &str) -> anyhow::Result<CoachingResult> {
        Ok(CoachingResult {
            coaching_tip: "stay calm".into(),
            suggested_responses: vec![],
            tone: "empathetic".into(),
            priority: "low".into(),
        })
    }

    async fn summarize(&self, _transcript: &str) -> anyhow::Result<SummaryAnalysis> {
        Ok(SummaryAnalysis {
            sentiment: "neutral".into(),
            intent: "support".into(),
            resolution_status: "resolved".into(),
            key_topics: vec![],
            action_items: vec![],
            frustration_trend: "stable".into(),
            full_text: String::new(),
            insights: vec![],
        })
    }
}

fn test_config() -> Config {
    Config {
        api_key: "test-key".into(),
        port: 0,
        debug: false,
        voice_model: "test-voice".into(),
        analysis_model: "test-analysis".into(),
        ai_provider_ws_url: "wss://example.invalid/realtime".into(),
        analytics_base_url: "https://example.invalid".into(),
        transcription_debounce_ms: 400,
        echo_window_ms: 10_000,
        analytics_timeout_ms: 5_000,
        connect_timeout_ms: 10_000,
        drain_timeout_ms: 500,
        escalation_score_threshold: 70.0,
        supervisor_outbox_capacity: 256,
        customer_outbox_capacity: 64,
        ai_outbound_audio_capacity: 128,
        summary_writer_queue_capacity: 256,
        summary_backend: "memory".into(),
        database_url: String::new(),
        database_pool_max: 16,
        supervisor_api_keys: String::new(),
    }
}

async fn spawn_server(auth: ControlPlaneAuthConfig) -> SocketAddr {
    let config = Arc::new(test_config());
    let registry = Arc::new(SupervisorRegistry::new());
    let provider: Arc<dyn AnalyticsProvider> = Arc::new(StubProvider);
    let storage = Arc::new(MemorySummaryStorage::new());
    let summary_writer = SummaryWriter::spawn(storage.clone(), config.summary_writer_queue_capacity);
    let manager = SessionManager::new(registry.clone(), provider.clone(), summary_writer, config.clone());

    let state = AppState {
        manager,
        registry,
        provider,
        storage,
        config,
    };

    let app = build_router(state, auth);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn health_reports_zero_active_sessions_and_needs_no_auth() {
    let addr = spawn_server(ControlPlaneAuthConfig::new()).await;
    let body: serde_json::Value = reqwest::get(format!("http://{addr}/health")).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["activeSessions"], 0);
}

#[tokio::test]
async fn sessions_list_requires_authentication() {
    let addr = spawn_server(ControlPlaneAuthConfig::new()).await;
    let resp = reqwest::get(format!("http://{addr}/sessions")).await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sessions_list_with_valid_key_returns_empty_array() {
    let auth = ControlPlaneAuthConfig::new().with_key("secret", ApiKeyEntry::new("sup-1", Role::Supervisor, "secret"));
    let addr = spawn_server(auth).await;
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/sessions"))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: Vec<serde_json::Value> = resp.json().await.unwrap();
    assert!(body.is_empty());
}

#[tokio::test]
async fn analyze_unknown_session_returns_session_not_found() {
    let auth = ControlPlaneAuthConfig::new().with_key("secret", ApiKeyEntry::new("sup-1", Role::Supervisor, "secret"));
    let addr = spawn_server(auth).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}/analyze"))
        .bearer_auth("secret")
        .json(&serde_json::json!({ "sessionId": "does-not-exist" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    let code = resp.headers().get(mediation::error::HEADER_ERROR_CODE).cloned();
    assert!(code.is_some());
}

#[tokio::test]
async fn summary_for_unknown_session_is_not_found() {
    let auth = ControlPlaneAuthConfig::new().with_key("secret", ApiKeyEntry::new("sup-1", Role::Supervisor, "secret"));
    let addr = spawn_server(auth).await;
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("http://{addr}/summary/unknown-session"))
        .bearer_auth("secret")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
}
