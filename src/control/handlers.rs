//! HTTP handlers for the control surface (spec §6, "Control surface").

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use mediation_storage::{SortOrder, SummaryQuery, SummaryStorage};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::analytics::AnalyticsProvider;
use crate::error::{bad_request, internal_error, not_found};
use crate::summary::compute_summary;

use super::AppState;

pub async fn health(State(state): State<AppState>) -> Response {
    Json(json!({
        "status": "healthy",
        "activeSessions": state.manager.active_count(),
        "timestamp": Utc::now(),
    }))
    .into_response()
}

pub async fn list_sessions(State(state): State<AppState>) -> Response {
    Json(state.manager.session_snapshots()).into_response()
}

pub async fn get_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(snapshot) = state.manager.session_snapshot(&id) else {
        return not_found("sessionNotFound", format!("no session with id {id}"));
    };
    let transcript = state.manager.session_transcript(&id).unwrap_or_default();
    Json(json!({ "snapshot": snapshot, "transcript": transcript })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct SummariesQuery {
    limit: Option<usize>,
    offset: Option<usize>,
    sentiment: Option<String>,
    intent: Option<String>,
    resolution: Option<String>,
    #[serde(rename = "sortBy")]
    sort_by: Option<String>,
    #[serde(rename = "sortOrder")]
    sort_order: Option<String>,
}

pub async fn list_summaries(State(state): State<AppState>, Query(q): Query<SummariesQuery>) -> Response {
    let sort_order = match q.sort_order.as_deref() {
        Some("asc") => SortOrder::Asc,
        _ => SortOrder::Desc,
    };
    let query = SummaryQuery {
        limit: q.limit.unwrap_or(50),
        offset: q.offset.unwrap_or(0),
        sentiment: q.sentiment,
        intent: q.intent,
        resolution: q.resolution,
        sort_by: q.sort_by,
        sort_order,
    };
    match state.storage.list(query).await {
        Ok(page) => Json(page).into_response(),
        Err(e) => internal_error("storageError", e.to_string()),
    }
}

pub async fn get_summary(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.storage.get(&id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => not_found("summaryNotFound", format!("no summary for session {id}")),
        Err(e) => internal_error("storageError", e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingRequest {
    session_id: String,
    customer_message: String,
}

pub async fn coaching(State(state): State<AppState>, Json(req): Json<CoachingRequest>) -> Response {
    let Some(transcript) = state.manager.session_transcript(&req.session_id) else {
        return not_found("sessionNotFound", format!("no session with id {}", req.session_id));
    };
    let recent: Vec<String> = transcript.iter().rev().take(5).rev().map(|e| e.content.clone()).collect();
    match state.provider.get_supervisor_coaching(&recent, &req.customer_message).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => internal_error("analyticsError", e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdRequest {
    session_id: String,
}

pub async fn analyze(State(state): State<AppState>, Json(req): Json<SessionIdRequest>) -> Response {
    let Some(transcript) = state.manager.session_transcript(&req.session_id) else {
        return not_found("sessionNotFound", format!("no session with id {}", req.session_id));
    };
    let text = transcript.iter().map(|e| e.content.clone()).collect::<Vec<_>>().join("\n");
    if text.trim().is_empty() {
        return bad_request("emptyTranscript", "session has no transcript yet");
    }
    match state.provider.analysis(&text).await {
        Ok(result) => Json(result).into_response(),
        Err(e) => internal_error("analyticsError", e.to_string()),
    }
}

#[derive(Debug, Serialize)]
struct OnDemandSummaryResponse {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(flatten)]
    summary: crate::analytics::SummaryAnalysis,
}

pub async fn generate_summary(State(state): State<AppState>, Json(req): Json<SessionIdRequest>) -> Response {
    let Some(transcript) = state.manager.session_transcript(&req.session_id) else {
        return not_found("sessionNotFound", format!("no session with id {}", req.session_id));
    };
    let summary = compute_summary(state.provider.as_ref(), &transcript).await;
    Json(OnDemandSummaryResponse {
        session_id: req.session_id,
        summary,
    })
    .into_response()
}
