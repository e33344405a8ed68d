//! HTTP error helpers for the control surface, in the same shape as the
//! domain error enums used throughout the core (`thiserror`, no `unwrap`).

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub const HEADER_ERROR_CODE: &str = "X-Mediation-Error-Code";

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    #[serde(rename = "type")]
    error_type: &'static str,
    code: &'a str,
    message: &'a str,
}

pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::BAD_REQUEST, code, message)
}

pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::NOT_FOUND, code, message)
}

pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::CONFLICT, code, message)
}

pub fn service_unavailable(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::SERVICE_UNAVAILABLE, code, message)
}

pub fn internal_error(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::INTERNAL_SERVER_ERROR, code, message)
}

pub fn create_error(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Response {
    let code_str = code.into();
    let message_str = message.into();

    let mut headers = HeaderMap::with_capacity(1);
    if let Ok(val) = HeaderValue::from_str(&code_str) {
        headers.insert(HEADER_ERROR_CODE, val);
    }

    (
        status,
        headers,
        Json(ErrorResponse {
            error: ErrorDetail {
                error_type: status.canonical_reason().unwrap_or("Unknown Status Code"),
                code: &code_str,
                message: &message_str,
            },
        }),
    )
        .into_response()
}

/// Errors surfaced by supervisor commands (spec §4.7, "Errors"). Carries a
/// stable machine-readable code matching what a supervisor client switches on.
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[serde(tag = "code", content = "detail", rename_all = "camelCase")]
pub enum CommandError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("wrong mode for this command")]
    WrongMode,
    #[error("AI binding not ready")]
    AiNotReady,
    #[error("context injection failed: {0}")]
    ContextInjectionFailed(String),
}

impl CommandError {
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::SessionNotFound(_) => "sessionNotFound",
            CommandError::WrongMode => "wrongMode",
            CommandError::AiNotReady => "aiNotReady",
            CommandError::ContextInjectionFailed(_) => "contextInjectionFailed",
        }
    }
}
