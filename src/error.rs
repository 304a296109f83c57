//! Crate-wide error type and its HTTP/WebSocket surfaces.
//!
//! Every fallible boundary (HTTP handler, WebSocket inbound event, admin
//! command) converts into `AppError`, which knows how to render itself as
//! the `{error, message, details?}` HTTP body (§6.1) or the `{code,
//! message, details?}` WebSocket `error` event (§6.2). Internal failures
//! are logged with full detail and surfaced to the client as `INTERNAL_ERROR`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("no active session")]
    SessionNotFound,

    #[error("session {0} is not the current session")]
    SessionIdMismatch(String),

    #[error("a session is already active or paused")]
    ConcurrentSession,

    #[error("authentication required")]
    AuthRequired,

    #[error("token expired")]
    TokenExpired,

    #[error("invalid token")]
    InvalidToken,

    #[error("unauthorized")]
    Unauthorized,

    #[error("vlc error: {0}")]
    Vlc(String),

    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::SessionNotFound => "SESSION_NOT_FOUND",
            AppError::SessionIdMismatch(_) => "SESSION_ID_MISMATCH",
            AppError::ConcurrentSession => "CONCURRENT_SESSION",
            AppError::AuthRequired => "AUTH_REQUIRED",
            AppError::TokenExpired => "TOKEN_EXPIRED",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Vlc(_) => "VLC_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::SessionNotFound => StatusCode::SERVICE_UNAVAILABLE,
            AppError::SessionIdMismatch(_) => StatusCode::NOT_FOUND,
            AppError::ConcurrentSession => StatusCode::CONFLICT,
            AppError::AuthRequired | AppError::TokenExpired | AppError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Unauthorized => StatusCode::FORBIDDEN,
            AppError::Vlc(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `{code, message, details?}` shape used by the WebSocket `error` event.
    pub fn as_ws_event(&self) -> Value {
        serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
        })
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<crate::session::SessionError> for AppError {
    fn from(err: crate::session::SessionError) -> Self {
        match err {
            crate::session::SessionError::ConcurrentSession => AppError::ConcurrentSession,
            crate::session::SessionError::NotFound => AppError::SessionNotFound,
            crate::session::SessionError::Store(e) => AppError::Internal(e.into()),
        }
    }
}

impl From<crate::session::EngineError> for AppError {
    fn from(err: crate::session::EngineError) -> Self {
        match err {
            crate::session::EngineError::NoActiveSession => AppError::SessionNotFound,
            crate::session::EngineError::Session(e) => e.into(),
        }
    }
}

impl From<crate::offline::OfflineError> for AppError {
    fn from(err: crate::offline::OfflineError) -> Self {
        match err {
            crate::offline::OfflineError::Engine(e) => e.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if matches!(self, AppError::Internal(_)) {
            tracing::error!(error = %self, "internal error");
        }

        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
            details: None,
        };

        (self.status(), axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
