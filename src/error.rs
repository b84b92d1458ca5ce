use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("OPENAI_API_KEY is not configured on the server.")]
    MissingCredential,
    #[error("messages must contain at least one entry")]
    EmptyInput,
    #[error("Invalid payload")]
    InvalidPayload,
    #[error("{0}")]
    Upstream(String),
    #[error("stream not found or expired")]
    HandoffNotFound,
}

impl ChatError {
    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::MissingCredential => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::EmptyInput | ChatError::InvalidPayload => StatusCode::BAD_REQUEST,
            ChatError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ChatError::HandoffNotFound => StatusCode::NOT_FOUND,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ChatError::MissingCredential => "credential_missing",
            ChatError::EmptyInput => "empty_input",
            ChatError::InvalidPayload => "invalid_payload",
            ChatError::Upstream(_) => "upstream_error",
            ChatError::HandoffNotFound => "stream_not_found",
        }
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        AppError::new(err.status(), err.code(), err.to_string())
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::warn!(code = %self.code, status = %self.status, "{}", self.message);
        } else {
            tracing::debug!(code = %self.code, status = %self.status, "{}", self.message);
        }
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, axum::Json(body)).into_response()
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
