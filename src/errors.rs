use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("credential not found: {0}")]
    NotFound(String),

    #[error("xray config not found: {0}")]
    ConfigNotFound(String),

    #[error("client with id {0} already exists")]
    DuplicateCredential(String),

    #[error("unsupported config shape: {0}")]
    UnsupportedConfigShape(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("external command unavailable: {0}")]
    ExternalCommandUnavailable(String),

    #[error("external command `{command}` failed: {detail}")]
    ExternalCommandFailed { command: String, detail: String },

    #[error("unknown choice: {0}")]
    UnknownChoice(String),

    #[error("no active creation request")]
    NoActiveSession,

    #[error("wizard step out of order: expected {expected}")]
    WizardOutOfOrder { expected: &'static str },

    #[error("failed to create key")]
    ProvisioningFailed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, code, msg) = match &self {
            AppError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "not_found_error",
                "key_not_found",
                format!("key {} not found", id),
            ),
            AppError::DuplicateCredential(id) => (
                StatusCode::CONFLICT,
                "conflict_error",
                "duplicate_key",
                format!("key {} already exists", id),
            ),
            AppError::UnknownChoice(value) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "unknown_choice",
                format!("unknown choice '{}'", value),
            ),
            AppError::NoActiveSession => (
                StatusCode::CONFLICT,
                "invalid_request_error",
                "no_active_request",
                "no active key creation request".to_string(),
            ),
            AppError::WizardOutOfOrder { expected } => (
                StatusCode::CONFLICT,
                "invalid_request_error",
                "wizard_out_of_order",
                format!("choose {} first", expected),
            ),
            AppError::ProvisioningFailed => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "key_creation_failed",
                "failed to create key".to_string(),
            ),
            other => {
                tracing::error!(error = %other, "admin API request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal_server_error",
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": msg,
                "type": error_type,
                "code": code,
            }
        }));

        (status, body).into_response()
    }
}
