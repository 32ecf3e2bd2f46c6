use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::fanout::{KeyError, PublishError};
use crate::persistence::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Identity error: {0}")]
    Identity(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<KeyError> for AppError {
    fn from(e: KeyError) -> Self {
        AppError::Validation(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

fn masked(log_msg: &str, public: &str) -> String {
    if is_production() {
        public.to_string()
    } else {
        log_msg.to_string()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, client_message, log_message) = match &self {
            AppError::Config(e) => {
                let log_msg = e.to_string();
                let client_msg = masked(&log_msg, "Configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR", client_msg, log_msg)
            }
            AppError::Identity(msg) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg.clone(),
                msg.clone(),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                msg.clone(),
                msg.clone(),
            ),
            AppError::Store(StoreError::UnknownParticipant(id)) => {
                let msg = format!("Unknown participant: {}", id);
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), msg)
            }
            AppError::Store(StoreError::Unavailable(e)) => {
                let log_msg = e.clone();
                let client_msg = masked(&log_msg, "Service temporarily unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", client_msg, log_msg)
            }
            AppError::Store(e) => {
                let log_msg = e.to_string();
                let client_msg = masked(&log_msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", client_msg, log_msg)
            }
            AppError::Publish(e) => {
                let log_msg = e.to_string();
                let client_msg = masked(&log_msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "PUBLISH_ERROR", client_msg, log_msg)
            }
            AppError::Internal(e) => {
                let log_msg = e.clone();
                let client_msg = masked(&log_msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", client_msg, log_msg)
            }
        };

        if status.is_server_error() {
            tracing::error!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API error"
            );
        } else {
            tracing::debug!(
                code = %code,
                status = %status.as_u16(),
                message = %log_message,
                "API request rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
