//! Error types shared across the service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors the service can report.
///
/// Schema mismatches are recoverable per request. A model that cannot be
/// loaded makes the whole service inoperable and is surfaced at startup.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Input data does not conform to the 29-column transaction schema,
    /// or a value could not be coerced to a number.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The model artifact could not be found or deserialized at startup.
    #[error("model load failure: {0}")]
    ModelLoad(String),

    /// The loaded model failed during an inference call.
    #[error("inference error: {0}")]
    Inference(String),

    /// Anything that should never happen during normal operation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Schema error naming the columns absent from an uploaded table.
    pub fn missing_columns(columns: &[String]) -> Self {
        ServiceError::SchemaMismatch(format!(
            "required column(s) missing: {}",
            columns.join(", ")
        ))
    }
}

impl From<ort::Error> for ServiceError {
    fn from(err: ort::Error) -> Self {
        ServiceError::Inference(err.to_string())
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServiceError::SchemaMismatch(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg.clone())
            }
            ServiceError::ModelLoad(msg) => {
                tracing::error!("Model load failure: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "model unavailable".to_string(),
                )
            }
            ServiceError::Inference(msg) => {
                tracing::error!("Inference error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "inference failed".to_string(),
                )
            }
            ServiceError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}
