//! Ingestion errors and their HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use messaging::QueueError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Invalid request body")]
    InvalidBody,

    #[error("Event type is required")]
    MissingType,

    #[error("Unknown event type: {0}")]
    UnknownType(String),

    #[error("Internal server error")]
    Encode(#[source] serde_json::Error),

    #[error("Internal server error")]
    Publish(#[source] QueueError),
}

impl IngestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::InvalidBody | IngestError::MissingType | IngestError::UnknownType(_) => {
                StatusCode::BAD_REQUEST
            }
            IngestError::Encode(_) | IngestError::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        match &self {
            IngestError::Encode(e) => error!(error = %e, "Failed to encode event"),
            IngestError::Publish(e) => error!(error = %e, "Failed to publish event"),
            _ => {}
        }
        (self.status_code(), self.to_string()).into_response()
    }
}
