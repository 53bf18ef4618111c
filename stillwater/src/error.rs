//! Error types shared by the store, the HTTP layer and the draft editor.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::DraftField;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors produced while editing, saving or publishing content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A required field is missing or a value is out of range.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The referenced record does not exist (or is not visible to the caller).
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    /// The caller does not own the referenced record.
    #[error("Not authorized to access {entity} '{id}'")]
    Unauthorized { entity: &'static str, id: String },

    /// Network or storage failure; the operation may succeed if retried.
    #[error("Transient I/O failure: {0}")]
    TransientIo(String),

    /// The draft has already been promoted into a session.
    #[error("Draft was already published as session '{0}'")]
    AlreadyPublished(String),

    /// Unexpected data from the store or the server.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// A required field was left empty.
    pub fn missing(field: DraftField) -> Self {
        Self::Validation(format!("{field} is required"))
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn unauthorized(entity: &'static str, id: impl Into<String>) -> Self {
        Self::Unauthorized {
            entity,
            id: id.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientIo(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether a later attempt with the same input could succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::TransientIo(_))
    }

    /// Stable machine-readable code, used on the wire.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Unauthorized { .. } => "unauthorized",
            Self::TransientIo(_) => "transient_io",
            Self::AlreadyPublished(_) => "already_published",
            Self::Internal(_) => "internal",
        }
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::TransientIo(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::AlreadyPublished(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::TransientIo(format!("storage: {e}"))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Internal(format!("malformed response: {e}"))
        } else {
            Self::TransientIo(format!("network: {e}"))
        }
    }
}

/// JSON body sent with every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Validation(msg) | Self::TransientIo(msg) | Self::AlreadyPublished(msg) => {
                msg.clone()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            code: self.code().to_string(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}
