// src/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

/// Main application error type.
#[derive(Error, Debug)]
pub enum AppError {
    // Key pool errors
    #[error("no active key with remaining quota for service '{service}'")]
    NoAvailableKey { service: String },

    #[error("rotation exhausted: no replacement key left for service '{service}'")]
    RotationExhausted { service: String },

    #[error("key not found: {id}")]
    KeyNotFound { id: Uuid },

    // Storage errors
    #[error("persistence failure during {operation}: {message}")]
    Persistence { operation: String, message: String },

    // Upstream errors (post-classification, propagated after the single retry)
    #[error("upstream call failed: {message}")]
    Upstream {
        message: String,
        status: Option<u16>,
    },

    // Configuration and validation
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation failed: {field} - {message}")]
    Validation { field: String, message: String },

    // Admin surface
    #[error("unauthorized")]
    Unauthorized,

    // Ambient errors
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn persistence(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persistence {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// HTTP status code this error maps to on the admin surface.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::Serialization(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::KeyNotFound { .. } => StatusCode::NOT_FOUND,
            Self::NoAvailableKey { .. } | Self::RotationExhausted { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Persistence { .. } | Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable error code for response bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoAvailableKey { .. } => "no_available_key",
            Self::RotationExhausted { .. } => "rotation_exhausted",
            Self::KeyNotFound { .. } => "key_not_found",
            Self::Persistence { .. } => "persistence",
            Self::Upstream { .. } => "upstream",
            Self::Config(_) => "config",
            Self::Validation { .. } => "validation",
            Self::Unauthorized => "unauthorized",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

/// JSON body returned for failed admin requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub detail: String,
    pub status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            error!(error = %self, error.code = self.code(), "request failed");
        } else {
            warn!(error = %self, error.code = self.code(), "request rejected");
        }

        let body = ErrorResponse {
            error: self.code().to_string(),
            detail: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        Self::Persistence {
            operation: "redis".to_string(),
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::PoolError> for AppError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::Persistence {
            operation: "redis_pool".to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for the application.
pub type Result<T, E = AppError> = std::result::Result<T, E>;
