// src/upstream.rs
//
// The single translation point between provider-specific failure text and the
// typed taxonomy the rotator acts on. Providers report quota and credential
// problems inconsistently (status codes, "API_KEY_INVALID" markers, prose),
// so the substring contract is quarantined here.

use crate::error::AppError;
use thiserror::Error;

/// How an upstream failure affects the key that served it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The key's quota window is spent. Rotate to another key.
    QuotaExhausted,
    /// The credential was rejected (expired/revoked). Rotate to another key.
    AuthRejected,
    /// Anything else: network trouble, 5xx, malformed request. Not the key's
    /// fault, so rotation would not help.
    Transient,
}

/// Failure reported by a caller from an upstream API invocation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct UpstreamError {
    pub message: String,
    pub status: Option<u16>,
}

impl UpstreamError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status: u16) -> Self {
        Self {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Classifies this failure into the rotation taxonomy.
    pub fn kind(&self) -> FailureKind {
        classify(self.message.as_str(), self.status)
    }

    /// Whether this failure should trigger a key rotation.
    pub fn is_rotatable(&self) -> bool {
        self.kind() != FailureKind::Transient
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

impl From<UpstreamError> for AppError {
    fn from(err: UpstreamError) -> Self {
        AppError::Upstream {
            message: err.message,
            status: err.status,
        }
    }
}

fn classify(message: &str, status: Option<u16>) -> FailureKind {
    match status {
        Some(429) => return FailureKind::QuotaExhausted,
        Some(401) | Some(403) => return FailureKind::AuthRejected,
        _ => {}
    }

    let lowered = message.to_lowercase();
    if lowered.contains("quota")
        || lowered.contains("resource_exhausted")
        || lowered.contains("rate limit")
        || message.contains("429")
    {
        return FailureKind::QuotaExhausted;
    }
    if message.contains("API_KEY")
        || message.contains("403")
        || message.contains("Forbidden")
        || lowered.contains("permission_denied")
        || lowered.contains("unauthenticated")
    {
        return FailureKind::AuthRejected;
    }
    FailureKind::Transient
}
