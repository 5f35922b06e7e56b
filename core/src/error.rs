//! Error types for the novel API client.
//!
//! # Design
//! Every failure below the `ApiService` boundary ends up as an `ApiError`
//! carrying a user-presentable `message`, the HTTP `status` (0 when no
//! response arrived) and the raw server payload in `details` so callers can
//! show field-level validation errors. `kind` classifies the failure without
//! forcing callers to match on status codes.

use serde_json::Value;
use thiserror::Error;

/// Shown for unresolved 401s instead of the server's wording.
pub const UNAUTHORIZED_MESSAGE: &str = "Please log in to access this content";
/// Shown for every 403 instead of the server's wording.
pub const FORBIDDEN_MESSAGE: &str = "You don't have permission to access this content";

/// Coarse classification of an `ApiError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No HTTP response reached the client.
    Transport,
    /// 401 that the retry coordinator could not resolve.
    Unauthorized,
    /// 403, never retried.
    Forbidden,
    /// 404.
    NotFound,
    /// Any other 4xx.
    Validation,
    /// 5xx.
    Server,
    /// The request body could not be serialized.
    Encode,
    /// A successful response did not match the expected shape.
    Decode,
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    pub message: String,
    pub status: u16,
    pub details: Option<Value>,
    pub kind: ErrorKind,
}

impl ApiError {
    /// Network-level failure, status 0.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: 0,
            details: None,
            kind: ErrorKind::Transport,
        }
    }

    /// Error for a non-2xx response with an already-chosen message.
    ///
    /// 401 and 403 always get the fixed user-facing wording.
    pub fn from_response(status: u16, message: String, details: Option<Value>) -> Self {
        let (kind, message) = match status {
            401 => (ErrorKind::Unauthorized, UNAUTHORIZED_MESSAGE.to_string()),
            403 => (ErrorKind::Forbidden, FORBIDDEN_MESSAGE.to_string()),
            404 => (ErrorKind::NotFound, message),
            500..=599 => (ErrorKind::Server, message),
            _ => (ErrorKind::Validation, message),
        };
        Self {
            message,
            status,
            details,
            kind,
        }
    }

    pub fn encode(err: impl std::fmt::Display) -> Self {
        Self {
            message: format!("failed to encode request body: {err}"),
            status: 0,
            details: None,
            kind: ErrorKind::Encode,
        }
    }

    pub fn decode(status: u16, err: impl std::fmt::Display) -> Self {
        Self {
            message: format!("failed to decode response: {err}"),
            status,
            details: None,
            kind: ErrorKind::Decode,
        }
    }

    /// A plain client-side precondition failure, e.g. a missing refresh token.
    pub fn invalid(status: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status,
            details: None,
            kind: ErrorKind::Validation,
        }
    }

    /// Whether this error means "past the last page" to the aggregator.
    pub fn is_page_not_found(&self) -> bool {
        self.status == 404
            || self.message.contains("Invalid page")
            || self.message.contains("Not Found")
    }
}
