//! Public error contract for the client
//!
//! Every public client method resolves to [`ApiResult`]; all failure modes
//! are folded into [`ApiFailure`] rather than surfaced as panics or raw
//! transport errors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type returned by every public client method.
///
/// The `Err` arm is always a fully-populated [`ApiFailure`]; callers branch
/// on it instead of catching exceptions.
pub type ApiResult<T> = Result<T, ApiFailure>;

/// Categories of client failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// Transport never reached the server (includes timeouts)
    Network,
    /// 401, a failed refresh, or a replay that was rejected again
    Auth,
    /// 403, surfaced to the caller and logged, never auto-recovered
    Permission,
    /// Structured field-level validation errors from the server
    Validation,
    /// Anything that does not fit the categories above
    Unknown,
}

/// Uniform failure payload surfaced to callers
///
/// `message` is always present and human-readable. `errors` carries the
/// flattened list form of the same information. For validation failures the
/// original field-to-messages mapping is preserved in `field_errors` so
/// calling forms can map messages back onto inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct ApiFailure {
    /// Failure category
    pub kind: ApiErrorKind,
    /// Primary human-readable message
    pub message: String,
    /// Flattened message list (at least one entry)
    pub errors: Vec<String>,
    /// Original field-keyed validation mapping, when the server sent one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_errors: Option<BTreeMap<String, Vec<String>>>,
    /// HTTP status code, when a response was received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ApiFailure {
    /// Transport-level failure: the request never produced a response.
    #[must_use]
    pub fn network() -> Self {
        Self {
            kind: ApiErrorKind::Network,
            message: "network error".to_string(),
            errors: vec!["Network error".to_string()],
            field_errors: None,
            status: None,
        }
    }

    /// Authentication failure (401 or refresh exhaustion).
    #[must_use]
    pub fn auth(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ApiErrorKind::Auth,
            errors: vec![message.clone()],
            message,
            field_errors: None,
            status: None,
        }
    }

    /// Permission failure (403).
    #[must_use]
    pub fn permission(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ApiErrorKind::Permission,
            errors: vec![message.clone()],
            message,
            field_errors: None,
            status: None,
        }
    }

    /// Field-level validation failure, preserving the server's mapping.
    #[must_use]
    pub fn validation(
        message: impl Into<String>,
        errors: Vec<String>,
        field_errors: BTreeMap<String, Vec<String>>,
    ) -> Self {
        Self {
            kind: ApiErrorKind::Validation,
            message: message.into(),
            errors,
            field_errors: Some(field_errors),
            status: None,
        }
    }

    /// Fallback failure for anything unclassified.
    #[must_use]
    pub fn unknown(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: ApiErrorKind::Unknown,
            errors: vec![message.clone()],
            message,
            field_errors: None,
            status: None,
        }
    }

    /// Attach the HTTP status the failure was derived from.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Check if retrying the same request could succeed.
    ///
    /// Only transport failures qualify; auth recovery is handled inside the
    /// request pipeline, and the remaining kinds are deterministic.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ApiErrorKind::Network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_shape() {
        let failure = ApiFailure::network();
        assert_eq!(failure.kind, ApiErrorKind::Network);
        assert_eq!(failure.message, "network error");
        assert_eq!(failure.errors, vec!["Network error".to_string()]);
        assert!(failure.field_errors.is_none());
    }

    #[test]
    fn test_should_retry() {
        assert!(ApiFailure::network().is_retryable());
        assert!(!ApiFailure::auth("expired").is_retryable());
        assert!(!ApiFailure::permission("denied").is_retryable());
        assert!(!ApiFailure::unknown("boom").is_retryable());
    }

    #[test]
    fn test_with_status() {
        let failure = ApiFailure::permission("denied").with_status(403);
        assert_eq!(failure.status, Some(403));
    }

    #[test]
    fn test_display_uses_message() {
        let failure = ApiFailure::auth("session expired");
        assert_eq!(failure.to_string(), "session expired");
    }
}
