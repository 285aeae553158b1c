//! Authentication data types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access/refresh credential pair created at login.
///
/// The access half is attached to every outgoing request when present; the
/// refresh half is read only by the token manager and never exposed to
/// feature code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived credential sent as the bearer token.
    pub access: String,
    /// Longer-lived credential used only to mint new access tokens.
    pub refresh: String,
}

/// Body of the token refresh request.
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    /// The stored refresh token.
    pub refresh: &'a str,
}

/// Body of a successful token refresh response.
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    /// The newly minted access token.
    pub access: String,
}

/// Session lifecycle state of the token manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No refresh in flight; requests proceed normally.
    Idle,
    /// A refresh is in flight; new 401s subscribe to its outcome.
    Refreshing,
    /// A refresh failed; credentials are cleared and requests fail fast
    /// until the host re-authenticates.
    Invalidated,
}

/// Token refresh errors
///
/// `Clone` because one refresh outcome is fanned out to every request that
/// observed the cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("no refresh token is stored")]
    MissingRefreshToken,

    #[error("refresh rejected with status {status}")]
    RefreshRejected { status: u16 },

    #[error("refresh transport failed: {0}")]
    Network(String),

    #[error("session invalidated; re-authentication required")]
    SessionInvalidated,

    #[error("credential storage failed: {0}")]
    Storage(String),

    #[error("refresh outcome channel closed")]
    Interrupted,
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::types.
    use super::*;

    /// Validates `TokenPair` behavior for the serde round trip scenario.
    ///
    /// Assertions:
    /// - Confirms the deserialized pair equals the original.
    #[test]
    fn token_pair_serde_round_trip() {
        let pair = TokenPair {
            access: "access-token".to_string(),
            refresh: "refresh-token".to_string(),
        };

        let raw = serde_json::to_string(&pair).unwrap();
        let parsed: TokenPair = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, pair);
    }

    /// Validates `RefreshResponse` behavior for the wire parsing scenario.
    ///
    /// Assertions:
    /// - Confirms the access field is extracted from the refresh response.
    #[test]
    fn refresh_response_parses_wire_shape() {
        let parsed: RefreshResponse =
            serde_json::from_str(r#"{"access": "new-access"}"#).unwrap();
        assert_eq!(parsed.access, "new-access");
    }

    #[test]
    fn refresh_request_serializes_wire_shape() {
        let raw = serde_json::to_string(&RefreshRequest { refresh: "r-1" }).unwrap();
        assert_eq!(raw, r#"{"refresh":"r-1"}"#);
    }
}
