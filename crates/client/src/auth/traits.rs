//! Trait abstractions for the token refresh protocol.
//!
//! These traits exist for dependency injection: the manager coordinates the
//! single-flight protocol against whatever transport and observer the host
//! wires in, and tests substitute deterministic doubles.

use async_trait::async_trait;

use super::types::AuthError;

/// Exchange of a refresh token for a new access token.
#[async_trait]
pub trait RefreshTransport: Send + Sync {
    /// Perform one refresh call against the authentication backend.
    ///
    /// # Arguments
    ///
    /// * `refresh_token` - The stored refresh token
    ///
    /// # Returns
    ///
    /// The newly minted access token
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the token or the call never
    /// reaches it
    async fn refresh(&self, refresh_token: &str) -> Result<String, AuthError>;
}

/// Host-side hook for session lifecycle events.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// Called exactly once per failed refresh cycle, after stored
    /// credentials have been cleared. The host decides what follows
    /// (navigation to login, a dialog, nothing).
    ///
    /// # Arguments
    ///
    /// * `reason` - Human-readable description of the failure
    async fn session_invalidated(&self, reason: &str);
}

/// Observer that ignores every session event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

#[async_trait]
impl SessionObserver for NoopObserver {
    async fn session_invalidated(&self, _reason: &str) {}
}
