//! Test doubles for the injectable seams.
//!
//! Used by this crate's own tests and available to hosts that want to test
//! against the client without a live backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::auth::{AuthError, RefreshTransport, SessionObserver};

/// Refresh transport that returns a canned outcome and counts calls.
#[derive(Debug)]
pub struct StaticRefresher {
    outcome: Result<String, AuthError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticRefresher {
    /// Transport whose every refresh succeeds with `token`.
    #[must_use]
    pub fn ok(token: &str) -> Self {
        Self {
            outcome: Ok(token.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Transport whose every refresh fails with `error`.
    #[must_use]
    pub fn failing(error: AuthError) -> Self {
        Self {
            outcome: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Delay each refresh, widening the window in which concurrent callers
    /// can pile onto the in-flight cycle.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of refresh calls observed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefreshTransport for StaticRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<String, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone()
    }
}

/// Observer that records every session invalidation it sees.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    reasons: Mutex<Vec<String>>,
}

impl RecordingObserver {
    /// Create an observer with no recorded events.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reasons recorded so far, in arrival order.
    #[must_use]
    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().clone()
    }

    /// Number of invalidation events observed.
    #[must_use]
    pub fn invalidations(&self) -> usize {
        self.reasons.lock().len()
    }
}

#[async_trait]
impl SessionObserver for RecordingObserver {
    async fn session_invalidated(&self, reason: &str) {
        self.reasons.lock().push(reason.to_string());
    }
}
