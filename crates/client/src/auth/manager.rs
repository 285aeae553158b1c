//! Single-flight token refresh coordination.
//!
//! At most one refresh call is ever in flight. The first 401 to arrive
//! becomes the leader: it installs a shared outcome channel, transitions the
//! session to `Refreshing`, and spawns the refresh task. Every 401 that
//! arrives while the flight is up subscribes to the same channel instead of
//! issuing its own refresh. The completing task publishes one outcome to all
//! subscribers, so replays always use the token minted by that exact cycle.
//!
//! The subscribe-or-lead decision is made under a single mutex with no await
//! point inside the critical section; everything that suspends happens after
//! the lock is released.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::traits::{RefreshTransport, SessionObserver};
use super::types::{AuthError, SessionState};
use crate::storage::{CredentialStore, StorageError};

/// Outcome fanned out to every request that observed a refresh cycle.
type RefreshOutcome = Result<String, AuthError>;

struct FlightState {
    state: SessionState,
    flight: Option<watch::Receiver<Option<RefreshOutcome>>>,
}

/// Coordinator for the refresh protocol.
///
/// Writes tokens on refresh success; clears the credential store and
/// notifies the [`SessionObserver`] on refresh failure. Feature code never
/// talks to this type directly; the request pipeline does.
pub struct AuthTokenManager {
    store: CredentialStore,
    transport: Arc<dyn RefreshTransport>,
    observer: Arc<dyn SessionObserver>,
    inner: Arc<Mutex<FlightState>>,
}

impl std::fmt::Debug for AuthTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokenManager")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl AuthTokenManager {
    /// Create a manager over the injected store, transport, and observer.
    #[must_use]
    pub fn new(
        store: CredentialStore,
        transport: Arc<dyn RefreshTransport>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            store,
            transport,
            observer,
            inner: Arc::new(Mutex::new(FlightState {
                state: SessionState::Idle,
                flight: None,
            })),
        }
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Current access token, read through to the credential store.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage backend cannot be read.
    pub fn access_token(&self) -> Result<Option<String>, StorageError> {
        self.store.access_token()
    }

    /// Re-arm the manager after the host completes a fresh login.
    ///
    /// Only leaves the `Invalidated` state; an in-flight refresh is never
    /// disturbed.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        if inner.state == SessionState::Invalidated {
            inner.state = SessionState::Idle;
            debug!("Session re-armed after login");
        }
    }

    /// Obtain an access token minted by a refresh cycle that completed
    /// after this call began.
    ///
    /// Joins the in-flight cycle when one exists, otherwise starts one. The
    /// returned token is the one carried in the cycle's outcome, never a
    /// re-read that could observe an older value.
    ///
    /// # Errors
    ///
    /// Returns the shared cycle error when the refresh fails, or
    /// [`AuthError::SessionInvalidated`] immediately when a previous cycle
    /// already invalidated the session.
    pub async fn refreshed_token(&self) -> Result<String, AuthError> {
        let mut rx = {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Invalidated {
                return Err(AuthError::SessionInvalidated);
            }

            if let Some(rx) = &inner.flight {
                debug!("Refresh already in flight; subscribing to its outcome");
                rx.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                inner.state = SessionState::Refreshing;
                inner.flight = Some(rx.clone());
                self.spawn_refresh(tx);
                rx
            }
        };

        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return outcome;
            }
            rx.changed().await.map_err(|_| AuthError::Interrupted)?;
        }
    }

    fn spawn_refresh(&self, tx: watch::Sender<Option<RefreshOutcome>>) {
        let store = self.store.clone();
        let transport = Arc::clone(&self.transport);
        let observer = Arc::clone(&self.observer);
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            info!("Starting token refresh");
            let outcome = Self::run_refresh(&store, transport.as_ref()).await;

            // Vacate the flight slot before publishing so a 401 arriving
            // after completion starts a new cycle instead of observing a
            // finished one.
            match &outcome {
                Ok(_) => {
                    {
                        let mut guard = inner.lock();
                        guard.state = SessionState::Idle;
                        guard.flight = None;
                    }
                    info!("Token refresh succeeded");
                }
                Err(err) => {
                    {
                        let mut guard = inner.lock();
                        guard.state = SessionState::Invalidated;
                        guard.flight = None;
                    }
                    warn!(error = %err, "Token refresh failed; invalidating session");
                    if let Err(clear_err) = store.clear() {
                        warn!(error = %clear_err, "Failed to clear credentials");
                    }
                    observer.session_invalidated(&err.to_string()).await;
                }
            }

            let _ = tx.send(Some(outcome));
        });
    }

    async fn run_refresh(
        store: &CredentialStore,
        transport: &dyn RefreshTransport,
    ) -> RefreshOutcome {
        let refresh_token = store
            .refresh_token()
            .map_err(|e| AuthError::Storage(e.to_string()))?
            .ok_or(AuthError::MissingRefreshToken)?;

        let access = transport.refresh(&refresh_token).await?;

        store
            .set_access_token(&access)
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        Ok(access)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::manager.
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::testing::{RecordingObserver, StaticRefresher};

    fn manager_with(
        refresher: StaticRefresher,
    ) -> (AuthTokenManager, CredentialStore, Arc<StaticRefresher>, Arc<RecordingObserver>) {
        let store = CredentialStore::in_memory();
        let refresher = Arc::new(refresher);
        let observer = Arc::new(RecordingObserver::new());
        let manager = AuthTokenManager::new(
            store.clone(),
            Arc::clone(&refresher) as Arc<dyn RefreshTransport>,
            Arc::clone(&observer) as Arc<dyn SessionObserver>,
        );
        (manager, store, refresher, observer)
    }

    /// Validates `AuthTokenManager::refreshed_token` behavior for the
    /// successful refresh scenario.
    ///
    /// Assertions:
    /// - Confirms the fresh token is returned, stored, and the session
    ///   returns to `Idle`.
    #[tokio::test]
    async fn refresh_success_updates_store_and_state() {
        let (manager, store, refresher, observer) = manager_with(StaticRefresher::ok("fresh-1"));
        store.set_refresh_token("refresh-1").unwrap();

        let token = assert_ok!(manager.refreshed_token().await);
        assert_eq!(token, "fresh-1");
        assert_eq!(store.access_token().unwrap(), Some("fresh-1".to_string()));
        assert_eq!(manager.state(), SessionState::Idle);
        assert_eq!(refresher.calls(), 1);
        assert_eq!(observer.invalidations(), 0);
    }

    /// Validates `AuthTokenManager::refreshed_token` behavior for the
    /// concurrent caller scenario.
    ///
    /// Assertions:
    /// - Confirms three concurrent callers share exactly one refresh call
    ///   and all receive the same token.
    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let (manager, store, refresher, _) = manager_with(StaticRefresher::ok("shared"));
        store.set_refresh_token("refresh-1").unwrap();

        let (a, b, c) = tokio::join!(
            manager.refreshed_token(),
            manager.refreshed_token(),
            manager.refreshed_token(),
        );

        assert_eq!(a.unwrap(), "shared");
        assert_eq!(b.unwrap(), "shared");
        assert_eq!(c.unwrap(), "shared");
        assert_eq!(refresher.calls(), 1);
    }

    /// Validates `AuthTokenManager::refreshed_token` behavior for the
    /// completed-cycle scenario.
    ///
    /// Assertions:
    /// - Confirms a call arriving after a finished cycle starts a new one
    ///   rather than observing the stale outcome.
    #[tokio::test]
    async fn later_call_starts_a_new_cycle() {
        let (manager, store, refresher, _) = manager_with(StaticRefresher::ok("fresh"));
        store.set_refresh_token("refresh-1").unwrap();

        assert_ok!(manager.refreshed_token().await);
        assert_ok!(manager.refreshed_token().await);
        assert_eq!(refresher.calls(), 2);
    }

    /// Validates `AuthTokenManager::refreshed_token` behavior for the failed
    /// refresh scenario.
    ///
    /// Assertions:
    /// - Confirms the store is emptied, the observer fires once, and the
    ///   session lands in `Invalidated`.
    #[tokio::test]
    async fn refresh_failure_invalidates_and_clears() {
        let (manager, store, _, observer) =
            manager_with(StaticRefresher::failing(AuthError::RefreshRejected { status: 401 }));
        store.set_access_token("stale-access").unwrap();
        store.set_refresh_token("stale-refresh").unwrap();

        let err = assert_err!(manager.refreshed_token().await);
        assert_eq!(err, AuthError::RefreshRejected { status: 401 });
        assert_eq!(manager.state(), SessionState::Invalidated);
        assert_eq!(store.access_token().unwrap(), None);
        assert_eq!(store.refresh_token().unwrap(), None);
        assert_eq!(observer.invalidations(), 1);
    }

    /// Validates `AuthTokenManager::refreshed_token` behavior for the
    /// already-invalidated scenario.
    ///
    /// Assertions:
    /// - Confirms calls after invalidation fail fast without touching the
    ///   transport again.
    #[tokio::test]
    async fn invalidated_session_fails_fast() {
        let (manager, store, refresher, _) =
            manager_with(StaticRefresher::failing(AuthError::RefreshRejected { status: 401 }));
        store.set_refresh_token("stale").unwrap();

        let _ = manager.refreshed_token().await;
        let err = assert_err!(manager.refreshed_token().await);
        assert_eq!(err, AuthError::SessionInvalidated);
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn concurrent_failures_share_one_outcome() {
        let (manager, store, refresher, observer) =
            manager_with(StaticRefresher::failing(AuthError::RefreshRejected { status: 403 }));
        store.set_refresh_token("stale").unwrap();

        let (a, b) = tokio::join!(manager.refreshed_token(), manager.refreshed_token());
        assert_eq!(a.unwrap_err(), AuthError::RefreshRejected { status: 403 });
        assert_eq!(b.unwrap_err(), AuthError::RefreshRejected { status: 403 });
        assert_eq!(refresher.calls(), 1);
        assert_eq!(observer.invalidations(), 1);
    }

    #[tokio::test]
    async fn missing_refresh_token_invalidates() {
        let (manager, _, refresher, observer) = manager_with(StaticRefresher::ok("unused"));

        let err = assert_err!(manager.refreshed_token().await);
        assert_eq!(err, AuthError::MissingRefreshToken);
        assert_eq!(manager.state(), SessionState::Invalidated);
        assert_eq!(refresher.calls(), 0);
        assert_eq!(observer.invalidations(), 1);
    }

    /// Validates `AuthTokenManager::reset` behavior for the re-login
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `reset` re-arms an invalidated session so a new refresh
    ///   cycle can run.
    #[tokio::test]
    async fn reset_re_arms_after_invalidation() {
        let (manager, store, refresher, _) =
            manager_with(StaticRefresher::failing(AuthError::RefreshRejected { status: 401 }));
        store.set_refresh_token("stale").unwrap();

        let _ = manager.refreshed_token().await;
        assert_eq!(manager.state(), SessionState::Invalidated);

        manager.reset();
        assert_eq!(manager.state(), SessionState::Idle);

        store.set_refresh_token("fresh-login").unwrap();
        let _ = manager.refreshed_token().await;
        assert_eq!(refresher.calls(), 2);
    }

    #[tokio::test]
    async fn reset_is_a_no_op_when_idle() {
        let (manager, _, _, _) = manager_with(StaticRefresher::ok("unused"));
        manager.reset();
        assert_eq!(manager.state(), SessionState::Idle);
    }
}
