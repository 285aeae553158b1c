//! Token lifecycle management for the API client.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                     request pipeline                    │
//! │                  (401 on a live request)                │
//! └────────────────────────────┬────────────────────────────┘
//!                              │ refreshed_token()
//!                              ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                    AuthTokenManager                     │
//! │   single-flight: lead a refresh cycle or subscribe to   │
//! │   the one in flight; fan one outcome out to all waiters │
//! └──────┬──────────────────────┬───────────────────────┬───┘
//!        │ RefreshTransport     │ CredentialStore       │ SessionObserver
//!        ▼                      ▼                       ▼
//!   POST /auth/refresh/   token reads/writes      invalidation hook
//! ```
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use caredesk_client::auth::{AuthTokenManager, NoopObserver};
//! use caredesk_client::storage::CredentialStore;
//! use caredesk_client::testing::StaticRefresher;
//!
//! let store = CredentialStore::in_memory();
//! let manager = AuthTokenManager::new(
//!     store,
//!     Arc::new(StaticRefresher::ok("fresh-access")),
//!     Arc::new(NoopObserver),
//! );
//! ```

mod client;
mod manager;
mod traits;
mod types;

pub use client::RefreshClient;
pub use manager::AuthTokenManager;
pub use traits::{NoopObserver, RefreshTransport, SessionObserver};
pub use types::{AuthError, RefreshRequest, RefreshResponse, SessionState, TokenPair};
