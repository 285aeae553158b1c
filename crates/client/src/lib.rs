//! # CareDesk API Client
//!
//! Shared HTTP client core for CareDesk host applications.
//!
//! This crate contains:
//! - Credential persistence over a pluggable key-value store
//! - Field-level encryption for sensitive request and response bodies
//! - Single-flight access-token refresh with session invalidation
//! - A request pipeline that normalizes every failure into one shape
//!
//! ## Architecture
//! - [`config::ClientConfig`] is built once by the host and injected
//! - [`transport::ApiClient`] owns the pipeline; feature code calls it and
//!   receives [`error::ApiResult`], never raw transport or crypto errors
//! - Seams ([`storage::KeyValueStore`], [`auth::RefreshTransport`],
//!   [`auth::SessionObserver`]) are trait objects so hosts and tests can
//!   substitute their own

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod storage;
pub mod testing;
pub mod transport;

// Re-export commonly used types for convenience
pub use auth::{
    AuthError, AuthTokenManager, NoopObserver, RefreshClient, RefreshTransport, SessionObserver,
    SessionState, TokenPair,
};
pub use config::{ClientConfig, ConfigError};
pub use crypto::{CryptoError, EncryptedEnvelope, EncryptionGateway};
pub use error::{ApiErrorKind, ApiFailure, ApiResult};
pub use storage::{CredentialStore, FileStore, KeyValueStore, MemoryStore, StorageError};
pub use transport::{ApiClient, ApiClientBuilder, ErrorNormalizer, ProgressFn, RequestOptions};
