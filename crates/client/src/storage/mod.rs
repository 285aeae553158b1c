//! Client-scoped persistent key-value storage
//!
//! The core never touches a concrete storage backend directly; everything
//! goes through the [`KeyValueStore`] trait so hosts can plug in whatever
//! persistence the platform offers and tests can run fully in memory.
//!
//! Two implementations ship with the crate:
//! - [`MemoryStore`] - process-local, the default for tests
//! - [`FileStore`] - a JSON file with write-through persistence

mod credentials;
mod file;
mod memory;

use thiserror::Error;

pub use credentials::CredentialStore;
pub use file::FileStore;
pub use memory::MemoryStore;

/// Storage backend errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Minimal key-value persistence seam.
///
/// Implementations must be safe to share across tasks; all methods take
/// `&self` and are expected to be quick (a map lookup or a small file
/// write), so the trait is synchronous.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove the value stored under `key`. Removing an absent key is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}
