//! Credential persistence over a [`KeyValueStore`].

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{KeyValueStore, MemoryStore, StorageError};
use crate::auth::TokenPair;
use crate::crypto::EncryptionGateway;

const ACCESS_TOKEN_KEY: &str = "auth.access_token";
const REFRESH_TOKEN_KEY: &str = "auth.refresh_token";
const USER_PROFILE_KEY: &str = "auth.user_profile";
const CSRF_TOKEN_KEY: &str = "auth.csrf_token";
/// Pre-rewrite installs stored the access token encrypted under this key.
const LEGACY_ENCRYPTED_TOKEN_KEY: &str = "auth.encrypted_token";

const MANAGED_KEYS: [&str; 5] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    USER_PROFILE_KEY,
    CSRF_TOKEN_KEY,
    LEGACY_ENCRYPTED_TOKEN_KEY,
];

/// Typed access to the session credentials held in a [`KeyValueStore`].
///
/// Token writes are restricted by convention: login and the refresh path
/// store tokens, logout and session invalidation clear them. Feature code
/// only ever reads.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}

impl CredentialStore {
    /// Wrap an injected storage backend.
    #[must_use]
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    /// Convenience constructor for an in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Current access token, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn access_token(&self) -> Result<Option<String>, StorageError> {
        self.inner.get(ACCESS_TOKEN_KEY)
    }

    /// Store a new access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn set_access_token(&self, token: &str) -> Result<(), StorageError> {
        self.inner.set(ACCESS_TOKEN_KEY, token)?;
        debug!("Stored access token");
        Ok(())
    }

    /// Current refresh token, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn refresh_token(&self) -> Result<Option<String>, StorageError> {
        self.inner.get(REFRESH_TOKEN_KEY)
    }

    /// Store a new refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn set_refresh_token(&self, token: &str) -> Result<(), StorageError> {
        self.inner.set(REFRESH_TOKEN_KEY, token)?;
        debug!("Stored refresh token");
        Ok(())
    }

    /// Store both halves of a token pair, as login does.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn set_token_pair(&self, pair: &TokenPair) -> Result<(), StorageError> {
        self.set_access_token(&pair.access)?;
        self.set_refresh_token(&pair.refresh)
    }

    /// Both tokens, when both are present.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn token_pair(&self) -> Result<Option<TokenPair>, StorageError> {
        let access = self.access_token()?;
        let refresh = self.refresh_token()?;
        Ok(match (access, refresh) {
            (Some(access), Some(refresh)) => Some(TokenPair { access, refresh }),
            _ => None,
        })
    }

    /// Whether a full token pair is stored.
    #[must_use]
    pub fn has_tokens(&self) -> bool {
        matches!(self.token_pair(), Ok(Some(_)))
    }

    /// Cached user profile, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or the cached value
    /// is not valid JSON.
    pub fn user_profile(&self) -> Result<Option<Value>, StorageError> {
        match self.inner.get(USER_PROFILE_KEY)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Cache the user profile returned by the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn set_user_profile(&self, profile: &Value) -> Result<(), StorageError> {
        let raw = serde_json::to_string(profile)?;
        self.inner.set(USER_PROFILE_KEY, &raw)?;
        debug!("Cached user profile");
        Ok(())
    }

    /// Anti-forgery token attached to mutating requests, if one is known.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn csrf_token(&self) -> Result<Option<String>, StorageError> {
        self.inner.get(CSRF_TOKEN_KEY)
    }

    /// Store the anti-forgery token for this session.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn set_csrf_token(&self, token: &str) -> Result<(), StorageError> {
        self.inner.set(CSRF_TOKEN_KEY, token)
    }

    /// Seed the legacy encrypted-token entry (import paths only).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn set_legacy_encrypted_token(&self, ciphertext: &str) -> Result<(), StorageError> {
        self.inner.set(LEGACY_ENCRYPTED_TOKEN_KEY, ciphertext)
    }

    /// Recover an access token stored encrypted by pre-rewrite installs.
    ///
    /// On success the decrypted token becomes the current access token and
    /// the legacy entry is removed. An undecryptable entry is dropped with a
    /// warning rather than failing startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or written.
    pub fn migrate_legacy_token(
        &self,
        gateway: &EncryptionGateway,
    ) -> Result<Option<String>, StorageError> {
        let Some(ciphertext) = self.inner.get(LEGACY_ENCRYPTED_TOKEN_KEY)? else {
            return Ok(None);
        };

        match gateway.decrypt(&ciphertext) {
            Ok(token) => {
                self.set_access_token(&token)?;
                self.inner.remove(LEGACY_ENCRYPTED_TOKEN_KEY)?;
                debug!("Migrated legacy encrypted token");
                Ok(Some(token))
            }
            Err(err) => {
                warn!(error = %err, "Discarding undecryptable legacy token");
                self.inner.remove(LEGACY_ENCRYPTED_TOKEN_KEY)?;
                Ok(None)
            }
        }
    }

    /// Remove every credential this store manages. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn clear(&self) -> Result<(), StorageError> {
        for key in MANAGED_KEYS {
            self.inner.remove(key)?;
        }
        debug!("Cleared stored credentials");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_token_round_trip() {
        let store = CredentialStore::in_memory();
        assert_eq!(store.access_token().unwrap(), None);
        assert!(!store.has_tokens());

        let pair = TokenPair {
            access: "access-1".to_string(),
            refresh: "refresh-1".to_string(),
        };
        store.set_token_pair(&pair).unwrap();

        assert_eq!(store.access_token().unwrap(), Some("access-1".to_string()));
        assert_eq!(store.refresh_token().unwrap(), Some("refresh-1".to_string()));
        assert_eq!(store.token_pair().unwrap(), Some(pair));
        assert!(store.has_tokens());
    }

    #[test]
    fn test_partial_pair_is_none() {
        let store = CredentialStore::in_memory();
        store.set_access_token("only-access").unwrap();
        assert_eq!(store.token_pair().unwrap(), None);
        assert!(!store.has_tokens());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = CredentialStore::in_memory();
        store.set_access_token("a").unwrap();
        store.set_refresh_token("r").unwrap();
        store.set_csrf_token("c").unwrap();
        store.set_user_profile(&json!({"name": "Dr. Reyes"})).unwrap();

        store.clear().unwrap();
        assert_eq!(store.access_token().unwrap(), None);
        assert_eq!(store.refresh_token().unwrap(), None);
        assert_eq!(store.csrf_token().unwrap(), None);
        assert_eq!(store.user_profile().unwrap(), None);

        store.clear().unwrap();
        assert_eq!(store.access_token().unwrap(), None);
    }

    #[test]
    fn test_user_profile_round_trip() {
        let store = CredentialStore::in_memory();
        let profile = json!({"id": 7, "name": "Dr. Reyes", "role": "clinician"});
        store.set_user_profile(&profile).unwrap();
        assert_eq!(store.user_profile().unwrap(), Some(profile));
    }

    #[test]
    fn test_legacy_token_migration() {
        let store = CredentialStore::in_memory();
        let gateway =
            EncryptionGateway::new("Legacy-Migration-Key-01!", Vec::new()).unwrap();

        let ciphertext = gateway.encrypt("legacy-access").unwrap();
        store.set_legacy_encrypted_token(&ciphertext).unwrap();

        let migrated = store.migrate_legacy_token(&gateway).unwrap();
        assert_eq!(migrated, Some("legacy-access".to_string()));
        assert_eq!(store.access_token().unwrap(), Some("legacy-access".to_string()));

        // Legacy entry is gone; a second migration is a no-op.
        assert_eq!(store.migrate_legacy_token(&gateway).unwrap(), None);
    }

    #[test]
    fn test_undecryptable_legacy_token_is_dropped() {
        let store = CredentialStore::in_memory();
        let gateway =
            EncryptionGateway::new("Legacy-Migration-Key-01!", Vec::new()).unwrap();

        store.set_legacy_encrypted_token("not-a-ciphertext").unwrap();
        assert_eq!(store.migrate_legacy_token(&gateway).unwrap(), None);
        assert_eq!(store.access_token().unwrap(), None);
        assert_eq!(store.migrate_legacy_token(&gateway).unwrap(), None);
    }
}
