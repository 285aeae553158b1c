//! Symmetric encryption gateway for sensitive request and response bodies.
//!
//! This module provides the **payload protection layer** used by the request
//! pipeline:
//!
//! - [`EncryptionGateway`]: AES-256-GCM encryption/decryption keyed by the
//!   configured secret, plus hashing and HMAC integrity primitives
//! - [`EncryptedEnvelope`]: the wire shape carried in place of a plaintext
//!   body on sensitive endpoints
//! - Metadata envelopes: plaintext wrapped with a timestamp and checksum,
//!   rejected on tampering or staleness
//!
//! Whether a path is sensitive is decided here, by prefix, and nowhere else;
//! the pipeline asks once per request so a body is never encrypted on the
//! way out but left sealed on the way in.
//!
//! ## Usage
//!
//! ```rust
//! use caredesk_client::crypto::EncryptionGateway;
//!
//! let gateway = EncryptionGateway::new("Demo-Secret-Key-2024!", Vec::new())?;
//!
//! let sealed = gateway.encrypt("patient note")?;
//! assert_eq!(gateway.decrypt(&sealed)?, "patient note");
//! # Ok::<(), caredesk_client::crypto::CryptoError>(())
//! ```

use std::time::Duration;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AES-256-GCM";
const NONCE_LENGTH: usize = 12;

/// Encryption gateway errors
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("cipher initialization failed: {0}")]
    Key(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("envelope integrity check failed")]
    Integrity,

    #[error("envelope expired: age {age_secs}s exceeds maximum {max_age_secs}s")]
    Expired { age_secs: i64, max_age_secs: u64 },
}

/// Wire shape replacing the plaintext body on sensitive endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Base64-encoded ciphertext payload.
    pub encrypted_data: String,
    /// RFC 3339 instant the envelope was sealed, when the sender recorded one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Serialized form of a single AES-256-GCM ciphertext.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CipherPayload {
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
    algorithm: String,
}

/// Inner payload of the metadata variant: plaintext plus freshness and
/// integrity fields, sealed as one ciphertext.
#[derive(Debug, Serialize, Deserialize)]
struct MetadataPayload {
    data: String,
    timestamp: String,
    checksum: String,
}

/// AES-256-GCM gateway keyed by the configured secret.
///
/// The cipher key is the SHA-256 digest of the secret, so the same
/// configuration always derives the same key and envelopes survive process
/// restarts. The secret itself doubles as the default HMAC key.
pub struct EncryptionGateway {
    cipher: Aes256Gcm,
    key: [u8; 32],
    secret: String,
    sensitive_prefixes: Vec<String>,
}

impl std::fmt::Debug for EncryptionGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionGateway")
            .field("key", &"[REDACTED]")
            .field("secret", &"[REDACTED]")
            .field("sensitive_prefixes", &self.sensitive_prefixes)
            .finish()
    }
}

impl EncryptionGateway {
    /// Create a gateway from the configured secret and the sensitive-path
    /// prefix allow-list.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Key`] if the cipher cannot be constructed from
    /// the derived key.
    pub fn new(secret: &str, sensitive_prefixes: Vec<String>) -> Result<Self, CryptoError> {
        let key: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| CryptoError::Key(format!("failed to create cipher: {e}")))?;

        Ok(Self { cipher, key, secret: secret.to_string(), sensitive_prefixes })
    }

    /// Encrypt a plaintext string into a self-describing base64 payload.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if sealing fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce_bytes = Self::generate_nonce();
        let ciphertext = self
            .cipher
            .encrypt(&Nonce::from(nonce_bytes), plaintext.as_bytes())
            .map_err(|e| CryptoError::Encryption(format!("sealing failed: {e}")))?;

        let payload = CipherPayload {
            nonce: nonce_bytes.to_vec(),
            ciphertext,
            algorithm: ALGORITHM.to_string(),
        };
        let serialized = serde_json::to_vec(&payload)
            .map_err(|e| CryptoError::Encryption(format!("payload serialization failed: {e}")))?;
        Ok(BASE64.encode(serialized))
    }

    /// Decrypt a payload produced by [`EncryptionGateway::encrypt`].
    ///
    /// Wrong keys, tampered ciphertext, and malformed input all fail with
    /// [`CryptoError::Decryption`]; garbage is never returned.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Decryption`] on any malformed or
    /// unauthenticated input.
    pub fn decrypt(&self, encoded: &str) -> Result<String, CryptoError> {
        let decoded = BASE64
            .decode(encoded)
            .map_err(|e| CryptoError::Decryption(format!("base64 decode failed: {e}")))?;
        let payload: CipherPayload = serde_json::from_slice(&decoded)
            .map_err(|e| CryptoError::Decryption(format!("malformed payload: {e}")))?;

        if payload.algorithm != ALGORITHM {
            return Err(CryptoError::Decryption(format!(
                "unsupported algorithm: {}",
                payload.algorithm
            )));
        }

        if payload.nonce.len() != NONCE_LENGTH {
            return Err(CryptoError::Decryption(
                "invalid nonce length for AES-256-GCM payload".to_string(),
            ));
        }

        let nonce_array: [u8; NONCE_LENGTH] =
            payload.nonce.as_slice().try_into().map_err(|_| {
                CryptoError::Decryption("nonce must be exactly 12 bytes".to_string())
            })?;

        let plaintext = self
            .cipher
            .decrypt(&Nonce::from(nonce_array), payload.ciphertext.as_ref())
            .map_err(|_| CryptoError::Decryption("ciphertext authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::Decryption("plaintext is not valid UTF-8".to_string()))
    }

    /// Hex-encoded SHA-256 digest of `data`.
    #[must_use]
    pub fn hash(&self, data: &str) -> String {
        hex::encode(Sha256::digest(data.as_bytes()))
    }

    /// Hex-encoded HMAC-SHA256 tag over `data`.
    ///
    /// Keyed by `key` when given, otherwise by the configured secret.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Key`] if the MAC cannot be keyed.
    pub fn generate_hmac(&self, data: &str, key: Option<&str>) -> Result<String, CryptoError> {
        let key_bytes = key.unwrap_or(&self.secret).as_bytes();
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key_bytes)
            .map_err(|e| CryptoError::Key(format!("failed to key MAC: {e}")))?;
        mac.update(data.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Verify a tag produced by [`EncryptionGateway::generate_hmac`].
    ///
    /// Comparison is constant-time; malformed tags simply fail verification.
    #[must_use]
    pub fn verify_hmac(&self, data: &str, tag: &str, key: Option<&str>) -> bool {
        let Ok(expected) = hex::decode(tag) else {
            return false;
        };
        let key_bytes = key.unwrap_or(&self.secret).as_bytes();
        let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(key_bytes) else {
            return false;
        };
        mac.update(data.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }

    /// Encrypt `data` together with a seal timestamp and an integrity
    /// checksum of the plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if sealing fails.
    pub fn encrypt_with_metadata(&self, data: &str) -> Result<String, CryptoError> {
        let inner = MetadataPayload {
            data: data.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            checksum: self.hash(data),
        };
        let serialized = serde_json::to_string(&inner)
            .map_err(|e| CryptoError::Encryption(format!("metadata serialization failed: {e}")))?;
        self.encrypt(&serialized)
    }

    /// Decrypt a metadata envelope, verifying checksum and optionally age.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Integrity`] when the recomputed checksum does
    /// not match the sealed one (or the metadata itself is unreadable),
    /// [`CryptoError::Expired`] when `max_age` is given and exceeded, and
    /// [`CryptoError::Decryption`] when the envelope cannot be opened at all.
    pub fn decrypt_with_metadata(
        &self,
        encoded: &str,
        max_age: Option<Duration>,
    ) -> Result<String, CryptoError> {
        let serialized = self.decrypt(encoded)?;
        let inner: MetadataPayload =
            serde_json::from_str(&serialized).map_err(|_| CryptoError::Integrity)?;

        if self.hash(&inner.data) != inner.checksum {
            return Err(CryptoError::Integrity);
        }

        if let Some(max_age) = max_age {
            let sealed_at = DateTime::parse_from_rfc3339(&inner.timestamp)
                .map_err(|_| CryptoError::Integrity)?
                .with_timezone(&Utc);
            let age = Utc::now().signed_duration_since(sealed_at);
            let Ok(limit) = chrono::Duration::from_std(max_age) else {
                return Ok(inner.data);
            };
            if age > limit {
                return Err(CryptoError::Expired {
                    age_secs: age.num_seconds(),
                    max_age_secs: max_age.as_secs(),
                });
            }
        }

        Ok(inner.data)
    }

    /// Check whether a key meets the minimum strength bar: length of at
    /// least 16 and at least 3 of the 4 character classes (upper, lower,
    /// digit, symbol).
    #[must_use]
    pub fn validate_key_strength(key: &str) -> bool {
        if key.len() < 16 {
            return false;
        }

        let has_upper = key.chars().any(char::is_uppercase);
        let has_lower = key.chars().any(char::is_lowercase);
        let has_digit = key.chars().any(|c| c.is_ascii_digit());
        let has_symbol = key.chars().any(|c| !c.is_alphanumeric());

        [has_upper, has_lower, has_digit, has_symbol]
            .iter()
            .filter(|present| **present)
            .count()
            >= 3
    }

    /// Whether `path` falls under the sensitive-endpoint allow-list.
    ///
    /// Pure prefix match; the pipeline evaluates this once per request and
    /// applies the answer to both directions.
    #[must_use]
    pub fn is_sensitive_path(&self, path: &str) -> bool {
        self.sensitive_prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Replace a JSON body with its wire envelope.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if the body cannot be sealed.
    pub fn seal_body(&self, body: &Value) -> Result<Value, CryptoError> {
        let plaintext = serde_json::to_string(body)
            .map_err(|e| CryptoError::Encryption(format!("body serialization failed: {e}")))?;
        let envelope = EncryptedEnvelope {
            encrypted_data: self.encrypt(&plaintext)?,
            timestamp: Some(Utc::now().to_rfc3339()),
        };
        serde_json::to_value(envelope)
            .map_err(|e| CryptoError::Encryption(format!("envelope serialization failed: {e}")))
    }

    /// Recover the JSON body from a wire envelope.
    ///
    /// A value without an `encrypted_data` field passes through unchanged;
    /// error payloads arrive unsealed even on sensitive paths.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Decryption`] if the envelope cannot be opened
    /// or its plaintext is not JSON.
    pub fn open_body(&self, body: &Value) -> Result<Value, CryptoError> {
        let Some(ciphertext) = body.get("encrypted_data").and_then(Value::as_str) else {
            return Ok(body.clone());
        };

        let plaintext = self.decrypt(ciphertext)?;
        serde_json::from_str(&plaintext)
            .map_err(|e| CryptoError::Decryption(format!("envelope plaintext is not JSON: {e}")))
    }

    /// Short fingerprint of the derived key for log correlation.
    #[must_use]
    pub fn key_fingerprint(&self) -> String {
        let digest = Sha256::digest(self.key);
        BASE64.encode(&digest[..8])
    }

    fn generate_nonce() -> [u8; NONCE_LENGTH] {
        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce);
        nonce
    }
}
