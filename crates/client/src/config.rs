//! Client configuration
//!
//! An explicit configuration object constructed once at application start and
//! injected into [`crate::transport::ApiClient`], rather than ambient global
//! state. Construction validates the base URL and the encryption secret so a
//! misconfigured client fails fast instead of failing on the hot path.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::crypto::EncryptionGateway;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Endpoint prefixes whose bodies are encrypted end to end by default.
const DEFAULT_SENSITIVE_PREFIXES: [&str; 3] = ["/messages/", "/clinical-notes/", "/billing/"];

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base URL `{0}`")]
    InvalidBaseUrl(String),

    #[error("encryption secret does not meet the minimum strength bar")]
    WeakEncryptionSecret,

    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid value for environment variable {name}: `{value}`")]
    InvalidEnv { name: &'static str, value: String },

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("encryption gateway initialization failed: {0}")]
    Encryption(String),
}

/// Validated client configuration
#[derive(Clone)]
pub struct ClientConfig {
    base_url: Url,
    timeout: Duration,
    encryption_secret: String,
    sensitive_prefixes: Vec<String>,
}

impl ClientConfig {
    /// Create a configuration from a base URL and an encryption secret.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] if the URL does not parse and
    /// [`ConfigError::WeakEncryptionSecret`] if the secret fails the
    /// strength bar (length >= 16, at least 3 character classes).
    pub fn new(
        base_url: impl AsRef<str>,
        encryption_secret: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let raw = base_url.as_ref();
        let base_url =
            Url::parse(raw).map_err(|_| ConfigError::InvalidBaseUrl(raw.to_string()))?;

        let encryption_secret = encryption_secret.into();
        if !EncryptionGateway::validate_key_strength(&encryption_secret) {
            return Err(ConfigError::WeakEncryptionSecret);
        }

        Ok(Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
            encryption_secret,
            sensitive_prefixes: DEFAULT_SENSITIVE_PREFIXES
                .iter()
                .map(ToString::to_string)
                .collect(),
        })
    }

    /// Load configuration from the environment.
    ///
    /// Reads `CAREDESK_API_BASE_URL` and `CAREDESK_ENCRYPTION_SECRET`
    /// (required), `CAREDESK_API_TIMEOUT_SECS` and
    /// `CAREDESK_SENSITIVE_PREFIXES` (comma-separated, optional). A local
    /// `.env` file is honored when present.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value does
    /// not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let base_url = std::env::var("CAREDESK_API_BASE_URL")
            .map_err(|_| ConfigError::MissingEnv("CAREDESK_API_BASE_URL"))?;
        let secret = std::env::var("CAREDESK_ENCRYPTION_SECRET")
            .map_err(|_| ConfigError::MissingEnv("CAREDESK_ENCRYPTION_SECRET"))?;

        let mut config = Self::new(base_url, secret)?;

        if let Ok(value) = std::env::var("CAREDESK_API_TIMEOUT_SECS") {
            let secs: u64 = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "CAREDESK_API_TIMEOUT_SECS",
                value,
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        if let Ok(value) = std::env::var("CAREDESK_SENSITIVE_PREFIXES") {
            config.sensitive_prefixes = value
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(ToString::to_string)
                .collect();
        }

        Ok(config)
    }

    /// Override the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the sensitive-endpoint prefix allow-list.
    #[must_use]
    pub fn with_sensitive_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.sensitive_prefixes = prefixes;
        self
    }

    /// Base URL requests are issued against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Secret the encryption gateway derives its key from.
    #[must_use]
    pub fn encryption_secret(&self) -> &str {
        &self.encryption_secret
    }

    /// Endpoint prefixes subject to mandatory body encryption.
    #[must_use]
    pub fn sensitive_prefixes(&self) -> &[String] {
        &self.sensitive_prefixes
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("encryption_secret", &"[REDACTED]")
            .field("sensitive_prefixes", &self.sensitive_prefixes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRONG_SECRET: &str = "Practice-Mgmt-2024-Key!";

    #[test]
    fn test_valid_config() {
        let config = ClientConfig::new("https://api.example.com", STRONG_SECRET)
            .expect("config should build");
        assert_eq!(config.base_url().as_str(), "https://api.example.com/");
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(config.sensitive_prefixes().len(), 3);
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = ClientConfig::new("not a url", STRONG_SECRET);
        assert!(matches!(result, Err(ConfigError::InvalidBaseUrl(_))));
    }

    #[test]
    fn test_weak_secret_rejected() {
        let result = ClientConfig::new("https://api.example.com", "weak");
        assert!(matches!(result, Err(ConfigError::WeakEncryptionSecret)));
    }

    #[test]
    fn test_overrides() {
        let config = ClientConfig::new("https://api.example.com", STRONG_SECRET)
            .expect("config should build")
            .with_timeout(Duration::from_secs(5))
            .with_sensitive_prefixes(vec!["/records/".to_string()]);
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.sensitive_prefixes(), ["/records/".to_string()]);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ClientConfig::new("https://api.example.com", STRONG_SECRET)
            .expect("config should build");
        let rendered = format!("{config:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains(STRONG_SECRET));
    }
}
