//! Outward-facing API client.
//!
//! Every feature call funnels through the same pipeline: bearer attachment,
//! anti-forgery header on mutating verbs, envelope sealing for sensitive
//! paths, the network call, envelope opening, refresh-once on 401, and
//! failure normalization. Callers receive [`ApiResult`] and nothing else.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt};
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use super::normalize::ErrorNormalizer;
use crate::auth::{
    AuthTokenManager, NoopObserver, RefreshClient, RefreshTransport, SessionObserver,
    SessionState, TokenPair,
};
use crate::config::{ClientConfig, ConfigError};
use crate::crypto::EncryptionGateway;
use crate::error::{ApiErrorKind, ApiFailure, ApiResult};
use crate::storage::{CredentialStore, KeyValueStore, MemoryStore};

const CSRF_HEADER: &str = "X-CSRF-Token";
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Upload progress callback: `(bytes_sent, bytes_total)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra headers attached to this request.
    pub headers: Vec<(String, String)>,
    /// Override of the client-level timeout.
    pub timeout: Option<Duration>,
}

/// The shared API client.
///
/// Constructed once at application start with an explicit [`ClientConfig`]
/// and passed by reference to all callers. Public request methods never
/// panic and never surface transport or crypto error types; every outcome
/// is an [`ApiResult`].
#[derive(Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    store: CredentialStore,
    gateway: Arc<EncryptionGateway>,
    auth: Arc<AuthTokenManager>,
}

/// Builder wiring injectable seams into an [`ApiClient`].
pub struct ApiClientBuilder {
    config: ClientConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    refresher: Option<Arc<dyn RefreshTransport>>,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl ApiClientBuilder {
    fn new(config: ClientConfig) -> Self {
        Self { config, store: None, refresher: None, observer: None }
    }

    /// Inject a persistence backend. Defaults to an in-memory store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Inject a refresh transport. Defaults to [`RefreshClient`] against the
    /// configured base URL.
    #[must_use]
    pub fn refresh_transport(mut self, refresher: Arc<dyn RefreshTransport>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Inject a session observer. Defaults to [`NoopObserver`].
    #[must_use]
    pub fn session_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Construct the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the encryption gateway cannot
    /// be initialized.
    pub fn build(self) -> Result<ApiClient, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(self.config.timeout())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let gateway = Arc::new(
            EncryptionGateway::new(
                self.config.encryption_secret(),
                self.config.sensitive_prefixes().to_vec(),
            )
            .map_err(|e| ConfigError::Encryption(e.to_string()))?,
        );

        let store = CredentialStore::new(
            self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
        );
        let refresher = self
            .refresher
            .unwrap_or_else(|| Arc::new(RefreshClient::new(http.clone(), self.config.base_url())));
        let observer = self.observer.unwrap_or_else(|| Arc::new(NoopObserver));
        let auth = Arc::new(AuthTokenManager::new(store.clone(), refresher, observer));

        debug!(
            base_url = %self.config.base_url(),
            key_fingerprint = %gateway.key_fingerprint(),
            "API client initialized"
        );

        Ok(ApiClient { http, config: self.config, store, gateway, auth })
    }
}

impl ApiClient {
    /// Construct a client with the default seams.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client or the encryption gateway cannot
    /// be initialized.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    /// Start building a client with injected seams.
    #[must_use]
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder::new(config)
    }

    /// The credential store backing this client.
    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.store
    }

    /// The encryption gateway backing this client.
    #[must_use]
    pub fn gateway(&self) -> &EncryptionGateway {
        &self.gateway
    }

    /// Current session lifecycle state.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.auth.state()
    }

    /// Persist a freshly issued token pair and re-arm the session.
    pub fn login(&self, tokens: &TokenPair) -> ApiResult<()> {
        self.store.set_token_pair(tokens).map_err(|err| {
            warn!(error = %err, "Failed to persist session credentials");
            ApiFailure::unknown("Failed to persist session credentials")
        })?;
        self.auth.reset();
        Ok(())
    }

    /// Clear every stored credential. Safe to call repeatedly.
    pub fn logout(&self) -> ApiResult<()> {
        self.store.clear().map_err(|err| {
            warn!(error = %err, "Failed to clear session credentials");
            ApiFailure::unknown("Failed to clear session credentials")
        })
    }

    /// `GET path`.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.get_with(path, RequestOptions::default()).await
    }

    /// `GET path` with per-request options.
    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> ApiResult<T> {
        self.request(Method::GET, path, None, options).await
    }

    /// `POST path` with a JSON body.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.post_with(path, body, RequestOptions::default()).await
    }

    /// `POST path` with a JSON body and per-request options.
    pub async fn post_with<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> ApiResult<T> {
        let body = Self::to_body(body)?;
        self.request(Method::POST, path, Some(body), options).await
    }

    /// `PUT path` with a JSON body.
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.put_with(path, body, RequestOptions::default()).await
    }

    /// `PUT path` with a JSON body and per-request options.
    pub async fn put_with<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> ApiResult<T> {
        let body = Self::to_body(body)?;
        self.request(Method::PUT, path, Some(body), options).await
    }

    /// `PATCH path` with a JSON body.
    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        self.patch_with(path, body, RequestOptions::default()).await
    }

    /// `PATCH path` with a JSON body and per-request options.
    pub async fn patch_with<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        options: RequestOptions,
    ) -> ApiResult<T> {
        let body = Self::to_body(body)?;
        self.request(Method::PATCH, path, Some(body), options).await
    }

    /// `DELETE path`.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.delete_with(path, RequestOptions::default()).await
    }

    /// `DELETE path` with per-request options.
    pub async fn delete_with<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> ApiResult<T> {
        self.request(Method::DELETE, path, None, options).await
    }

    /// Issue a request through the full pipeline.
    ///
    /// Sensitivity of `path` is decided once, up front, and applied to both
    /// the outgoing body and the incoming one, so a request is never sealed
    /// on the way out but left sealed on the way in.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> ApiResult<T> {
        let sensitive = self.gateway.is_sensitive_path(path);
        let response = self
            .dispatch(|| self.base_request(&method, path, body.as_ref(), &options, sensitive))
            .await?;
        self.read_body(response, sensitive, path).await
    }

    /// Upload a file as `multipart/form-data`.
    ///
    /// The part streams out in fixed-size chunks; `progress` is invoked
    /// after each chunk with `(bytes_sent, bytes_total)`. Multipart bodies
    /// are binary and bypass envelope sealing; the JSON response is still
    /// opened when `path` is sensitive.
    pub async fn upload_file<T: DeserializeOwned>(
        &self,
        path: &str,
        field: &str,
        file_name: &str,
        bytes: Vec<u8>,
        options: RequestOptions,
        progress: Option<ProgressFn>,
    ) -> ApiResult<T> {
        let sensitive = self.gateway.is_sensitive_path(path);
        let total = bytes.len() as u64;

        let response = self
            .dispatch(|| {
                let sent = Arc::new(AtomicU64::new(0));
                let progress = progress.clone();
                let stream = ReaderStream::with_capacity(
                    std::io::Cursor::new(bytes.clone()),
                    UPLOAD_CHUNK_SIZE,
                )
                .inspect_ok(move |chunk| {
                    let so_far =
                        sent.fetch_add(chunk.len() as u64, Ordering::Relaxed) + chunk.len() as u64;
                    if let Some(callback) = &progress {
                        callback(so_far, total);
                    }
                });

                let part = Part::stream_with_length(Body::wrap_stream(stream), total)
                    .file_name(file_name.to_string());
                let form = Form::new().part(field.to_string(), part);

                let builder = self
                    .base_request(&Method::POST, path, None, &options, sensitive)?
                    .multipart(form);
                Ok(builder)
            })
            .await?;

        self.read_body(response, sensitive, path).await
    }

    /// Download a binary payload to `dest`, returning the bytes written.
    ///
    /// The body streams to disk and bypasses envelope opening. Bytes land in
    /// a staging file that replaces `dest` only once the stream completes; a
    /// failed or truncated download leaves no partial file behind.
    pub async fn download_file(&self, path: &str, dest: &Path) -> ApiResult<u64> {
        let options = RequestOptions::default();
        let response = self
            .dispatch(|| self.base_request(&Method::GET, path, None, &options, false))
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::failure_from_response(response, path).await);
        }

        let staging = dest.with_extension("tmp");
        let written = match Self::write_stream(response, &staging).await {
            Ok(written) => written,
            Err(failure) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(failure);
            }
        };
        if let Err(err) = tokio::fs::rename(&staging, dest).await {
            warn!(error = %err, dest = %dest.display(), "Failed to finalize download");
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(ApiFailure::unknown("Failed to write the downloaded data"));
        }

        debug!(path = %path, bytes = written, "Download complete");
        Ok(written)
    }

    /// Stream a response body into `dest`, returning the bytes written.
    async fn write_stream(response: Response, dest: &Path) -> Result<u64, ApiFailure> {
        let mut file = tokio::fs::File::create(dest).await.map_err(|err| {
            warn!(error = %err, dest = %dest.display(), "Failed to create download destination");
            ApiFailure::unknown("Failed to create the destination file")
        })?;

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| ErrorNormalizer::from_transport(&e))?;
            file.write_all(&chunk).await.map_err(|err| {
                warn!(error = %err, "Failed to write downloaded data");
                ApiFailure::unknown("Failed to write the downloaded data")
            })?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|err| {
            warn!(error = %err, "Failed to flush downloaded data");
            ApiFailure::unknown("Failed to write the downloaded data")
        })?;
        Ok(written)
    }

    /// Send with bearer attachment and the refresh-once recovery loop.
    ///
    /// The descriptor is auto-retried after a refresh at most once; a 401 on
    /// the replay falls through to normalization. Replays carry the token
    /// from the refresh outcome itself, never a re-read of the store.
    async fn dispatch<F>(&self, make: F) -> Result<Response, ApiFailure>
    where
        F: Fn() -> Result<reqwest::RequestBuilder, ApiFailure>,
    {
        let mut bearer = match self.store.access_token() {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "Failed to read access token");
                None
            }
        };
        let mut retried = false;

        loop {
            let mut builder = make()?;
            if let Some(token) = &bearer {
                builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
            }

            let response = match builder.send().await {
                Ok(response) => response,
                Err(err) => {
                    debug!(error = %err, "Transport failure");
                    return Err(ErrorNormalizer::from_transport(&err));
                }
            };

            if response.status() == StatusCode::UNAUTHORIZED && !retried {
                retried = true;
                debug!("Received 401; entering refresh protocol");
                match self.auth.refreshed_token().await {
                    Ok(token) => {
                        bearer = Some(token);
                        continue;
                    }
                    Err(err) => return Err(ErrorNormalizer::auth_failure(&err)),
                }
            }

            return Ok(response);
        }
    }

    /// Build one attempt of a request: URL, per-request options, CSRF on
    /// mutating verbs, and envelope sealing for sensitive paths.
    fn base_request(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
        options: &RequestOptions,
        sensitive: bool,
    ) -> Result<reqwest::RequestBuilder, ApiFailure> {
        let mut builder = self.http.request(method.clone(), self.absolute_url(path));

        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        for (name, value) in &options.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if Self::is_mutating(method) {
            match self.store.csrf_token() {
                Ok(Some(token)) => builder = builder.header(CSRF_HEADER, token),
                Ok(None) => {}
                Err(err) => warn!(error = %err, "Failed to read CSRF token"),
            }
        }

        if let Some(body) = body {
            let payload = if sensitive {
                self.gateway.seal_body(body).map_err(|err| {
                    warn!(error = %err, path = %path, "Failed to seal request body");
                    ErrorNormalizer::crypto_failure(&err)
                })?
            } else {
                body.clone()
            };
            builder = builder.json(&payload);
        }

        Ok(builder)
    }

    /// Interpret a response: open sensitive envelopes, deserialize, and
    /// normalize every error status.
    async fn read_body<T: DeserializeOwned>(
        &self,
        response: Response,
        sensitive: bool,
        path: &str,
    ) -> ApiResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::failure_from_response(response, path).await);
        }

        let value = if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
            Value::Null
        } else {
            match response.json::<Value>().await {
                Ok(value) => value,
                Err(err) => {
                    debug!(error = %err, path = %path, "Response body is not JSON");
                    return Err(ApiFailure::unknown("Malformed server response"));
                }
            }
        };

        let value = if sensitive {
            match self.gateway.open_body(&value) {
                Ok(opened) => opened,
                Err(err) => {
                    warn!(error = %err, path = %path, "Failed to open response envelope");
                    return Err(ErrorNormalizer::crypto_failure(&err));
                }
            }
        } else {
            value
        };

        serde_json::from_value(value).map_err(|err| {
            debug!(error = %err, path = %path, "Response deserialization failed");
            ErrorNormalizer::decode_failure(&err)
        })
    }

    async fn failure_from_response(response: Response, path: &str) -> ApiFailure {
        let status = response.status();
        let body = response.json::<Value>().await.ok();
        let failure = ErrorNormalizer::from_response(status, body.as_ref());
        if failure.kind == ApiErrorKind::Permission {
            warn!(path = %path, status = status.as_u16(), "Permission denied by server");
        }
        failure
    }

    fn absolute_url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url().as_str().trim_end_matches('/'), path)
    }

    fn is_mutating(method: &Method) -> bool {
        [Method::POST, Method::PUT, Method::PATCH, Method::DELETE].contains(method)
    }

    fn to_body<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiFailure> {
        serde_json::to_value(body).map_err(|err| {
            debug!(error = %err, "Request body serialization failed");
            ApiFailure::unknown("Failed to serialize the request body")
        })
    }
}
