//! HTTP implementation of the refresh transport.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::traits::RefreshTransport;
use super::types::{AuthError, RefreshRequest, RefreshResponse};

/// Path of the refresh endpoint, relative to the configured base URL.
const REFRESH_PATH: &str = "/auth/refresh/";

/// Refresh transport backed by the shared HTTP client.
///
/// Speaks the wire contract directly: `POST <base>/auth/refresh/` with
/// `{"refresh": <token>}`, expecting `{"access": <token>}` on success.
#[derive(Debug, Clone)]
pub struct RefreshClient {
    http: reqwest::Client,
    refresh_url: String,
}

impl RefreshClient {
    /// Create a refresh client reusing the transport's HTTP client (and
    /// therefore its timeout).
    #[must_use]
    pub fn new(http: reqwest::Client, base_url: &Url) -> Self {
        let refresh_url =
            format!("{}{}", base_url.as_str().trim_end_matches('/'), REFRESH_PATH);
        Self { http, refresh_url }
    }
}

#[async_trait]
impl RefreshTransport for RefreshClient {
    async fn refresh(&self, refresh_token: &str) -> Result<String, AuthError> {
        debug!(url = %self.refresh_url, "Issuing token refresh");

        let response = self
            .http
            .post(&self.refresh_url)
            .json(&RefreshRequest { refresh: refresh_token })
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::RefreshRejected { status: status.as_u16() });
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Network(format!("malformed refresh response: {e}")))?;
        Ok(body.access)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn test_refresh_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh/"))
            .and(body_json(serde_json::json!({"refresh": "refresh-1"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access": "access-2"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let client = RefreshClient::new(reqwest::Client::new(), &base);

        let access = client.refresh("refresh-1").await.unwrap();
        assert_eq!(access, "access-2");
    }

    #[tokio::test]
    async fn test_rejected_refresh_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let client = RefreshClient::new(reqwest::Client::new(), &base);

        let err = client.refresh("stale").await.unwrap_err();
        assert_eq!(err, AuthError::RefreshRejected { status: 401 });
    }

    #[tokio::test]
    async fn test_malformed_success_body_is_a_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let client = RefreshClient::new(reqwest::Client::new(), &base);

        assert!(matches!(client.refresh("r").await, Err(AuthError::Network(_))));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_a_network_error() {
        // Bind then drop a listener so the port is known to refuse connections.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = Url::parse(&format!("http://{addr}")).unwrap();
        let client = RefreshClient::new(reqwest::Client::new(), &base);

        assert!(matches!(client.refresh("r").await, Err(AuthError::Network(_))));
    }
}
