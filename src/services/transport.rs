//! HTTP transport used by connector services
//!
//! The transport is injected into [`ConnectorService`](super::ConnectorService)
//! so tests can substitute a fake peer.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::{Error, Result};

/// Header carrying the connector security key
pub const KEY_HEADER: &str = "X-Api-Key";

/// Path prefix of the connector control protocol
pub const API_PREFIX: &str = "/api/v1";

/// Response returned by a connector peer
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: String,
}

impl TransportResponse {
    /// Whether the peer answered with a 2xx status
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Capability for calling a connector's control protocol
#[async_trait]
pub trait ConnectorTransport: Send + Sync {
    /// Issue `GET <base>/<path>`
    async fn get(&self, path: &str, key: &str) -> Result<TransportResponse>;

    /// Issue `POST <base>/<path>` with an optional JSON body
    async fn post(
        &self,
        path: &str,
        key: &str,
        body: Option<serde_json::Value>,
    ) -> Result<TransportResponse>;
}

/// reqwest-backed transport for a single connector peer
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the peer at `url`
    ///
    /// `port` is applied when the URL does not already carry one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL cannot be parsed
    pub fn new(url: &str, port: u16) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            base_url: base_url(url, port)?,
        })
    }

    /// Base URL every path is appended to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn into_response(response: reqwest::Response) -> TransportResponse {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        TransportResponse { status, body }
    }
}

#[async_trait]
impl ConnectorTransport for HttpTransport {
    async fn get(&self, path: &str, key: &str) -> Result<TransportResponse> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .header(KEY_HEADER, key)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("GET {url} failed: {e}")))?;

        Ok(Self::into_response(response).await)
    }

    async fn post(
        &self,
        path: &str,
        key: &str,
        body: Option<serde_json::Value>,
    ) -> Result<TransportResponse> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.client.post(&url).header(KEY_HEADER, key);

        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req
            .send()
            .await
            .map_err(|e| Error::Transport(format!("POST {url} failed: {e}")))?;

        Ok(Self::into_response(response).await)
    }
}

/// Compute `<url[:port]>/api/v1`
fn base_url(url: &str, port: u16) -> Result<String> {
    let mut parsed =
        Url::parse(url).map_err(|e| Error::Config(format!("invalid connector url '{url}': {e}")))?;

    if parsed.port().is_none() && port != 0 {
        parsed
            .set_port(Some(port))
            .map_err(|()| Error::Config(format!("cannot set port on connector url '{url}'")))?;
    }

    Ok(format!("{}{API_PREFIX}", parsed.as_str().trim_end_matches('/')))
}

/// Host component of a connector URL, empty if it has none
#[must_use]
pub fn hostname(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(ToString::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_applies_declared_port() {
        let base = base_url("http://ingest.internal", 8080).unwrap();
        assert_eq!(base, "http://ingest.internal:8080/api/v1");
    }

    #[test]
    fn base_url_keeps_explicit_port() {
        let base = base_url("http://ingest.internal:9000/", 8080).unwrap();
        assert_eq!(base, "http://ingest.internal:9000/api/v1");
    }

    #[test]
    fn transport_targets_versioned_api() {
        let transport = HttpTransport::new("http://ingest.internal", 8080).unwrap();
        assert_eq!(transport.base_url(), "http://ingest.internal:8080/api/v1");
    }

    #[test]
    fn base_url_rejects_garbage() {
        assert!(matches!(base_url("not a url", 80), Err(Error::Config(_))));
    }

    #[test]
    fn hostname_extraction() {
        assert_eq!(hostname("https://peer.example.com:443/x"), "peer.example.com");
        assert_eq!(hostname("nope"), "");
    }
}
