//! Reverse-proxy bridge to plugin HTTP ports
//!
//! `/plugin/{prefix}/{*path}` is forwarded to `http://localhost:<port>/<path>`
//! where `port` is the one declared by the plugin named `prefix`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{HeaderMap, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};

use super::error_response;
use crate::services::{Definition, ServiceType};

/// Headers that describe a single connection and are never forwarded
const HOP_BY_HOP: [header::HeaderName; 8] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Plugin prefix → local port routing table
#[derive(Debug, Clone, Default)]
pub struct ProxyTable {
    routes: HashMap<String, u16>,
}

impl ProxyTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from plugin definitions; connectors are ignored
    #[must_use]
    pub fn from_definitions(definitions: &[Definition]) -> Self {
        let mut table = Self::new();
        for def in definitions
            .iter()
            .filter(|d| d.service_type() == ServiceType::Plugin)
        {
            table.insert(def.name.clone(), def.port);
        }
        table
    }

    /// Route `prefix` to `port`
    pub fn insert(&mut self, prefix: impl Into<String>, port: u16) {
        self.routes.insert(prefix.into(), port);
    }

    /// Port routed for `prefix`
    #[must_use]
    pub fn port(&self, prefix: &str) -> Option<u16> {
        self.routes.get(prefix).copied()
    }

    /// Number of routed prefixes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no prefix is routed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Shared proxy state
#[derive(Clone)]
pub struct ProxyState {
    pub table: Arc<ProxyTable>,
    pub client: reqwest::Client,
}

impl ProxyState {
    /// Create proxy state with a fresh HTTP client
    #[must_use]
    pub fn new(table: ProxyTable) -> Self {
        Self {
            table: Arc::new(table),
            client: reqwest::Client::new(),
        }
    }
}

/// Proxy failures
#[derive(Debug)]
pub enum ProxyError {
    UnknownPrefix(String),
    Upstream(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::UnknownPrefix(prefix) => (
                StatusCode::NOT_FOUND,
                "plugin_not_found",
                format!("no plugin routed for prefix '{prefix}'"),
            ),
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, "upstream_error", msg),
        };

        error_response(status, code, message)
    }
}

/// Marker returned for the bare plugin prefix
#[derive(Debug, Serialize)]
pub struct LoadedResponse {
    pub loaded: bool,
}

/// Build reverse-proxy routes
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/plugin/{prefix}", any(plugin_loaded))
        .route("/plugin/{prefix}/", any(forward))
        .route("/plugin/{prefix}/{*path}", any(forward))
        .with_state(state)
}

/// Report that a routed plugin is loaded
async fn plugin_loaded(
    State(state): State<ProxyState>,
    Path(prefix): Path<String>,
) -> Result<Json<LoadedResponse>, ProxyError> {
    if state.table.port(&prefix).is_none() {
        return Err(ProxyError::UnknownPrefix(prefix));
    }
    Ok(Json(LoadedResponse { loaded: true }))
}

#[derive(Deserialize)]
struct PluginPath {
    prefix: String,
}

/// Forward a request to the plugin's local port
async fn forward(
    State(state): State<ProxyState>,
    Path(PluginPath { prefix }): Path<PluginPath>,
    req: Request,
) -> Result<Response, ProxyError> {
    let port = state
        .table
        .port(&prefix)
        .ok_or_else(|| ProxyError::UnknownPrefix(prefix.clone()))?;

    let mut target = format!("http://localhost:{port}/{}", upstream_path(req.uri()));
    if let Some(query) = req.uri().query() {
        target.push('?');
        target.push_str(query);
    }

    let (parts, body) = req.into_parts();

    tracing::debug!(plugin = %prefix, method = %parts.method, target = %target, "forwarding plugin request");

    let upstream = state
        .client
        .request(parts.method, &target)
        .headers(strip_hop_by_hop(&parts.headers))
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await
        .map_err(|e| {
            tracing::warn!(plugin = %prefix, error = %e, "plugin upstream unreachable");
            ProxyError::Upstream(format!("plugin '{prefix}' unreachable: {e}"))
        })?;

    let mut response = Response::builder().status(upstream.status());
    if let Some(headers) = response.headers_mut() {
        headers.extend(strip_hop_by_hop(upstream.headers()));
    }

    let stream = upstream.bytes_stream().inspect_err(move |e| {
        tracing::warn!(plugin = %prefix, error = %e, "plugin response stream failed");
    });

    response
        .body(Body::from_stream(stream))
        .map_err(|e| ProxyError::Upstream(format!("invalid upstream response: {e}")))
}

/// Still-encoded path after `/plugin/<prefix>/`, empty for a trailing slash
fn upstream_path(uri: &Uri) -> &str {
    uri.path()
        .strip_prefix("/plugin/")
        .and_then(|rest| rest.split_once('/'))
        .map_or("", |(_, tail)| tail)
}

/// Copy `headers` without connection-scoped entries
fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in &HOP_BY_HOP {
        out.remove(name);
    }
    out.remove("keep-alive");
    out
}
