//! HTTP API server for Harbor gateway

pub mod health;
pub mod proxy;
pub mod services;

use std::future::Future;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use proxy::{ProxyState, ProxyTable};
pub use services::ApiError;

use crate::services::manager::SharedServiceManager;
use crate::Result;

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

/// Render the shared `{"error": {"code", "message"}}` body
pub(crate) fn error_response(status: StatusCode, code: &'static str, message: String) -> Response {
    (status, Json(ErrorResponse { error: ErrorBody { code, message } })).into_response()
}

/// Configuration for building an API server
pub struct ApiServerBuilder {
    services: SharedServiceManager,
    host: String,
    port: u16,
    proxy_table: ProxyTable,
}

impl ApiServerBuilder {
    /// Create a new API server builder
    #[must_use]
    pub fn new(services: SharedServiceManager) -> Self {
        Self {
            services,
            host: "0.0.0.0".to_string(),
            port: crate::config::DEFAULT_PORT,
            proxy_table: ProxyTable::new(),
        }
    }

    /// Set the bind address
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the listen port
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the plugin routing table for the reverse proxy
    #[must_use]
    pub fn proxy_table(mut self, table: ProxyTable) -> Self {
        self.proxy_table = table;
        self
    }

    /// Build the API server
    #[must_use]
    pub fn build(self) -> ApiServer {
        ApiServer {
            services: self.services,
            proxy: ProxyState::new(self.proxy_table),
            host: self.host,
            port: self.port,
        }
    }
}

/// API server
pub struct ApiServer {
    services: SharedServiceManager,
    proxy: ProxyState,
    host: String,
    port: u16,
}

impl ApiServer {
    /// Build the router with all routes
    pub fn router(&self) -> Router {
        Router::new()
            .merge(services::router(self.services.clone()))
            .merge(proxy::router(self.proxy.clone()))
            .merge(health::router())
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server until `shutdown` resolves
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server on {addr}: {e}")))?;

        tracing::info!(
            addr = %addr,
            plugin_routes = self.proxy.table.len(),
            "API server listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        tracing::info!("API server stopped");
        Ok(())
    }
}
