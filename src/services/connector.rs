//! Connector service - lifecycle control of a remote HTTP peer

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::transport::{ConnectorTransport, HttpTransport, TransportResponse, hostname};
use super::types::{Definition, ServiceType, SharedDefinition, Status};
use super::{Service, Timeouts};
use crate::config::ConnectorDeclaration;
use crate::{Error, Result};

/// Service backed by an independently deployed HTTP peer
pub struct ConnectorService {
    definition: SharedDefinition,
    transport: Arc<dyn ConnectorTransport>,
    timeouts: Timeouts,
}

impl ConnectorService {
    /// Create a connector service over an explicit transport
    #[must_use]
    pub fn new(definition: Definition, transport: Arc<dyn ConnectorTransport>) -> Self {
        Self {
            definition: definition.into_shared(),
            transport,
            timeouts: Timeouts::default(),
        }
    }

    /// Build a connector service from a configuration entry
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the declared URL is invalid
    pub fn from_declaration(decl: &ConnectorDeclaration, timeouts: Timeouts) -> Result<Self> {
        let transport = HttpTransport::new(&decl.url, decl.port)?;
        let definition = Definition::new(&decl.name, ServiceType::Connector)
            .with_location(&decl.url, hostname(&decl.url), decl.port)
            .with_security_key(&decl.key)
            .with_components(decl.components.clone());

        Ok(Self::new(definition, Arc::new(transport)).with_timeouts(timeouts))
    }

    /// Override the call timeouts
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    async fn key(&self) -> String {
        self.definition.read().await.security_key.clone()
    }

    /// Run a control call and require a 2xx answer
    async fn control(
        &self,
        action: &str,
        call: impl Future<Output = Result<TransportResponse>> + Send,
    ) -> Result<()> {
        let response = tokio::time::timeout(self.timeouts.action, call)
            .await
            .map_err(|_| {
                Error::Transport(format!(
                    "{action} timed out after {:?}",
                    self.timeouts.action
                ))
            })??;

        if !response.is_success() {
            return Err(Error::Transport(format!(
                "{action} rejected: {} - {}",
                response.status, response.body
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl Service for ConnectorService {
    async fn status(&self) -> Status {
        let key = self.key().await;
        let call = tokio::time::timeout(self.timeouts.status, self.transport.get("/alive", &key));

        match call.await {
            Ok(Ok(response)) if response.is_success() => Status::alive(),
            Ok(Ok(response)) => {
                tracing::debug!(status = %response.status, "connector reported not alive");
                Status::down()
            }
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "connector alive check failed");
                Status::down()
            }
            Err(_) => {
                tracing::debug!(timeout = ?self.timeouts.status, "connector alive check timed out");
                Status::down()
            }
        }
    }

    async fn reload(&self, component: &str) -> Result<()> {
        let key = {
            let def = self.definition.read().await;
            def.check_component(component)?;
            def.security_key.clone()
        };

        let body = json!({ "component": component });
        self.control("reload", self.transport.post("/reload", &key, Some(body)))
            .await
    }

    fn definition(&self) -> SharedDefinition {
        Arc::clone(&self.definition)
    }

    async fn restart(&self) -> Result<()> {
        let key = self.key().await;
        self.control("restart", self.transport.post("/restart", &key, None))
            .await
    }
}
