//! Service registry
//!
//! Owns the identity → service mapping. Populated once at boot from
//! configuration and read concurrently by every request handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::types::{Definition, ServiceId, Status};
use super::{ConnectorService, PluginService, Service, Timeouts};
use crate::config::{Config, DEFAULT_RESTART_COOLDOWN, ServicesConfig};
use crate::plugins::PluginHost;
use crate::{Error, Result};

/// Shared registry handle injected into the HTTP layer
pub type SharedServiceManager = Arc<ServiceManager>;

struct Entry {
    service: Arc<dyn Service>,
    /// Serializes restarts so the cooldown check and `last_action` update
    /// happen as one transition
    restart_lock: Arc<Mutex<()>>,
}

/// Registry of managed services
pub struct ServiceManager {
    services: RwLock<HashMap<ServiceId, Entry>>,
    timeouts: Timeouts,
    restart_cooldown: Duration,
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceManager {
    /// Create an empty registry with default bounds
    #[must_use]
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            timeouts: Timeouts::default(),
            restart_cooldown: DEFAULT_RESTART_COOLDOWN,
        }
    }

    /// Create an empty registry using the configured bounds
    #[must_use]
    pub fn from_config(config: &ServicesConfig) -> Self {
        Self::new()
            .with_timeouts(config.timeouts)
            .with_restart_cooldown(config.restart_cooldown)
    }

    /// Override the timeouts handed to services built from configuration
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Override the minimum time between two restarts of one service
    #[must_use]
    pub const fn with_restart_cooldown(mut self, cooldown: Duration) -> Self {
        self.restart_cooldown = cooldown;
        self
    }

    /// Register a service under a freshly allocated identity
    pub async fn register(&self, service: Arc<dyn Service>) -> ServiceId {
        let definition = service.definition();
        let mut services = self.services.write().await;

        let mut id = Uuid::new_v4();
        while services.contains_key(&id) {
            id = Uuid::new_v4();
        }

        {
            let mut def = definition.write().await;
            def.id = Some(id);
            tracing::info!(
                service_id = %id,
                name = %def.name,
                kind = %def.service_type(),
                "registered service"
            );
        }

        services.insert(
            id,
            Entry {
                service,
                restart_lock: Arc::new(Mutex::new(())),
            },
        );
        id
    }

    /// Look up a service by identity
    pub async fn get(&self, id: &ServiceId) -> Option<Arc<dyn Service>> {
        self.services
            .read()
            .await
            .get(id)
            .map(|e| Arc::clone(&e.service))
    }

    /// All registered services
    pub async fn get_all(&self) -> Vec<Arc<dyn Service>> {
        self.services
            .read()
            .await
            .values()
            .map(|e| Arc::clone(&e.service))
            .collect()
    }

    /// Snapshot of every registered definition
    pub async fn definitions(&self) -> Vec<Definition> {
        let mut definitions = Vec::new();
        for service in self.get_all().await {
            definitions.push(service.definition().read().await.clone());
        }
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Number of registered services
    pub async fn len(&self) -> usize {
        self.services.read().await.len()
    }

    /// Whether no service is registered
    pub async fn is_empty(&self) -> bool {
        self.services.read().await.is_empty()
    }

    /// Register one connector service per `[[connector]]` entry
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the list cannot be decoded or an entry's
    /// URL is invalid; nothing from the list is registered in that case
    pub async fn load_connectors(&self, config: &Config) -> Result<usize> {
        let declarations = config.connectors()?;

        let services = declarations
            .iter()
            .map(|decl| ConnectorService::from_declaration(decl, self.timeouts))
            .collect::<Result<Vec<_>>>()?;

        let count = services.len();
        for service in services {
            self.register(Arc::new(service)).await;
        }

        tracing::info!(count, "loaded connectors");
        Ok(count)
    }

    /// Register one plugin service per `[[plugin]]` entry with a live handle
    ///
    /// Entries whose plugin is not live in `host` are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the list cannot be decoded
    pub async fn load_plugins(&self, config: &Config, host: &PluginHost) -> Result<usize> {
        let declarations = config.plugin_declarations()?;
        let mut count = 0;

        for decl in &declarations {
            let Some(handle) = host.get(&decl.name) else {
                tracing::warn!(plugin = %decl.name, "plugin not loaded by host, skipping");
                continue;
            };

            let service = PluginService::from_declaration(decl, handle, self.timeouts);
            self.register(Arc::new(service)).await;
            count += 1;
        }

        tracing::info!(count, declared = declarations.len(), "loaded plugins");
        Ok(count)
    }

    fn entry_not_found(id: &ServiceId) -> Error {
        Error::ServiceNotFound(id.to_string())
    }

    async fn service(&self, id: &ServiceId) -> Result<Arc<dyn Service>> {
        self.get(id).await.ok_or_else(|| Self::entry_not_found(id))
    }

    /// Status of the service registered under `id`
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceNotFound`] for an unknown identity
    pub async fn status(&self, id: &ServiceId) -> Result<Status> {
        Ok(self.service(id).await?.status().await)
    }

    /// Reload one component of the service registered under `id`
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceNotFound`] for an unknown identity, otherwise
    /// the service's reload error
    pub async fn reload(&self, id: &ServiceId, component: &str) -> Result<()> {
        let service = self.service(id).await?;
        service.reload(component).await?;
        tracing::info!(service_id = %id, component, "service reloaded");
        Ok(())
    }

    /// Restart the service registered under `id`, honoring the cooldown
    ///
    /// `last_action` is refreshed only when the restart succeeds, so a failed
    /// attempt never blocks a retry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceNotFound`] for an unknown identity,
    /// [`Error::Throttled`] inside the cooldown window, otherwise the
    /// service's restart error
    pub async fn restart(&self, id: &ServiceId) -> Result<Definition> {
        let (service, restart_lock) = {
            let services = self.services.read().await;
            let entry = services.get(id).ok_or_else(|| Self::entry_not_found(id))?;
            (Arc::clone(&entry.service), Arc::clone(&entry.restart_lock))
        };

        let _restarting = restart_lock.lock().await;
        let definition = service.definition();

        if let Some(last) = definition.read().await.last_action {
            let cooldown =
                chrono::Duration::from_std(self.restart_cooldown).unwrap_or(chrono::Duration::MAX);
            // A window ending past the representable range never expires
            let remaining = last
                .checked_add_signed(cooldown)
                .map_or(chrono::Duration::MAX, |until| until - Utc::now());
            if remaining > chrono::Duration::zero() {
                let retry_after_secs = u64::try_from(remaining.num_seconds()).unwrap_or(0).max(1);
                tracing::warn!(service_id = %id, retry_after_secs, "restart throttled");
                return Err(Error::Throttled { retry_after_secs });
            }
        }

        if let Err(e) = service.restart().await {
            tracing::warn!(service_id = %id, error = %e, "service restart failed");
            return Err(e);
        }

        let mut def = definition.write().await;
        def.last_action = Some(Utc::now());
        tracing::info!(service_id = %id, name = %def.name, "service restarted");
        Ok(def.clone())
    }
}
