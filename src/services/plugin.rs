//! Plugin service - lifecycle control of a subprocess plugin

use std::sync::Arc;

use async_trait::async_trait;

use super::types::{Definition, ServiceType, SharedDefinition, Status};
use super::{Service, Timeouts};
use crate::config::PluginDeclaration;
use crate::plugins::PluginHandle;
use crate::{Error, Result};

/// Service backed by a live plugin handle
///
/// Restart is stop-then-start: a status taken in between reports the plugin
/// as not running.
pub struct PluginService {
    definition: SharedDefinition,
    handle: Option<Arc<dyn PluginHandle>>,
    timeouts: Timeouts,
}

impl PluginService {
    /// Create a plugin service, optionally bound to a live handle
    #[must_use]
    pub fn new(definition: Definition, handle: Option<Arc<dyn PluginHandle>>) -> Self {
        Self {
            definition: definition.into_shared(),
            handle,
            timeouts: Timeouts::default(),
        }
    }

    /// Build a plugin service from a configuration entry
    #[must_use]
    pub fn from_declaration(
        decl: &PluginDeclaration,
        handle: Arc<dyn PluginHandle>,
        timeouts: Timeouts,
    ) -> Self {
        let definition = Definition::new(&decl.name, ServiceType::Plugin)
            .with_location(format!("http://localhost:{}", decl.port), "localhost", decl.port)
            .with_components(decl.components.clone());

        Self::new(definition, Some(handle)).with_timeouts(timeouts)
    }

    /// Override the call timeouts
    #[must_use]
    pub const fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    fn handle(&self) -> Result<&Arc<dyn PluginHandle>> {
        self.handle
            .as_ref()
            .ok_or_else(|| Error::Process("plugin binary was never loaded".to_string()))
    }
}

#[async_trait]
impl Service for PluginService {
    async fn status(&self) -> Status {
        let Some(handle) = &self.handle else {
            return Status::down();
        };

        match tokio::time::timeout(self.timeouts.status, handle.running()).await {
            Ok(true) => Status::alive(),
            Ok(false) => Status::down(),
            Err(_) => {
                tracing::debug!(plugin = %handle.name(), "plugin running check timed out");
                Status::down()
            }
        }
    }

    async fn reload(&self, component: &str) -> Result<()> {
        self.definition.read().await.check_component(component)?;
        // Plugins do not implement hot reload yet; a declared component is accepted as-is
        Ok(())
    }

    fn definition(&self) -> SharedDefinition {
        Arc::clone(&self.definition)
    }

    async fn restart(&self) -> Result<()> {
        let handle = self.handle()?;
        let limit = self.timeouts.action;

        tokio::time::timeout(limit, handle.stop())
            .await
            .map_err(|_| Error::Process(format!("plugin stop timed out after {limit:?}")))??;

        tokio::time::timeout(limit, handle.start())
            .await
            .map_err(|_| Error::Process(format!("plugin start timed out after {limit:?}")))?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    /// Call-counting plugin handle
    #[derive(Default)]
    struct SpyHandle {
        starts: AtomicUsize,
        stops: AtomicUsize,
        running_checks: AtomicUsize,
        fail_stop: bool,
        running: AtomicBool,
    }

    #[async_trait]
    impl PluginHandle for SpyHandle {
        fn name(&self) -> &str {
            "spy"
        }

        async fn start(&self) -> Result<()> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.fail_stop {
                return Err(Error::Process("kill refused".to_string()));
            }
            self.running.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn running(&self) -> bool {
            self.running_checks.fetch_add(1, Ordering::SeqCst);
            self.running.load(Ordering::SeqCst)
        }
    }

    fn definition(components: &[&str]) -> Definition {
        Definition::new("spy", ServiceType::Plugin)
            .with_components(components.iter().map(ToString::to_string).collect())
    }

    #[tokio::test]
    async fn status_without_handle_is_down() {
        let svc = PluginService::new(definition(&[]), None);
        assert_eq!(svc.status().await, Status::down());
    }

    #[tokio::test]
    async fn status_reflects_running_handle() {
        let spy = Arc::new(SpyHandle::default());
        spy.running.store(true, Ordering::SeqCst);
        let svc = PluginService::new(definition(&[]), Some(spy.clone()));

        assert_eq!(svc.status().await, Status::alive());
        assert_eq!(spy.running_checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn restart_stops_then_starts() {
        let spy = Arc::new(SpyHandle::default());
        let svc = PluginService::new(definition(&[]), Some(spy.clone()));

        svc.restart().await.unwrap();

        assert_eq!(spy.stops.load(Ordering::SeqCst), 1);
        assert_eq!(spy.starts.load(Ordering::SeqCst), 1);
        assert!(spy.running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn failed_stop_skips_start_and_returns_stop_error() {
        let spy = Arc::new(SpyHandle {
            fail_stop: true,
            ..SpyHandle::default()
        });
        let svc = PluginService::new(definition(&[]), Some(spy.clone()));

        let err = svc.restart().await.unwrap_err();

        assert_eq!(err.to_string(), "process error: kill refused");
        assert_eq!(spy.starts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn restart_without_handle_is_process_error() {
        let svc = PluginService::new(definition(&[]), None);
        assert!(matches!(svc.restart().await, Err(Error::Process(_))));
    }

    #[tokio::test]
    async fn reload_checks_allow_list() {
        let svc = PluginService::new(definition(&["cache"]), None);

        assert!(svc.reload("cache").await.is_ok());
        assert!(matches!(
            svc.reload("rules").await,
            Err(Error::ComponentNotFound { .. })
        ));
        assert!(matches!(
            PluginService::new(definition(&[]), None).reload("cache").await,
            Err(Error::ComponentNotFound { .. })
        ));
    }
}
