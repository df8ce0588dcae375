//! Managed services
//!
//! Connectors (remote HTTP peers) and plugins (child processes reached over
//! RPC) are managed behind the same four-operation [`Service`] contract and
//! owned by the [`ServiceManager`] registry.

pub mod connector;
pub mod manager;
pub mod plugin;
pub mod transport;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;

pub use connector::ConnectorService;
pub use manager::ServiceManager;
pub use plugin::PluginService;
pub use transport::{ConnectorTransport, HttpTransport, TransportResponse};
pub use types::{Definition, ServiceId, ServiceType, SharedDefinition, Status};

use crate::Result;

/// Contract every managed component satisfies
#[async_trait]
pub trait Service: Send + Sync {
    /// Best-effort liveness snapshot
    ///
    /// Never fails: transport or process errors degrade to a negative status.
    async fn status(&self) -> Status;

    /// Reload a single declared component
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ComponentNotFound`] if the component is not in
    /// the allow-list, or the underlying transport/process error
    async fn reload(&self, component: &str) -> Result<()>;

    /// Shared handle to the service definition
    fn definition(&self) -> SharedDefinition;

    /// Restart the underlying component
    ///
    /// # Errors
    ///
    /// Returns the transport or process error that prevented the restart
    async fn restart(&self) -> Result<()>;
}

/// Upper bounds on calls into external components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound on status checks
    pub status: Duration,
    /// Bound on restart and reload
    pub action: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            status: Duration::from_secs(5),
            action: Duration::from_secs(30),
        }
    }
}
