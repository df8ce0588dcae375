//! Descriptive and observable data for managed services

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{Error, Result};

/// Identity assigned by the registry at registration time
pub type ServiceId = Uuid;

/// Definition shared between a service, the registry and the HTTP surface
pub type SharedDefinition = Arc<RwLock<Definition>>;

/// Kind of managed service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    /// Independently deployed HTTP peer
    Connector,
    /// Child process reached over RPC
    Plugin,
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connector => write!(f, "connector"),
            Self::Plugin => write!(f, "plugin"),
        }
    }
}

/// Descriptive record identifying a managed service
///
/// Immutable after creation except for `id` (written once by the registry)
/// and `last_action` (refreshed by a successful restart).
#[derive(Debug, Clone, Serialize)]
pub struct Definition {
    pub id: Option<ServiceId>,
    pub name: String,
    pub url: String,
    pub hostname: String,
    pub port: u16,
    #[serde(skip_serializing)]
    pub security_key: String,
    #[serde(rename = "type")]
    service_type: ServiceType,
    pub last_action: Option<DateTime<Utc>>,
    pub components: Vec<String>,
}

impl Definition {
    /// Create an unregistered definition
    #[must_use]
    pub fn new(name: impl Into<String>, service_type: ServiceType) -> Self {
        Self {
            id: None,
            name: name.into(),
            url: String::new(),
            hostname: String::new(),
            port: 0,
            security_key: String::new(),
            service_type,
            last_action: None,
            components: Vec::new(),
        }
    }

    /// Set the network location
    #[must_use]
    pub fn with_location(mut self, url: impl Into<String>, hostname: impl Into<String>, port: u16) -> Self {
        self.url = url.into();
        self.hostname = hostname.into();
        self.port = port;
        self
    }

    /// Set the key presented to the remote peer
    #[must_use]
    pub fn with_security_key(mut self, key: impl Into<String>) -> Self {
        self.security_key = key.into();
        self
    }

    /// Set the reloadable components
    #[must_use]
    pub fn with_components(mut self, components: Vec<String>) -> Self {
        self.components = components;
        self
    }

    /// Service kind, fixed at creation
    #[must_use]
    pub const fn service_type(&self) -> ServiceType {
        self.service_type
    }

    /// Check a reload target against the component allow-list
    ///
    /// # Errors
    ///
    /// Returns [`Error::ComponentNotFound`] when no components are declared
    /// or the requested one is not among them
    pub fn check_component(&self, component: &str) -> Result<()> {
        if self.components.iter().any(|c| c == component) {
            Ok(())
        } else {
            Err(Error::component_not_found(&self.name, component))
        }
    }

    /// Wrap into a shared, lockable definition
    #[must_use]
    pub fn into_shared(self) -> SharedDefinition {
        Arc::new(RwLock::new(self))
    }
}

/// Best-effort, point-in-time liveness snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub is_running: bool,
    pub is_alive: bool,
}

impl Status {
    /// Status reporting the service as up
    #[must_use]
    pub const fn alive() -> Self {
        Self {
            is_running: true,
            is_alive: true,
        }
    }

    /// Status reporting the service as down
    #[must_use]
    pub const fn down() -> Self {
        Self {
            is_running: false,
            is_alive: false,
        }
    }
}
