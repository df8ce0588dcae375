//! Configuration management for Harbor gateway

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

pub use file::{ConnectorDeclaration, PluginDeclaration};

use crate::plugins::HandshakeConfig;
use crate::services::Timeouts;
use crate::{Error, Result};

/// Default API server port
pub const DEFAULT_PORT: u16 = 9000;

/// Default restart cooldown
pub const DEFAULT_RESTART_COOLDOWN: Duration = Duration::from_secs(120);

/// Harbor gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP API server configuration
    pub server: ServerConfig,

    /// Service call bounds and restart cooldown
    pub services: ServicesConfig,

    /// Plugin process framework configuration
    pub plugins: PluginsConfig,

    /// Raw document the bootstrap lists are decoded from
    bootstrap: toml::Table,
}

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Bounds applied to every managed service
#[derive(Debug, Clone)]
pub struct ServicesConfig {
    pub timeouts: Timeouts,
    /// Minimum time between two restarts of the same service
    pub restart_cooldown: Duration,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            restart_cooldown: DEFAULT_RESTART_COOLDOWN,
        }
    }
}

/// Plugin discovery and handshake configuration
#[derive(Debug, Clone)]
pub struct PluginsConfig {
    /// Directory plugin binaries are discovered in
    pub dir: PathBuf,
    pub handshake: HandshakeConfig,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("plugins"),
            handshake: HandshakeConfig::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            services: ServicesConfig::default(),
            plugins: PluginsConfig::default(),
            bootstrap: toml::Table::new(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or the standard location if `None`
    ///
    /// A missing file yields the defaults with empty bootstrap lists.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or is not valid TOML
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => file::config_file_path(),
        };

        let Some(path) = path.filter(|p| p.exists()) else {
            tracing::info!("no config file found, using defaults");
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Parse configuration from a TOML document
    ///
    /// # Errors
    ///
    /// Returns error if the document is not valid TOML or a runtime section is
    /// malformed. Bootstrap lists are not validated here.
    pub fn from_toml(content: &str) -> Result<Self> {
        let bootstrap: toml::Table = toml::from_str(content)?;
        let fc: file::HarborConfigFile = toml::Value::Table(bootstrap.clone()).try_into()?;

        let defaults = Self::default();
        let timeouts = Timeouts {
            status: fc
                .services
                .status_timeout_secs
                .map_or(defaults.services.timeouts.status, Duration::from_secs),
            action: fc
                .services
                .action_timeout_secs
                .map_or(defaults.services.timeouts.action, Duration::from_secs),
        };

        let hs = defaults.plugins.handshake;
        let handshake = HandshakeConfig {
            protocol_version: fc.plugins.protocol_version.unwrap_or(hs.protocol_version),
            magic_cookie_key: fc.plugins.magic_cookie_key.unwrap_or(hs.magic_cookie_key),
            magic_cookie_value: fc
                .plugins
                .magic_cookie_value
                .unwrap_or(hs.magic_cookie_value),
            allowed_protocols: fc
                .plugins
                .allowed_protocols
                .unwrap_or(hs.allowed_protocols),
            timeout: fc
                .plugins
                .handshake_timeout_secs
                .map_or(hs.timeout, Duration::from_secs),
        };

        Ok(Self {
            server: ServerConfig {
                host: fc.server.host.unwrap_or(defaults.server.host),
                port: fc.server.port.unwrap_or(defaults.server.port),
            },
            services: ServicesConfig {
                timeouts,
                restart_cooldown: fc
                    .services
                    .restart_cooldown_secs
                    .map_or(defaults.services.restart_cooldown, Duration::from_secs),
            },
            plugins: PluginsConfig {
                dir: fc.plugins.dir.map_or(defaults.plugins.dir, PathBuf::from),
                handshake,
            },
            bootstrap,
        })
    }

    /// Decode the `[[connector]]` list
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the list is malformed. An absent key is an
    /// empty list.
    pub fn connectors(&self) -> Result<Vec<ConnectorDeclaration>> {
        self.declarations("connector")
    }

    /// Decode the `[[plugin]]` list
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the list is malformed. An absent key is an
    /// empty list.
    pub fn plugin_declarations(&self) -> Result<Vec<PluginDeclaration>> {
        self.declarations("plugin")
    }

    fn declarations<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        let Some(value) = self.bootstrap.get(key) else {
            return Ok(Vec::new());
        };

        value
            .clone()
            .try_into()
            .map_err(|e| Error::Config(format!("invalid '{key}' list: {e}")))
    }
}
