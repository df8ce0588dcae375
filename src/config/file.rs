//! TOML configuration file schema
//!
//! The file is read once at boot. Runtime sections (`server`, `services`,
//! `plugins`) are all optional overlays on top of defaults. The bootstrap
//! lists (`[[connector]]`, `[[plugin]]`) are decoded separately so that a
//! malformed list never prevents the other one from loading.

use std::path::PathBuf;

use serde::Deserialize;

/// Runtime sections of the config file
#[derive(Debug, Default, Deserialize)]
pub struct HarborConfigFile {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Timeouts and restart cooldown
    #[serde(default)]
    pub services: ServicesFileConfig,

    /// Plugin process framework configuration
    #[serde(default)]
    pub plugins: PluginsFileConfig,
}

/// HTTP server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Bind address
    pub host: Option<String>,

    /// API server port
    pub port: Option<u16>,
}

/// Service call bounds
#[derive(Debug, Default, Deserialize)]
pub struct ServicesFileConfig {
    pub status_timeout_secs: Option<u64>,
    pub action_timeout_secs: Option<u64>,
    pub restart_cooldown_secs: Option<u64>,
}

/// Plugin framework configuration
#[derive(Debug, Default, Deserialize)]
pub struct PluginsFileConfig {
    /// Directory plugin binaries are discovered in
    pub dir: Option<String>,
    pub protocol_version: Option<u32>,
    pub magic_cookie_key: Option<String>,
    pub magic_cookie_value: Option<String>,
    /// Transport protocols a plugin may negotiate
    pub allowed_protocols: Option<Vec<String>>,
    pub handshake_timeout_secs: Option<u64>,
}

/// A `[[connector]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectorDeclaration {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub components: Vec<String>,
}

/// A `[[plugin]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PluginDeclaration {
    pub name: String,
    pub port: u16,
    #[serde(default)]
    pub components: Vec<String>,
}

/// Return the config file path: `~/.config/harbor/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("harbor").join("config.toml"))
}
