//! Harbor Gateway - lifecycle orchestration for external services
//!
//! This library provides the core functionality for the Harbor gateway:
//! - A registry of managed services behind one status/restart/reload contract
//! - Connectors: remote HTTP peers driven over their control API
//! - Plugins: child processes reached over a handshake-negotiated RPC channel
//! - An operator HTTP surface and a reverse proxy to plugin ports
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    HTTP surface                      │
//! │   /api/v1/services   │   /plugin/{prefix}/*  │ /health│
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 ServiceManager                       │
//! │   ConnectorService          │    PluginService       │
//! └────────────┬────────────────┴──────────┬────────────┘
//!              │                           │
//! ┌────────────▼──────────┐   ┌────────────▼────────────┐
//! │  HTTP peer /api/v1/*  │   │ child process (JSON-RPC) │
//! └───────────────────────┘   └─────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod plugins;
pub mod services;

pub use api::{ApiServer, ApiServerBuilder, ProxyTable};
pub use config::Config;
pub use error::{Error, Result};
pub use plugins::{PluginHandle, PluginHost};
pub use services::{
    ConnectorService, Definition, PluginService, Service, ServiceId, ServiceManager, ServiceType,
    Status,
};
