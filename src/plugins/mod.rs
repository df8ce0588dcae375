//! Plugin process framework
//!
//! Plugins are separately built executables found under the plugin
//! directory by their declared name. Each one is launched as a child process,
//! must answer a versioned handshake, and is then driven over a JSON-RPC
//! channel on its stdin/stdout. Its stderr carries structured log records
//! that are forwarded into `tracing`.

pub mod discovery;
pub mod handshake;
pub mod host;
pub mod logging;
pub mod process;
pub mod rpc;
pub mod server;

use async_trait::async_trait;

pub use discovery::find_binary;
pub use handshake::{HandshakeConfig, Negotiated, PROTOCOL_JSONRPC};
pub use host::PluginHost;
pub use logging::{LogLevel, LogRecord, PluginLogger, TracingLogger};
pub use process::PluginProcess;
pub use rpc::{RemoteCapability, RpcClient};
pub use server::{Dispensable, PluginServer};

use crate::Result;

/// Live plugin capability managed by a [`PluginService`](crate::services::PluginService)
#[async_trait]
pub trait PluginHandle: Send + Sync {
    /// Declared plugin name
    fn name(&self) -> &str;

    /// Spawn the plugin and establish its RPC channel
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Process`] if spawning, the handshake or the
    /// capability lookup fails
    async fn start(&self) -> Result<()>;

    /// Tear down the RPC channel and terminate the plugin
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Process`] if the child cannot be killed
    async fn stop(&self) -> Result<()>;

    /// Whether the plugin process is alive with an open channel
    async fn running(&self) -> bool;
}
