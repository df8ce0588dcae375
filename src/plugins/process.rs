//! Plugin process supervision
//!
//! [`PluginProcess`] owns one child executable: it spawns it, negotiates the
//! handshake, opens the RPC channel and dispenses the plugin's capability.
//! Stopping is abrupt: the channel is closed and the child killed.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::PluginHandle;
use super::handshake::{HandshakeConfig, Negotiated};
use super::logging::{TracingLogger, forward_lines};
use super::rpc::{RemoteCapability, RpcClient};
use crate::{Error, Result};

/// A live plugin child process
struct Running {
    child: Child,
    client: Arc<RpcClient>,
    capability: RemoteCapability,
    negotiated: Negotiated,
    logs: JoinHandle<()>,
}

/// Supervisor for a single plugin executable
pub struct PluginProcess {
    name: String,
    binary: PathBuf,
    handshake: HandshakeConfig,
    state: Mutex<Option<Running>>,
}

impl PluginProcess {
    /// Create a supervisor; the process is not started
    #[must_use]
    pub fn new(name: impl Into<String>, binary: impl Into<PathBuf>, handshake: HandshakeConfig) -> Self {
        Self {
            name: name.into(),
            binary: binary.into(),
            handshake,
            state: Mutex::new(None),
        }
    }

    /// Path of the plugin executable
    #[must_use]
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Capability dispensed by the running plugin
    pub async fn capability(&self) -> Option<RemoteCapability> {
        self.state.lock().await.as_ref().map(|r| r.capability.clone())
    }

    /// Protocol negotiated with the running plugin
    pub async fn negotiated(&self) -> Option<Negotiated> {
        self.state.lock().await.as_ref().map(|r| r.negotiated.clone())
    }
}

#[async_trait]
impl PluginHandle for PluginProcess {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        if let Some(running) = state.as_mut() {
            if matches!(running.child.try_wait(), Ok(None)) {
                return Err(Error::Process(format!("plugin '{}' is already running", self.name)));
            }
            tracing::debug!(plugin = %self.name, "discarding exited plugin process");
            if let Some(stale) = state.take() {
                stale.client.close().await;
                stale.logs.abort();
            }
        }

        // The handshake runs in its own task so a dropped caller cannot
        // interrupt it halfway through negotiation
        let launch = tokio::spawn(launch(
            self.name.clone(),
            self.binary.clone(),
            self.handshake.clone(),
        ));
        let running = launch
            .await
            .map_err(|e| Error::Process(format!("plugin '{}' launch task failed: {e}", self.name)))??;

        tracing::info!(
            plugin = %self.name,
            pid = ?running.child.id(),
            protocol = %running.negotiated.protocol,
            version = running.negotiated.protocol_version,
            "plugin started"
        );

        *state = Some(running);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(mut running) = self.state.lock().await.take() else {
            tracing::debug!(plugin = %self.name, "plugin not running, nothing to stop");
            return Ok(());
        };

        running.client.close().await;

        match running.child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(plugin = %self.name, %status, "plugin already exited");
            }
            _ => {
                running.child.kill().await.map_err(|e| {
                    Error::Process(format!("failed to kill plugin '{}': {e}", self.name))
                })?;
            }
        }

        running.logs.abort();
        tracing::info!(plugin = %self.name, "plugin stopped");
        Ok(())
    }

    async fn running(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.as_mut() {
            Some(running) => {
                matches!(running.child.try_wait(), Ok(None)) && !running.client.is_closed()
            }
            None => false,
        }
    }
}

/// Spawn the binary, negotiate, connect and dispense
async fn launch(name: String, binary: PathBuf, handshake: HandshakeConfig) -> Result<Running> {
    let mut child = Command::new(&binary)
        .env(&handshake.magic_cookie_key, &handshake.magic_cookie_value)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Process(format!("failed to spawn plugin '{name}' ({}): {e}", binary.display())))?;

    let (Some(stdin), Some(stdout), Some(stderr)) =
        (child.stdin.take(), child.stdout.take(), child.stderr.take())
    else {
        return Err(abort(child, Error::Process(format!("plugin '{name}' stdio unavailable"))).await);
    };

    let logs = tokio::spawn(forward_lines(stderr, TracingLogger::new(&name)));

    let mut stdout = BufReader::new(stdout);
    let mut line = String::new();
    let read = tokio::time::timeout(handshake.timeout, stdout.read_line(&mut line)).await;

    let negotiated = match read {
        Ok(Ok(0)) => Err(Error::Process(format!("plugin '{name}' exited before handshake"))),
        Ok(Ok(_)) => handshake.negotiate(&line),
        Ok(Err(e)) => Err(Error::Process(format!("plugin '{name}' handshake read failed: {e}"))),
        Err(_) => Err(Error::Process(format!(
            "plugin '{name}' did not complete handshake within {:?}",
            handshake.timeout
        ))),
    };
    let negotiated = match negotiated {
        Ok(n) => n,
        Err(e) => {
            logs.abort();
            return Err(abort(child, e).await);
        }
    };

    let client = Arc::new(RpcClient::new(stdout, stdin));
    let dispensed = tokio::time::timeout(handshake.timeout, client.dispense(&name)).await;

    let capability = match dispensed {
        Ok(Ok(capability)) => capability,
        Ok(Err(e)) => {
            client.close().await;
            logs.abort();
            return Err(abort(child, e).await);
        }
        Err(_) => {
            client.close().await;
            logs.abort();
            let e = Error::Process(format!("plugin '{name}' did not dispense its capability in time"));
            return Err(abort(child, e).await);
        }
    };

    Ok(Running {
        child,
        client,
        capability,
        negotiated,
        logs,
    })
}

/// Kill a child that failed to come up, returning the original error
async fn abort(mut child: Child, err: Error) -> Error {
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "failed to kill plugin after launch failure");
    }
    err
}
