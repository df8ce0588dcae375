//! JSON-RPC channel to a plugin process
//!
//! Newline-delimited JSON-RPC 2.0 over the plugin's stdin/stdout. Requests
//! are correlated with responses by id; a reader task resolves pending
//! requests as responses arrive.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;

use crate::{Error, Result};

/// Look up a named capability
pub const METHOD_DISPENSE: &str = "plugin.dispense";

/// Invoke a method on a dispensed capability
pub const METHOD_CALL: &str = "plugin.call";

/// JSON-RPC error code for an unknown method
pub const METHOD_NOT_FOUND: i32 = -32601;

/// JSON-RPC error code for invalid parameters
pub const INVALID_PARAMS: i32 = -32602;

/// Error code reported when a capability method fails
pub const CAPABILITY_ERROR: i32 = -32000;

/// JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    #[must_use]
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(id: u64, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// JSON-RPC error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Client side of the plugin RPC channel
pub struct RpcClient {
    writer: Mutex<Option<Writer>>,
    pending: Pending,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl RpcClient {
    /// Start a client over a reader/writer pair
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(reader_loop(reader, Arc::clone(&pending), Arc::clone(&closed)));

        Self {
            writer: Mutex::new(Some(Box::new(writer))),
            pending,
            next_id: AtomicU64::new(1),
            closed,
            reader,
        }
    }

    /// Whether the channel has been closed by either side
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a request and wait for its response
    ///
    /// # Errors
    ///
    /// Returns [`Error::Process`] if the channel is closed, the write fails, or
    /// the plugin answers with an error
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::Process("plugin channel is closed".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        // The reader marks the channel closed before clearing pending, so a
        // sender inserted after that clear is caught here
        if self.is_closed() {
            self.pending.lock().await.remove(&id);
            return Err(Error::Process("plugin channel is closed".to_string()));
        }

        if let Err(e) = self.write_line(&line).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let response = rx
            .await
            .map_err(|_| Error::Process(format!("plugin closed the channel during '{method}'")))?;

        if let Some(error) = response.error {
            return Err(Error::Process(format!(
                "plugin rejected '{method}' ({}): {}",
                error.code, error.message
            )));
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| Error::Process("plugin channel is closed".to_string()))?;

        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Process(format!("failed to write to plugin: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| Error::Process(format!("failed to flush plugin channel: {e}")))
    }

    /// Look up a capability by name
    ///
    /// # Errors
    ///
    /// Returns [`Error::Process`] if the plugin does not provide it
    pub async fn dispense(self: &Arc<Self>, name: &str) -> Result<RemoteCapability> {
        self.request(METHOD_DISPENSE, json!({ "name": name })).await?;

        Ok(RemoteCapability {
            name: name.to_string(),
            client: Arc::clone(self),
        })
    }

    /// Close the channel
    ///
    /// Closing the writer delivers EOF on the plugin's stdin; pending requests
    /// fail immediately.
    pub async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.closed.store(true, Ordering::SeqCst);
        self.reader.abort();
        self.pending.lock().await.clear();
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn reader_loop<R>(reader: R, pending: Pending, closed: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let response = match serde_json::from_str::<RpcResponse>(&line) {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::warn!(error = %e, "malformed plugin response");
                        continue;
                    }
                };

                let Some(id) = response.id else {
                    tracing::debug!("ignoring plugin notification");
                    continue;
                };

                match pending.lock().await.remove(&id) {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => tracing::debug!(id, "dropping response for unknown request"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "plugin channel read failed");
                break;
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    pending.lock().await.clear();
}

/// Local proxy for a capability dispensed by a plugin
#[derive(Clone)]
pub struct RemoteCapability {
    name: String,
    client: Arc<RpcClient>,
}

impl std::fmt::Debug for RemoteCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCapability")
            .field("name", &self.name)
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

impl RemoteCapability {
    /// Name the capability was dispensed under
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke a method on the remote capability
    ///
    /// # Errors
    ///
    /// Returns [`Error::Process`] if the call fails or the channel is closed
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.client
            .request(
                METHOD_CALL,
                json!({ "capability": self.name, "method": method, "params": params }),
            )
            .await
    }
}
