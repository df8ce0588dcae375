//! Plugin side of the process protocol
//!
//! A plugin binary builds a [`PluginServer`] with the capabilities it offers
//! and calls [`PluginServer::serve_stdio`]. The server checks the magic
//! cookie, prints the handshake line and then answers RPC requests until the
//! host closes stdin.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use super::handshake::{HandshakeConfig, PROTOCOL_JSONRPC};
use super::logging::{LogLevel, LogRecord};
use super::rpc::{
    CAPABILITY_ERROR, INVALID_PARAMS, METHOD_CALL, METHOD_DISPENSE, METHOD_NOT_FOUND, RpcRequest, RpcResponse,
};
use crate::{Error, Result};

/// A capability a plugin can dispense to the host
#[async_trait]
pub trait Dispensable: Send + Sync {
    /// Handle one method call; `Err` is reported to the host as an RPC error
    async fn call(&self, method: &str, params: Value) -> std::result::Result<Value, String>;
}

#[derive(Deserialize)]
struct DispenseParams {
    name: String,
}

#[derive(Deserialize)]
struct CallParams {
    capability: String,
    method: String,
    #[serde(default)]
    params: Value,
}

/// Serves named capabilities over the plugin RPC channel
#[derive(Clone)]
pub struct PluginServer {
    handshake: HandshakeConfig,
    capabilities: HashMap<String, Arc<dyn Dispensable>>,
}

impl PluginServer {
    #[must_use]
    pub fn new(handshake: HandshakeConfig) -> Self {
        Self {
            handshake,
            capabilities: HashMap::new(),
        }
    }

    /// Offer a capability under `name`
    #[must_use]
    pub fn capability(mut self, name: impl Into<String>, capability: Arc<dyn Dispensable>) -> Self {
        self.capabilities.insert(name.into(), capability);
        self
    }

    /// Serve on the process's stdin/stdout
    ///
    /// # Errors
    ///
    /// Returns [`Error::Process`] when the process was not launched by a host
    /// presenting the expected cookie, or an IO error from the channel
    pub async fn serve_stdio(&self) -> Result<()> {
        let cookie = std::env::var(&self.handshake.magic_cookie_key).ok();
        if !self.handshake.cookie_matches(cookie.as_deref()) {
            return Err(Error::Process(
                "this binary is a plugin and must be launched by its host".to_string(),
            ));
        }

        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Print the handshake line, then answer requests until EOF
    ///
    /// # Errors
    ///
    /// Returns an IO error if the channel cannot be read or written
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut handshake = self.handshake.line(PROTOCOL_JSONRPC);
        handshake.push('\n');
        writer.write_all(handshake.as_bytes()).await?;
        writer.flush().await?;

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<RpcRequest>(&line) {
                Ok(request) => self.handle(request).await,
                Err(e) => {
                    log(LogLevel::Warn, "malformed request", &[json!("error"), json!(e.to_string())]);
                    continue;
                }
            };

            let mut out = serde_json::to_string(&response)?;
            out.push('\n');
            writer.write_all(out.as_bytes()).await?;
            writer.flush().await?;
        }

        Ok(())
    }

    async fn handle(&self, request: RpcRequest) -> RpcResponse {
        let id = request.id;

        match request.method.as_str() {
            METHOD_DISPENSE => match serde_json::from_value::<DispenseParams>(request.params) {
                Ok(p) if self.capabilities.contains_key(&p.name) => {
                    RpcResponse::success(id, json!({ "name": p.name }))
                }
                Ok(p) => RpcResponse::failure(id, METHOD_NOT_FOUND, format!("unknown capability '{}'", p.name)),
                Err(e) => RpcResponse::failure(id, INVALID_PARAMS, e.to_string()),
            },
            METHOD_CALL => {
                let p = match serde_json::from_value::<CallParams>(request.params) {
                    Ok(p) => p,
                    Err(e) => return RpcResponse::failure(id, INVALID_PARAMS, e.to_string()),
                };
                let Some(capability) = self.capabilities.get(&p.capability) else {
                    return RpcResponse::failure(
                        id,
                        METHOD_NOT_FOUND,
                        format!("unknown capability '{}'", p.capability),
                    );
                };
                match capability.call(&p.method, p.params).await {
                    Ok(result) => RpcResponse::success(id, result),
                    Err(message) => RpcResponse::failure(id, CAPABILITY_ERROR, message),
                }
            }
            other => RpcResponse::failure(id, METHOD_NOT_FOUND, format!("unknown method '{other}'")),
        }
    }
}

/// Write a structured log record to stderr for the host to forward
pub fn log(level: LogLevel, message: &str, args: &[Value]) {
    let record = LogRecord {
        level,
        message: message.to_string(),
        args: args.to_vec(),
    };
    if let Ok(line) = serde_json::to_string(&record) {
        eprintln!("{line}");
    }
}
