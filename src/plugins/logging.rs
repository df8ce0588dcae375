//! Structured-logging bridge between plugins and the host
//!
//! Plugins write one log record per stderr line. A record carries a level, a
//! message and a flat list of trailing arguments that are paired two at a
//! time into key/value fields. The host forwards records into `tracing`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Log level carried by a plugin record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// One log line written by a plugin
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default)]
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl LogRecord {
    /// Parse a stderr line; non-JSON lines become a debug record verbatim
    #[must_use]
    pub fn parse(line: &str) -> Self {
        serde_json::from_str(line).unwrap_or_else(|_| Self {
            level: LogLevel::Debug,
            message: line.to_string(),
            args: Vec::new(),
        })
    }
}

/// Logging capability the plugin framework writes into
pub trait PluginLogger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, args: &[Value]);
}

/// Adapts the host's `tracing` subscriber into a [`PluginLogger`]
#[derive(Debug, Clone)]
pub struct TracingLogger {
    plugin: String,
}

impl TracingLogger {
    #[must_use]
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
        }
    }
}

impl PluginLogger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str, args: &[Value]) {
        let fields = render_fields(&pair_fields(args));
        let plugin = self.plugin.as_str();

        match level {
            LogLevel::Trace => tracing::trace!(plugin, fields = %fields, "{message}"),
            LogLevel::Debug => tracing::debug!(plugin, fields = %fields, "{message}"),
            LogLevel::Info => tracing::info!(plugin, fields = %fields, "{message}"),
            LogLevel::Warn => tracing::warn!(plugin, fields = %fields, "{message}"),
            LogLevel::Error => tracing::error!(plugin, fields = %fields, "{message}"),
        }
    }
}

/// Pair trailing arguments into key/value fields
///
/// Keys that are not strings are rendered as JSON. An odd leftover argument
/// is kept under the key `arg_<index>`.
#[must_use]
pub fn pair_fields(args: &[Value]) -> Vec<(String, Value)> {
    let mut fields = Vec::with_capacity(args.len().div_ceil(2));
    let mut chunks = args.chunks_exact(2);

    for pair in chunks.by_ref() {
        if let [key, value] = pair {
            let key = match key {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            fields.push((key, value.clone()));
        }
    }

    if let [leftover] = chunks.remainder() {
        fields.push((format!("arg_{}", args.len() - 1), leftover.clone()));
    }

    fields
}

fn render_fields(fields: &[(String, Value)]) -> String {
    fields
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => format!("{k}={s}"),
            other => format!("{k}={other}"),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Forward every line of a plugin's stderr into `logger` until EOF
pub async fn forward_lines<R>(reader: R, logger: impl PluginLogger)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let record = LogRecord::parse(&line);
        logger.log(record.level, &record.message, &record.args);
    }
}
