//! Plugin host - the set of live plugin handles available at boot

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::discovery::find_binary;
use super::handshake::HandshakeConfig;
use super::process::PluginProcess;
use super::PluginHandle;
use crate::config::PluginDeclaration;

/// Live plugin handles, keyed by declared name
pub struct PluginHost {
    dir: PathBuf,
    handshake: HandshakeConfig,
    plugins: HashMap<String, Arc<dyn PluginHandle>>,
}

impl PluginHost {
    /// Create an empty host discovering binaries under `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, handshake: HandshakeConfig) -> Self {
        Self {
            dir: dir.into(),
            handshake,
            plugins: HashMap::new(),
        }
    }

    /// Discover and start every declared plugin
    ///
    /// Missing binaries and failed starts are skipped with a warning so one
    /// broken plugin never blocks the others. Returns the names started.
    pub async fn launch(&mut self, declarations: &[PluginDeclaration]) -> Vec<String> {
        let mut started = Vec::new();

        for decl in declarations {
            if self.plugins.contains_key(&decl.name) {
                tracing::debug!(plugin = %decl.name, "plugin already launched, skipping");
                continue;
            }

            let Some(binary) = find_binary(&self.dir, &decl.name) else {
                tracing::warn!(
                    plugin = %decl.name,
                    dir = %self.dir.display(),
                    "plugin binary not found, skipping"
                );
                continue;
            };

            let process = PluginProcess::new(&decl.name, binary, self.handshake.clone());
            if let Err(e) = process.start().await {
                tracing::warn!(plugin = %decl.name, error = %e, "plugin failed to start, skipping");
                continue;
            }

            tracing::info!(plugin = %decl.name, binary = %process.binary().display(), "plugin started");
            self.plugins.insert(decl.name.clone(), Arc::new(process));
            started.push(decl.name.clone());
        }

        started
    }

    /// Add an already constructed handle
    pub fn insert(&mut self, name: impl Into<String>, handle: Arc<dyn PluginHandle>) {
        self.plugins.insert(name.into(), handle);
    }

    /// Look up a live handle by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn PluginHandle>> {
        self.plugins.get(name).cloned()
    }

    /// Number of live handles
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Whether no plugin is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Stop every plugin, logging failures
    pub async fn stop_all(&self) {
        for (name, handle) in &self.plugins {
            if let Err(e) = handle.stop().await {
                tracing::warn!(plugin = %name, error = %e, "failed to stop plugin");
            }
        }
    }
}
