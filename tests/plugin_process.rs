//! Plugin process integration tests
//!
//! Plugins here are small shell scripts that speak the handshake and the
//! newline-delimited JSON-RPC protocol by hand.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use harbor_gateway::config::{Config, PluginDeclaration};
use harbor_gateway::plugins::{HandshakeConfig, PluginHandle, PluginHost, PluginProcess};
use harbor_gateway::services::{PluginService, Timeouts};
use harbor_gateway::{Service, ServiceManager};
use serde_json::json;

const RPC_LOOP: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  case "$line" in
    *'"plugin.dispense"'*) printf '{"jsonrpc":"2.0","id":%s,"result":{"dispensed":true}}\n' "$id" ;;
    *'"plugin.call"'*) printf '{"jsonrpc":"2.0","id":%s,"result":{"pong":true}}\n' "$id" ;;
    *) printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"method not found"}}\n' "$id" ;;
  esac
done
"#;

/// Write an executable script at `<dir>/<name>/<name>`
fn write_plugin(dir: &Path, name: &str, body: &str) -> PathBuf {
    let plugin_dir = dir.join(name);
    std::fs::create_dir_all(&plugin_dir).unwrap();
    let path = plugin_dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn conforming_plugin() -> String {
    let cookie = HandshakeConfig::default().magic_cookie_value;
    format!(
        r#"[ "$HARBOR_PLUGIN_COOKIE" = "{cookie}" ] || {{ echo "missing cookie" >&2; exit 1; }}
echo '1|jsonrpc'
echo '{{"level":"info","message":"plugin ready","args":["port",9101,"dangling"]}}' >&2
{RPC_LOOP}"#
    )
}

fn short_handshake() -> HandshakeConfig {
    HandshakeConfig {
        timeout: Duration::from_secs(2),
        ..HandshakeConfig::default()
    }
}

#[tokio::test]
async fn test_start_call_and_stop() {
    let dir = tempfile::tempdir().unwrap();
    let binary = write_plugin(dir.path(), "echo", &conforming_plugin());
    let process = PluginProcess::new("echo", binary, short_handshake());

    assert!(!process.running().await);
    process.start().await.unwrap();
    assert!(process.running().await);

    let negotiated = process.negotiated().await.unwrap();
    assert_eq!(negotiated.protocol_version, 1);
    assert_eq!(negotiated.protocol, "jsonrpc");

    let capability = process.capability().await.unwrap();
    assert_eq!(capability.name(), "echo");
    let result = capability.call("ping", json!({})).await.unwrap();
    assert_eq!(result, json!({ "pong": true }));

    process.stop().await.unwrap();
    assert!(!process.running().await);

    // The channel went down with the process
    assert!(capability.call("ping", json!({})).await.is_err());

    // Stopping again is a no-op
    process.stop().await.unwrap();
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let binary = write_plugin(dir.path(), "echo", &conforming_plugin());
    let process = PluginProcess::new("echo", binary, short_handshake());

    process.start().await.unwrap();
    let err = process.start().await.unwrap_err();
    assert!(err.to_string().contains("already running"));

    process.stop().await.unwrap();
}

#[tokio::test]
async fn test_version_mismatch_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let binary = write_plugin(dir.path(), "old", &format!("echo '2|jsonrpc'\n{RPC_LOOP}"));
    let process = PluginProcess::new("old", binary, short_handshake());

    let err = process.start().await.unwrap_err();
    assert!(err.to_string().contains("incompatible"), "{err}");
    assert!(!process.running().await);
}

#[tokio::test]
async fn test_unknown_protocol_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let binary = write_plugin(dir.path(), "grpc", &format!("echo '1|grpc'\n{RPC_LOOP}"));
    let process = PluginProcess::new("grpc", binary, short_handshake());

    let err = process.start().await.unwrap_err();
    assert!(err.to_string().contains("unsupported"), "{err}");
}

#[tokio::test]
async fn test_exit_before_handshake() {
    let dir = tempfile::tempdir().unwrap();
    let binary = write_plugin(dir.path(), "quitter", "exit 0\n");
    let process = PluginProcess::new("quitter", binary, short_handshake());

    let err = process.start().await.unwrap_err();
    assert!(err.to_string().contains("exited before handshake"), "{err}");
}

#[tokio::test]
async fn test_wrong_cookie_fails_handshake() {
    let dir = tempfile::tempdir().unwrap();
    let binary = write_plugin(dir.path(), "echo", &conforming_plugin());
    let handshake = HandshakeConfig {
        magic_cookie_value: "not-the-cookie".to_string(),
        ..short_handshake()
    };
    let process = PluginProcess::new("echo", binary, handshake);

    assert!(process.start().await.is_err());
}

#[tokio::test]
async fn test_silent_plugin_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let binary = write_plugin(dir.path(), "silent", "exec sleep 30\n");
    let handshake = HandshakeConfig {
        timeout: Duration::from_millis(300),
        ..HandshakeConfig::default()
    };
    let process = PluginProcess::new("silent", binary, handshake);

    let err = process.start().await.unwrap_err();
    assert!(err.to_string().contains("did not complete handshake"), "{err}");
}

#[tokio::test]
async fn test_plugin_service_restart_and_status() {
    let dir = tempfile::tempdir().unwrap();
    let binary = write_plugin(dir.path(), "echo", &conforming_plugin());
    let process = Arc::new(PluginProcess::new("echo", binary, short_handshake()));
    process.start().await.unwrap();

    let declaration = PluginDeclaration {
        name: "echo".to_string(),
        port: 9101,
        components: Vec::new(),
    };
    let handle: Arc<dyn PluginHandle> = process.clone();
    let service = PluginService::from_declaration(&declaration, handle, Timeouts::default());

    assert!(service.status().await.is_alive);
    service.restart().await.unwrap();
    assert!(service.status().await.is_alive);
    assert!(process.capability().await.is_some());

    process.stop().await.unwrap();
    assert!(!service.status().await.is_alive);
}

#[tokio::test]
async fn test_host_launches_and_manager_registers() {
    let dir = tempfile::tempdir().unwrap();
    write_plugin(dir.path(), "echo", &conforming_plugin());
    write_plugin(dir.path(), "broken", "exit 3\n");

    let config = Config::from_toml(
        r#"
        [[plugin]]
        name = "echo"
        port = 9101

        [[plugin]]
        name = "broken"
        port = 9102

        [[plugin]]
        name = "absent"
        port = 9103
        "#,
    )
    .unwrap();

    let mut host = PluginHost::new(dir.path(), short_handshake());
    let started = host.launch(&config.plugin_declarations().unwrap()).await;
    assert_eq!(started, vec!["echo".to_string()]);

    let manager = ServiceManager::new();
    assert_eq!(manager.load_plugins(&config, &host).await.unwrap(), 1);

    let definitions = manager.definitions().await;
    assert_eq!(definitions.len(), 1);
    assert_eq!(definitions[0].name, "echo");
    assert_eq!(definitions[0].port, 9101);
    let id = definitions[0].id.unwrap();
    assert!(manager.status(&id).await.unwrap().is_alive);

    host.stop_all().await;
    assert!(!manager.status(&id).await.unwrap().is_alive);
}
