use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use harbor_gateway::{ApiServerBuilder, Config, PluginHost, ProxyTable, ServiceManager};

/// Harbor - lifecycle gateway for connectors and plugins
#[derive(Parser)]
#[command(name = "harbor", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "HARBOR_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the config file)
    #[arg(long, env = "HARBOR_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,harbor_gateway=info",
        1 => "info,harbor_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        plugins_dir = %config.plugins.dir.display(),
        "starting harbor gateway"
    );

    let mut host = PluginHost::new(&config.plugins.dir, config.plugins.handshake.clone());
    match config.plugin_declarations() {
        Ok(declarations) => {
            let started = host.launch(&declarations).await;
            tracing::info!(
                started = ?started,
                live = host.len(),
                declared = declarations.len(),
                "plugin host ready"
            );
        }
        Err(e) => tracing::error!(error = %e, "invalid plugin declarations, no plugins launched"),
    }

    let manager = Arc::new(ServiceManager::from_config(&config.services));

    // Each bootstrap list fails on its own; the gateway still serves the rest
    if let Err(e) = manager.load_connectors(&config).await {
        tracing::error!(error = %e, "failed to load connectors");
    }
    if let Err(e) = manager.load_plugins(&config, &host).await {
        tracing::error!(error = %e, "failed to load plugins");
    }

    let proxy_table = ProxyTable::from_definitions(&manager.definitions().await);

    let server = ApiServerBuilder::new(Arc::clone(&manager))
        .host(config.server.host.clone())
        .port(config.server.port)
        .proxy_table(proxy_table)
        .build();

    let served = server.run(shutdown_signal()).await;

    tracing::info!("shutting down plugins");
    host.stop_all().await;

    served.context("API server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
