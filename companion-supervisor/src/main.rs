use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use companion_supervisor::rest::{AppState, create_router};
use companion_supervisor::runtime::DockerCli;
use companion_supervisor::session::BridgeConfig;
use companion_supervisor::{Reconciler, Settings, SettingsStore, Supervisor};

#[derive(Parser)]
#[command(name = "companion-supervisor")]
#[command(about = "Container service supervisor")]
struct Args {
    /// Service settings file
    #[arg(long, default_value = "/supervisor/.config/dockers.json")]
    config: PathBuf,

    /// REST API listen address
    #[arg(long, default_value = "0.0.0.0:8081")]
    listen: String,

    /// Release manifest used for update checks
    #[arg(long)]
    versions: Option<PathBuf>,

    /// Docker binary
    #[arg(long, default_value = "/usr/bin/docker")]
    docker: PathBuf,

    /// ttyd binary used for interactive sessions
    #[arg(long, default_value = "/usr/bin/ttyd")]
    ttyd: PathBuf,

    /// Port the terminal bridge listens on
    #[arg(long, default_value = "8082")]
    bridge_port: u16,

    /// Service to leave unmanaged (repeatable)
    #[arg(long)]
    exclude: Vec<String>,

    /// Timeout for every docker call, in seconds
    #[arg(long, default_value = "30")]
    call_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("companion_supervisor=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let call_timeout = Duration::from_secs(args.call_timeout_secs);

    info!(config = %args.config.display(), "Starting companion-supervisor");

    let settings = Settings::load(&args.config, &args.exclude)?;
    info!(services = settings.dockers.len(), "Settings loaded");

    let runtime = Arc::new(DockerCli::new(&args.docker).with_timeout(call_timeout));
    let mut supervisor = Supervisor::new(settings, runtime, SettingsStore::new(&args.config))
        .with_bridge(BridgeConfig::ttyd(&args.ttyd, args.bridge_port, &args.docker))
        .with_call_timeout(call_timeout);
    if let Some(path) = &args.versions {
        supervisor = supervisor.with_release_manifest(path);
    }
    let supervisor = Arc::new(supervisor);
    info!(services = ?supervisor.names().collect::<Vec<_>>(), "Supervising");

    // Reconcile loop
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = Reconciler::new(supervisor.clone()).spawn(shutdown_rx);

    // REST API
    let router = create_router(Arc::new(AppState {
        supervisor: supervisor.clone(),
    }));
    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!("REST API listening on {}", args.listen);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let ctrl_c = signal::ctrl_c();
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        })
        .await?;

    info!("Shutting down...");
    let _ = shutdown_tx.send(true);
    if let Err(e) = reconciler.await {
        tracing::warn!(error = %e, "Reconcile task ended abnormally");
    }
    supervisor.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}
