//! A trace-correlated mock HTTP origin, run as a standalone process, for driving HTTP proxy tests from outside the
//! test process.

#![deny(warnings)]
#![deny(missing_docs)]

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser as _;
use mock_origin::{AdminApi, MockOrigin, OriginConfig};
use tokio::{
    net::TcpListener,
    select,
    signal::unix::{signal, SignalKind},
    sync::{mpsc, watch},
    task::JoinSet,
};
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

mod cli;
use self::cli::Cli;

type GenericError = anyhow::Error;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_ansi(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => info!("mock-origin stopped."),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<(), GenericError> {
    info!("mock-origin starting...");

    let mut config = OriginConfig::load(cli.config.as_deref()).context("Failed to load configuration.")?;
    cli.apply_overrides(&mut config);

    let origin = MockOrigin::from_config(&config).context("Failed to configure mock origin.")?;

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
    spawn_signal_handlers(shutdown_tx.clone()).context("Failed to configure signal handlers.")?;

    // Every server stops once this is updated.
    let (stop_tx, stop_rx) = watch::channel(());
    let mut servers = JoinSet::new();

    let listener = TcpListener::bind(config.listen_address)
        .await
        .with_context(|| format!("Failed to bind origin listener to {}.", config.listen_address))?;
    info!(
        "mock-origin started: listening on {} (trace header: {})",
        listener.local_addr()?,
        config.trace_id_header
    );
    let store = Arc::clone(origin.store());
    servers.spawn(origin.serve(listener, wait_for_stop(stop_rx.clone())));

    if let Some(admin_address) = config.admin_address {
        let admin_listener = TcpListener::bind(admin_address)
            .await
            .with_context(|| format!("Failed to bind admin listener to {}.", admin_address))?;
        let admin = AdminApi::new(store, shutdown_tx).with_max_body_bytes(config.max_body_bytes);
        servers.spawn(admin.serve(admin_listener, wait_for_stop(stop_rx)));
    }

    select! {
        _ = shutdown_rx.recv() => {}
        Some(result) = servers.join_next() => {
            // A server stopping on its own is always an error, since we never asked it to stop.
            result.context("Server task panicked.")??;
            return Err(anyhow::anyhow!("Server stopped unexpectedly."));
        }
    }

    info!("Stopping servers...");
    stop_tx.send_replace(());

    while let Some(result) = servers.join_next().await {
        result.context("Server task panicked.")??;
    }

    Ok(())
}

async fn wait_for_stop(mut stop_rx: watch::Receiver<()>) {
    // Either the stop signal arrives or the sender is gone: both mean stop.
    let _ = stop_rx.changed().await;
}

fn spawn_signal_handlers(shutdown_tx: mpsc::Sender<()>) -> Result<(), GenericError> {
    let mut sigint_handler = signal(SignalKind::interrupt()).context("Failed to set up SIGINT handler.")?;
    let mut sigterm_handler = signal(SignalKind::terminate()).context("Failed to set up SIGTERM handler.")?;

    tokio::spawn(async move {
        select! {
            _ = sigint_handler.recv() => {
                info!("Received SIGINT, shutting down...");
            }
            _ = sigterm_handler.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }

        if let Err(e) = shutdown_tx.send(()).await {
            error!("Failed to send shutdown signal: {:?}", e);
        }
    });

    Ok(())
}
