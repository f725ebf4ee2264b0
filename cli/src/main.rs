mod cli;
mod config;
mod health;
mod service;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use common::logger::init_logger;
use engine::pipeline::drive;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::cli::Cli;
use crate::config::AppConfig;
use crate::health::HealthState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = AppConfig::from_env();
    cli.apply(&mut cfg);

    let name = cli.service.name();
    init_logger(name, cfg.log_format);
    for (key, reason) in &cfg.rejected {
        warn!(%key, %reason, "ignoring invalid environment value; using default");
    }

    // Nothing is served until every dependency is up.
    let listener = health::bind(cfg.port).await?;
    let service = tokio::task::block_in_place(|| service::build(&cli.service, &cfg))
        .with_context(|| format!("starting {name}"))?;

    let health_state = HealthState::new(name, service.counters.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let server = tokio::spawn(health::serve(
        listener,
        health_state.clone(),
        shutdown_rx.clone(),
    ));
    tokio::spawn(stop_on_signal(Arc::clone(&shutdown_tx)));

    health_state.set_ready(true);
    info!(service = name, transport = ?cfg.transport, "ready and consuming");

    let outcome = drive(
        service.source,
        service.handler,
        shutdown_rx,
        cfg.shutdown_grace,
    )
    .await;

    health_state.set_ready(false);
    let _ = shutdown_tx.send(true);

    if let Err(e) = service.sink.close().await {
        warn!(error = %e, "failed to close sink");
    }
    match server.await {
        Ok(Err(e)) => warn!(error = %e, "health server stopped with error"),
        Err(e) => warn!(error = %e, "health server task failed"),
        Ok(Ok(())) => {}
    }

    if let Err(e) = &outcome {
        error!(error = %e, "event source failed");
    }
    info!(service = name, counters = ?service.counters.snapshot(), "shut down");
    outcome
}

async fn stop_on_signal(shutdown: Arc<watch::Sender<bool>>) {
    if let Err(e) = wait_for_signal().await {
        error!(error = %e, "cannot listen for shutdown signals");
        return;
    }
    info!("shutdown signal received");
    let _ = shutdown.send(true);
}

#[cfg(unix)]
async fn wait_for_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
