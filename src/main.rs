//! Changefeed Gateway - Binary Entry Point
//!
//! Starts the change watcher and the HTTP gateway, then waits for SIGINT or
//! SIGTERM. Losing the watch feed is fatal: the process exits non-zero so
//! its supervisor can restart it, which re-subscribes from the current
//! revision.

use std::sync::Arc;

use anyhow::{Context, Result};
use changefeed_gateway::api::create_router;
use changefeed_gateway::{AppContext, GatewayConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
        _ = terminate => info!("Received SIGTERM"),
        _ = token.cancelled() => {}
    }

    token.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    let config = GatewayConfig::from_env().context("invalid configuration")?;
    info!(
        backend = ?config.store_backend,
        endpoints = ?config.endpoints,
        prefix = %config.watch_prefix,
        log_path = %config.log_path.display(),
        time_zone = %config.time_zone,
        "changefeed gateway starting"
    );

    let ctx = Arc::new(AppContext::from_config(&config).context("failed to create store client")?);

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let watcher = ctx.watcher();
    info!(
        prefix = %watcher.prefix(),
        time_zone = %ctx.logger.time_zone(),
        "change capture pipeline starting"
    );
    let watcher_token = shutdown.clone();
    let watcher_task = tokio::spawn(async move {
        let result = watcher.run(watcher_token.clone()).await;
        // Stop the gateway too when the pipeline dies
        watcher_token.cancel();
        result
    });

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;
    info!(addr = %config.http_addr, "HTTP gateway listening");

    axum::serve(listener, create_router(ctx.clone()))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
        .context("HTTP server failed")?;

    match watcher_task.await.context("watcher task panicked")? {
        Ok(stats) => {
            info!(
                events = stats.events,
                appended = stats.appended,
                failed = stats.failed,
                "changefeed gateway shut down gracefully"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "change capture pipeline stopped");
            Err(e).context("change capture pipeline stopped")
        }
    }
}
