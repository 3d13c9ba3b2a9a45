use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use stockhold_api::app::{build_app, services};
use stockhold_infra::{Config, ExpirySweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;
    stockhold_observability::init(&config.log_level);

    let services = Arc::new(services::build_services(&config).await?);

    let sweeper =
        ExpirySweeper::new(config.sweep_period).spawn("expiry-sweeper", services.engine.clone());

    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;

    info!(address = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")?;

    info!("http server stopped; stopping expiry sweeper");
    if tokio::time::timeout(config.shutdown_timeout, sweeper.shutdown())
        .await
        .is_err()
    {
        warn!(
            timeout_secs = config.shutdown_timeout.as_secs(),
            "expiry sweeper did not stop in time"
        );
    }

    Ok(())
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
