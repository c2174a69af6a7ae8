//! `printwatch-poller` -- OctoPrint telemetry capture daemon.
//!
//! Polls the controller's job state, asks the firmware for position and
//! settings reports while an allow-listed file prints, and appends the
//! merged samples to CSV. See [`printwatch_poller::config::PollerConfig`]
//! for the environment variables it reads.

use printwatch_poller::config::PollerConfig;
use printwatch_poller::{logging, runner};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = match PollerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            logging::init(None);
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    logging::init(config.log_file.as_deref());

    tracing::info!(
        url = %config.octoprint_url,
        profile = %config.profile,
        csv_file = %config.csv_file.display(),
        allowed_files = config.allow_list.len(),
        predictions = config.prediction_endpoints().len(),
        "Starting printwatch-poller",
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received");
            cancel.cancel();
        }
    });

    loop {
        match runner::run_session(&config, &cancel).await {
            Ok(()) => break,
            Err(e) => tracing::error!(
                error = %e,
                retry_in_secs = config.retry_wait.as_secs(),
                "Session failed, restarting",
            ),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.retry_wait) => {}
        }
    }

    tracing::info!("printwatch-poller stopped");
}

/// Wait for Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
