//! Standalone monitor: watches the addresses from `WATCH_*` settings until
//! interrupted, then stops the session cleanly.

use std::io;

use tracing::{error, info};
use watchtower_domain::config::{MonitorConfig, WatchConfig};
use watchtower_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use watchtower_monitor::{build_registry, MonitorError, SessionError, SessionRequest};

#[derive(Debug, thiserror::Error)]
enum BootstrapError {
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("signal handler failed: {0}")]
    Signal(#[from] io::Error),
}

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("[monitor] {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn run() -> Result<(), BootstrapError> {
    let config = MonitorConfig::load_from_env().map_err(MonitorError::from)?;
    let watch = WatchConfig::load_from_env().map_err(MonitorError::from)?;
    let telemetry_config = TelemetryConfig::from_env("MONITOR");
    init_telemetry(&telemetry_config).map_err(MonitorError::from)?;

    let registry = build_registry(&config).await?;
    let started = registry
        .start(SessionRequest {
            addresses: watch.addresses().to_vec(),
            notify_target: watch.notify_target().to_string(),
            network: watch.network(),
            options: watch.session_options(config.poll_interval()),
        })
        .await?;
    info!(
        session = %started.session_id,
        network = %started.network,
        start_height = started.start_height,
        "monitoring, press ctrl-c to stop"
    );

    let signal = tokio::signal::ctrl_c().await;
    match registry.stop(&started.session_id).await {
        Ok(report) => info!(
            matches = report.matches,
            last_height = report.last_processed_height,
            "monitor stopped"
        ),
        Err(err) => error!(%err, "failed to stop session"),
    }
    signal?;
    Ok(())
}
