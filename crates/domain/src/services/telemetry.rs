//! Process-wide logging and metrics for the watchtower binaries.

use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use metrics_util::MetricKindMask;
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{config::hydrate_env_file, model::MAX_POLLING_INTERVAL};

static SUBSCRIBER_INSTALLED: OnceCell<()> = OnceCell::new();
static METRICS_HANDLE: OnceCell<Arc<PrometheusHandle>> = OnceCell::new();

/// Gauges not set for this long are dropped from the exposition. Live
/// sessions refresh theirs every tick, so only stopped sessions age out.
pub const GAUGE_IDLE_TIMEOUT: Duration = Duration::from_secs(3 * MAX_POLLING_INTERVAL.as_secs());

const COUNTERS: &[(&str, &str)] = &[
    ("monitor_ticks_total", "Polling ticks by outcome"),
    ("monitor_blocks_total", "Blocks walked by fetch result"),
    ("monitor_matches_total", "Watched transactions emitted by direction"),
    ("monitor_duplicates_total", "Matches dropped by the dedup window"),
    ("monitor_notifications_total", "Notification attempts by result"),
    ("monitor_audit_writes_total", "Audit record appends by result"),
    ("api_session_requests_total", "Session API calls by endpoint and status"),
];

const GAUGES: &[(&str, &str)] = &[
    ("monitor_active_sessions", "Sessions currently polling"),
    ("monitor_last_height", "Last fully processed block height per session"),
];

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    service: String,
    log_filter: String,
    metrics_address: Option<String>,
}

impl TelemetryConfig {
    /// Reads `<PREFIX>_LOG_FILTER` (default `info`) and the optional
    /// `<PREFIX>_METRICS_ADDRESS` listener.
    pub fn from_env(prefix: &str) -> Self {
        let _ = hydrate_env_file();
        let service = prefix.trim().to_ascii_uppercase();
        let log_filter =
            optional_var(&format!("{service}_LOG_FILTER")).unwrap_or_else(|| "info".to_string());
        let metrics_address = optional_var(&format!("{service}_METRICS_ADDRESS"));

        Self {
            service: service.to_ascii_lowercase(),
            log_filter,
            metrics_address,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn metrics_address(&self) -> Option<&str> {
        self.metrics_address.as_deref()
    }

    fn metrics_listener(&self) -> Result<Option<SocketAddr>, TelemetryError> {
        self.metrics_address()
            .map(|raw| {
                raw.parse().map_err(|err: std::net::AddrParseError| {
                    TelemetryError::InvalidMetricsAddress(raw.to_string(), err.to_string())
                })
            })
            .transpose()
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Keeps the Prometheus handle for the `/metrics` endpoint.
#[derive(Clone)]
pub struct TelemetryGuard {
    metrics: Arc<PrometheusHandle>,
}

impl TelemetryGuard {
    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }
}

/// Installs the tracing subscriber and the Prometheus recorder. Safe to call
/// more than once; later calls reuse what the first one installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    install_tracing(config)?;
    let metrics = METRICS_HANDLE
        .get_or_try_init(|| install_metrics(config))?
        .clone();
    Ok(TelemetryGuard { metrics })
}

fn install_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return Ok(());
    }
    let env_filter = EnvFilter::try_new(config.log_filter())
        .map_err(|err| TelemetryError::InvalidLogFilter(err.to_string()))?;

    if SUBSCRIBER_INSTALLED.set(()).is_ok() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .map_err(|err| TelemetryError::Tracing(err.to_string()))?;
    }
    Ok(())
}

fn install_metrics(config: &TelemetryConfig) -> Result<Arc<PrometheusHandle>, TelemetryError> {
    let mut builder = PrometheusBuilder::new()
        .idle_timeout(MetricKindMask::GAUGE, Some(GAUGE_IDLE_TIMEOUT));
    let listener = config.metrics_listener()?;
    if let Some(address) = listener {
        builder = builder.with_http_listener(address);
    }
    let handle = builder
        .install_recorder()
        .map_err(|err| TelemetryError::Metrics(err.to_string()))?;

    describe_metrics();
    info!(
        service = config.service(),
        listener = ?listener,
        "metrics recorder installed"
    );
    Ok(Arc::new(handle))
}

fn describe_metrics() {
    for &(name, help) in COUNTERS {
        describe_counter!(name, help);
    }
    for &(name, help) in GAUGES {
        describe_gauge!(name, help);
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("invalid metrics address `{0}`: {1}")]
    InvalidMetricsAddress(String, String),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
