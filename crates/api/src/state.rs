use std::{sync::Arc, time::Duration};

use watchtower_domain::services::telemetry::TelemetryGuard;
use watchtower_monitor::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    registry: Arc<SessionRegistry>,
    telemetry: TelemetryGuard,
    default_poll_interval: Duration,
}

impl AppState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        telemetry: TelemetryGuard,
        default_poll_interval: Duration,
    ) -> Self {
        Self {
            registry,
            telemetry,
            default_poll_interval,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        self.registry.as_ref()
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }

    /// Cadence for sessions whose request does not name one.
    pub fn default_poll_interval(&self) -> Duration {
        self.default_poll_interval
    }
}
