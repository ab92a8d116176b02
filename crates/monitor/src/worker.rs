use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::watch,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use watchtower_domain::{
    config::ConfigError,
    model::{MAX_POLLING_INTERVAL, MIN_POLLING_INTERVAL},
    services::telemetry::TelemetryError,
    services::DedupWindow,
    storage::StorageError,
};

use crate::{
    notify::{session_started_message, NotifyError},
    pipeline::{process_block, Fanout, SessionContext},
    rpc::ChainProvider,
};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("malformed rpc payload: {0}")]
    Decode(String),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("notifier setup failed: {0}")]
    Notify(#[from] NotifyError),
}

impl From<reqwest::Error> for MonitorError {
    fn from(value: reqwest::Error) -> Self {
        Self::Rpc(value.to_string())
    }
}

/// State owned by exactly one session task.
#[derive(Debug)]
pub struct SessionState {
    pub last_processed_height: u64,
    pub dedup: DedupWindow,
    pub ticks: u64,
    pub matches: u64,
}

impl SessionState {
    pub fn new(start_height: u64, dedup_capacity: usize) -> Self {
        Self {
            last_processed_height: start_height,
            dedup: DedupWindow::new(dedup_capacity),
            ticks: 0,
            matches: 0,
        }
    }
}

/// Read-only view of a running session, published after every tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub last_processed_height: u64,
    pub ticks: u64,
    pub matches: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SessionProgress {
    pub fn starting_at(height: u64) -> Self {
        Self {
            last_processed_height: height,
            ticks: 0,
            matches: 0,
            last_tick_at: None,
            last_error: None,
        }
    }
}

/// What the task hands back once it stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub ticks: u64,
    pub matches: u64,
    pub last_processed_height: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Chain head has not moved past the checkpoint.
    Idle,
    Advanced { from: u64, to: u64, matches: u64 },
    /// Cancellation arrived mid-range; the checkpoint stays where it was.
    Cancelled,
}

/// Number of running sessions behind the `monitor_active_sessions` gauge.
///
/// Session tasks re-publish it every tick: the Prometheus recorder drops
/// gauges that go unset for longer than its idle timeout.
#[derive(Debug, Clone, Default)]
pub struct LiveSessions(Arc<AtomicUsize>);

impl LiveSessions {
    pub fn set(&self, count: usize) {
        self.0.store(count, Ordering::SeqCst);
        self.publish();
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn publish(&self) {
        gauge!("monitor_active_sessions").set(self.count() as f64);
    }
}

fn publish_height(ctx: &SessionContext, height: u64) {
    gauge!(
        "monitor_last_height",
        "session" => ctx.id.to_string(),
        "network" => ctx.network.as_ref().to_string()
    )
    .set(height as f64);
}

/// One polling tick: walk `(last_processed_height, head]` in order.
///
/// The checkpoint moves after each height completes, so an error returns
/// with every earlier height kept and the failing one retried next tick.
/// Unavailable blocks are skipped for good.
pub async fn poll_once(
    ctx: &SessionContext,
    state: &mut SessionState,
    provider: &dyn ChainProvider,
    fanout: &Fanout,
    cancel: &CancellationToken,
) -> Result<TickOutcome, MonitorError> {
    let head = provider.current_height().await?;
    let from = state.last_processed_height;
    if head <= from {
        return Ok(TickOutcome::Idle);
    }

    let mut matches = 0;
    for height in (from + 1)..=head {
        if cancel.is_cancelled() {
            return Ok(TickOutcome::Cancelled);
        }
        match provider.block_with_transactions(height).await? {
            Some(block) => {
                let found = process_block(ctx, &mut state.dedup, fanout, &block, cancel).await;
                if cancel.is_cancelled() {
                    state.matches += found;
                    return Ok(TickOutcome::Cancelled);
                }
                counter!("monitor_blocks_total", "result" => "ok").increment(1);
                matches += found;
                state.matches += found;
            }
            None => {
                counter!("monitor_blocks_total", "result" => "unavailable").increment(1);
                warn!(session = %ctx.id, height, "block unavailable, skipping height");
            }
        }
        state.last_processed_height = height;
        publish_height(ctx, height);
    }

    Ok(TickOutcome::Advanced {
        from,
        to: head,
        matches,
    })
}

/// Everything a session task needs. Consumed by [`run_session`].
pub struct SessionTask {
    pub ctx: Arc<SessionContext>,
    pub provider: Arc<dyn ChainProvider>,
    pub fanout: Fanout,
    pub state: SessionState,
    pub progress: watch::Sender<SessionProgress>,
    pub cancel: CancellationToken,
    pub live: LiveSessions,
}

/// Polls on the session cadence until cancelled. Ticks run one after another
/// and missed ticks are dropped, so two cycles never overlap.
pub async fn run_session(task: SessionTask) -> SessionReport {
    let SessionTask {
        ctx,
        provider,
        fanout,
        mut state,
        progress,
        cancel,
        live,
    } = task;

    if !cancel.is_cancelled() {
        let (title, body) = session_started_message(
            ctx.network,
            ctx.watch.len(),
            state.last_processed_height,
        );
        fanout.notify(&ctx, &title, &body).await;
    }

    let period = ctx
        .options
        .polling_interval
        .clamp(MIN_POLLING_INTERVAL, MAX_POLLING_INTERVAL);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        state.ticks += 1;
        let outcome = poll_once(&ctx, &mut state, provider.as_ref(), &fanout, &cancel).await;
        let last_error = match outcome {
            Ok(TickOutcome::Idle) => {
                counter!("monitor_ticks_total", "result" => "idle").increment(1);
                None
            }
            Ok(TickOutcome::Advanced { from, to, matches }) => {
                counter!("monitor_ticks_total", "result" => "advanced").increment(1);
                debug!(session = %ctx.id, from, to, matches, "tick advanced");
                None
            }
            Ok(TickOutcome::Cancelled) => {
                counter!("monitor_ticks_total", "result" => "cancelled").increment(1);
                None
            }
            Err(err) => {
                counter!("monitor_ticks_total", "result" => "error").increment(1);
                warn!(
                    session = %ctx.id,
                    height = state.last_processed_height,
                    %err,
                    "tick failed, retrying next interval"
                );
                Some(err.to_string())
            }
        };

        live.publish();
        publish_height(&ctx, state.last_processed_height);
        progress.send_replace(SessionProgress {
            last_processed_height: state.last_processed_height,
            ticks: state.ticks,
            matches: state.matches,
            last_tick_at: Some(Utc::now()),
            last_error,
        });
    }

    info!(
        session = %ctx.id,
        ticks = state.ticks,
        matches = state.matches,
        height = state.last_processed_height,
        "session task finished"
    );
    SessionReport {
        ticks: state.ticks,
        matches: state.matches,
        last_processed_height: state.last_processed_height,
    }
}
