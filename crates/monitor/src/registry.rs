//! Process-scoped owner of every monitoring session.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{timeout, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use watchtower_domain::{
    config::MonitorConfig,
    model::{
        AuditRecord, EntropyError, Network, SessionId, SessionOptions, SessionStatus,
        MAX_POLLING_INTERVAL, MIN_POLLING_INTERVAL,
    },
    services::DedupWindow,
    storage::{AuditSink, StorageError},
    Address,
};

use crate::{
    notify::{session_stopped_message, LogNotifier, Notifier, TelegramNotifier},
    pipeline::{Fanout, SessionContext},
    rpc::ProviderSet,
    worker::{
        run_session, LiveSessions, MonitorError, SessionProgress, SessionReport, SessionState,
        SessionTask,
    },
};

const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("none of the supplied addresses are valid")]
    NoValidAddresses,
    #[error("provider for {network} unavailable: {reason}")]
    ProviderUnavailable { network: Network, reason: String },
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error(transparent)]
    Entropy(#[from] EntropyError),
    #[error("audit storage error: {0}")]
    Audit(#[from] StorageError),
}

/// Parameters of a start request, before validation.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub addresses: Vec<String>,
    pub notify_target: String,
    /// Falls back to the registry's default network.
    pub network: Option<Network>,
    pub options: SessionOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedSession {
    pub session_id: SessionId,
    pub network: Network,
    pub addresses: Vec<Address>,
    pub start_height: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub network: Network,
    pub addresses: Vec<Address>,
    pub notify_target: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub start_height: u64,
    pub min_value: String,
    pub include_outgoing: bool,
    pub save_transactions: bool,
    pub polling_interval_secs: u64,
    pub progress: SessionProgress,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub session_id: SessionId,
    pub duration: Duration,
    pub ticks: u64,
    pub matches: u64,
    pub last_processed_height: u64,
}

struct SessionHandle {
    ctx: Arc<SessionContext>,
    started_at: DateTime<Utc>,
    started: Instant,
    start_height: u64,
    cancel: CancellationToken,
    progress: watch::Receiver<SessionProgress>,
    join: JoinHandle<SessionReport>,
}

impl SessionHandle {
    fn info(&self) -> SessionInfo {
        let ctx = &self.ctx;
        SessionInfo {
            session_id: ctx.id.clone(),
            network: ctx.network,
            addresses: ordered(&ctx.watch),
            notify_target: ctx.notify_target.clone(),
            status: SessionStatus::Active,
            started_at: self.started_at,
            start_height: self.start_height,
            min_value: ctx.options.min_value.to_native_string(),
            include_outgoing: ctx.options.include_outgoing,
            save_transactions: ctx.options.save_transactions,
            polling_interval_secs: ctx.options.polling_interval.as_secs(),
            progress: self.progress.borrow().clone(),
        }
    }
}

fn ordered(watch: &HashSet<Address>) -> Vec<Address> {
    watch.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Starts, tracks and stops independent polling sessions. Each session owns
/// its task; the registry only holds the handles.
pub struct SessionRegistry {
    providers: ProviderSet,
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
    default_network: Network,
    dedup_capacity: usize,
    stop_grace: Duration,
    live: LiveSessions,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    pub fn new(
        providers: ProviderSet,
        notifier: Arc<dyn Notifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            providers,
            notifier,
            audit,
            default_network: Network::Mainnet,
            dedup_capacity: DedupWindow::DEFAULT_CAPACITY,
            stop_grace: DEFAULT_STOP_GRACE,
            live: LiveSessions::default(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_network(mut self, network: Network) -> Self {
        self.default_network = network;
        self
    }

    pub fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = capacity;
        self
    }

    /// How long `stop` waits for an in-flight tick before aborting it.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn default_network(&self) -> Network {
        self.default_network
    }

    /// Validates the request, pins the start height and spawns the polling
    /// task. Returns without waiting for any tick.
    pub async fn start(&self, request: SessionRequest) -> Result<StartedSession, SessionError> {
        if request.addresses.is_empty() {
            return Err(SessionError::InvalidInput("address list is empty".into()));
        }
        let notify_target = request.notify_target.trim().to_string();
        if notify_target.is_empty() {
            return Err(SessionError::InvalidInput("notify target is empty".into()));
        }
        if !request.options.polling_interval_in_range() {
            return Err(SessionError::InvalidInput(format!(
                "polling interval must be between {}s and {}s",
                MIN_POLLING_INTERVAL.as_secs(),
                MAX_POLLING_INTERVAL.as_secs()
            )));
        }

        let mut watch_set = HashSet::new();
        for raw in &request.addresses {
            match Address::parse(raw) {
                Ok(address) => {
                    watch_set.insert(address);
                }
                Err(err) => warn!(address = %raw, %err, "dropping invalid address"),
            }
        }
        if watch_set.is_empty() {
            return Err(SessionError::NoValidAddresses);
        }

        let network = request.network.unwrap_or(self.default_network);
        let provider = self
            .providers
            .get(network)
            .ok_or_else(|| SessionError::ProviderUnavailable {
                network,
                reason: "no endpoint configured".into(),
            })?;
        let start_height =
            provider
                .current_height()
                .await
                .map_err(|err| SessionError::ProviderUnavailable {
                    network,
                    reason: err.to_string(),
                })?;

        let id = SessionId::generate()?;
        let ctx = Arc::new(SessionContext {
            id: id.clone(),
            network,
            notify_target,
            watch: watch_set,
            options: request.options,
        });
        let (progress_tx, progress_rx) = watch::channel(SessionProgress::starting_at(start_height));
        let cancel = CancellationToken::new();
        let join = tokio::spawn(run_session(SessionTask {
            ctx: ctx.clone(),
            provider,
            fanout: Fanout::new(self.notifier.clone(), self.audit.clone()),
            state: SessionState::new(start_height, self.dedup_capacity),
            progress: progress_tx,
            cancel: cancel.clone(),
            live: self.live.clone(),
        }));

        let started = StartedSession {
            session_id: id.clone(),
            network,
            addresses: ordered(&ctx.watch),
            start_height,
        };
        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            id.clone(),
            SessionHandle {
                ctx,
                started_at: Utc::now(),
                started: Instant::now(),
                start_height,
                cancel,
                progress: progress_rx,
                join,
            },
        );
        self.live.set(sessions.len());
        drop(sessions);

        info!(
            session = %id,
            %network,
            watching = %started
                .addresses
                .iter()
                .map(Address::short)
                .collect::<Vec<_>>()
                .join(", "),
            start_height,
            "session started"
        );
        Ok(started)
    }

    /// Cancels the session, waits for its in-flight tick, closes its audit
    /// stream and sends the summary notification.
    pub async fn stop(&self, id: &SessionId) -> Result<StopReport, SessionError> {
        let handle = {
            let mut sessions = self.sessions.lock().await;
            let handle = sessions
                .remove(id)
                .ok_or_else(|| SessionError::SessionNotFound(id.clone()))?;
            self.live.set(sessions.len());
            handle
        };

        let SessionHandle {
            ctx,
            started,
            cancel,
            progress,
            mut join,
            ..
        } = handle;
        cancel.cancel();

        let report = match timeout(self.stop_grace, &mut join).await {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => {
                warn!(session = %id, %err, "session task ended abnormally");
                report_from(&progress)
            }
            Err(_) => {
                warn!(session = %id, "session task did not finish in time, aborting");
                join.abort();
                report_from(&progress)
            }
        };

        if let Err(err) = self.audit.close_session(id).await {
            warn!(session = %id, %err, "failed to close audit stream");
        }

        let duration = started.elapsed();
        let (title, body) = session_stopped_message(ctx.network, duration, report.matches);
        Fanout::new(self.notifier.clone(), self.audit.clone())
            .notify(&ctx, &title, &body)
            .await;

        info!(
            session = %id,
            duration_secs = duration.as_secs(),
            matches = report.matches,
            "session stopped"
        );
        Ok(StopReport {
            session_id: id.clone(),
            duration,
            ticks: report.ticks,
            matches: report.matches,
            last_processed_height: report.last_processed_height,
        })
    }

    pub async fn get(&self, id: &SessionId) -> Result<SessionInfo, SessionError> {
        self.sessions
            .lock()
            .await
            .get(id)
            .map(SessionHandle::info)
            .ok_or_else(|| SessionError::SessionNotFound(id.clone()))
    }

    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<_> = self
            .sessions
            .lock()
            .await
            .values()
            .map(SessionHandle::info)
            .collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        sessions
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Audit records written for a session, live or stopped.
    pub async fn records(&self, id: &SessionId) -> Result<Vec<AuditRecord>, SessionError> {
        Ok(self.audit.records_for_session(id).await?)
    }

    /// Stops every session; used on process shutdown.
    pub async fn shutdown(&self) -> Vec<StopReport> {
        let ids: Vec<SessionId> = self.sessions.lock().await.keys().cloned().collect();
        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            match self.stop(&id).await {
                Ok(report) => reports.push(report),
                Err(err) => warn!(session = %id, %err, "stop during shutdown failed"),
            }
        }
        reports
    }
}

fn report_from(progress: &watch::Receiver<SessionProgress>) -> SessionReport {
    let snapshot = progress.borrow();
    SessionReport {
        ticks: snapshot.ticks,
        matches: snapshot.matches,
        last_processed_height: snapshot.last_processed_height,
    }
}

/// Wires the registry from environment configuration: JSON-RPC providers,
/// Telegram (or log-only) notifications and the configured audit sink.
pub async fn build_registry(config: &MonitorConfig) -> Result<SessionRegistry, MonitorError> {
    let providers = ProviderSet::from_config(config)?;
    let notifier: Arc<dyn Notifier> = match config.telegram_bot_token() {
        Some(token) => Arc::new(TelegramNotifier::new(token, config.rpc_timeout())?),
        None => {
            info!("TELEGRAM_BOT_TOKEN not set, notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };
    let audit = watchtower_storage::open_audit_sink(
        config.audit_database_url(),
        config.audit_log_dir(),
    )
    .await?;

    Ok(SessionRegistry::new(providers, notifier, audit)
        .with_default_network(config.default_network())
        .with_dedup_capacity(config.dedup_capacity()))
}
