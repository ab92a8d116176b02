//! Hand-rolled collaborators shared by the monitor unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use chrono::DateTime;
use tokio::sync::Notify;
use watchtower_domain::{
    model::{AuditRecord, Network, SessionId, SessionOptions, Wei},
    storage::{AuditSink, StorageError, StorageResult},
    Address,
};

use crate::{
    notify::{Notifier, NotifyError},
    pipeline::SessionContext,
    rpc::{ChainBlock, ChainProvider, ChainTransaction},
    worker::MonitorError,
};

pub const WATCHED: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
pub const STRANGER: &str = "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359";

pub fn addr(raw: &str) -> Address {
    Address::parse(raw).unwrap()
}

pub fn tx(hash: &str, from: &str, to: Option<&str>, value: &str) -> ChainTransaction {
    ChainTransaction {
        hash: hash.to_string(),
        from: addr(from),
        to: to.map(addr),
        value: Wei::parse_native(value).unwrap(),
    }
}

pub fn block(number: u64, transactions: Vec<ChainTransaction>) -> ChainBlock {
    ChainBlock {
        number,
        timestamp: DateTime::from_timestamp(1_700_000_000 + number as i64, 0).unwrap(),
        transactions,
    }
}

pub fn ctx(options: SessionOptions) -> SessionContext {
    SessionContext {
        id: SessionId::generate().unwrap(),
        network: Network::Sepolia,
        notify_target: "chat-1".into(),
        watch: HashSet::from([addr(WATCHED)]),
        options,
    }
}

#[derive(Default)]
pub struct MockProvider {
    head: AtomicU64,
    head_fails: AtomicBool,
    blocks: Mutex<HashMap<u64, ChainBlock>>,
    failing: Mutex<HashSet<u64>>,
    gates: Mutex<HashMap<u64, Arc<Notify>>>,
    fetched: Mutex<Vec<u64>>,
}

impl MockProvider {
    pub fn at(head: u64) -> Self {
        let provider = Self::default();
        provider.set_head(head);
        provider
    }

    pub fn set_head(&self, head: u64) {
        self.head.store(head, Ordering::SeqCst);
    }

    pub fn fail_head(&self, fail: bool) {
        self.head_fails.store(fail, Ordering::SeqCst);
    }

    pub fn put_block(&self, block: ChainBlock) {
        self.blocks.lock().unwrap().insert(block.number, block);
    }

    pub fn fail_block(&self, height: u64, fail: bool) {
        let mut failing = self.failing.lock().unwrap();
        if fail {
            failing.insert(height);
        } else {
            failing.remove(&height);
        }
    }

    /// Makes the fetch of `height` wait until the returned gate is opened
    /// with `notify_one`.
    pub fn hold(&self, height: u64) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(height, gate.clone());
        gate
    }

    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainProvider for MockProvider {
    async fn current_height(&self) -> Result<u64, MonitorError> {
        if self.head_fails.load(Ordering::SeqCst) {
            return Err(MonitorError::Rpc("connection refused".into()));
        }
        Ok(self.head.load(Ordering::SeqCst))
    }

    async fn block_with_transactions(
        &self,
        height: u64,
    ) -> Result<Option<ChainBlock>, MonitorError> {
        self.fetched.lock().unwrap().push(height);
        let gate = self.gates.lock().unwrap().get(&height).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self.failing.lock().unwrap().contains(&height) {
            return Err(MonitorError::Rpc(format!("timeout fetching {height}")));
        }
        Ok(self.blocks.lock().unwrap().get(&height).cloned())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    fail: bool,
    attempts: AtomicUsize,
    messages: Mutex<Vec<(String, String, String)>>,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// `(recipient, title, body)` in send order.
    pub fn messages(&self) -> Vec<(String, String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(NotifyError::Rejected(502));
        }
        self.messages
            .lock()
            .unwrap()
            .push((recipient.to_string(), title.to_string(), body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAudit {
    records: Mutex<HashMap<SessionId, Vec<AuditRecord>>>,
    closed: Mutex<HashSet<SessionId>>,
}

impl MemoryAudit {
    pub fn records(&self, session: &SessionId) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap()
            .get(session)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_closed(&self, session: &SessionId) -> bool {
        self.closed.lock().unwrap().contains(session)
    }
}

#[async_trait]
impl AuditSink for MemoryAudit {
    async fn append_record(
        &self,
        session: &SessionId,
        record: &AuditRecord,
    ) -> StorageResult<()> {
        if self.is_closed(session) {
            return Err(StorageError::Closed(session.clone()));
        }
        self.records
            .lock()
            .unwrap()
            .entry(session.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn close_session(&self, session: &SessionId) -> StorageResult<()> {
        self.closed.lock().unwrap().insert(session.clone());
        Ok(())
    }

    async fn records_for_session(&self, session: &SessionId) -> StorageResult<Vec<AuditRecord>> {
        Ok(self.records(session))
    }
}
