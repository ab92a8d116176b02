use std::{
    collections::{HashMap, VecDeque},
    path::{Path, PathBuf},
};

use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
    sync::Mutex,
};
use watchtower_domain::model::{AuditRecord, SessionId};
use watchtower_domain::storage::{AuditSink, StorageError, StorageResult};

/// One append-only `session_<id>.jsonl` file per session under a log
/// directory. Each matched transaction becomes a single JSON line.
pub struct JsonlAuditLog {
    dir: PathBuf,
    closed_capacity: usize,
    state: Mutex<LogState>,
}

/// Stopped sessions are remembered only so that a write racing the close is
/// refused; once the owning task is gone no further writes arrive, so the
/// oldest entries can be forgotten.
pub const DEFAULT_CLOSED_CAPACITY: usize = 1024;

#[derive(Default)]
struct LogState {
    open: HashMap<SessionId, File>,
    closed: VecDeque<SessionId>,
}

impl JsonlAuditLog {
    /// Creates the log directory if needed.
    pub async fn create(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(StorageError::from_io)?;
        Ok(Self {
            dir,
            closed_capacity: DEFAULT_CLOSED_CAPACITY,
            state: Mutex::new(LogState::default()),
        })
    }

    pub fn with_closed_capacity(mut self, capacity: usize) -> Self {
        self.closed_capacity = capacity.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, session: &SessionId) -> PathBuf {
        self.dir.join(format!("session_{}.jsonl", session.as_str()))
    }
}

#[async_trait::async_trait]
impl AuditSink for JsonlAuditLog {
    async fn append_record(
        &self,
        session: &SessionId,
        record: &AuditRecord,
    ) -> StorageResult<()> {
        let mut line = serde_json::to_vec(record)
            .map_err(|err| StorageError::Encoding(err.to_string()))?;
        line.push(b'\n');

        let mut state = self.state.lock().await;
        if state.closed.contains(session) {
            return Err(StorageError::Closed(session.clone()));
        }
        if !state.open.contains_key(session) {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path_for(session))
                .await
                .map_err(StorageError::from_io)?;
            state.open.insert(session.clone(), file);
        }
        let Some(file) = state.open.get_mut(session) else {
            return Err(StorageError::Io("audit file handle vanished".into()));
        };
        file.write_all(&line).await.map_err(StorageError::from_io)?;
        file.flush().await.map_err(StorageError::from_io)?;
        Ok(())
    }

    async fn close_session(&self, session: &SessionId) -> StorageResult<()> {
        let mut state = self.state.lock().await;
        if !state.closed.contains(session) {
            if state.closed.len() >= self.closed_capacity {
                state.closed.pop_front();
            }
            state.closed.push_back(session.clone());
        }
        if let Some(mut file) = state.open.remove(session) {
            file.sync_all().await.map_err(StorageError::from_io)?;
        }
        Ok(())
    }

    async fn records_for_session(&self, session: &SessionId) -> StorageResult<Vec<AuditRecord>> {
        let contents = match fs::read_to_string(self.path_for(session)).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::from_io(err)),
        };
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|err| StorageError::Encoding(err.to_string()))
            })
            .collect()
    }
}
