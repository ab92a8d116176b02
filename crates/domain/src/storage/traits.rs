use async_trait::async_trait;
use thiserror::Error;

use crate::model::{AuditRecord, SessionId};

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("malformed audit record: {0}")]
    Encoding(String),
    #[error("audit log for session {0} is closed")]
    Closed(SessionId),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }

    pub fn from_io(err: impl std::fmt::Display) -> Self {
        Self::Io(err.to_string())
    }
}

/// Append-only audit trail of matched transactions, one stream per session.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append_record(&self, session: &SessionId, record: &AuditRecord)
        -> StorageResult<()>;

    /// Releases whatever the sink holds for `session`. Later appends for the
    /// same session fail with [`StorageError::Closed`].
    async fn close_session(&self, session: &SessionId) -> StorageResult<()>;

    /// Reads back a session's records in append order.
    async fn records_for_session(&self, session: &SessionId) -> StorageResult<Vec<AuditRecord>>;
}
