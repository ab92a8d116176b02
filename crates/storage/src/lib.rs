//! Audit sinks that satisfy the domain [`AuditSink`] trait: an append-only
//! JSON Lines file per session, and a SeaORM table for deployments that want
//! the trail in a database (SQLite by default, PostgreSQL via feature flag).

mod audit_store;
mod builder;
mod entity;
mod jsonl;
mod migration;

use std::sync::Arc;

use builder::StorageBuilder;
use migration::run_migrations;
use sea_orm::{Database, DatabaseConnection};
use watchtower_domain::storage::{AuditSink, StorageError, StorageResult};

pub use jsonl::JsonlAuditLog;

/// Shared database handle used by the HTTP API and the standalone monitor.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStorage {
    /// Connects to the provided database URL and ensures the schema is present.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let db = Database::connect(database_url)
            .await
            .map_err(StorageError::from_source)?;
        run_migrations(&db).await?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub(crate) fn from_connection(db: DatabaseConnection) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}

/// Picks the audit backend: the database when a URL is configured, otherwise
/// JSON Lines files under `log_dir`.
pub async fn open_audit_sink(
    database_url: Option<&str>,
    log_dir: &std::path::Path,
) -> StorageResult<Arc<dyn AuditSink>> {
    match database_url {
        Some(url) => {
            tracing::info!("writing audit records to database");
            Ok(Arc::new(SeaOrmStorage::connect(url).await?))
        }
        None => {
            tracing::info!(dir = %log_dir.display(), "writing audit records to jsonl files");
            Ok(Arc::new(JsonlAuditLog::create(log_dir).await?))
        }
    }
}
