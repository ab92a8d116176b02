use sea_orm::Database;
use watchtower_domain::storage::{StorageError, StorageResult};

use crate::{migration::run_migrations, SeaOrmStorage};

#[derive(Default)]
pub struct StorageBuilder {
    database_url: Option<String>,
}

impl StorageBuilder {
    pub fn new() -> Self {
        Self { database_url: None }
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub async fn build(self) -> StorageResult<SeaOrmStorage> {
        let url = self
            .database_url
            .ok_or_else(|| StorageError::Database("missing database url".into()))?;
        let db = Database::connect(url)
            .await
            .map_err(StorageError::from_source)?;
        run_migrations(&db).await?;
        Ok(SeaOrmStorage::from_connection(db))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_requires_a_url() {
        let err = StorageBuilder::new().build().await.err().expect("missing url");
        assert!(matches!(err, StorageError::Database(_)));
    }

    #[tokio::test]
    async fn build_runs_migrations() {
        let storage = StorageBuilder::new()
            .database_url("sqlite::memory:")
            .build()
            .await
            .expect("storage inits");
        // Re-running is harmless because every statement is IF NOT EXISTS.
        run_migrations(storage.connection()).await.unwrap();
    }
}
