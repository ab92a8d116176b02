use sea_orm::sea_query::{ColumnDef, Index, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::audit_records;
use watchtower_domain::storage::{StorageError, StorageResult};

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let audit_table = Table::create()
        .if_not_exists()
        .table(audit_records::Entity)
        .col(
            ColumnDef::new(audit_records::Column::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(audit_records::Column::SessionId)
                .string_len(32)
                .not_null(),
        )
        .col(
            ColumnDef::new(audit_records::Column::TxHash)
                .string_len(66)
                .not_null(),
        )
        .col(
            ColumnDef::new(audit_records::Column::FromAddress)
                .string_len(42)
                .not_null(),
        )
        .col(
            ColumnDef::new(audit_records::Column::ToAddress)
                .string_len(42)
                .null(),
        )
        .col(
            ColumnDef::new(audit_records::Column::Value)
                .string_len(64)
                .not_null(),
        )
        .col(
            ColumnDef::new(audit_records::Column::BlockNumber)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(audit_records::Column::Direction)
                .string_len(16)
                .not_null(),
        )
        .col(
            ColumnDef::new(audit_records::Column::ObservedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, audit_table).await?;

    let session_index = Index::create()
        .if_not_exists()
        .name("idx_audit_records_session")
        .table(audit_records::Entity)
        .col(audit_records::Column::SessionId)
        .to_owned();
    db.execute(backend.build(&session_index))
        .await
        .map_err(StorageError::from_source)?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
