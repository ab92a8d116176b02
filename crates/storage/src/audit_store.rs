use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use watchtower_domain::model::{AuditRecord, SessionId, TxDirection};
use watchtower_domain::storage::{AuditSink, StorageError, StorageResult};
use watchtower_domain::Address;

use crate::entity::audit_records;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl AuditSink for SeaOrmStorage {
    async fn append_record(
        &self,
        session: &SessionId,
        record: &AuditRecord,
    ) -> StorageResult<()> {
        let block_number = i64::try_from(record.block_number)
            .map_err(|_| StorageError::Encoding("block number overflows i64".into()))?;
        let model = audit_records::ActiveModel {
            session_id: Set(session.as_str().to_string()),
            tx_hash: Set(record.hash.clone()),
            from_address: Set(record.from.to_canonical()),
            to_address: Set(record.to.map(|to| to.to_canonical())),
            value: Set(record.value.clone()),
            block_number: Set(block_number),
            direction: Set(record.direction.as_ref().to_string()),
            observed_at: Set(record.timestamp),
            ..Default::default()
        };
        audit_records::Entity::insert(model)
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }

    async fn close_session(&self, _session: &SessionId) -> StorageResult<()> {
        // Rows are committed per insert; the shared pool outlives sessions.
        Ok(())
    }

    async fn records_for_session(&self, session: &SessionId) -> StorageResult<Vec<AuditRecord>> {
        audit_records::Entity::find()
            .filter(audit_records::Column::SessionId.eq(session.as_str()))
            .order_by_asc(audit_records::Column::Id)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?
            .into_iter()
            .map(model_to_record)
            .collect()
    }
}

fn model_to_record(model: audit_records::Model) -> StorageResult<AuditRecord> {
    let decode = |err: &dyn std::fmt::Display| StorageError::Encoding(err.to_string());

    let from = Address::parse(&model.from_address).map_err(|err| decode(&err))?;
    let to = model
        .to_address
        .as_deref()
        .map(Address::parse)
        .transpose()
        .map_err(|err| decode(&err))?;
    let direction = match model.direction.as_str() {
        "incoming" => TxDirection::Incoming,
        "outgoing" => TxDirection::Outgoing,
        "internal_tx" => TxDirection::InternalTx,
        other => return Err(decode(&format!("unknown direction `{other}`"))),
    };
    let block_number = u64::try_from(model.block_number).map_err(|err| decode(&err))?;

    Ok(AuditRecord {
        timestamp: model.observed_at,
        hash: model.tx_hash,
        from,
        to,
        value: model.value,
        block_number,
        direction,
    })
}
