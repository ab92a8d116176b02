use std::{collections::HashSet, sync::Arc};

use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use watchtower_domain::{
    model::{AuditRecord, Network, SessionId, SessionOptions, TransactionRecord},
    services::DedupWindow,
    storage::AuditSink,
    Address,
};

use crate::{
    classifier::classify,
    notify::{transaction_message, Notifier},
    rpc::ChainBlock,
};

/// Immutable per-session facts, fixed at start.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub id: SessionId,
    pub network: Network,
    pub notify_target: String,
    pub watch: HashSet<Address>,
    pub options: SessionOptions,
}

/// Delivers a match to the audit sink and the notifier. Neither failure is
/// propagated.
#[derive(Clone)]
pub struct Fanout {
    notifier: Arc<dyn Notifier>,
    audit: Arc<dyn AuditSink>,
}

impl Fanout {
    pub fn new(notifier: Arc<dyn Notifier>, audit: Arc<dyn AuditSink>) -> Self {
        Self { notifier, audit }
    }

    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    pub async fn deliver(&self, ctx: &SessionContext, record: &TransactionRecord) {
        if ctx.options.save_transactions {
            match self
                .audit
                .append_record(&ctx.id, &AuditRecord::from(record))
                .await
            {
                Ok(()) => counter!("monitor_audit_writes_total", "result" => "ok").increment(1),
                Err(err) => {
                    counter!("monitor_audit_writes_total", "result" => "error").increment(1);
                    warn!(session = %ctx.id, hash = %record.hash, %err, "audit append failed");
                }
            }
        }

        let (title, body) = transaction_message(ctx.network, record);
        self.notify(ctx, &title, &body).await;
    }

    pub async fn notify(&self, ctx: &SessionContext, title: &str, body: &str) {
        match self.notifier.send(&ctx.notify_target, title, body).await {
            Ok(()) => counter!("monitor_notifications_total", "result" => "ok").increment(1),
            Err(err) => {
                counter!("monitor_notifications_total", "result" => "error").increment(1);
                warn!(session = %ctx.id, %err, "notification failed");
            }
        }
    }
}

/// Runs every transaction of `block` through classification, dedup and
/// fanout in order. Stops emitting as soon as `cancel` fires; the caller
/// must then leave the block unprocessed.
pub async fn process_block(
    ctx: &SessionContext,
    dedup: &mut DedupWindow,
    fanout: &Fanout,
    block: &ChainBlock,
    cancel: &CancellationToken,
) -> u64 {
    let mut matches = 0;
    for tx in &block.transactions {
        let Some(direction) = classify(tx, &ctx.watch, &ctx.options) else {
            continue;
        };
        if !dedup.check_and_mark(&tx.hash) {
            debug!(session = %ctx.id, hash = %tx.hash, "duplicate transaction skipped");
            counter!("monitor_duplicates_total").increment(1);
            continue;
        }
        if cancel.is_cancelled() {
            break;
        }

        let record = TransactionRecord {
            hash: tx.hash.clone(),
            from: tx.from,
            to: tx.to,
            value: tx.value,
            block_number: block.number,
            direction,
            timestamp: block.timestamp,
        };
        counter!("monitor_matches_total", "direction" => direction.as_ref().to_string())
            .increment(1);
        fanout.deliver(ctx, &record).await;
        matches += 1;
    }
    matches
}
