//! Address-monitor engine: per-session polling tasks that walk new blocks,
//! classify transactions against a watch set and fan matches out to the
//! audit sink and the notifier. The API embeds [`SessionRegistry`]; the
//! binary in `main.rs` runs a single session from environment settings.

pub mod classifier;
pub mod client;
pub mod notify;
pub mod pipeline;
pub mod registry;
pub mod rpc;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use notify::{LogNotifier, Notifier, NotifyError, TelegramNotifier};
pub use registry::{
    build_registry, SessionError, SessionInfo, SessionRegistry, SessionRequest, StartedSession,
    StopReport,
};
pub use rpc::{ChainBlock, ChainProvider, ChainTransaction, JsonRpcChainProvider, ProviderSet};
pub use worker::{MonitorError, SessionProgress};
