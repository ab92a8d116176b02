//! Domain-level building blocks shared across the API and monitor crates:
//! validated addresses and amounts, session identifiers, matched-transaction
//! records, the dedup window, storage traits, configuration and telemetry.

pub mod address;
pub mod config;
pub mod model;
pub mod services;
pub mod storage;

pub use address::{Address, AddressFormatError};
pub use model::*;
pub use services::*;
pub use storage::*;

#[cfg(test)]
pub(crate) static TEST_ENV_GUARD: std::sync::Mutex<()> = std::sync::Mutex::new(());
