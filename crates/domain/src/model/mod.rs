//! Data structures shared by the monitor engine, the storage adapters and the
//! HTTP surface.

mod amount;

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

use crate::address::Address;

pub use amount::{AmountError, Wei, NATIVE_DECIMALS};

/// Chains a session can poll. Each one maps to its own provider endpoint.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Network {
    Mainnet,
    Sepolia,
    Holesky,
    Base,
    Arbitrum,
    Optimism,
    Polygon,
}

impl Network {
    pub fn explorer_base(&self) -> &'static str {
        match self {
            Network::Mainnet => "https://etherscan.io",
            Network::Sepolia => "https://sepolia.etherscan.io",
            Network::Holesky => "https://holesky.etherscan.io",
            Network::Base => "https://basescan.org",
            Network::Arbitrum => "https://arbiscan.io",
            Network::Optimism => "https://optimistic.etherscan.io",
            Network::Polygon => "https://polygonscan.com",
        }
    }

    pub fn explorer_tx_url(&self, hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_base(), hash)
    }

    pub fn explorer_address_url(&self, address: &Address) -> String {
        format!("{}/address/{}", self.explorer_base(), address.to_checksum())
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Network::Polygon => "POL",
            _ => "ETH",
        }
    }
}

static NEXT_SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Opaque session identifier. The leading half is a process-wide sequence so
/// an id is never issued twice in one process; the trailing half is random so
/// ids are not guessable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to gather randomness: {0}")]
pub struct EntropyError(pub String);

impl SessionId {
    pub fn generate() -> Result<Self, EntropyError> {
        let sequence = NEXT_SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let mut random = [0u8; 8];
        getrandom::fill(&mut random).map_err(|err| EntropyError(err.to_string()))?;

        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&sequence.to_be_bytes());
        bytes[8..].copy_from_slice(&random);
        Ok(Self(hex::encode(bytes)))
    }

    /// Wraps a caller-supplied id (e.g. from a URL path) for lookups.
    pub fn new(value: impl Into<String>) -> Self {
        let mut owned = value.into();
        owned.make_ascii_lowercase();
        Self(owned)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Stopped,
}

/// How a matched transaction relates to the watch set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TxDirection {
    Incoming,
    Outgoing,
    InternalTx,
}

impl TxDirection {
    pub fn label(&self) -> &'static str {
        match self {
            TxDirection::Incoming => "Incoming",
            TxDirection::Outgoing => "Outgoing",
            TxDirection::InternalTx => "Internal",
        }
    }
}

pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(15);
pub const MIN_POLLING_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_POLLING_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Per-session knobs, fixed when the session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub min_value: Wei,
    pub include_outgoing: bool,
    pub save_transactions: bool,
    pub polling_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            min_value: Wei::ZERO,
            include_outgoing: false,
            save_transactions: true,
            polling_interval: DEFAULT_POLLING_INTERVAL,
        }
    }
}

impl SessionOptions {
    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval.clamp(MIN_POLLING_INTERVAL, MAX_POLLING_INTERVAL);
        self
    }

    pub fn polling_interval_in_range(&self) -> bool {
        (MIN_POLLING_INTERVAL..=MAX_POLLING_INTERVAL).contains(&self.polling_interval)
    }
}

/// A matched on-chain transaction on its way to the fanout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub hash: String,
    pub from: Address,
    pub to: Option<Address>,
    pub value: Wei,
    pub block_number: u64,
    pub direction: TxDirection,
    pub timestamp: DateTime<Utc>,
}

/// The audit line written per matched transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub hash: String,
    pub from: Address,
    pub to: Option<Address>,
    /// Exact decimal amount in the native unit.
    pub value: String,
    #[serde(rename = "blockNumber")]
    pub block_number: u64,
    #[serde(rename = "type")]
    pub direction: TxDirection,
}

impl From<&TransactionRecord> for AuditRecord {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            timestamp: record.timestamp,
            hash: record.hash.clone(),
            from: record.from,
            to: record.to,
            value: record.value.to_native_string(),
            block_number: record.block_number,
            direction: record.direction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashSet, str::FromStr};

    #[test]
    fn session_ids_are_unique() {
        let ids: HashSet<SessionId> = (0..256)
            .map(|_| SessionId::generate().expect("entropy available"))
            .collect();
        assert_eq!(ids.len(), 256);
        assert!(ids.iter().all(|id| id.as_str().len() == 32));
    }

    #[test]
    fn network_parses_case_insensitively() {
        assert_eq!(Network::from_str("Sepolia").unwrap(), Network::Sepolia);
        assert_eq!(Network::from_str("MAINNET").unwrap(), Network::Mainnet);
        assert!(Network::from_str("dogechain").is_err());
        assert_eq!(Network::Base.as_ref(), "base");
    }

    #[test]
    fn explorer_links_follow_network() {
        assert_eq!(
            Network::Mainnet.explorer_tx_url("0x01"),
            "https://etherscan.io/tx/0x01"
        );
        assert_eq!(
            Network::Sepolia.explorer_tx_url("0x02"),
            "https://sepolia.etherscan.io/tx/0x02"
        );
    }

    #[test]
    fn polling_interval_is_clamped() {
        let options = SessionOptions::default().with_polling_interval(Duration::from_millis(10));
        assert_eq!(options.polling_interval, MIN_POLLING_INTERVAL);
        let options = SessionOptions::default().with_polling_interval(Duration::from_secs(u64::MAX));
        assert_eq!(options.polling_interval, MAX_POLLING_INTERVAL);
        assert!(options.polling_interval_in_range());
    }

    #[test]
    fn out_of_range_interval_is_detected() {
        let zero = SessionOptions {
            polling_interval: Duration::ZERO,
            ..SessionOptions::default()
        };
        assert!(!zero.polling_interval_in_range());
        let huge = SessionOptions {
            polling_interval: Duration::MAX,
            ..SessionOptions::default()
        };
        assert!(!huge.polling_interval_in_range());
        assert!(SessionOptions::default().polling_interval_in_range());
    }

    #[test]
    fn audit_record_uses_wire_field_names() {
        let from = Address::parse("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        let record = TransactionRecord {
            hash: "0x1".into(),
            from,
            to: None,
            value: Wei::parse_native("0.5").unwrap(),
            block_number: 7,
            direction: TxDirection::InternalTx,
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        };
        let json = serde_json::to_value(AuditRecord::from(&record)).unwrap();
        assert_eq!(json["blockNumber"], 7);
        assert_eq!(json["type"], "internal_tx");
        assert_eq!(json["value"], "0.5");
        assert_eq!(json["from"], "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed");
        assert!(json["to"].is_null());
    }
}
