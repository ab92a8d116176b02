use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;
use watchtower_domain::{model::Wei, Address};

use crate::worker::MonitorError;

/// A block as the classifier sees it: only the fields matching needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBlock {
    pub number: u64,
    pub timestamp: DateTime<Utc>,
    pub transactions: Vec<ChainTransaction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: String,
    pub from: Address,
    /// `None` for contract creations.
    pub to: Option<Address>,
    pub value: Wei,
}

/// `eth_getBlockByNumber(.., true)` payload. Transactions stay raw so one
/// odd entry does not sink the whole block.
#[derive(Debug, Deserialize)]
pub struct RpcBlock {
    pub number: String,
    pub timestamp: String,
    #[serde(default)]
    pub transactions: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct RpcTransaction {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub value: String,
}

pub fn parse_quantity(raw: &str) -> Result<u64, MonitorError> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| MonitorError::Decode(format!("quantity `{raw}` lacks 0x prefix")))?;
    if digits.is_empty() {
        return Err(MonitorError::Decode("empty quantity".into()));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|err| MonitorError::Decode(format!("quantity `{raw}`: {err}")))
}

impl TryFrom<RpcTransaction> for ChainTransaction {
    type Error = MonitorError;

    fn try_from(raw: RpcTransaction) -> Result<Self, Self::Error> {
        let from = Address::parse(&raw.from)
            .map_err(|err| MonitorError::Decode(format!("from `{}`: {err}", raw.from)))?;
        let to = raw
            .to
            .as_deref()
            .map(Address::parse)
            .transpose()
            .map_err(|err| MonitorError::Decode(format!("to: {err}")))?;
        let value = Wei::from_hex_quantity(&raw.value)
            .map_err(|err| MonitorError::Decode(format!("value: {err}")))?;

        Ok(Self {
            hash: raw.hash.to_ascii_lowercase(),
            from,
            to,
            value,
        })
    }
}

impl TryFrom<RpcBlock> for ChainBlock {
    type Error = MonitorError;

    fn try_from(raw: RpcBlock) -> Result<Self, Self::Error> {
        let number = parse_quantity(&raw.number)?;
        let seconds = parse_quantity(&raw.timestamp)?;
        let timestamp = i64::try_from(seconds)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| MonitorError::Decode(format!("timestamp {seconds} out of range")))?;

        let mut transactions = Vec::with_capacity(raw.transactions.len());
        for (index, entry) in raw.transactions.into_iter().enumerate() {
            let decoded = serde_json::from_value::<RpcTransaction>(entry)
                .map_err(|err| MonitorError::Decode(err.to_string()))
                .and_then(ChainTransaction::try_from);
            match decoded {
                Ok(tx) => transactions.push(tx),
                Err(err) => warn!(block = number, index, %err, "skipping undecodable transaction"),
            }
        }

        Ok(Self {
            number,
            timestamp,
            transactions,
        })
    }
}

/// Decodes an `eth_getBlockByNumber` result. A header that cannot be read
/// would stall the session on that height forever, so it is reported and
/// handled like a missing block.
pub fn decode_block(height: u64, raw: serde_json::Value) -> Option<ChainBlock> {
    let decoded = serde_json::from_value::<RpcBlock>(raw)
        .map_err(|err| MonitorError::Decode(err.to_string()))
        .and_then(ChainBlock::try_from);
    match decoded {
        Ok(block) => Some(block),
        Err(err) => {
            warn!(height, %err, "undecodable block header, treating block as unavailable");
            None
        }
    }
}
