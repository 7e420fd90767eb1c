//! Chain-level types shared across the ingestion pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::IngestError;
use crate::node::BlockData;

/// Sequence number of a block in the chain. Height 0 means "genesis state".
pub type Height = i64;

// ─── Block ────────────────────────────────────────────────────────────────────

/// A single chain block as persisted by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub height: Height,
    pub hash: String,
    pub num_txs: i32,
    /// Total gas consumed across the block's transactions.
    pub total_gas: u64,
    pub proposer_address: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Block {
    /// Builds the persisted block from fetched header data plus the gas total
    /// computed over its transactions.
    pub fn from_data(data: &BlockData, total_gas: u64) -> Self {
        Self {
            height: data.height,
            hash: data.hash.clone(),
            num_txs: data.tx_count as i32,
            total_gas,
            proposer_address: data.proposer_address.clone(),
            timestamp: data.timestamp,
        }
    }
}

// ─── Coin ─────────────────────────────────────────────────────────────────────

/// A coin amount. The amount stays a decimal string end to end — chain
/// amounts routinely exceed `u64`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    pub amount: String,
}

// ─── Events ───────────────────────────────────────────────────────────────────

/// A single key/value attribute of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

/// An attribute-bag event, emitted either by the chain's block transition
/// (begin/end-block) or inside a transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Vec<EventAttribute>,
}

impl Event {
    /// Returns the value of the first attribute with the given key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| a.value.as_str())
    }
}

/// Which block transition phase an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockPhase {
    BeginBlock,
    EndBlock,
}

impl std::fmt::Display for BlockPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BeginBlock => write!(f, "begin_block"),
            Self::EndBlock => write!(f, "end_block"),
        }
    }
}

// ─── Transactions ─────────────────────────────────────────────────────────────

/// A transaction message, kept as its type URL plus the raw JSON body.
/// Decoding into a concrete message kind happens at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    pub type_url: String,
    pub value: serde_json::Value,
}

/// The event log of a single message inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxLog {
    #[serde(default)]
    pub msg_index: u32,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// An already-finalized chain transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tx {
    pub hash: String,
    pub height: Height,
    /// Result code; 0 means success.
    pub code: u32,
    pub gas_wanted: i64,
    pub gas_used: i64,
    pub fee: Vec<Coin>,
    /// RFC3339 timestamp as reported by the node. Parsed lazily by the
    /// handlers that need it, so a malformed value only fails those.
    pub timestamp: String,
    pub messages: Vec<RawMessage>,
    pub logs: Vec<TxLog>,
}

impl Tx {
    /// Whether this transaction executed successfully.
    pub fn successful(&self) -> bool {
        self.code == 0
    }

    /// Finds the event with the given type inside the log of the message at
    /// `index`.
    pub fn find_event_by_type(
        &self,
        index: usize,
        event_type: &str,
    ) -> Result<&Event, IngestError> {
        if let Some(log) = self.logs.iter().find(|l| l.msg_index as usize == index) {
            if let Some(event) = log.events.iter().find(|e| e.kind == event_type) {
                return Ok(event);
            }
        }
        Err(IngestError::Event {
            event_type: event_type.to_string(),
            reason: format!("not found inside tx {}", self.hash),
        })
    }

    /// Finds the attribute with the given key inside `event`.
    pub fn find_attribute_by_key<'a>(
        &self,
        event: &'a Event,
        key: &str,
    ) -> Result<&'a str, IngestError> {
        event
            .attribute(key)
            .ok_or_else(|| IngestError::MissingAttribute {
                event_type: event.kind.clone(),
                key: key.to_string(),
            })
    }
}

/// Total gas consumed by a set of transactions.
pub fn sum_tx_gas(txs: &[Tx]) -> u64 {
    txs.iter().map(|tx| tx.gas_used.max(0) as u64).sum()
}

// ─── Serde helpers ────────────────────────────────────────────────────────────

/// Deserializes a `u64` that the chain JSON encodes either as a number or as
/// a decimal string (protobuf JSON renders uint64 as a string).
pub fn u64_from_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Number of bytes a base64 string decodes to, computed without decoding.
pub fn base64_decoded_len(encoded: &str) -> usize {
    let trimmed = encoded.trim_end_matches('=');
    let padding = encoded.len() - trimmed.len();
    if encoded.is_empty() {
        return 0;
    }
    encoded.len() / 4 * 3 - padding
}

// ─── Tests ────────────────────────────────────────────────────────────────────
