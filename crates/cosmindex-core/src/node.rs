//! The upstream node boundary.
//!
//! The ingestion core only ever talks to the chain through [`NodeClient`].
//! Implementations live outside the core (see `cosmindex-node` for the
//! CometBFT RPC + LCD client); tests substitute stubs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::types::{u64_from_string, Event, Height, Tx};

/// Header-level data of a fetched block. The persisted [`Block`]
/// (crate::types::Block) is derived from this plus the gas total of the
/// block's transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockData {
    pub height: Height,
    pub hash: String,
    pub proposer_address: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub tx_count: usize,
}

/// Events emitted by the block transition, split by phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockResults {
    pub height: Height,
    #[serde(default)]
    pub begin_block_events: Vec<Event>,
    #[serde(default)]
    pub end_block_events: Vec<Event>,
}

/// Contract information as reported by the node at a given height.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractMeta {
    pub creator: String,
    #[serde(default)]
    pub extension: Option<serde_json::Value>,
}

/// Uploaded-code information as reported by the node at a given height.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeMeta {
    pub creator: String,
    pub code_hash: String,
    pub size: i64,
}

/// The chain's genesis document plus its application state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisData {
    pub chain_id: String,
    #[serde(default)]
    pub genesis_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "initial_height_from_string")]
    pub initial_height: Height,
    #[serde(default)]
    pub app_state: serde_json::Value,
}

fn initial_height_from_string<'de, D>(deserializer: D) -> Result<Height, D::Error>
where
    D: serde::Deserializer<'de>,
{
    u64_from_string(deserializer).map(|v| v as Height)
}

/// Read-only client for the upstream node. All calls may fail and are
/// retried by the caller (a failed height loops back onto the queue); the
/// implementation must be safe for concurrent use by every worker.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// The chain's current latest height.
    async fn latest_height(&self) -> Result<Height, IngestError>;

    /// Header data for the block at `height`.
    async fn block(&self, height: Height) -> Result<BlockData, IngestError>;

    /// Begin/end-block events for the block at `height`.
    async fn block_results(&self, height: Height) -> Result<BlockResults, IngestError>;

    /// All transactions contained in `block`.
    async fn txs(&self, block: &BlockData) -> Result<Vec<Tx>, IngestError>;

    /// The genesis document, for processing height 0.
    async fn genesis(&self) -> Result<GenesisData, IngestError>;

    /// Contract metadata as of `height`.
    async fn contract_info(
        &self,
        height: Height,
        address: &str,
    ) -> Result<ContractMeta, IngestError>;

    /// Uploaded-code metadata as of `height`.
    async fn code_info(&self, height: Height, code_id: u64) -> Result<CodeMeta, IngestError>;

    /// Releases any held connections. Called once during shutdown.
    async fn stop(&self);
}
