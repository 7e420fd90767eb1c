//! Domain records produced by the dispatch handlers and consumed by the
//! [`Store`](crate::store::Store).
//!
//! All records are built once during the processing of a single height and
//! handed to the store; nothing is cached in memory past that point.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Coin, Height};

// ─── Contract lifecycle ───────────────────────────────────────────────────────

/// A code upload. One row per store-code message, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasmCodeRecord {
    pub sender: String,
    pub code_hash: String,
    pub code_id: u64,
    pub size: i64,
    pub tx_hash: String,
    pub height: Height,
}

/// An instantiated contract, keyed by its address.
///
/// `admin` changes on admin-update/clear; `code_id` and `raw_msg` change on
/// migration. Both are targeted updates against the existing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasmContractRecord {
    pub sender: String,
    pub creator: String,
    pub admin: String,
    pub code_id: u64,
    pub label: String,
    pub raw_msg: serde_json::Value,
    pub funds: Vec<Coin>,
    pub contract_address: String,
    pub tx_hash: String,
    pub instantiated_at: DateTime<Utc>,
    pub height: Height,
}

/// One row per execute-contract message. Write-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasmExecuteRecord {
    pub sender: String,
    pub contract_address: String,
    pub raw_msg: serde_json::Value,
    pub funds: Vec<Coin>,
    pub gas_used: i64,
    pub fees: Vec<Coin>,
    pub tx_hash: String,
    pub executed_at: DateTime<Utc>,
    pub height: Height,
}

// ─── Reward accounting ────────────────────────────────────────────────────────

/// A reward coin amount. The amount is a decimal string — the tracking module
/// emits fractional amounts that must not be rounded through a float.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCoin {
    pub denom: String,
    pub amount: String,
}

/// Reward computation for a contract over one block.
///
/// The stored height is the height the rewards account FOR, which is one
/// less than the height of the block the event was observed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardCalculationRecord {
    pub contract_address: String,
    pub reward_address: String,
    pub developer_address: String,
    pub gas_consumed: u64,
    pub contract_rewards: Vec<RewardCoin>,
    pub inflation_rewards: Vec<RewardCoin>,
    pub collect_premium: bool,
    pub gas_rebate_to_user: bool,
    pub premium_percentage_charged: u64,
    /// The metadata attribute exactly as emitted.
    pub metadata: String,
    pub height: Height,
}

/// Distributed/leftover amounts applied to an existing calculation row.
///
/// Matched by (reward_address, height), falling back to
/// (contract_address, height). No matching row means the update is a no-op —
/// a distribution is never stored on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardDistributionRecord {
    pub contract_address: String,
    pub reward_address: String,
    pub distributed_rewards: Vec<RewardCoin>,
    pub leftover_rewards: Vec<RewardCoin>,
    pub height: Height,
}

/// Reward routing metadata set explicitly for a contract.
/// One row per set-metadata message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractMetadataRecord {
    pub contract_address: String,
    pub reward_address: String,
    pub developer_address: String,
    pub collect_premium: bool,
    pub gas_rebate_to_user: bool,
    pub premium_percentage_charged: u64,
    pub metadata: serde_json::Value,
    pub tx_hash: String,
    pub saved_at: DateTime<Utc>,
    pub height: Height,
}
