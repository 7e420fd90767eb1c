//! The persistence boundary.
//!
//! Every write is idempotent: inserts are keyed by natural identifiers
//! (height, tx hash, contract address) and have no effect when the row
//! already exists, updates target a single row by its natural key. That is
//! what makes concurrent workers — and re-runs over already-exported ranges —
//! safe without any locking in the ingestion core.

use async_trait::async_trait;

use crate::error::IngestError;
use crate::records::{
    ContractMetadataRecord, RewardCalculationRecord, RewardDistributionRecord, WasmCodeRecord,
    WasmContractRecord, WasmExecuteRecord,
};
use crate::types::{Block, Height};

/// Abstract store for all ingested records. Implementations must be safe for
/// concurrent use by all workers (pool connections internally).
#[async_trait]
pub trait Store: Send + Sync {
    /// Whether the block at `height` has already been exported. The block
    /// row is the idempotency marker for the whole height.
    async fn has_block(&self, height: Height) -> Result<bool, IngestError>;

    /// Insert-or-ignore, keyed by height.
    async fn save_block(&self, block: &Block) -> Result<(), IngestError>;

    /// Insert-or-ignore, keyed by code ID.
    async fn save_wasm_code(&self, code: &WasmCodeRecord) -> Result<(), IngestError>;

    /// Insert-or-ignore, keyed by contract address.
    async fn save_wasm_contract(&self, contract: &WasmContractRecord)
        -> Result<(), IngestError>;

    /// Append one execution row.
    async fn save_wasm_execute_contract(
        &self,
        execute: &WasmExecuteRecord,
    ) -> Result<(), IngestError>;

    /// Sets the admin of the contract at `contract_address`. An empty
    /// `new_admin` clears it.
    async fn update_contract_admin(
        &self,
        sender: &str,
        contract_address: &str,
        new_admin: &str,
    ) -> Result<(), IngestError>;

    /// Updates code ID and instantiation payload of the contract at
    /// `contract_address` after a migration.
    async fn update_contract_on_migrate(
        &self,
        sender: &str,
        contract_address: &str,
        code_id: u64,
        raw_msg: &serde_json::Value,
    ) -> Result<(), IngestError>;

    /// Insert-or-ignore, keyed by (contract address, reward address, height).
    async fn save_contract_reward_calculation(
        &self,
        calculation: &RewardCalculationRecord,
    ) -> Result<(), IngestError>;

    /// Applies distributed/leftover amounts to the matching calculation row.
    /// No matching row means no-op — a distribution row is never created on
    /// its own.
    async fn save_contract_reward_distribution(
        &self,
        distribution: &RewardDistributionRecord,
    ) -> Result<(), IngestError>;

    /// Append one metadata row.
    async fn save_contract_metadata(
        &self,
        metadata: &ContractMetadataRecord,
    ) -> Result<(), IngestError>;

    /// Flushes and closes the underlying connections. Called once during
    /// shutdown, after the workers have drained.
    async fn close(&self);
}
