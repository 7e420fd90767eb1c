//! In-memory store backend.
//!
//! Mirrors the natural-key conflict semantics of the PostgreSQL backend —
//! insert-or-ignore keyed by height / code ID / contract address, targeted
//! updates, distribution-without-calculation as a no-op — so tests exercise
//! the same idempotency contract the real store enforces. All data is lost
//! when the process exits.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use cosmindex_core::records::{
    ContractMetadataRecord, RewardCalculationRecord, RewardCoin, RewardDistributionRecord,
    WasmCodeRecord, WasmContractRecord, WasmExecuteRecord,
};
use cosmindex_core::types::{Block, Height};
use cosmindex_core::{IngestError, Store};

/// A reward calculation row plus the distribution amounts applied to it
/// later, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardRow {
    pub calculation: RewardCalculationRecord,
    pub distributed_rewards: Option<Vec<RewardCoin>>,
    pub leftover_rewards: Option<Vec<RewardCoin>>,
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    blocks: Mutex<HashMap<Height, Block>>,
    codes: Mutex<HashMap<u64, WasmCodeRecord>>,
    contracts: Mutex<HashMap<String, WasmContractRecord>>,
    executions: Mutex<Vec<WasmExecuteRecord>>,
    rewards: Mutex<Vec<RewardRow>>,
    metadata: Mutex<Vec<ContractMetadataRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Inspection helpers for tests ─────────────────────────────────────────

    pub fn block(&self, height: Height) -> Option<Block> {
        self.blocks.lock().unwrap().get(&height).cloned()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.lock().unwrap().len()
    }

    pub fn code(&self, code_id: u64) -> Option<WasmCodeRecord> {
        self.codes.lock().unwrap().get(&code_id).cloned()
    }

    pub fn contract(&self, address: &str) -> Option<WasmContractRecord> {
        self.contracts.lock().unwrap().get(address).cloned()
    }

    pub fn executions(&self) -> Vec<WasmExecuteRecord> {
        self.executions.lock().unwrap().clone()
    }

    pub fn reward_rows(&self) -> Vec<RewardRow> {
        self.rewards.lock().unwrap().clone()
    }

    /// The reward row for (contract, height), if any.
    pub fn reward_row(&self, contract_address: &str, height: Height) -> Option<RewardRow> {
        self.rewards
            .lock()
            .unwrap()
            .iter()
            .find(|r| {
                r.calculation.contract_address == contract_address
                    && r.calculation.height == height
            })
            .cloned()
    }

    pub fn metadata_rows(&self) -> Vec<ContractMetadataRecord> {
        self.metadata.lock().unwrap().clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn has_block(&self, height: Height) -> Result<bool, IngestError> {
        Ok(self.blocks.lock().unwrap().contains_key(&height))
    }

    async fn save_block(&self, block: &Block) -> Result<(), IngestError> {
        self.blocks
            .lock()
            .unwrap()
            .entry(block.height)
            .or_insert_with(|| block.clone());
        Ok(())
    }

    async fn save_wasm_code(&self, code: &WasmCodeRecord) -> Result<(), IngestError> {
        self.codes
            .lock()
            .unwrap()
            .entry(code.code_id)
            .or_insert_with(|| code.clone());
        Ok(())
    }

    async fn save_wasm_contract(
        &self,
        contract: &WasmContractRecord,
    ) -> Result<(), IngestError> {
        self.contracts
            .lock()
            .unwrap()
            .entry(contract.contract_address.clone())
            .or_insert_with(|| contract.clone());
        Ok(())
    }

    async fn save_wasm_execute_contract(
        &self,
        execute: &WasmExecuteRecord,
    ) -> Result<(), IngestError> {
        self.executions.lock().unwrap().push(execute.clone());
        Ok(())
    }

    async fn update_contract_admin(
        &self,
        _sender: &str,
        contract_address: &str,
        new_admin: &str,
    ) -> Result<(), IngestError> {
        if let Some(contract) = self.contracts.lock().unwrap().get_mut(contract_address) {
            contract.admin = new_admin.to_string();
        }
        Ok(())
    }

    async fn update_contract_on_migrate(
        &self,
        _sender: &str,
        contract_address: &str,
        code_id: u64,
        raw_msg: &serde_json::Value,
    ) -> Result<(), IngestError> {
        if let Some(contract) = self.contracts.lock().unwrap().get_mut(contract_address) {
            contract.code_id = code_id;
            contract.raw_msg = raw_msg.clone();
        }
        Ok(())
    }

    async fn save_contract_reward_calculation(
        &self,
        calculation: &RewardCalculationRecord,
    ) -> Result<(), IngestError> {
        let mut rewards = self.rewards.lock().unwrap();
        let exists = rewards.iter().any(|r| {
            r.calculation.contract_address == calculation.contract_address
                && r.calculation.reward_address == calculation.reward_address
                && r.calculation.height == calculation.height
        });
        if !exists {
            rewards.push(RewardRow {
                calculation: calculation.clone(),
                distributed_rewards: None,
                leftover_rewards: None,
            });
        }
        Ok(())
    }

    async fn save_contract_reward_distribution(
        &self,
        distribution: &RewardDistributionRecord,
    ) -> Result<(), IngestError> {
        let mut rewards = self.rewards.lock().unwrap();
        let idx = rewards
            .iter()
            .position(|r| {
                !distribution.reward_address.is_empty()
                    && r.calculation.reward_address == distribution.reward_address
                    && r.calculation.height == distribution.height
            })
            .or_else(|| {
                rewards.iter().position(|r| {
                    !distribution.contract_address.is_empty()
                        && r.calculation.contract_address == distribution.contract_address
                        && r.calculation.height == distribution.height
                })
            });
        let row = idx.map(|i| &mut rewards[i]);
        match row {
            Some(row) => {
                row.distributed_rewards = Some(distribution.distributed_rewards.clone());
                row.leftover_rewards = Some(distribution.leftover_rewards.clone());
            }
            None => {
                debug!(
                    reward_address = %distribution.reward_address,
                    height = distribution.height,
                    "no matching reward calculation, distribution ignored"
                );
            }
        }
        Ok(())
    }

    async fn save_contract_metadata(
        &self,
        metadata: &ContractMetadataRecord,
    ) -> Result<(), IngestError> {
        self.metadata.lock().unwrap().push(metadata.clone());
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn block(height: Height) -> Block {
        Block {
            height,
            hash: format!("HASH{height}"),
            num_txs: 0,
            total_gas: 0,
            proposer_address: None,
            timestamp: Utc::now(),
        }
    }

    fn calculation(contract: &str, reward: &str, height: Height) -> RewardCalculationRecord {
        RewardCalculationRecord {
            contract_address: contract.into(),
            reward_address: reward.into(),
            developer_address: "wasm1dev".into(),
            gas_consumed: 1000,
            contract_rewards: vec![],
            inflation_rewards: vec![],
            collect_premium: false,
            gas_rebate_to_user: false,
            premium_percentage_charged: 0,
            metadata: String::new(),
            height,
        }
    }

    #[tokio::test]
    async fn duplicate_block_save_is_ignored() {
        let store = MemoryStore::new();
        store.save_block(&block(5)).await.unwrap();

        let mut other = block(5);
        other.hash = "DIFFERENT".into();
        store.save_block(&other).await.unwrap();

        assert_eq!(store.block_count(), 1);
        assert_eq!(store.block(5).unwrap().hash, "HASH5");
    }

    #[tokio::test]
    async fn distribution_without_calculation_is_a_noop() {
        let store = MemoryStore::new();
        store
            .save_contract_reward_distribution(&RewardDistributionRecord {
                contract_address: "wasm1c".into(),
                reward_address: "wasm1r".into(),
                distributed_rewards: vec![],
                leftover_rewards: vec![],
                height: 9,
            })
            .await
            .unwrap();

        assert!(store.reward_rows().is_empty());
    }

    #[tokio::test]
    async fn distribution_matches_by_reward_address_then_contract() {
        let store = MemoryStore::new();
        store
            .save_contract_reward_calculation(&calculation("wasm1c", "wasm1r", 9))
            .await
            .unwrap();

        let coins = vec![RewardCoin {
            denom: "uarch".into(),
            amount: "12.5".into(),
        }];

        // No reward_address match, falls back to the contract address.
        store
            .save_contract_reward_distribution(&RewardDistributionRecord {
                contract_address: "wasm1c".into(),
                reward_address: "wasm1other".into(),
                distributed_rewards: coins.clone(),
                leftover_rewards: vec![],
                height: 9,
            })
            .await
            .unwrap();

        let row = store.reward_row("wasm1c", 9).unwrap();
        assert_eq!(row.distributed_rewards, Some(coins));
    }
}
