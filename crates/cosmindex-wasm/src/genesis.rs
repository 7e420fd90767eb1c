//! Genesis-state handler: contracts and codes that existed before block 1.
//!
//! A chain exported-and-restarted at some height carries its wasm state in
//! the genesis document's `app_state.wasm`. Without this pass those
//! contracts would never get a row, and later migrate/admin updates would
//! quietly target nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use cosmindex_core::node::GenesisData;
use cosmindex_core::records::{WasmCodeRecord, WasmContractRecord};
use cosmindex_core::types::{base64_decoded_len, u64_from_string};
use cosmindex_core::{DispatchContext, GenesisHandler, IngestError};

#[derive(Debug, Default, Deserialize)]
struct WasmGenesisState {
    #[serde(default)]
    codes: Vec<GenesisCode>,
    #[serde(default)]
    contracts: Vec<GenesisContract>,
}

#[derive(Debug, Deserialize)]
struct GenesisCode {
    #[serde(deserialize_with = "u64_from_string")]
    code_id: u64,
    #[serde(default)]
    code_info: GenesisCodeInfo,
    #[serde(default)]
    code_bytes: String,
}

#[derive(Debug, Default, Deserialize)]
struct GenesisCodeInfo {
    #[serde(default)]
    code_hash: String,
    #[serde(default)]
    creator: String,
}

#[derive(Debug, Deserialize)]
struct GenesisContract {
    contract_address: String,
    #[serde(default)]
    contract_info: GenesisContractInfo,
}

#[derive(Debug, Default, Deserialize)]
struct GenesisContractInfo {
    #[serde(default, deserialize_with = "u64_from_string")]
    code_id: u64,
    #[serde(default)]
    creator: String,
    #[serde(default)]
    admin: String,
    #[serde(default)]
    label: String,
}

/// Persists the wasm codes and contracts present in the genesis state,
/// all at height 0.
#[derive(Default)]
pub struct WasmGenesisHandler;

impl WasmGenesisHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GenesisHandler for WasmGenesisHandler {
    fn name(&self) -> &'static str {
        "wasm-genesis"
    }

    async fn handle_genesis(
        &self,
        genesis: &GenesisData,
        ctx: &DispatchContext,
    ) -> Result<(), IngestError> {
        let Some(raw) = genesis.app_state.get("wasm") else {
            debug!("genesis has no wasm state");
            return Ok(());
        };
        let state: WasmGenesisState = serde_json::from_value(raw.clone())
            .map_err(|e| IngestError::Decode(format!("malformed wasm genesis state: {e}")))?;

        let genesis_time = genesis.genesis_time.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        for code in &state.codes {
            ctx.store
                .save_wasm_code(&WasmCodeRecord {
                    sender: code.code_info.creator.clone(),
                    code_hash: code.code_info.code_hash.clone(),
                    code_id: code.code_id,
                    size: base64_decoded_len(&code.code_bytes) as i64,
                    tx_hash: String::new(),
                    height: 0,
                })
                .await?;
        }

        for contract in &state.contracts {
            ctx.store
                .save_wasm_contract(&WasmContractRecord {
                    sender: contract.contract_info.creator.clone(),
                    creator: contract.contract_info.creator.clone(),
                    admin: contract.contract_info.admin.clone(),
                    code_id: contract.contract_info.code_id,
                    label: contract.contract_info.label.clone(),
                    raw_msg: serde_json::Value::Null,
                    funds: vec![],
                    contract_address: contract.contract_address.clone(),
                    tx_hash: String::new(),
                    instantiated_at: genesis_time,
                    height: 0,
                })
                .await?;
        }

        info!(
            codes = state.codes.len(),
            contracts = state.contracts.len(),
            "wasm genesis state exported"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use cosmindex_core::node::{BlockData, BlockResults, CodeMeta, ContractMeta, NodeClient};
    use cosmindex_core::types::{Height, Tx};
    use cosmindex_storage::MemoryStore;
    use serde_json::json;

    struct UnusedNode;

    #[async_trait]
    impl NodeClient for UnusedNode {
        async fn latest_height(&self) -> Result<Height, IngestError> {
            Ok(0)
        }
        async fn block(&self, _h: Height) -> Result<BlockData, IngestError> {
            unreachable!()
        }
        async fn block_results(&self, _h: Height) -> Result<BlockResults, IngestError> {
            unreachable!()
        }
        async fn txs(&self, _b: &BlockData) -> Result<Vec<Tx>, IngestError> {
            unreachable!()
        }
        async fn genesis(&self) -> Result<GenesisData, IngestError> {
            unreachable!()
        }
        async fn contract_info(&self, _h: Height, _a: &str) -> Result<ContractMeta, IngestError> {
            unreachable!()
        }
        async fn code_info(&self, _h: Height, _id: u64) -> Result<CodeMeta, IngestError> {
            unreachable!()
        }
        async fn stop(&self) {}
    }

    #[tokio::test]
    async fn genesis_contracts_land_at_height_zero() {
        let store = Arc::new(MemoryStore::new());
        let ctx = DispatchContext {
            node: Arc::new(UnusedNode),
            store: store.clone(),
        };
        let genesis = GenesisData {
            chain_id: "testchain-1".into(),
            genesis_time: None,
            initial_height: 1,
            app_state: json!({
                "wasm": {
                    "codes": [{
                        "code_id": "1",
                        "code_info": {"code_hash": "q80=", "creator": "wasm1creator"},
                        "code_bytes": "aGVsbG8="
                    }],
                    "contracts": [{
                        "contract_address": "wasm1genesis",
                        "contract_info": {
                            "code_id": "1",
                            "creator": "wasm1creator",
                            "label": "from-genesis"
                        }
                    }]
                }
            }),
        };

        WasmGenesisHandler::new()
            .handle_genesis(&genesis, &ctx)
            .await
            .unwrap();

        let code = store.code(1).unwrap();
        assert_eq!(code.height, 0);
        assert_eq!(code.size, 5);

        let contract = store.contract("wasm1genesis").unwrap();
        assert_eq!(contract.height, 0);
        assert_eq!(contract.label, "from-genesis");
    }

    #[tokio::test]
    async fn genesis_without_wasm_state_is_fine() {
        let store = Arc::new(MemoryStore::new());
        let ctx = DispatchContext {
            node: Arc::new(UnusedNode),
            store: store.clone(),
        };
        let genesis = GenesisData {
            chain_id: "testchain-1".into(),
            genesis_time: None,
            initial_height: 1,
            app_state: json!({"bank": {}}),
        };

        WasmGenesisHandler::new()
            .handle_genesis(&genesis, &ctx)
            .await
            .unwrap();
        assert!(store.contract("anything").is_none());
    }
}
