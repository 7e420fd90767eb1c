//! Message handlers for the CosmWasm contract lifecycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use cosmindex_core::records::{
    ContractMetadataRecord, WasmCodeRecord, WasmContractRecord, WasmExecuteRecord,
};
use cosmindex_core::types::{RawMessage, Tx};
use cosmindex_core::{DispatchContext, IngestError, MessageHandler};

use crate::msg::{
    MsgExecuteContract, MsgInstantiateContract, MsgMigrateContract, MsgSetContractMetadata,
    MsgStoreCode, WasmMsg, ATTR_CODE_ID, ATTR_CONTRACT_ADDR, EVENT_INSTANTIATE, EVENT_STORE_CODE,
};

/// Turns wasm transaction messages into contract lifecycle records.
///
/// Only called for successful transactions — the worker filters failed ones
/// out before dispatch.
#[derive(Default)]
pub struct WasmMessageHandler;

impl WasmMessageHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageHandler for WasmMessageHandler {
    fn name(&self) -> &'static str {
        "wasm"
    }

    async fn handle_message(
        &self,
        index: usize,
        msg: &RawMessage,
        tx: &Tx,
        ctx: &DispatchContext,
    ) -> Result<(), IngestError> {
        let Some(decoded) = WasmMsg::decode(msg)? else {
            return Ok(());
        };

        // Without a log there is no event to correlate against; nothing from
        // this tx can be attributed.
        if tx.logs.is_empty() {
            debug!(tx_hash = %tx.hash, kind = decoded.kind(), "transaction has no logs, skipping");
            return Ok(());
        }

        match decoded {
            WasmMsg::StoreCode(m) => self.handle_store_code(index, tx, &m, ctx).await,
            WasmMsg::Instantiate(m) => self.handle_instantiate(index, tx, &m, ctx).await,
            WasmMsg::Execute(m) => self.handle_execute(tx, &m, ctx).await,
            WasmMsg::Migrate(m) => self.handle_migrate(tx, &m, ctx).await,
            WasmMsg::UpdateAdmin(m) => {
                ctx.store
                    .update_contract_admin(&m.sender, &m.contract, &m.new_admin)
                    .await
            }
            WasmMsg::ClearAdmin(m) => {
                ctx.store
                    .update_contract_admin(&m.sender, &m.contract, "")
                    .await
            }
            WasmMsg::SetContractMetadata(m) => self.handle_set_metadata(tx, &m, ctx).await,
        }
    }
}

impl WasmMessageHandler {
    /// A code upload. The chain assigns the code ID in the store_code event;
    /// hash and size come from the node's code info at that height.
    async fn handle_store_code(
        &self,
        index: usize,
        tx: &Tx,
        msg: &MsgStoreCode,
        ctx: &DispatchContext,
    ) -> Result<(), IngestError> {
        let event = tx.find_event_by_type(index, EVENT_STORE_CODE)?;
        let code_id_attr = tx.find_attribute_by_key(event, ATTR_CODE_ID)?;
        let code_id: u64 = code_id_attr.trim_matches('"').parse().map_err(|e| {
            IngestError::Decode(format!("invalid code_id attribute '{code_id_attr}': {e}"))
        })?;

        let code_info = ctx.node.code_info(tx.height, code_id).await?;

        ctx.store
            .save_wasm_code(&WasmCodeRecord {
                sender: msg.sender.clone(),
                code_hash: code_info.code_hash,
                code_id,
                size: code_info.size,
                tx_hash: tx.hash.clone(),
                height: tx.height,
            })
            .await
    }

    /// An instantiation. The contract address is assigned by the chain and
    /// only present in the instantiate event; the creator comes from the
    /// node's contract info — if that call fails, this message fails.
    async fn handle_instantiate(
        &self,
        index: usize,
        tx: &Tx,
        msg: &MsgInstantiateContract,
        ctx: &DispatchContext,
    ) -> Result<(), IngestError> {
        let event = tx.find_event_by_type(index, EVENT_INSTANTIATE)?;
        let contract_address = tx.find_attribute_by_key(event, ATTR_CONTRACT_ADDR)?;

        let contract_info = ctx.node.contract_info(tx.height, contract_address).await?;
        let instantiated_at = parse_timestamp(&tx.timestamp)?;

        ctx.store
            .save_wasm_contract(&WasmContractRecord {
                sender: msg.sender.clone(),
                creator: contract_info.creator,
                admin: msg.admin.clone(),
                code_id: msg.code_id,
                label: msg.label.clone(),
                raw_msg: msg.msg.clone(),
                funds: msg.funds.clone(),
                contract_address: contract_address.to_string(),
                tx_hash: tx.hash.clone(),
                instantiated_at,
                height: tx.height,
            })
            .await
    }

    /// An execution. Built from the message and the tx metadata alone.
    async fn handle_execute(
        &self,
        tx: &Tx,
        msg: &MsgExecuteContract,
        ctx: &DispatchContext,
    ) -> Result<(), IngestError> {
        let executed_at = parse_timestamp(&tx.timestamp)?;

        ctx.store
            .save_wasm_execute_contract(&WasmExecuteRecord {
                sender: msg.sender.clone(),
                contract_address: msg.contract.clone(),
                raw_msg: msg.msg.clone(),
                funds: msg.funds.clone(),
                gas_used: tx.gas_used,
                fees: tx.fee.clone(),
                tx_hash: tx.hash.clone(),
                executed_at,
                height: tx.height,
            })
            .await
    }

    /// A migration: the contract row keeps its address, code ID and payload
    /// change in place.
    async fn handle_migrate(
        &self,
        tx: &Tx,
        msg: &MsgMigrateContract,
        ctx: &DispatchContext,
    ) -> Result<(), IngestError> {
        debug!(tx_hash = %tx.hash, contract = %msg.contract, code_id = msg.code_id, "migrating contract");
        ctx.store
            .update_contract_on_migrate(&msg.sender, &msg.contract, msg.code_id, &msg.msg)
            .await
    }

    /// Explicit reward-routing metadata. One row per message.
    async fn handle_set_metadata(
        &self,
        tx: &Tx,
        msg: &MsgSetContractMetadata,
        ctx: &DispatchContext,
    ) -> Result<(), IngestError> {
        let saved_at = parse_timestamp(&tx.timestamp)?;
        let meta = &msg.metadata;

        let contract_address = if msg.contract_address.is_empty() {
            meta.contract_address.clone()
        } else {
            msg.contract_address.clone()
        };

        ctx.store
            .save_contract_metadata(&ContractMetadataRecord {
                contract_address,
                reward_address: meta.reward_address.clone(),
                developer_address: meta.developer_address.clone(),
                collect_premium: meta.collect_premium,
                gas_rebate_to_user: meta.gas_rebate_to_user,
                premium_percentage_charged: meta.premium_percentage_charged,
                metadata: serde_json::to_value(meta)
                    .map_err(|e| IngestError::Decode(format!("serialize metadata: {e}")))?,
                tx_hash: tx.hash.clone(),
                saved_at,
                height: tx.height,
            })
            .await
    }
}

/// Parses the RFC3339 timestamp a node reports for a transaction. Malformed
/// input is a hard failure for the message that needed it.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, IngestError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| IngestError::Timestamp(format!("invalid tx timestamp '{raw}': {e}")))
}
