//! CosmWasm message decoding.
//!
//! Messages arrive as a type URL plus a raw JSON body. Decoding maps the URL
//! onto a closed enum — the full set of message kinds this pipeline knows is
//! auditable right here — and unknown URLs simply decode to `None`, keeping
//! the pipeline forward-compatible with upstream module additions.

use serde::{Deserialize, Serialize};

use cosmindex_core::types::{u64_from_string, Coin, RawMessage};
use cosmindex_core::IngestError;

// ─── Type URLs ────────────────────────────────────────────────────────────────

pub const MSG_STORE_CODE: &str = "/cosmwasm.wasm.v1.MsgStoreCode";
pub const MSG_INSTANTIATE_CONTRACT: &str = "/cosmwasm.wasm.v1.MsgInstantiateContract";
pub const MSG_EXECUTE_CONTRACT: &str = "/cosmwasm.wasm.v1.MsgExecuteContract";
pub const MSG_MIGRATE_CONTRACT: &str = "/cosmwasm.wasm.v1.MsgMigrateContract";
pub const MSG_UPDATE_ADMIN: &str = "/cosmwasm.wasm.v1.MsgUpdateAdmin";
pub const MSG_CLEAR_ADMIN: &str = "/cosmwasm.wasm.v1.MsgClearAdmin";
pub const MSG_SET_CONTRACT_METADATA: &str = "/archway.gastracker.v1.MsgSetContractMetadata";

// ─── Tx event types / attribute keys ──────────────────────────────────────────

pub const EVENT_STORE_CODE: &str = "store_code";
pub const EVENT_INSTANTIATE: &str = "instantiate";
pub const ATTR_CODE_ID: &str = "code_id";
pub const ATTR_CONTRACT_ADDR: &str = "_contract_address";

// ─── Message bodies ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MsgStoreCode {
    pub sender: String,
    /// Base64 wasm bytes, possibly gzipped. Only carried through; code hash
    /// and size are taken from the node's code info instead.
    #[serde(default)]
    pub wasm_byte_code: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MsgInstantiateContract {
    pub sender: String,
    #[serde(default)]
    pub admin: String,
    #[serde(deserialize_with = "u64_from_string")]
    pub code_id: u64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub msg: serde_json::Value,
    #[serde(default)]
    pub funds: Vec<Coin>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MsgExecuteContract {
    pub sender: String,
    pub contract: String,
    #[serde(default)]
    pub msg: serde_json::Value,
    #[serde(default)]
    pub funds: Vec<Coin>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MsgMigrateContract {
    pub sender: String,
    pub contract: String,
    #[serde(deserialize_with = "u64_from_string")]
    pub code_id: u64,
    #[serde(default)]
    pub msg: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MsgUpdateAdmin {
    pub sender: String,
    pub new_admin: String,
    pub contract: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MsgClearAdmin {
    pub sender: String,
    pub contract: String,
}

/// Reward routing metadata carried by a set-metadata message. Serialized
/// back out verbatim into the metadata record's raw column.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackerMetadata {
    #[serde(default)]
    pub contract_address: String,
    #[serde(default)]
    pub reward_address: String,
    #[serde(default)]
    pub developer_address: String,
    #[serde(default)]
    pub collect_premium: bool,
    #[serde(default)]
    pub gas_rebate_to_user: bool,
    #[serde(default, deserialize_with = "u64_from_string")]
    pub premium_percentage_charged: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MsgSetContractMetadata {
    pub sender: String,
    #[serde(default)]
    pub contract_address: String,
    #[serde(default)]
    pub metadata: TrackerMetadata,
}

// ─── Decode ───────────────────────────────────────────────────────────────────

/// The closed set of message kinds the contract pipeline handles.
#[derive(Debug, Clone, PartialEq)]
pub enum WasmMsg {
    StoreCode(MsgStoreCode),
    Instantiate(MsgInstantiateContract),
    Execute(MsgExecuteContract),
    Migrate(MsgMigrateContract),
    UpdateAdmin(MsgUpdateAdmin),
    ClearAdmin(MsgClearAdmin),
    SetContractMetadata(MsgSetContractMetadata),
}

impl WasmMsg {
    /// Decodes a raw message by its type URL. Unknown URLs return `None`;
    /// a known URL with a malformed body is an error.
    pub fn decode(raw: &RawMessage) -> Result<Option<Self>, IngestError> {
        let decoded = match raw.type_url.as_str() {
            MSG_STORE_CODE => Self::StoreCode(decode_body(raw)?),
            MSG_INSTANTIATE_CONTRACT => Self::Instantiate(decode_body(raw)?),
            MSG_EXECUTE_CONTRACT => Self::Execute(decode_body(raw)?),
            MSG_MIGRATE_CONTRACT => Self::Migrate(decode_body(raw)?),
            MSG_UPDATE_ADMIN => Self::UpdateAdmin(decode_body(raw)?),
            MSG_CLEAR_ADMIN => Self::ClearAdmin(decode_body(raw)?),
            MSG_SET_CONTRACT_METADATA => Self::SetContractMetadata(decode_body(raw)?),
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }

    /// Short kind name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StoreCode(_) => "store-code",
            Self::Instantiate(_) => "instantiate",
            Self::Execute(_) => "execute",
            Self::Migrate(_) => "migrate",
            Self::UpdateAdmin(_) => "update-admin",
            Self::ClearAdmin(_) => "clear-admin",
            Self::SetContractMetadata(_) => "set-contract-metadata",
        }
    }
}

fn decode_body<T: serde::de::DeserializeOwned>(raw: &RawMessage) -> Result<T, IngestError> {
    serde_json::from_value(raw.value.clone())
        .map_err(|e| IngestError::Decode(format!("malformed {} body: {e}", raw.type_url)))
}
