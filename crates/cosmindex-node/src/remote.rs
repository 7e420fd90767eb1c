//! The remote node client.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use cosmindex_core::node::{
    BlockData, BlockResults, CodeMeta, ContractMeta, GenesisData, NodeClient,
};
use cosmindex_core::types::{base64_decoded_len, Coin, Event, Height, RawMessage, Tx, TxLog};
use cosmindex_core::IngestError;

use crate::retry::{RetryConfig, RetryPolicy};

/// Name of the header selecting historical state on LCD queries.
const BLOCK_HEIGHT_HEADER: &str = "x-cosmos-block-height";

/// Connection settings for [`RemoteNode`].
#[derive(Debug, Clone)]
pub struct RemoteNodeConfig {
    /// CometBFT JSON-RPC endpoint, e.g. `http://localhost:26657`.
    pub rpc_url: String,
    /// LCD REST endpoint, e.g. `http://localhost:1317`.
    pub api_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for RemoteNodeConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:26657".into(),
            api_url: "http://localhost:1317".into(),
            timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

/// [`NodeClient`] implementation over CometBFT RPC + LCD REST.
///
/// Safe for concurrent use by all workers: `reqwest::Client` pools
/// connections internally.
pub struct RemoteNode {
    rpc_url: String,
    api_url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

enum FetchError {
    /// Connection-level problems and 5xx responses — worth retrying.
    Transient(String),
    /// Everything else; retrying would return the same answer.
    Permanent(String),
}

impl FetchError {
    fn into_message(self) -> String {
        match self {
            Self::Transient(m) | Self::Permanent(m) => m,
        }
    }
}

impl RemoteNode {
    pub fn new(config: RemoteNodeConfig) -> Result<Self, IngestError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IngestError::Node(format!("cannot build http client: {e}")))?;

        Ok(Self {
            rpc_url: config.rpc_url.trim_end_matches('/').to_string(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            http,
            retry: RetryPolicy::new(config.retry),
        })
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
        height: Option<Height>,
    ) -> Result<Value, IngestError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.get_json_once(url, query, height).await {
                Ok(value) => return Ok(value),
                Err(FetchError::Transient(msg)) => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        warn!(attempt, url, error = %msg, "transient node error, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(IngestError::Node(msg)),
                },
                Err(err) => return Err(IngestError::Node(err.into_message())),
            }
        }
    }

    async fn get_json_once(
        &self,
        url: &str,
        query: &[(&str, String)],
        height: Option<Height>,
    ) -> Result<Value, FetchError> {
        let mut request = self.http.get(url).query(query);
        if let Some(height) = height {
            request = request.header(BLOCK_HEIGHT_HEADER, height.to_string());
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("{url}: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(FetchError::Transient(format!("{url}: HTTP {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Permanent(format!("{url}: HTTP {status}: {body}")));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Permanent(format!("{url}: invalid JSON: {e}")))
    }

    /// Calls a CometBFT JSON-RPC endpoint and unwraps the response envelope.
    async fn rpc(&self, path: &str, query: &[(&str, String)]) -> Result<Value, IngestError> {
        let url = format!("{}{path}", self.rpc_url);
        let envelope = self.get_json(&url, query, None).await?;

        if let Some(error) = envelope.get("error") {
            return Err(IngestError::Node(format!("{path}: rpc error: {error}")));
        }
        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| IngestError::Node(format!("{path}: missing rpc result")))
    }

    /// Calls an LCD REST endpoint, optionally pinned to a historical height.
    async fn lcd(
        &self,
        path: &str,
        query: &[(&str, String)],
        height: Option<Height>,
    ) -> Result<Value, IngestError> {
        let url = format!("{}{path}", self.api_url);
        self.get_json(&url, query, height).await
    }
}

#[async_trait]
impl NodeClient for RemoteNode {
    async fn latest_height(&self) -> Result<Height, IngestError> {
        let status = self.rpc("/status", &[]).await?;
        json_i64(&status, "/sync_info/latest_block_height")
    }

    async fn block(&self, height: Height) -> Result<BlockData, IngestError> {
        let result = self
            .rpc("/block", &[("height", height.to_string())])
            .await?;
        block_data_from_json(&result)
    }

    async fn block_results(&self, height: Height) -> Result<BlockResults, IngestError> {
        let result = self
            .rpc("/block_results", &[("height", height.to_string())])
            .await?;
        block_results_from_json(height, &result)
    }

    async fn txs(&self, block: &BlockData) -> Result<Vec<Tx>, IngestError> {
        if block.tx_count == 0 {
            return Ok(vec![]);
        }

        let mut txs = Vec::with_capacity(block.tx_count);
        let mut next_key: Option<String> = None;
        loop {
            let mut query = vec![("events", format!("tx.height={}", block.height))];
            if let Some(key) = &next_key {
                query.push(("pagination.key", key.clone()));
            }
            let page = self.lcd("/cosmos/tx/v1beta1/txs", &query, None).await?;
            let (mut page_txs, key) = txs_from_page(&page)?;
            txs.append(&mut page_txs);

            match key {
                Some(key) if !key.is_empty() => next_key = Some(key),
                _ => break,
            }
        }

        debug!(height = block.height, count = txs.len(), "fetched transactions");
        Ok(txs)
    }

    async fn genesis(&self) -> Result<GenesisData, IngestError> {
        let result = self.rpc("/genesis", &[]).await?;
        let genesis = result
            .get("genesis")
            .ok_or_else(|| IngestError::Node("missing genesis document".into()))?;
        serde_json::from_value(genesis.clone())
            .map_err(|e| IngestError::Node(format!("malformed genesis document: {e}")))
    }

    async fn contract_info(
        &self,
        height: Height,
        address: &str,
    ) -> Result<ContractMeta, IngestError> {
        let response = self
            .lcd(
                &format!("/cosmwasm/wasm/v1/contract/{address}"),
                &[],
                Some(height),
            )
            .await?;
        contract_meta_from_json(&response)
    }

    async fn code_info(&self, height: Height, code_id: u64) -> Result<CodeMeta, IngestError> {
        let response = self
            .lcd(&format!("/cosmwasm/wasm/v1/code/{code_id}"), &[], Some(height))
            .await?;
        code_meta_from_json(&response)
    }

    async fn stop(&self) {
        // reqwest holds no long-lived connections worth tearing down
        // explicitly; pooled sockets close on drop.
        debug!("node client stopped");
    }
}

// ─── Response parsing ─────────────────────────────────────────────────────────

fn json_str<'a>(value: &'a Value, pointer: &str) -> Result<&'a str, IngestError> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| IngestError::Node(format!("missing field {pointer}")))
}

fn json_i64(value: &Value, pointer: &str) -> Result<i64, IngestError> {
    json_str(value, pointer)?
        .parse()
        .map_err(|e| IngestError::Node(format!("invalid integer at {pointer}: {e}")))
}

fn block_data_from_json(result: &Value) -> Result<BlockData, IngestError> {
    let time = json_str(result, "/block/header/time")?;
    let timestamp = chrono::DateTime::parse_from_rfc3339(time)
        .map_err(|e| IngestError::Node(format!("invalid block time '{time}': {e}")))?
        .with_timezone(&chrono::Utc);

    let proposer = result
        .pointer("/block/header/proposer_address")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let tx_count = result
        .pointer("/block/data/txs")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);

    Ok(BlockData {
        height: json_i64(result, "/block/header/height")?,
        hash: json_str(result, "/block_id/hash")?.to_string(),
        proposer_address: proposer,
        timestamp,
        tx_count,
    })
}

fn block_results_from_json(height: Height, result: &Value) -> Result<BlockResults, IngestError> {
    fn events_at(result: &Value, key: &str) -> Result<Vec<Event>, IngestError> {
        match result.get(key) {
            None | Some(Value::Null) => Ok(vec![]),
            Some(raw) => serde_json::from_value(raw.clone())
                .map_err(|e| IngestError::Node(format!("malformed {key}: {e}"))),
        }
    }

    Ok(BlockResults {
        height,
        begin_block_events: events_at(result, "begin_block_events")?,
        end_block_events: events_at(result, "end_block_events")?,
    })
}

fn contract_meta_from_json(response: &Value) -> Result<ContractMeta, IngestError> {
    Ok(ContractMeta {
        creator: json_str(response, "/contract_info/creator")?.to_string(),
        extension: response
            .pointer("/contract_info/extension")
            .filter(|v| !v.is_null())
            .cloned(),
    })
}

fn code_meta_from_json(response: &Value) -> Result<CodeMeta, IngestError> {
    let data = response.get("data").and_then(Value::as_str).unwrap_or("");
    Ok(CodeMeta {
        creator: json_str(response, "/code_info/creator")?.to_string(),
        code_hash: json_str(response, "/code_info/data_hash")?.to_string(),
        size: base64_decoded_len(data) as i64,
    })
}

/// One page of the LCD tx query. `txs` and `tx_responses` are parallel
/// arrays; the response carries the decoded body, the execution result, or
/// both.
fn txs_from_page(page: &Value) -> Result<(Vec<Tx>, Option<String>), IngestError> {
    #[derive(Deserialize, Default)]
    struct LcdFee {
        #[serde(default)]
        amount: Vec<Coin>,
    }
    #[derive(Deserialize, Default)]
    struct LcdAuthInfo {
        #[serde(default)]
        fee: LcdFee,
    }
    #[derive(Deserialize, Default)]
    struct LcdTxBody {
        #[serde(default)]
        messages: Vec<Value>,
    }
    #[derive(Deserialize, Default)]
    struct LcdTx {
        #[serde(default)]
        body: LcdTxBody,
        #[serde(default)]
        auth_info: LcdAuthInfo,
    }
    #[derive(Deserialize)]
    struct LcdTxResponse {
        txhash: String,
        #[serde(default)]
        code: u32,
        #[serde(default)]
        height: String,
        #[serde(default)]
        gas_wanted: String,
        #[serde(default)]
        gas_used: String,
        #[serde(default)]
        timestamp: String,
        #[serde(default)]
        logs: Vec<TxLog>,
    }
    #[derive(Deserialize, Default)]
    struct Pagination {
        #[serde(default)]
        next_key: Option<String>,
    }
    #[derive(Deserialize)]
    struct Page {
        #[serde(default)]
        txs: Vec<LcdTx>,
        #[serde(default)]
        tx_responses: Vec<LcdTxResponse>,
        #[serde(default)]
        pagination: Option<Pagination>,
    }

    let page: Page = serde_json::from_value(page.clone())
        .map_err(|e| IngestError::Node(format!("malformed tx page: {e}")))?;

    if page.txs.len() != page.tx_responses.len() {
        return Err(IngestError::Node(format!(
            "tx page mismatch: {} bodies vs {} responses",
            page.txs.len(),
            page.tx_responses.len()
        )));
    }

    let mut txs = Vec::with_capacity(page.txs.len());
    for (tx, response) in page.txs.into_iter().zip(page.tx_responses) {
        let height = response.height.parse().map_err(|e| {
            IngestError::Node(format!("invalid tx height '{}': {e}", response.height))
        })?;
        txs.push(Tx {
            hash: response.txhash,
            height,
            code: response.code,
            gas_wanted: response.gas_wanted.parse().unwrap_or_default(),
            gas_used: response.gas_used.parse().unwrap_or_default(),
            fee: tx.auth_info.fee.amount,
            timestamp: response.timestamp,
            messages: tx
                .body
                .messages
                .iter()
                .filter_map(raw_message_from_value)
                .collect(),
            logs: response.logs,
        });
    }

    let next_key = page.pagination.and_then(|p| p.next_key);
    Ok((txs, next_key))
}

/// Splits a protobuf-JSON message into its type URL and body.
fn raw_message_from_value(value: &Value) -> Option<RawMessage> {
    let type_url = value.get("@type")?.as_str()?.to_string();
    let mut body = value.clone();
    body.as_object_mut()?.remove("@type");
    Some(RawMessage {
        type_url,
        value: body,
    })
}
