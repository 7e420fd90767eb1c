//! PostgreSQL store backend.
//!
//! Uses `sqlx` with connection pooling; safe for concurrent use by every
//! worker. The schema is created on first connect. Inserts rely on
//! natural-key `ON CONFLICT ... DO NOTHING`, which is what makes two workers
//! racing on the same height harmless: both attempt the same writes, at most
//! one wins each conflict, both succeed.
//!
//! # Feature Flag
//! Requires the `postgres` feature:
//! ```toml
//! cosmindex-storage = { version = "0.1", features = ["postgres"] }
//! ```

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};

use cosmindex_core::records::{
    ContractMetadataRecord, RewardCalculationRecord, RewardDistributionRecord, WasmCodeRecord,
    WasmContractRecord, WasmExecuteRecord,
};
use cosmindex_core::types::{Block, Height};
use cosmindex_core::{IngestError, Store};

// ─── Connection options ───────────────────────────────────────────────────────

/// Pool options for the Postgres store.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: u32,
    /// Minimum number of idle connections to keep open (default: 1)
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 30)
    pub connect_timeout_secs: u64,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 30,
        }
    }
}

// ─── PostgresStore ────────────────────────────────────────────────────────────

/// PostgreSQL-backed store for all ingested records.
///
/// Cheaply cloneable — wraps a connection pool internally.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect and initialize the schema.
    ///
    /// The URL follows libpq convention:
    /// `postgresql://[user[:password]@][host][:port][/dbname]`
    pub async fn connect(database_url: &str) -> Result<Self, IngestError> {
        Self::connect_with_options(database_url, PostgresOptions::default()).await
    }

    /// Connect with custom pool options.
    pub async fn connect_with_options(
        database_url: &str,
        opts: PostgresOptions,
    ) -> Result<Self, IngestError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .min_connections(opts.min_connections)
            .acquire_timeout(std::time::Duration::from_secs(opts.connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| IngestError::Store(format!("postgres connect: {e}")))?;

        let store = Self { pool };
        store.init_schema().await?;
        info!("PostgresStore connected and schema initialized");
        Ok(store)
    }

    /// Create tables and indexes if they don't already exist.
    async fn init_schema(&self) -> Result<(), IngestError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS block (
                height           BIGINT      PRIMARY KEY,
                hash             TEXT        NOT NULL,
                num_txs          INTEGER     NOT NULL DEFAULT 0,
                total_gas        BIGINT      NOT NULL DEFAULT 0,
                proposer_address TEXT,
                timestamp        TIMESTAMPTZ NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS wasm_code (
                code_id   BIGINT PRIMARY KEY,
                sender    TEXT   NOT NULL,
                code_hash TEXT   NOT NULL,
                size      BIGINT NOT NULL DEFAULT 0,
                tx_hash   TEXT   NOT NULL,
                height    BIGINT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS wasm_contract (
                contract_address     TEXT        PRIMARY KEY,
                sender               TEXT        NOT NULL,
                creator              TEXT        NOT NULL,
                admin                TEXT        NOT NULL DEFAULT '',
                code_id              BIGINT      NOT NULL,
                label                TEXT        NOT NULL DEFAULT '',
                raw_contract_message JSONB       NOT NULL DEFAULT '{}'::JSONB,
                funds                JSONB       NOT NULL DEFAULT '[]'::JSONB,
                tx_hash              TEXT        NOT NULL,
                instantiated_at      TIMESTAMPTZ NOT NULL,
                height               BIGINT      NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS wasm_execute_contract (
                id                   BIGSERIAL   PRIMARY KEY,
                sender               TEXT        NOT NULL,
                contract_address     TEXT        NOT NULL,
                raw_contract_message JSONB       NOT NULL DEFAULT '{}'::JSONB,
                funds                JSONB       NOT NULL DEFAULT '[]'::JSONB,
                gas_used             BIGINT      NOT NULL DEFAULT 0,
                fees                 JSONB       NOT NULL DEFAULT '[]'::JSONB,
                tx_hash              TEXT        NOT NULL,
                executed_at          TIMESTAMPTZ NOT NULL,
                height               BIGINT      NOT NULL
            )",
            // gas_consumed is TEXT: it is an unsigned 64-bit counter and
            // BIGINT cannot represent the full range.
            "CREATE TABLE IF NOT EXISTS contract_reward (
                contract_address           TEXT    NOT NULL,
                reward_address             TEXT    NOT NULL,
                developer_address          TEXT    NOT NULL DEFAULT '',
                gas_consumed               TEXT    NOT NULL DEFAULT '0',
                contract_rewards           JSONB   NOT NULL DEFAULT '[]'::JSONB,
                inflation_rewards          JSONB   NOT NULL DEFAULT '[]'::JSONB,
                distributed_rewards        JSONB,
                leftover_rewards           JSONB,
                collect_premium            BOOLEAN NOT NULL DEFAULT FALSE,
                gas_rebate_to_user         BOOLEAN NOT NULL DEFAULT FALSE,
                premium_percentage_charged BIGINT  NOT NULL DEFAULT 0,
                metadata                   TEXT    NOT NULL DEFAULT '',
                height                     BIGINT  NOT NULL,
                PRIMARY KEY (contract_address, reward_address, height)
            )",
            "CREATE TABLE IF NOT EXISTS contract_metadata (
                id                         BIGSERIAL   PRIMARY KEY,
                contract_address           TEXT        NOT NULL,
                reward_address             TEXT        NOT NULL DEFAULT '',
                developer_address          TEXT        NOT NULL DEFAULT '',
                collect_premium            BOOLEAN     NOT NULL DEFAULT FALSE,
                gas_rebate_to_user         BOOLEAN     NOT NULL DEFAULT FALSE,
                premium_percentage_charged BIGINT      NOT NULL DEFAULT 0,
                metadata                   JSONB       NOT NULL DEFAULT '{}'::JSONB,
                tx_hash                    TEXT        NOT NULL,
                saved_at                   TIMESTAMPTZ NOT NULL,
                height                     BIGINT      NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_contract_reward_reward_height
             ON contract_reward(reward_address, height)",
            "CREATE INDEX IF NOT EXISTS idx_wasm_execute_contract_address
             ON wasm_execute_contract(contract_address, height DESC)",
            "CREATE INDEX IF NOT EXISTS idx_contract_metadata_address
             ON contract_metadata(contract_address, height DESC)",
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| IngestError::Store(e.to_string()))?;
        }

        debug!("PostgresStore schema initialized");
        Ok(())
    }

    /// Get the underlying connection pool (for custom queries).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn coins_json<T: serde::Serialize>(coins: &T) -> Result<serde_json::Value, IngestError> {
        serde_json::to_value(coins).map_err(|e| IngestError::Store(format!("serialize coins: {e}")))
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn has_block(&self, height: Height) -> Result<bool, IngestError> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM block WHERE height = $1)")
                .bind(height)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| IngestError::Store(e.to_string()))?;
        Ok(exists.0)
    }

    async fn save_block(&self, block: &Block) -> Result<(), IngestError> {
        sqlx::query(
            "INSERT INTO block (height, hash, num_txs, total_gas, proposer_address, timestamp)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (height) DO NOTHING",
        )
        .bind(block.height)
        .bind(&block.hash)
        .bind(block.num_txs)
        .bind(block.total_gas as i64)
        .bind(&block.proposer_address)
        .bind(block.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Store(format!("save block: {e}")))?;
        Ok(())
    }

    async fn save_wasm_code(&self, code: &WasmCodeRecord) -> Result<(), IngestError> {
        sqlx::query(
            "INSERT INTO wasm_code (code_id, sender, code_hash, size, tx_hash, height)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (code_id) DO NOTHING",
        )
        .bind(code.code_id as i64)
        .bind(&code.sender)
        .bind(&code.code_hash)
        .bind(code.size)
        .bind(&code.tx_hash)
        .bind(code.height)
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Store(format!("save wasm code: {e}")))?;
        Ok(())
    }

    async fn save_wasm_contract(
        &self,
        contract: &WasmContractRecord,
    ) -> Result<(), IngestError> {
        sqlx::query(
            "INSERT INTO wasm_contract
                (contract_address, sender, creator, admin, code_id, label,
                 raw_contract_message, funds, tx_hash, instantiated_at, height)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (contract_address) DO NOTHING",
        )
        .bind(&contract.contract_address)
        .bind(&contract.sender)
        .bind(&contract.creator)
        .bind(&contract.admin)
        .bind(contract.code_id as i64)
        .bind(&contract.label)
        .bind(&contract.raw_msg)
        .bind(Self::coins_json(&contract.funds)?)
        .bind(&contract.tx_hash)
        .bind(contract.instantiated_at)
        .bind(contract.height)
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Store(format!("save wasm contract: {e}")))?;
        Ok(())
    }

    async fn save_wasm_execute_contract(
        &self,
        execute: &WasmExecuteRecord,
    ) -> Result<(), IngestError> {
        sqlx::query(
            "INSERT INTO wasm_execute_contract
                (sender, contract_address, raw_contract_message, funds,
                 gas_used, fees, tx_hash, executed_at, height)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&execute.sender)
        .bind(&execute.contract_address)
        .bind(&execute.raw_msg)
        .bind(Self::coins_json(&execute.funds)?)
        .bind(execute.gas_used)
        .bind(Self::coins_json(&execute.fees)?)
        .bind(&execute.tx_hash)
        .bind(execute.executed_at)
        .bind(execute.height)
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Store(format!("save wasm execute contract: {e}")))?;
        Ok(())
    }

    async fn update_contract_admin(
        &self,
        _sender: &str,
        contract_address: &str,
        new_admin: &str,
    ) -> Result<(), IngestError> {
        sqlx::query("UPDATE wasm_contract SET admin = $1 WHERE contract_address = $2")
            .bind(new_admin)
            .bind(contract_address)
            .execute(&self.pool)
            .await
            .map_err(|e| IngestError::Store(format!("update contract admin: {e}")))?;
        Ok(())
    }

    async fn update_contract_on_migrate(
        &self,
        _sender: &str,
        contract_address: &str,
        code_id: u64,
        raw_msg: &serde_json::Value,
    ) -> Result<(), IngestError> {
        sqlx::query(
            "UPDATE wasm_contract SET code_id = $1, raw_contract_message = $2
             WHERE contract_address = $3",
        )
        .bind(code_id as i64)
        .bind(raw_msg)
        .bind(contract_address)
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Store(format!("update contract on migrate: {e}")))?;
        Ok(())
    }

    async fn save_contract_reward_calculation(
        &self,
        calculation: &RewardCalculationRecord,
    ) -> Result<(), IngestError> {
        sqlx::query(
            "INSERT INTO contract_reward
                (contract_address, reward_address, developer_address, gas_consumed,
                 contract_rewards, inflation_rewards, collect_premium,
                 gas_rebate_to_user, premium_percentage_charged, metadata, height)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (contract_address, reward_address, height) DO NOTHING",
        )
        .bind(&calculation.contract_address)
        .bind(&calculation.reward_address)
        .bind(&calculation.developer_address)
        .bind(calculation.gas_consumed.to_string())
        .bind(Self::coins_json(&calculation.contract_rewards)?)
        .bind(Self::coins_json(&calculation.inflation_rewards)?)
        .bind(calculation.collect_premium)
        .bind(calculation.gas_rebate_to_user)
        .bind(calculation.premium_percentage_charged as i64)
        .bind(&calculation.metadata)
        .bind(calculation.height)
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Store(format!("save reward calculation: {e}")))?;
        Ok(())
    }

    async fn save_contract_reward_distribution(
        &self,
        distribution: &RewardDistributionRecord,
    ) -> Result<(), IngestError> {
        let distributed = Self::coins_json(&distribution.distributed_rewards)?;
        let leftover = Self::coins_json(&distribution.leftover_rewards)?;

        let updated = sqlx::query(
            "UPDATE contract_reward
             SET distributed_rewards = $1, leftover_rewards = $2
             WHERE reward_address = $3 AND height = $4",
        )
        .bind(&distributed)
        .bind(&leftover)
        .bind(&distribution.reward_address)
        .bind(distribution.height)
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Store(format!("save reward distribution: {e}")))?
        .rows_affected();

        if updated > 0 {
            return Ok(());
        }

        // Some event shapes carry no reward address; fall back to the
        // contract address key.
        let updated = sqlx::query(
            "UPDATE contract_reward
             SET distributed_rewards = $1, leftover_rewards = $2
             WHERE contract_address = $3 AND height = $4",
        )
        .bind(&distributed)
        .bind(&leftover)
        .bind(&distribution.contract_address)
        .bind(distribution.height)
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Store(format!("save reward distribution: {e}")))?
        .rows_affected();

        if updated == 0 {
            debug!(
                reward_address = %distribution.reward_address,
                height = distribution.height,
                "no matching reward calculation, distribution ignored"
            );
        }
        Ok(())
    }

    async fn save_contract_metadata(
        &self,
        metadata: &ContractMetadataRecord,
    ) -> Result<(), IngestError> {
        sqlx::query(
            "INSERT INTO contract_metadata
                (contract_address, reward_address, developer_address, collect_premium,
                 gas_rebate_to_user, premium_percentage_charged, metadata, tx_hash,
                 saved_at, height)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&metadata.contract_address)
        .bind(&metadata.reward_address)
        .bind(&metadata.developer_address)
        .bind(metadata.collect_premium)
        .bind(metadata.gas_rebate_to_user)
        .bind(metadata.premium_percentage_charged as i64)
        .bind(&metadata.metadata)
        .bind(&metadata.tx_hash)
        .bind(metadata.saved_at)
        .bind(metadata.height)
        .execute(&self.pool)
        .await
        .map_err(|e| IngestError::Store(format!("save contract metadata: {e}")))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
