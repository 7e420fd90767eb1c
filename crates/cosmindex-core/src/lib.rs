//! cosmindex-core — the ingestion engine for a Cosmos-SDK chain data exporter.
//!
//! # Architecture
//!
//! ```text
//! Supervisor
//!     ├── Scheduler producers (genesis / backfill / live tail)
//!     │        │
//!     │        ▼
//!     ├── HeightQueue  (bounded, multi-producer multi-consumer)
//!     │        │
//!     │        ▼
//!     └── Worker pool ──▶ NodeClient (fetch) ──▶ Dispatcher (classify)
//!                                                     │
//!                                                     ▼
//!                                                Store (idempotent writes)
//! ```
//!
//! Every height is processed at most once per run (`Store::has_block` guards
//! re-processing) and never lost: a failed height loops back onto the queue.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod node;
pub mod queue;
pub mod records;
pub mod scheduler;
pub mod store;
pub mod supervisor;
pub mod types;
pub mod worker;

pub use config::IngestConfig;
pub use context::IngestContext;
pub use dispatch::{DispatchContext, Dispatcher, EventHandler, GenesisHandler, MessageHandler};
pub use error::IngestError;
pub use node::{BlockData, BlockResults, CodeMeta, ContractMeta, GenesisData, NodeClient};
pub use queue::{EnqueueError, HeightQueue, DEFAULT_QUEUE_CAPACITY};
pub use records::{
    ContractMetadataRecord, RewardCalculationRecord, RewardCoin, RewardDistributionRecord,
    WasmCodeRecord, WasmContractRecord, WasmExecuteRecord,
};
pub use store::Store;
pub use supervisor::Supervisor;
pub use types::{Block, BlockPhase, Coin, Event, EventAttribute, Height, RawMessage, Tx, TxLog};
pub use worker::Worker;
