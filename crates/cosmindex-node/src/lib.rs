//! cosmindex-node — the upstream node client.
//!
//! [`RemoteNode`] implements [`NodeClient`](cosmindex_core::NodeClient) over
//! two standard endpoints of a Cosmos-SDK chain:
//! - the CometBFT JSON-RPC (`/status`, `/block`, `/block_results`,
//!   `/genesis`) for consensus-level data, and
//! - the LCD REST API for transactions and wasm queries (which support
//!   historical state via the `x-cosmos-block-height` header).
//!
//! Transient transport errors are retried with bounded exponential backoff;
//! everything else surfaces to the worker, whose re-enqueue loop is the real
//! durability mechanism.

pub mod remote;
pub mod retry;

pub use remote::{RemoteNode, RemoteNodeConfig};
pub use retry::{RetryConfig, RetryPolicy};
