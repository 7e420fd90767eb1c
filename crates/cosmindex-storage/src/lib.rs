//! cosmindex-storage — pluggable [`Store`](cosmindex_core::Store) backends.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - `postgres` — PostgreSQL via `sqlx` (feature: `postgres`)

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
