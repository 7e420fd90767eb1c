//! cosmindex-wasm — CosmWasm contract lifecycle handlers.
//!
//! Decodes `x/wasm` (and the tracker module's set-metadata) transaction
//! messages into a closed [`WasmMsg`] enum and turns them into contract
//! records: code uploads, instantiations, executions, migrations, and admin
//! changes. Register [`WasmMessageHandler`] (and optionally
//! [`WasmGenesisHandler`]) on the core dispatcher.

pub mod genesis;
pub mod handler;
pub mod msg;

pub use genesis::WasmGenesisHandler;
pub use handler::WasmMessageHandler;
pub use msg::WasmMsg;
