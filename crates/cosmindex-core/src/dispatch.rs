//! Handler traits + dispatcher.
//!
//! The dispatcher is the seam between the scheduling core and the domain
//! handlers: workers hand it raw messages and block events, registered
//! handlers turn them into records. Which handlers exist is decided by the
//! binary at wiring time, not here.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::IngestError;
use crate::node::{GenesisData, NodeClient};
use crate::store::Store;
use crate::types::{BlockPhase, Event, Height, RawMessage, Tx};

/// Shared handles passed into every handler invocation.
#[derive(Clone)]
pub struct DispatchContext {
    pub node: Arc<dyn NodeClient>,
    pub store: Arc<dyn Store>,
}

/// Handles messages of successful transactions. A handler inspects the
/// message's type URL and ignores kinds it does not know.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Called once per message, with `index` being the message's position
    /// inside the transaction (needed to correlate the per-message event log).
    async fn handle_message(
        &self,
        index: usize,
        msg: &RawMessage,
        tx: &Tx,
        ctx: &DispatchContext,
    ) -> Result<(), IngestError>;
}

/// Handles block-transition events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called once per begin/end-block event with the height of the block
    /// the event was observed in.
    async fn handle_event(
        &self,
        event: &Event,
        phase: BlockPhase,
        height: Height,
        ctx: &DispatchContext,
    ) -> Result<(), IngestError>;
}

/// Handles the genesis state (height 0).
#[async_trait]
pub trait GenesisHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle_genesis(
        &self,
        genesis: &GenesisData,
        ctx: &DispatchContext,
    ) -> Result<(), IngestError>;
}

/// Registry of message/event/genesis handlers.
#[derive(Default)]
pub struct Dispatcher {
    message_handlers: Vec<Arc<dyn MessageHandler>>,
    event_handlers: Vec<Arc<dyn EventHandler>>,
    genesis_handlers: Vec<Arc<dyn GenesisHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_message(&mut self, handler: Arc<dyn MessageHandler>) {
        self.message_handlers.push(handler);
    }

    pub fn on_event(&mut self, handler: Arc<dyn EventHandler>) {
        self.event_handlers.push(handler);
    }

    pub fn on_genesis(&mut self, handler: Arc<dyn GenesisHandler>) {
        self.genesis_handlers.push(handler);
    }

    /// Dispatches one transaction message to all message handlers.
    /// The first handler error aborts this message (the worker logs it and
    /// moves to the next message).
    pub async fn dispatch_message(
        &self,
        index: usize,
        msg: &RawMessage,
        tx: &Tx,
        ctx: &DispatchContext,
    ) -> Result<(), IngestError> {
        for handler in &self.message_handlers {
            handler
                .handle_message(index, msg, tx, ctx)
                .await
                .map_err(|e| IngestError::Handler {
                    handler: handler.name().to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Dispatches one block event to all event handlers.
    pub async fn dispatch_event(
        &self,
        event: &Event,
        phase: BlockPhase,
        height: Height,
        ctx: &DispatchContext,
    ) -> Result<(), IngestError> {
        for handler in &self.event_handlers {
            handler
                .handle_event(event, phase, height, ctx)
                .await
                .map_err(|e| IngestError::Handler {
                    handler: handler.name().to_string(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    /// Runs every genesis handler. A failing handler is logged and does not
    /// stop the remaining handlers — genesis is processed best-effort, it is
    /// never re-enqueued.
    pub async fn dispatch_genesis(&self, genesis: &GenesisData, ctx: &DispatchContext) {
        for handler in &self.genesis_handlers {
            if let Err(err) = handler.handle_genesis(genesis, ctx).await {
                tracing::error!(
                    handler = handler.name(),
                    chain_id = %genesis.chain_id,
                    %err,
                    "genesis handling failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::node::{BlockData, BlockResults, CodeMeta, ContractMeta};

    struct CountingHandler(Arc<AtomicU32>);

    #[async_trait]
    impl MessageHandler for CountingHandler {
        fn name(&self) -> &'static str {
            "counting"
        }
        async fn handle_message(
            &self,
            _index: usize,
            _msg: &RawMessage,
            _tx: &Tx,
            _ctx: &DispatchContext,
        ) -> Result<(), IngestError> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    struct NoopNode;

    #[async_trait]
    impl NodeClient for NoopNode {
        async fn latest_height(&self) -> Result<Height, IngestError> {
            Ok(0)
        }
        async fn block(&self, _height: Height) -> Result<BlockData, IngestError> {
            Err(IngestError::Node("not implemented".into()))
        }
        async fn block_results(&self, _height: Height) -> Result<BlockResults, IngestError> {
            Err(IngestError::Node("not implemented".into()))
        }
        async fn txs(&self, _block: &BlockData) -> Result<Vec<Tx>, IngestError> {
            Ok(vec![])
        }
        async fn genesis(&self) -> Result<GenesisData, IngestError> {
            Err(IngestError::Node("not implemented".into()))
        }
        async fn contract_info(
            &self,
            _height: Height,
            _address: &str,
        ) -> Result<ContractMeta, IngestError> {
            Ok(ContractMeta::default())
        }
        async fn code_info(&self, _height: Height, _code_id: u64) -> Result<CodeMeta, IngestError> {
            Ok(CodeMeta::default())
        }
        async fn stop(&self) {}
    }

    struct NoopStore;

    #[async_trait]
    impl Store for NoopStore {
        async fn has_block(&self, _height: Height) -> Result<bool, IngestError> {
            Ok(false)
        }
        async fn save_block(&self, _block: &crate::types::Block) -> Result<(), IngestError> {
            Ok(())
        }
        async fn save_wasm_code(
            &self,
            _code: &crate::records::WasmCodeRecord,
        ) -> Result<(), IngestError> {
            Ok(())
        }
        async fn save_wasm_contract(
            &self,
            _contract: &crate::records::WasmContractRecord,
        ) -> Result<(), IngestError> {
            Ok(())
        }
        async fn save_wasm_execute_contract(
            &self,
            _execute: &crate::records::WasmExecuteRecord,
        ) -> Result<(), IngestError> {
            Ok(())
        }
        async fn update_contract_admin(
            &self,
            _sender: &str,
            _contract_address: &str,
            _new_admin: &str,
        ) -> Result<(), IngestError> {
            Ok(())
        }
        async fn update_contract_on_migrate(
            &self,
            _sender: &str,
            _contract_address: &str,
            _code_id: u64,
            _raw_msg: &serde_json::Value,
        ) -> Result<(), IngestError> {
            Ok(())
        }
        async fn save_contract_reward_calculation(
            &self,
            _calculation: &crate::records::RewardCalculationRecord,
        ) -> Result<(), IngestError> {
            Ok(())
        }
        async fn save_contract_reward_distribution(
            &self,
            _distribution: &crate::records::RewardDistributionRecord,
        ) -> Result<(), IngestError> {
            Ok(())
        }
        async fn save_contract_metadata(
            &self,
            _metadata: &crate::records::ContractMetadataRecord,
        ) -> Result<(), IngestError> {
            Ok(())
        }
        async fn close(&self) {}
    }

    fn dummy_ctx() -> DispatchContext {
        DispatchContext {
            node: Arc::new(NoopNode),
            store: Arc::new(NoopStore),
        }
    }

    fn dummy_tx() -> Tx {
        Tx {
            hash: "AA".into(),
            height: 1,
            code: 0,
            gas_wanted: 0,
            gas_used: 0,
            fee: vec![],
            timestamp: "2023-01-01T00:00:00Z".into(),
            messages: vec![],
            logs: vec![],
        }
    }

    #[tokio::test]
    async fn message_dispatch_reaches_all_handlers() {
        let count = Arc::new(AtomicU32::new(0));
        let mut dispatcher = Dispatcher::new();
        dispatcher.on_message(Arc::new(CountingHandler(count.clone())));
        dispatcher.on_message(Arc::new(CountingHandler(count.clone())));

        let msg = RawMessage {
            type_url: "/cosmwasm.wasm.v1.MsgExecuteContract".into(),
            value: serde_json::Value::Null,
        };
        dispatcher
            .dispatch_message(0, &msg, &dummy_tx(), &dummy_ctx())
            .await
            .unwrap();

        assert_eq!(count.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn handler_error_carries_handler_name() {
        struct Failing;
        #[async_trait]
        impl MessageHandler for Failing {
            fn name(&self) -> &'static str {
                "failing"
            }
            async fn handle_message(
                &self,
                _index: usize,
                _msg: &RawMessage,
                _tx: &Tx,
                _ctx: &DispatchContext,
            ) -> Result<(), IngestError> {
                Err(IngestError::Decode("boom".into()))
            }
        }

        let mut dispatcher = Dispatcher::new();
        dispatcher.on_message(Arc::new(Failing));
        let msg = RawMessage {
            type_url: "/x".into(),
            value: serde_json::Value::Null,
        };
        let err = dispatcher
            .dispatch_message(0, &msg, &dummy_tx(), &dummy_ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Handler { handler, .. } if handler == "failing"));
    }
}
