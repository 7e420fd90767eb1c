//! The worker — the unit of concurrency of the ingestion engine.
//!
//! Each worker loops: dequeue a height, skip it when the store already has
//! its block, otherwise fetch → dispatch → persist. A failure anywhere in
//! that sequence puts the height back on the queue and the worker moves on;
//! no height is ever dropped. Per-message and per-event failures inside an
//! otherwise healthy block are logged and skipped without failing the height.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::IngestConfig;
use crate::context::IngestContext;
use crate::dispatch::{DispatchContext, Dispatcher};
use crate::error::IngestError;
use crate::node::{BlockData, BlockResults, GenesisData, NodeClient};
use crate::queue::{EnqueueError, HeightQueue};
use crate::store::Store;
use crate::types::{sum_tx_gas, Block, BlockPhase, Height, Tx};

/// A queue consumer that exports one height at a time.
pub struct Worker {
    index: usize,
    queue: HeightQueue,
    config: Arc<IngestConfig>,
    node: Arc<dyn NodeClient>,
    store: Arc<dyn Store>,
    dispatcher: Arc<Dispatcher>,
    /// Failed heights waiting for a free queue slot. Flushed with a
    /// non-blocking send at the top of every loop iteration, so sustained
    /// failures never block the worker and never spawn extra tasks.
    pending: VecDeque<Height>,
}

impl Worker {
    pub fn new(ctx: &IngestContext, queue: HeightQueue, index: usize) -> Self {
        Self {
            index,
            queue,
            config: ctx.config.clone(),
            node: ctx.node.clone(),
            store: ctx.store.clone(),
            dispatcher: ctx.dispatcher.clone(),
            pending: VecDeque::new(),
        }
    }

    /// Consumes heights until the queue is closed and drained.
    pub async fn run(mut self) {
        debug!(worker = self.index, "worker started");

        loop {
            self.flush_pending();

            let Some(height) = self.queue.recv().await else {
                break;
            };

            if let Err(err) = self.process_if_not_exists(height).await {
                error!(height, %err, "block processing failed, re-enqueueing");
                self.requeue(height);
            }
        }

        // Queue closed mid-failure: surface what could not be re-enqueued.
        for height in &self.pending {
            warn!(height, "height failed and the queue is closed; re-run will pick it up");
        }
        debug!(worker = self.index, "worker stopped");
    }

    fn requeue(&mut self, height: Height) {
        match self.queue.try_send(height) {
            Ok(()) => {}
            Err(EnqueueError::Full(h)) | Err(EnqueueError::Closed(h)) => {
                self.pending.push_back(h);
            }
        }
    }

    fn flush_pending(&mut self) {
        while let Some(height) = self.pending.front().copied() {
            match self.queue.try_send(height) {
                Ok(()) => {
                    self.pending.pop_front();
                }
                Err(EnqueueError::Full(_)) | Err(EnqueueError::Closed(_)) => break,
            }
        }
    }

    /// Exports the block at `height` unless the store already has it.
    /// The existence check is what makes re-runs and racing workers cheap:
    /// an already-exported height never touches the node again.
    pub async fn process_if_not_exists(&self, height: Height) -> Result<(), IngestError> {
        if self.store.has_block(height).await? {
            debug!(height, "skipping already exported block");
            return Ok(());
        }
        self.process(height).await
    }

    /// Fetches and exports the block at `height`. Height 0 processes the
    /// genesis state instead.
    pub async fn process(&self, height: Height) -> Result<(), IngestError> {
        if height == 0 {
            return self.process_genesis().await;
        }

        debug!(height, "processing block");

        let block = self.node.block(height).await?;
        let results = self.node.block_results(height).await?;
        let txs = self.node.txs(&block).await?;

        self.export_block(&block, &results, &txs).await
    }

    async fn process_genesis(&self) -> Result<(), IngestError> {
        let genesis = match &self.config.genesis_file_path {
            Some(path) => read_genesis_file(path)?,
            None => self.node.genesis().await?,
        };

        debug!(chain_id = %genesis.chain_id, "processing genesis state");
        self.dispatcher
            .dispatch_genesis(&genesis, &self.dispatch_context())
            .await;
        Ok(())
    }

    /// Persists the block row first — its existence is the idempotency
    /// marker every other worker and every re-run checks — then dispatches
    /// block events and transaction messages.
    async fn export_block(
        &self,
        block: &BlockData,
        results: &BlockResults,
        txs: &[Tx],
    ) -> Result<(), IngestError> {
        self.store
            .save_block(&Block::from_data(block, sum_tx_gas(txs)))
            .await?;

        self.export_events(block.height, results).await;
        self.export_transactions(block.height, txs).await;
        Ok(())
    }

    /// Dispatches begin/end-block events. A failing event is logged with its
    /// type and skipped; its siblings still run.
    async fn export_events(&self, height: Height, results: &BlockResults) {
        let ctx = self.dispatch_context();
        let phases = [
            (BlockPhase::BeginBlock, &results.begin_block_events),
            (BlockPhase::EndBlock, &results.end_block_events),
        ];
        for (phase, events) in phases {
            for event in events {
                if let Err(err) = self
                    .dispatcher
                    .dispatch_event(event, phase, height, &ctx)
                    .await
                {
                    error!(height, event_type = %event.kind, %phase, %err, "event handling failed, skipping");
                }
            }
        }
    }

    /// Dispatches the messages of every successful transaction. Failed
    /// transactions contribute nothing; a failing message is logged with its
    /// tx hash and skipped without aborting its siblings.
    async fn export_transactions(&self, height: Height, txs: &[Tx]) {
        let ctx = self.dispatch_context();
        for tx in txs {
            if !tx.successful() {
                debug!(height, tx_hash = %tx.hash, code = tx.code, "skipping failed transaction");
                continue;
            }
            for (index, msg) in tx.messages.iter().enumerate() {
                if let Err(err) = self
                    .dispatcher
                    .dispatch_message(index, msg, tx, &ctx)
                    .await
                {
                    error!(height, tx_hash = %tx.hash, msg_type = %msg.type_url, %err, "message handling failed, skipping");
                }
            }
        }
    }

    fn dispatch_context(&self) -> DispatchContext {
        DispatchContext {
            node: self.node.clone(),
            store: self.store.clone(),
        }
    }
}

/// Reads a genesis document from a local file.
fn read_genesis_file(path: &Path) -> Result<GenesisData, IngestError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| IngestError::Config(format!("cannot read genesis file {path:?}: {e}")))?;
    serde_json::from_str(&contents)
        .map_err(|e| IngestError::Config(format!("cannot parse genesis file {path:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::dispatch::MessageHandler;
    use crate::node::{CodeMeta, ContractMeta};
    use crate::records::*;
    use crate::types::RawMessage;

    /// Node stub: serves a fixed block with the given txs, optionally failing
    /// the first `fail_times` block fetches.
    struct StubNode {
        txs: Vec<Tx>,
        fail_times: AtomicU32,
        calls: AtomicU32,
    }

    impl StubNode {
        fn new(txs: Vec<Tx>) -> Self {
            Self {
                txs,
                fail_times: AtomicU32::new(0),
                calls: AtomicU32::new(0),
            }
        }

        fn failing_first(txs: Vec<Tx>, times: u32) -> Self {
            let node = Self::new(txs);
            node.fail_times.store(times, Ordering::SeqCst);
            node
        }
    }

    #[async_trait]
    impl NodeClient for StubNode {
        async fn latest_height(&self) -> Result<Height, IngestError> {
            Ok(100)
        }
        async fn block(&self, height: Height) -> Result<BlockData, IngestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .fail_times
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(IngestError::Node("stubbed fetch failure".into()));
            }
            Ok(BlockData {
                height,
                hash: format!("HASH{height}"),
                proposer_address: None,
                timestamp: Utc::now(),
                tx_count: self.txs.len(),
            })
        }
        async fn block_results(&self, height: Height) -> Result<BlockResults, IngestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(BlockResults {
                height,
                ..Default::default()
            })
        }
        async fn txs(&self, _block: &BlockData) -> Result<Vec<Tx>, IngestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.txs.clone())
        }
        async fn genesis(&self) -> Result<GenesisData, IngestError> {
            Err(IngestError::Node("no genesis".into()))
        }
        async fn contract_info(
            &self,
            _height: Height,
            _address: &str,
        ) -> Result<ContractMeta, IngestError> {
            Ok(ContractMeta::default())
        }
        async fn code_info(&self, _h: Height, _id: u64) -> Result<CodeMeta, IngestError> {
            Ok(CodeMeta::default())
        }
        async fn stop(&self) {}
    }

    /// Store double recording only what the worker tests care about.
    #[derive(Default)]
    struct RecordingStore {
        blocks: Mutex<HashMap<Height, Block>>,
    }

    impl RecordingStore {
        fn with_block(height: Height) -> Self {
            let store = Self::default();
            store.blocks.lock().unwrap().insert(
                height,
                Block {
                    height,
                    hash: "seeded".into(),
                    num_txs: 0,
                    total_gas: 0,
                    proposer_address: None,
                    timestamp: Utc::now(),
                },
            );
            store
        }

        fn block_count(&self) -> usize {
            self.blocks.lock().unwrap().len()
        }

        fn has(&self, height: Height) -> bool {
            self.blocks.lock().unwrap().contains_key(&height)
        }
    }

    #[async_trait]
    impl Store for RecordingStore {
        async fn has_block(&self, height: Height) -> Result<bool, IngestError> {
            Ok(self.blocks.lock().unwrap().contains_key(&height))
        }
        async fn save_block(&self, block: &Block) -> Result<(), IngestError> {
            self.blocks
                .lock()
                .unwrap()
                .entry(block.height)
                .or_insert_with(|| block.clone());
            Ok(())
        }
        async fn save_wasm_code(&self, _c: &WasmCodeRecord) -> Result<(), IngestError> {
            Ok(())
        }
        async fn save_wasm_contract(&self, _c: &WasmContractRecord) -> Result<(), IngestError> {
            Ok(())
        }
        async fn save_wasm_execute_contract(
            &self,
            _e: &WasmExecuteRecord,
        ) -> Result<(), IngestError> {
            Ok(())
        }
        async fn update_contract_admin(
            &self,
            _s: &str,
            _c: &str,
            _a: &str,
        ) -> Result<(), IngestError> {
            Ok(())
        }
        async fn update_contract_on_migrate(
            &self,
            _s: &str,
            _c: &str,
            _id: u64,
            _m: &serde_json::Value,
        ) -> Result<(), IngestError> {
            Ok(())
        }
        async fn save_contract_reward_calculation(
            &self,
            _c: &RewardCalculationRecord,
        ) -> Result<(), IngestError> {
            Ok(())
        }
        async fn save_contract_reward_distribution(
            &self,
            _d: &RewardDistributionRecord,
        ) -> Result<(), IngestError> {
            Ok(())
        }
        async fn save_contract_metadata(
            &self,
            _m: &ContractMetadataRecord,
        ) -> Result<(), IngestError> {
            Ok(())
        }
        async fn close(&self) {}
    }

    fn make_ctx(node: Arc<StubNode>, store: Arc<RecordingStore>) -> IngestContext {
        IngestContext {
            config: Arc::new(IngestConfig::default()),
            node,
            store,
            dispatcher: Arc::new(Dispatcher::new()),
        }
    }

    fn make_tx(code: u32, msgs: Vec<RawMessage>) -> Tx {
        Tx {
            hash: "TX1".into(),
            height: 5,
            code,
            gas_wanted: 0,
            gas_used: 90_000,
            fee: vec![],
            timestamp: "2023-01-01T00:00:00Z".into(),
            messages: msgs,
            logs: vec![],
        }
    }

    #[tokio::test]
    async fn existing_block_short_circuits_node() {
        let node = Arc::new(StubNode::new(vec![]));
        let store = Arc::new(RecordingStore::with_block(5));
        let ctx = make_ctx(node.clone(), store.clone());
        let worker = Worker::new(&ctx, HeightQueue::new(4), 0);

        worker.process_if_not_exists(5).await.unwrap();

        assert_eq!(node.calls.load(Ordering::SeqCst), 0, "node must not be hit");
        assert_eq!(store.block_count(), 1);
    }

    #[tokio::test]
    async fn processing_twice_stores_once() {
        let node = Arc::new(StubNode::new(vec![]));
        let store = Arc::new(RecordingStore::default());
        let ctx = make_ctx(node, store.clone());
        let worker = Worker::new(&ctx, HeightQueue::new(4), 0);

        worker.process_if_not_exists(8).await.unwrap();
        worker.process_if_not_exists(8).await.unwrap();

        assert_eq!(store.block_count(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_is_retried_from_the_queue() {
        let node = Arc::new(StubNode::failing_first(vec![], 1));
        let store = Arc::new(RecordingStore::default());
        let ctx = make_ctx(node, store.clone());

        let queue = HeightQueue::new(4);
        let handle = tokio::spawn(Worker::new(&ctx, queue.clone(), 0).run());

        queue.send(7).await.unwrap();

        // The first attempt fails and loops back; the second succeeds.
        tokio::time::timeout(Duration::from_secs(5), async {
            while !store.has(7) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("height 7 was never durably stored");

        queue.close();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn failed_transactions_dispatch_nothing() {
        struct Sensitive(Arc<AtomicU32>);
        #[async_trait]
        impl MessageHandler for Sensitive {
            fn name(&self) -> &'static str {
                "sensitive"
            }
            async fn handle_message(
                &self,
                _i: usize,
                _m: &RawMessage,
                _tx: &Tx,
                _ctx: &DispatchContext,
            ) -> Result<(), IngestError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let msg = RawMessage {
            type_url: "/cosmwasm.wasm.v1.MsgExecuteContract".into(),
            value: serde_json::json!({"sender": "wasm1s", "contract": "wasm1c"}),
        };
        let failed = make_tx(11, vec![msg.clone()]);
        let ok = make_tx(0, vec![msg]);

        let count = Arc::new(AtomicU32::new(0));
        let mut dispatcher = Dispatcher::new();
        dispatcher.on_message(Arc::new(Sensitive(count.clone())));

        let node = Arc::new(StubNode::new(vec![failed, ok]));
        let store = Arc::new(RecordingStore::default());
        let ctx = IngestContext {
            config: Arc::new(IngestConfig::default()),
            node,
            store: store.clone(),
            dispatcher: Arc::new(dispatcher),
        };

        Worker::new(&ctx, HeightQueue::new(4), 0)
            .process(5)
            .await
            .unwrap();

        // Only the successful tx's single message reached the handler.
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(store.has(5));
    }
}
