//! Shared handles threaded through the supervisor, scheduler, and workers.

use std::sync::Arc;

use crate::config::IngestConfig;
use crate::dispatch::{DispatchContext, Dispatcher};
use crate::node::NodeClient;
use crate::store::Store;

/// Everything the ingestion engine needs to run. Built once by the binary
/// after config/node/store setup succeeded.
#[derive(Clone)]
pub struct IngestContext {
    pub config: Arc<IngestConfig>,
    pub node: Arc<dyn NodeClient>,
    pub store: Arc<dyn Store>,
    pub dispatcher: Arc<Dispatcher>,
}

impl IngestContext {
    pub fn new(
        config: IngestConfig,
        node: Arc<dyn NodeClient>,
        store: Arc<dyn Store>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            config: Arc::new(config),
            node,
            store,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// The per-invocation handler context.
    pub fn dispatch_context(&self) -> DispatchContext {
        DispatchContext {
            node: self.node.clone(),
            store: self.store.clone(),
        }
    }
}
