//! Queue producers: genesis, historical backfill, and live tailing.
//!
//! All three feed the same bounded [`HeightQueue`]; each enqueues strictly
//! increasing heights. A failed latest-height query is fatal for the flow —
//! none of these can make progress without it, and retrying silently would
//! hide a dead upstream. A closed queue, by contrast, just means shutdown.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::node::NodeClient;
use crate::queue::HeightQueue;

/// Enqueues height 0 (the genesis state) exactly once.
pub async fn enqueue_genesis(queue: &HeightQueue) -> Result<(), IngestError> {
    debug!("enqueueing genesis state");
    match queue.send(0).await {
        Ok(()) | Err(IngestError::QueueClosed) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Enqueues every height from `start_height` through the latest height
/// observed at launch, one at a time — the queue's bound is what throttles
/// fetch-ahead. With fast sync the whole flow is skipped: catching up
/// historical gaps is traded for reaching the live tip sooner.
pub async fn enqueue_missing_heights(
    queue: HeightQueue,
    node: Arc<dyn NodeClient>,
    config: Arc<IngestConfig>,
) -> Result<(), IngestError> {
    let latest_height = node.latest_height().await?;

    if config.fast_sync {
        info!(latest_height, "fast sync is enabled, ignoring all previous blocks");
        return Ok(());
    }

    info!(
        start_height = config.start_height,
        latest_height, "syncing missing blocks"
    );
    for height in config.start_height..=latest_height {
        debug!(height, "enqueueing missing block");
        if queue.send(height).await.is_err() {
            return Ok(()); // shutdown
        }
    }
    Ok(())
}

/// Follows the live tip forever: polls the latest height and enqueues every
/// height in (last seen, latest], then sleeps one average block interval.
/// The sleep is mandatory pacing — this loop must never spin.
pub async fn enqueue_new_heights(
    queue: HeightQueue,
    node: Arc<dyn NodeClient>,
    avg_block_time: Duration,
) -> Result<(), IngestError> {
    let mut last_seen = node.latest_height().await?;

    loop {
        let latest_height = node.latest_height().await?;

        while last_seen < latest_height {
            last_seen += 1;
            debug!(height = last_seen, "enqueueing new block");
            if queue.send(last_seen).await.is_err() {
                return Ok(()); // shutdown
            }
        }

        tokio::time::sleep(avg_block_time).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::node::{BlockData, BlockResults, CodeMeta, ContractMeta, GenesisData};
    use crate::types::{Height, Tx};

    /// Node stub serving a scripted sequence of latest heights, then an
    /// error once the script is exhausted.
    struct ScriptedNode {
        heights: Mutex<Vec<Height>>,
    }

    impl ScriptedNode {
        fn new(heights: Vec<Height>) -> Self {
            Self {
                heights: Mutex::new(heights),
            }
        }
    }

    #[async_trait]
    impl NodeClient for ScriptedNode {
        async fn latest_height(&self) -> Result<Height, IngestError> {
            let mut heights = self.heights.lock().unwrap();
            if heights.is_empty() {
                return Err(IngestError::Node("status unavailable".into()));
            }
            Ok(heights.remove(0))
        }
        async fn block(&self, _h: Height) -> Result<BlockData, IngestError> {
            unreachable!("scheduler never fetches blocks")
        }
        async fn block_results(&self, _h: Height) -> Result<BlockResults, IngestError> {
            unreachable!()
        }
        async fn txs(&self, _b: &BlockData) -> Result<Vec<Tx>, IngestError> {
            unreachable!()
        }
        async fn genesis(&self) -> Result<GenesisData, IngestError> {
            unreachable!()
        }
        async fn contract_info(&self, _h: Height, _a: &str) -> Result<ContractMeta, IngestError> {
            unreachable!()
        }
        async fn code_info(&self, _h: Height, _id: u64) -> Result<CodeMeta, IngestError> {
            unreachable!()
        }
        async fn stop(&self) {}
    }

    #[tokio::test]
    async fn genesis_enqueues_height_zero() {
        let queue = HeightQueue::new(2);
        enqueue_genesis(&queue).await.unwrap();
        assert_eq!(queue.recv().await, Some(0));
    }

    #[tokio::test]
    async fn backfill_enqueues_start_through_latest() {
        let queue = HeightQueue::new(16);
        let node = Arc::new(ScriptedNode::new(vec![5]));
        let config = Arc::new(IngestConfig {
            start_height: 2,
            ..Default::default()
        });

        enqueue_missing_heights(queue.clone(), node, config)
            .await
            .unwrap();
        queue.close();

        let mut got = vec![];
        while let Some(h) = queue.recv().await {
            got.push(h);
        }
        assert_eq!(got, vec![2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn fast_sync_skips_backfill() {
        let queue = HeightQueue::new(4);
        let node = Arc::new(ScriptedNode::new(vec![50]));
        let config = Arc::new(IngestConfig {
            start_height: 1,
            fast_sync: true,
            ..Default::default()
        });

        enqueue_missing_heights(queue.clone(), node, config)
            .await
            .unwrap();
        queue.close();
        assert_eq!(queue.recv().await, None);
    }

    #[tokio::test]
    async fn latest_height_failure_is_fatal() {
        let queue = HeightQueue::new(4);
        let node = Arc::new(ScriptedNode::new(vec![]));
        let config = Arc::new(IngestConfig::default());

        let err = enqueue_missing_heights(queue, node, config)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Node(_)));
    }

    #[tokio::test]
    async fn live_tail_enqueues_only_new_heights() {
        let queue = HeightQueue::new(16);
        let node = Arc::new(ScriptedNode::new(vec![10, 10, 13, 14]));

        let producer = tokio::spawn(enqueue_new_heights(
            queue.clone(),
            node,
            Duration::from_millis(5),
        ));

        let mut got = vec![];
        for _ in 0..3 {
            got.push(queue.recv().await.unwrap());
        }
        assert_eq!(got, vec![11, 12, 13]);

        // Stops either at the next enqueue into the closed queue or on the
        // exhausted script — both end the loop.
        queue.close();
        let joined = tokio::time::timeout(Duration::from_secs(2), producer).await;
        assert!(joined.is_ok(), "producer should stop after queue closure");
    }
}
