//! The supervisor — owns the worker pool and the shutdown sequence.
//!
//! Startup: build the queue, spawn the workers, spawn the enabled producers,
//! then wait. Shutdown (signal or fatal producer error): stop the producers,
//! close the queue, let the workers drain and finish their in-flight
//! heights, then stop the node connection and close the store.

use tokio::task::JoinSet;
use tracing::{error, info};

use crate::context::IngestContext;
use crate::error::IngestError;
use crate::queue::{HeightQueue, DEFAULT_QUEUE_CAPACITY};
use crate::scheduler;
use crate::worker::Worker;

/// Runs the ingestion engine until a shutdown signal or a fatal scheduler
/// error.
pub struct Supervisor {
    ctx: IngestContext,
}

impl Supervisor {
    pub fn new(ctx: IngestContext) -> Self {
        Self { ctx }
    }

    /// Blocks until shutdown. Returns `Err` only for fatal conditions (the
    /// process should exit non-zero); a signal-triggered shutdown is `Ok`.
    pub async fn run(self) -> Result<(), IngestError> {
        let config = self.ctx.config.clone();
        let queue = HeightQueue::new(DEFAULT_QUEUE_CAPACITY);

        info!(workers = config.workers, "starting ingestion");

        let mut workers = JoinSet::new();
        for index in 0..config.workers.max(1) {
            workers.spawn(Worker::new(&self.ctx, queue.clone(), index).run());
        }

        let mut producers: JoinSet<Result<(), IngestError>> = JoinSet::new();
        if config.parse_genesis {
            let q = queue.clone();
            producers.spawn(async move { scheduler::enqueue_genesis(&q).await });
        }
        if config.parse_old_blocks {
            producers.spawn(scheduler::enqueue_missing_heights(
                queue.clone(),
                self.ctx.node.clone(),
                config.clone(),
            ));
        }
        if config.parse_new_blocks {
            producers.spawn(scheduler::enqueue_new_heights(
                queue.clone(),
                self.ctx.node.clone(),
                config.avg_block_time(),
            ));
        }

        let fatal = self.wait_for_shutdown(&mut producers).await;

        // Producers first so nothing new reaches the queue, then let the
        // workers drain what is buffered and finish their in-flight heights.
        producers.abort_all();
        queue.close();
        while workers.join_next().await.is_some() {}

        self.ctx.node.stop().await;
        self.ctx.store.close().await;

        match fatal {
            Some(err) => Err(err),
            None => {
                info!("shutdown complete");
                Ok(())
            }
        }
    }

    /// Waits for a termination signal or a fatal producer error. Producers
    /// that finish cleanly (genesis, completed backfill) are simply reaped.
    async fn wait_for_shutdown(
        &self,
        producers: &mut JoinSet<Result<(), IngestError>>,
    ) -> Option<IngestError> {
        let signal = shutdown_signal();
        tokio::pin!(signal);
        loop {
            tokio::select! {
                _ = &mut signal => {
                    info!("caught shutdown signal, shutting down");
                    return None;
                }
                joined = producers.join_next(), if !producers.is_empty() => {
                    match joined {
                        Some(Ok(Ok(()))) => continue,
                        Some(Ok(Err(err))) => {
                            error!(%err, "scheduler failed, shutting down");
                            return Some(err);
                        }
                        Some(Err(join_err)) => {
                            error!(%join_err, "scheduler task panicked, shutting down");
                            return Some(IngestError::Other(join_err.to_string()));
                        }
                        None => continue,
                    }
                }
            }
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
