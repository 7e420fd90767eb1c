//! The height queue — a bounded, multi-producer multi-consumer channel of
//! block heights awaiting processing.
//!
//! The bound is what throttles fetch-ahead: a producer enqueueing faster than
//! the workers drain blocks once the queue is full. Closing the queue stops
//! further sends while letting consumers drain what is already buffered, so a
//! worker always finishes its in-flight height before terminating.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{watch, Mutex};

use crate::error::IngestError;
use crate::types::Height;

/// Default queue capacity. Small on purpose: it bounds how far ahead of the
/// workers any producer can run.
pub const DEFAULT_QUEUE_CAPACITY: usize = 25;

/// Outcome of a non-blocking enqueue attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueError {
    /// The queue is at capacity; the height was not enqueued.
    Full(Height),
    /// The queue has been closed; no further sends are possible.
    Closed(Height),
}

/// Bounded MPMC queue of heights. Cheap to clone; all clones share the same
/// channel.
///
/// Closing is signalled out-of-band (a watch flag) rather than through the
/// channel itself, so a consumer parked inside [`recv`](Self::recv) — which
/// holds the shared receiver — wakes up without anyone needing to take the
/// receiver away from it.
#[derive(Clone)]
pub struct HeightQueue {
    tx: mpsc::Sender<Height>,
    rx: Arc<Mutex<mpsc::Receiver<Height>>>,
    closed_tx: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
}

impl HeightQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let (closed_tx, closed_rx) = watch::channel(false);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            closed_tx: Arc::new(closed_tx),
            closed_rx,
        }
    }

    /// Enqueues a height, waiting for a free slot when the queue is full.
    ///
    /// Returns `Err(IngestError::QueueClosed)` once the queue is closed,
    /// which producers treat as the shutdown signal.
    pub async fn send(&self, height: Height) -> Result<(), IngestError> {
        if *self.closed_rx.borrow() {
            return Err(IngestError::QueueClosed);
        }
        let mut closed = self.closed_rx.clone();
        tokio::select! {
            result = self.tx.send(height) => result.map_err(|_| IngestError::QueueClosed),
            _ = closed.wait_for(|c| *c) => Err(IngestError::QueueClosed),
        }
    }

    /// Enqueues a height without waiting. Used by workers to hand a failed
    /// height back without ever blocking their own loop.
    pub fn try_send(&self, height: Height) -> Result<(), EnqueueError> {
        if *self.closed_rx.borrow() {
            return Err(EnqueueError::Closed(height));
        }
        self.tx.try_send(height).map_err(|e| match e {
            TrySendError::Full(h) => EnqueueError::Full(h),
            TrySendError::Closed(h) => EnqueueError::Closed(h),
        })
    }

    /// Dequeues the next height, waiting until one is available.
    ///
    /// Returns `None` once the queue is closed AND fully drained.
    pub async fn recv(&self) -> Option<Height> {
        let mut closed = self.closed_rx.clone();
        let mut rx = self.rx.lock().await;
        loop {
            if *closed.borrow() {
                return rx.try_recv().ok();
            }
            tokio::select! {
                item = rx.recv() => return item,
                _ = closed.changed() => continue,
            }
        }
    }

    /// Closes the queue. Pending and future sends fail, buffered heights
    /// remain receivable until drained.
    pub fn close(&self) {
        let _ = self.closed_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn send_blocks_when_full() {
        let queue = HeightQueue::new(2);
        queue.send(1).await.unwrap();
        queue.send(2).await.unwrap();

        // Third send must block until a consumer frees a slot.
        let blocked = timeout(Duration::from_millis(50), queue.send(3)).await;
        assert!(blocked.is_err(), "send into a full queue should block");

        assert_eq!(queue.recv().await, Some(1));
        timeout(Duration::from_millis(50), queue.send(3))
            .await
            .expect("send should complete once a slot frees")
            .unwrap();
    }

    #[tokio::test]
    async fn try_send_full_and_closed() {
        let queue = HeightQueue::new(1);
        queue.try_send(7).unwrap();
        assert_eq!(queue.try_send(8), Err(EnqueueError::Full(8)));

        queue.close();
        assert_eq!(queue.try_send(9), Err(EnqueueError::Closed(9)));
    }

    #[tokio::test]
    async fn close_lets_consumers_drain() {
        let queue = HeightQueue::new(5);
        for h in 1..=3 {
            queue.send(h).await.unwrap();
        }
        queue.close();

        assert!(queue.send(4).await.is_err());
        assert_eq!(queue.recv().await, Some(1));
        assert_eq!(queue.recv().await, Some(2));
        assert_eq!(queue.recv().await, Some(3));
        assert_eq!(queue.recv().await, None);
    }

    #[tokio::test]
    async fn close_wakes_a_parked_consumer() {
        let queue = HeightQueue::new(2);
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.recv().await })
        };

        // Give the consumer time to park inside recv, then close.
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let got = timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer must wake on close")
            .unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn close_wakes_a_blocked_producer() {
        let queue = HeightQueue::new(1);
        queue.send(1).await.unwrap();

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.send(2).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let result = timeout(Duration::from_secs(1), producer)
            .await
            .expect("producer must wake on close")
            .unwrap();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn multiple_consumers_share_the_queue() {
        let queue = HeightQueue::new(10);
        for h in 1..=6 {
            queue.send(h).await.unwrap();
        }
        queue.close();

        let a = queue.clone();
        let b = queue.clone();
        let ja = tokio::spawn(async move {
            let mut seen = vec![];
            while let Some(h) = a.recv().await {
                seen.push(h);
            }
            seen
        });
        let jb = tokio::spawn(async move {
            let mut seen = vec![];
            while let Some(h) = b.recv().await {
                seen.push(h);
            }
            seen
        });

        let mut all: Vec<Height> = ja.await.unwrap();
        all.extend(jb.await.unwrap());
        all.sort_unstable();
        assert_eq!(all, vec![1, 2, 3, 4, 5, 6]);
    }
}
