//! # Event publisher: the single writer into the buffer.
//!
//! The [`EventPublisher`] owns the writer half of the [`EventBuffer`] and
//! decouples the state-machine commit path from buffer mutation.
//!
//! ## Architecture
//! ```text
//! commit path ── publish(index, events) ──► [unbounded queue] ──► writer task ──► BufferWriter::append
//!   (never blocks)                            (FIFO)                (sole appender)      │
//!                                                                                       ▼
//!                                          pruner task ── every prune_tick ──► BufferWriter::prune
//!
//! readers ── EventBuffer::head() / BufferItem::next() / Subscription::next()
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` only enqueues
//! - **Single writer**: the writer and pruner tasks are the only holders of [`BufferWriter`]
//! - **Commit order**: the FIFO queue makes append order equal to publish order
//! - **Monotonic indexes**: a batch at or below the last appended index is dropped
//! - **Idle pruning**: the pruner ticks whether or not anything is published
//! - **Lifecycle**: both tasks stop when the owning token is cancelled, the
//!   publisher is shut down, or the publisher is dropped
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use commitstream::{Event, EventPublisher, PublisherConfig, SubscribeRequest, Topic};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let token = CancellationToken::new();
//!     let publisher = EventPublisher::new(PublisherConfig::default(), &token)?;
//!
//!     let mut sub = publisher.subscribe(SubscribeRequest::all());
//!     publisher.publish(1, vec![Event::new(Topic::Node, "node-1", 1)])?;
//!
//!     let batch = sub.next(&token).await?;
//!     assert_eq!(batch.index(), 1);
//!
//!     token.cancel();
//!     publisher.shutdown().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::config::PublisherConfig;
use crate::buffer::{self, BufferWriter, EventBuffer};
use crate::error::{ConfigError, PublishError};
use crate::events::{Event, EventBatch};
use crate::subscription::{SubscribeRequest, Subscription};

/// Non-blocking entry point for committed changes.
///
/// Created once per server process. Background tasks run on the current tokio
/// runtime until the owning token is cancelled.
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<EventBatch>,
    buffer: EventBuffer,
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl EventPublisher {
    /// Validates `cfg`, creates the buffer and spawns the writer and pruner tasks.
    ///
    /// Both tasks observe a child of `owner`: cancelling `owner` stops them.
    ///
    /// ### Errors
    /// Returns [`ConfigError`] for a zero buffer size, ttl or prune tick.
    ///
    /// ### Panics
    /// Must be called from within a tokio runtime.
    pub fn new(cfg: PublisherConfig, owner: &CancellationToken) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let (writer, buffer) = buffer::channel(cfg.buffer_size, cfg.ttl)?;
        let writer = Arc::new(writer);
        let token = owner.child_token();
        let (tx, rx) = mpsc::unbounded_channel();

        let tasks = vec![
            tokio::spawn(drain_queue(Arc::clone(&writer), rx, token.clone())),
            tokio::spawn(prune_periodically(writer, cfg.prune_tick, token.clone())),
        ];

        debug!(
            buffer_size = cfg.buffer_size,
            ttl = ?cfg.ttl,
            prune_tick = ?cfg.prune_tick,
            "event publisher started"
        );
        Ok(Self {
            tx,
            buffer,
            token,
            tasks,
        })
    }

    /// Queues the events committed at `index` and returns immediately.
    ///
    /// An empty `events` is a no-op. The writer drops (with a warning) any
    /// batch whose index is not greater than the last appended one, so every
    /// reader sees strictly increasing indexes.
    ///
    /// ### Errors
    /// - [`PublishError::IndexMismatch`] if an event carries a different index
    /// - [`PublishError::Closed`] if the writer has stopped
    pub fn publish(&self, index: u64, events: Vec<Event>) -> Result<(), PublishError> {
        if events.is_empty() {
            return Ok(());
        }
        self.publish_batch(EventBatch::new(index, events)?)
    }

    /// Queues a prebuilt batch. An empty batch is a no-op.
    pub fn publish_batch(&self, batch: EventBatch) -> Result<(), PublishError> {
        if batch.is_empty() {
            return Ok(());
        }
        let index = batch.index();
        self.tx.send(batch).map_err(|_| {
            warn!(index, "publish after event writer stopped");
            PublishError::Closed
        })
    }

    /// Read handle on the buffer.
    pub fn buffer(&self) -> EventBuffer {
        self.buffer.clone()
    }

    /// Opens a subscription over the buffer.
    pub fn subscribe(&self, request: SubscribeRequest) -> Subscription {
        Subscription::new(self.buffer.clone(), request)
    }

    /// Returns `true` once the writer no longer accepts batches.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Stops the background tasks and waits for them to exit.
    ///
    /// Batches still queued are discarded. After this returns the buffer is
    /// no longer mutated and readers parked on the tail observe `Closed`.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        for handle in std::mem::take(&mut self.tasks) {
            if let Err(err) = handle.await {
                warn!(error = %err, "event publisher task failed");
            }
        }
        debug!("event publisher stopped");
    }
}

impl Drop for EventPublisher {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("buffer", &self.buffer)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Drains the queue one batch at a time, in FIFO order.
async fn drain_queue(
    writer: Arc<BufferWriter>,
    mut rx: mpsc::UnboundedReceiver<EventBatch>,
    token: CancellationToken,
) {
    trace!("event writer running");
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            msg = rx.recv() => match msg {
                Some(batch) => append_batch(&writer, batch),
                None => break,
            },
        }
    }
    rx.close();
    debug!(pending = rx.len(), "event writer stopped");
}

fn append_batch(writer: &BufferWriter, batch: EventBatch) {
    let (index, events) = batch.into_parts();
    if let Some(last) = writer.last_index() {
        if index <= last {
            warn!(index, last, "dropping batch with non-increasing index");
            return;
        }
    }

    let evicted = writer.append(index, events);
    if evicted > 0 {
        trace!(index, evicted, "evicted oldest events over capacity");
    }
}

/// Evicts expired items every `tick`, independent of publish traffic.
async fn prune_periodically(writer: Arc<BufferWriter>, tick: Duration, token: CancellationToken) {
    let mut interval = time::interval_at(Instant::now() + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                let pruned = writer.prune();
                if pruned > 0 {
                    debug!(pruned, "pruned expired events");
                }
            }
        }
    }
    trace!("event pruner stopped");
}
