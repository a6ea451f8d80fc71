//! # commitstream
//!
//! **commitstream** is the change-event distribution core of a cluster
//! orchestrator's server. It takes batches of state-machine mutations (job,
//! allocation, node changes) tagged with a monotonically increasing commit
//! index and makes them available to many concurrent readers as a live,
//! ordered stream.
//!
//! The commit path never blocks on readers, and memory stays bounded: slow
//! readers are evicted rather than waited for.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   state-machine commit path
//!            │ publish(index, events)      (never blocks)
//!            ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  EventPublisher                                                   │
//! │  - unbounded FIFO queue                                           │
//! │  - writer task  (sole appender)  ──► BufferWriter::append         │
//! │  - pruner task  (every tick)     ──► BufferWriter::prune          │
//! └──────────────────────────────────┬────────────────────────────────┘
//!                                    ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  EventBuffer (bounded by count and by age)                        │
//! │                                                                   │
//! │   head ─► [item k] ─► [item k+1] ─► ... ─► [item n] ◄─ tail       │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     reader 1           reader 2           reader N
//!  item.next(..)      Subscription       Subscription::into_stream
//! ```
//!
//! ### Reader lifecycle
//! ```text
//! item = buffer.head()
//! loop {
//!   ├─► item.next(cancel, timeout)
//!   │       ├─ Ok(next)                → process next.events(), item = next
//!   │       ├─ Err(Discontinuity)      → history lost: item = buffer.head()
//!   │       ├─ Err(Timeout/Canceled)   → caller decides
//!   │       └─ Err(Closed)             → publisher gone, stop
//! }
//! ```
//!
//! ## Features
//! | Area             | Description                                                    | Key types                                  |
//! |------------------|----------------------------------------------------------------|--------------------------------------------|
//! | **Events**       | Immutable changes grouped by commit index.                     | [`Event`], [`EventBatch`], [`Topic`]       |
//! | **Buffer**       | Bounded broadcast log with blocking multi-reader traversal.    | [`EventBuffer`], [`BufferItem`]            |
//! | **Publisher**    | Non-blocking ingress, single writer, periodic pruning.         | [`EventPublisher`], [`PublisherConfig`]    |
//! | **Subscriptions**| Topic/key filtering, start positions, gap reporting.           | [`Subscription`], [`SubscribeRequest`]     |
//! | **Errors**       | Typed errors for readers, configuration and publishing.        | [`StreamError`], [`ConfigError`], [`PublishError`] |
//!
//! ## Logging
//! The crate emits [`tracing`] events (publisher lifecycle, evictions, resyncs)
//! and never installs a subscriber itself.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use commitstream::{Event, EventPublisher, PublisherConfig, StreamError, Topic};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let token = CancellationToken::new();
//!     let cfg = PublisherConfig::default()
//!         .with_buffer_size(1024)
//!         .with_ttl(Duration::from_secs(600));
//!     let publisher = EventPublisher::new(cfg, &token)?;
//!     let buffer = publisher.buffer();
//!
//!     let mut item = buffer.head();
//!     for index in 1..=3 {
//!         publisher.publish(index, vec![Event::new(Topic::Job, "web", index)])?;
//!     }
//!
//!     for _ in 0..3 {
//!         item = match item.next(&token, Some(Duration::from_secs(1))).await {
//!             Ok(next) => next,
//!             Err(StreamError::Discontinuity { .. }) => buffer.head(),
//!             Err(err) => return Err(err.into()),
//!         };
//!         println!("index={} events={}", item.index(), item.events().len());
//!     }
//!
//!     token.cancel();
//!     publisher.shutdown().await;
//!     Ok(())
//! }
//! ```
mod buffer;
mod core;
mod error;
mod events;
mod subscription;

// ---- Public re-exports ----

pub use buffer::{BufferItem, EventBuffer};
pub use core::{EventPublisher, PublisherConfig};
pub use error::{ConfigError, PublishError, StreamError};
pub use events::{Event, EventBatch, Payload, Topic};
pub use subscription::{StartAt, SubscribeRequest, Subscription, WILDCARD};
