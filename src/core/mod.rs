//! Publisher core: configuration and the single writer.
//!
//! The public API from this module is [`EventPublisher`] and its
//! [`PublisherConfig`].
//!
//! Internal modules:
//! - [`config`]: buffer size, retention and prune interval;
//! - [`publisher`]: publish queue, writer task and pruner task.

mod config;
mod publisher;

pub use config::PublisherConfig;
pub use publisher::EventPublisher;
