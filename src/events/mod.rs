//! Change events: the values carried through the buffer.
//!
//! ## Contents
//! - [`Topic`], [`Event`], [`Payload`] a single immutable change
//! - [`EventBatch`] the events committed at one index
//!
//! ## Quick reference
//! - **Producers**: the state-machine commit path, via `EventPublisher::publish`.
//! - **Consumers**: readers walking `BufferItem`s and `Subscription`s.

mod event;

pub use event::{Event, EventBatch, Payload, Topic};
