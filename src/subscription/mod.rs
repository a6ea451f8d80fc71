//! Subscriptions: filtered readers built on top of the buffer traversal.
//!
//! ## Contents
//! - [`SubscribeRequest`], [`StartAt`] which events to read and where to start
//! - [`Subscription`] cursor that filters, dedupes and resyncs after a gap

mod cursor;
mod request;

pub use cursor::Subscription;
pub use request::{StartAt, SubscribeRequest, WILDCARD};
