//! Bounded broadcast log of committed batches.
//!
//! This module contains the chain of [`BufferItem`]s and the [`EventBuffer`]
//! read handle over it. The writer half is crate-private: only the publisher
//! mutates the chain.
//!
//! Internal modules:
//! - [`item`]: chain node with its one-shot forward link;
//! - [`window`]: head/tail/count bookkeeping, count and age eviction.

mod item;
mod window;

pub use item::BufferItem;
pub use window::EventBuffer;

pub(crate) use window::{BufferWriter, channel};
