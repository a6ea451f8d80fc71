//! # Buffer item: one node of the append-only chain.
//!
//! Each [`BufferItem`] holds one committed batch and a forward link that is
//! resolved exactly once by the writer. Readers hold `Arc<BufferItem>` and
//! advance with [`BufferItem::next`].
//!
//! ## Link states
//! ```text
//!   Pending ──append──► Next(item) ──evict──► Dropped
//!      │                    │
//!      │                    └──writer gone──► Closed
//!      ├──evict (never for tail)──► Dropped
//!      └──writer gone──► Closed
//! ```
//!
//! ## Rules
//! - `Dropped` wins over an earlier `Next`: a reader that has not yet advanced
//!   past an evicted item gets a discontinuity, not the item after it.
//! - Leaving `Next` releases the forward reference, so a reader parked on an
//!   evicted item does not pin the rest of the chain.
//! - All readers waiting on the same item observe the same resolution.

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;
use crate::events::Event;

/// Resolution of an item's forward link.
enum LinkState {
    Pending,
    Next(Arc<BufferItem>),
    Dropped,
    Closed,
}

/// A node of the event buffer.
///
/// Immutable after creation except for its link. The sentinel item the buffer
/// is constructed with carries no events and reports index `0`; check
/// [`is_sentinel`](Self::is_sentinel) instead of relying on its index.
pub struct BufferItem {
    index: u64,
    events: Box<[Event]>,
    sentinel: bool,
    created_at: Instant,
    link: watch::Sender<LinkState>,
}

impl BufferItem {
    pub(crate) fn new(index: u64, events: Vec<Event>) -> Arc<Self> {
        Arc::new(Self {
            index,
            events: events.into_boxed_slice(),
            sentinel: false,
            created_at: Instant::now(),
            link: watch::Sender::new(LinkState::Pending),
        })
    }

    pub(crate) fn sentinel() -> Arc<Self> {
        Arc::new(Self {
            index: 0,
            events: Box::default(),
            sentinel: true,
            created_at: Instant::now(),
            link: watch::Sender::new(LinkState::Pending),
        })
    }

    /// Commit index of the batch held by this item.
    #[inline]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Events committed at [`index`](Self::index), in commit order.
    #[inline]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Returns `true` for the empty item a fresh buffer starts from.
    #[inline]
    pub fn is_sentinel(&self) -> bool {
        self.sentinel
    }

    /// Time since the item was appended.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub(crate) fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }

    /// Returns the next item without waiting.
    ///
    /// - `Ok(Some(next))` if the link is resolved to an item
    /// - `Ok(None)` if nothing has been appended after this item yet
    /// - `Err(Discontinuity)` if this item was evicted
    /// - `Err(Closed)` if the writer is gone
    pub fn next_no_block(&self) -> Result<Option<Arc<BufferItem>>, StreamError> {
        Self::read(&self.link.borrow(), self.index)
    }

    /// Waits for the next item.
    ///
    /// Returns immediately if the link is already resolved. Otherwise suspends
    /// until the writer resolves it, `timeout` elapses, or `cancel` fires.
    /// Timeouts and cancellation leave the buffer untouched.
    ///
    /// ### Errors
    /// - [`StreamError::Discontinuity`] this item was evicted; resync from `head()`
    /// - [`StreamError::Timeout`] `timeout` elapsed first
    /// - [`StreamError::Canceled`] `cancel` fired first
    /// - [`StreamError::Closed`] the writer is gone and nothing will follow
    pub async fn next(
        &self,
        cancel: &CancellationToken,
        timeout: Option<Duration>,
    ) -> Result<Arc<BufferItem>, StreamError> {
        if let Some(next) = self.next_no_block()? {
            return Ok(next);
        }

        let wait = self.wait_resolved();
        let waited = async move {
            match timeout {
                Some(dur) => time::timeout(dur, wait)
                    .await
                    .unwrap_or(Err(StreamError::Timeout { timeout: dur })),
                None => wait.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StreamError::Canceled),
            res = waited => res,
        }
    }

    async fn wait_resolved(&self) -> Result<Arc<BufferItem>, StreamError> {
        let mut rx = self.link.subscribe();
        let state = rx
            .wait_for(|s| !matches!(s, LinkState::Pending))
            .await
            .map_err(|_| StreamError::Closed)?;
        Self::read(&state, self.index)?.ok_or(StreamError::Closed)
    }

    fn read(state: &LinkState, index: u64) -> Result<Option<Arc<BufferItem>>, StreamError> {
        match state {
            LinkState::Pending => Ok(None),
            LinkState::Next(next) => Ok(Some(Arc::clone(next))),
            LinkState::Dropped => Err(StreamError::Discontinuity { index }),
            LinkState::Closed => Err(StreamError::Closed),
        }
    }

    /// Resolves a pending link to `next`, waking every waiter.
    pub(crate) fn link_to(&self, next: Arc<BufferItem>) {
        self.link.send_if_modified(|state| {
            if matches!(state, LinkState::Pending) {
                *state = LinkState::Next(next);
                true
            } else {
                false
            }
        });
    }

    /// Peeks at the resolved next item, if any.
    pub(crate) fn linked(&self) -> Option<Arc<BufferItem>> {
        match &*self.link.borrow() {
            LinkState::Next(next) => Some(Arc::clone(next)),
            _ => None,
        }
    }

    /// Marks the item as evicted, releasing its forward reference.
    pub(crate) fn mark_dropped(&self) {
        self.resolve_terminal(LinkState::Dropped);
    }

    /// Marks the item as closed and hands back its forward reference.
    ///
    /// Used when the buffer is torn down; walking the chain with this keeps
    /// teardown iterative.
    pub(crate) fn close(&self) -> Option<Arc<BufferItem>> {
        self.resolve_terminal(LinkState::Closed)
    }

    fn resolve_terminal(&self, terminal: LinkState) -> Option<Arc<BufferItem>> {
        let mut released = None;
        self.link.send_if_modified(|state| match state {
            LinkState::Dropped | LinkState::Closed => false,
            _ => {
                if let LinkState::Next(next) = mem::replace(state, terminal) {
                    released = Some(next);
                }
                true
            }
        });
        released
    }

    fn link_label(&self) -> &'static str {
        match &*self.link.borrow() {
            LinkState::Pending => "pending",
            LinkState::Next(_) => "next",
            LinkState::Dropped => "dropped",
            LinkState::Closed => "closed",
        }
    }
}

impl fmt::Debug for BufferItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferItem")
            .field("index", &self.index)
            .field("events", &self.events.len())
            .field("sentinel", &self.sentinel)
            .field("link", &self.link_label())
            .finish()
    }
}
