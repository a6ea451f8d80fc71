//! # Event buffer: bounded window over the item chain.
//!
//! [`EventBuffer`] is the read handle shared with every subscriber;
//! [`BufferWriter`] is the only handle that can mutate the chain and is
//! visible inside the crate only.
//!
//! ## Architecture
//! ```text
//!          head (anchor)                               tail (newest)
//!              │                                          │
//!              ▼                                          ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │ item  k  │──►│ item k+1 │──►│   ...    │──►│ item  n  │──► pending
//!        └──────────┘   └──────────┘   └──────────┘   └──────────┘
//!              └─────────────── count = n - k ───────────────┘
//! ```
//!
//! ## Rules
//! - `append` and `prune` take the same exclusive lock and never overlap
//! - `count` never exceeds `max_items`; eviction keeps exactly `max_items`
//! - the tail is never evicted, by count or by age
//! - an evicted item's link is resolved to a discontinuity for its readers
//! - when the writer is dropped, readers parked on the tail see `Closed`

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::item::BufferItem;
use crate::error::ConfigError;
use crate::events::Event;

/// Structural fields of the chain, guarded by one lock.
struct Window {
    head: Arc<BufferItem>,
    tail: Arc<BufferItem>,
    count: usize,
}

impl Window {
    /// Evicts the head, making its successor the new anchor.
    ///
    /// Returns `false` when head is the tail (nothing to evict).
    fn advance_head(&mut self) -> bool {
        let Some(next) = self.head.linked() else {
            return false;
        };
        let old = std::mem::replace(&mut self.head, next);
        old.mark_dropped();
        self.count -= 1;
        true
    }
}

struct Shared {
    window: Mutex<Window>,
    max_items: usize,
    ttl: Duration,
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Unlink iteratively; dropping a long chain recursively can overflow the stack.
        let mut cursor = Some(Arc::clone(&self.window.get_mut().head));
        while let Some(item) = cursor {
            cursor = item.close();
        }
    }
}

/// Read handle on the event buffer.
///
/// Cheap to clone. Exposes the resync point ([`head`](Self::head)), the newest
/// item ([`tail`](Self::tail)) and the retained length. It cannot mutate the
/// chain; only the publisher's writer can.
#[derive(Clone)]
pub struct EventBuffer {
    shared: Arc<Shared>,
}

impl EventBuffer {
    /// Returns the oldest retained item.
    ///
    /// Readers start here and come back here after a discontinuity. The
    /// returned item is an anchor: the first event delivered from it is the
    /// one appended after it.
    pub fn head(&self) -> Arc<BufferItem> {
        Arc::clone(&self.shared.window.lock().head)
    }

    /// Returns the most recently appended item (or the sentinel if none).
    pub fn tail(&self) -> Arc<BufferItem> {
        Arc::clone(&self.shared.window.lock().tail)
    }

    /// Number of items readable from [`head`](Self::head).
    pub fn len(&self) -> usize {
        self.shared.window.lock().count
    }

    /// Returns `true` if nothing is readable from [`head`](Self::head).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of retained items.
    pub fn max_items(&self) -> usize {
        self.shared.max_items
    }

    /// Time-to-live of retained items.
    pub fn ttl(&self) -> Duration {
        self.shared.ttl
    }
}

impl std::fmt::Debug for EventBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let w = self.shared.window.lock();
        f.debug_struct("EventBuffer")
            .field("head", &w.head.index())
            .field("tail", &w.tail.index())
            .field("count", &w.count)
            .field("max_items", &self.shared.max_items)
            .field("ttl", &self.shared.ttl)
            .finish()
    }
}

/// The only handle that mutates the chain.
///
/// Owned by the publisher's background tasks. Dropping the last writer closes
/// the buffer for readers waiting on the tail.
pub(crate) struct BufferWriter {
    shared: Arc<Shared>,
}

impl BufferWriter {
    /// Appends a batch, evicting from the front while over capacity.
    ///
    /// Returns the number of evicted items.
    pub(crate) fn append(&self, index: u64, events: Vec<Event>) -> usize {
        let item = BufferItem::new(index, events);

        let mut w = self.shared.window.lock();
        w.tail.link_to(Arc::clone(&item));
        w.tail = item;
        w.count += 1;

        let mut evicted = 0;
        while w.count > self.shared.max_items && w.advance_head() {
            evicted += 1;
        }
        evicted
    }

    /// Evicts expired items from the front, always keeping the tail.
    ///
    /// Returns the number of evicted items.
    pub(crate) fn prune(&self) -> usize {
        let now = Instant::now();
        let ttl = self.shared.ttl;

        let mut w = self.shared.window.lock();
        let mut pruned = 0;
        while w.count > 0 && w.head.is_expired(now, ttl) && w.advance_head() {
            pruned += 1;
        }
        pruned
    }

    /// Index of the newest item, `None` while only the sentinel exists.
    pub(crate) fn last_index(&self) -> Option<u64> {
        let w = self.shared.window.lock();
        (!w.tail.is_sentinel()).then(|| w.tail.index())
    }
}

impl std::fmt::Debug for BufferWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let w = self.shared.window.lock();
        f.debug_struct("BufferWriter")
            .field("head", &w.head.index())
            .field("tail", &w.tail.index())
            .field("count", &w.count)
            .finish()
    }
}

impl Drop for BufferWriter {
    fn drop(&mut self) {
        self.shared.window.lock().tail.close();
    }
}

/// Creates a buffer, returning its writer and a read handle.
///
/// ### Errors
/// - [`ConfigError::ZeroBufferSize`] if `max_items == 0`
/// - [`ConfigError::ZeroTtl`] if `ttl` is zero
pub(crate) fn channel(
    max_items: usize,
    ttl: Duration,
) -> Result<(BufferWriter, EventBuffer), ConfigError> {
    if max_items == 0 {
        return Err(ConfigError::ZeroBufferSize);
    }
    if ttl.is_zero() {
        return Err(ConfigError::ZeroTtl);
    }

    let sentinel = BufferItem::sentinel();
    let shared = Arc::new(Shared {
        window: Mutex::new(Window {
            head: Arc::clone(&sentinel),
            tail: sentinel,
            count: 0,
        }),
        max_items,
        ttl,
    });

    Ok((
        BufferWriter {
            shared: Arc::clone(&shared),
        },
        EventBuffer { shared },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::events::Topic;
    use rand::Rng;
    use tokio_util::sync::CancellationToken;

    const LONG_TTL: Duration = Duration::from_secs(3600);

    fn batch(index: u64) -> Vec<Event> {
        vec![Event::new(Topic::Job, "job", index)]
    }

    fn fill(writer: &BufferWriter, range: std::ops::Range<u64>) {
        for i in range {
            writer.append(i, batch(i));
        }
    }

    #[test]
    fn test_rejects_degenerate_config() {
        assert!(matches!(channel(0, LONG_TTL), Err(ConfigError::ZeroBufferSize)));
        assert!(matches!(channel(10, Duration::ZERO), Err(ConfigError::ZeroTtl)));
    }

    #[test]
    fn test_handles_report_window() {
        let (writer, buffer) = channel(4, Duration::from_secs(30)).unwrap();
        assert_eq!(buffer.max_items(), 4);
        assert_eq!(buffer.ttl(), Duration::from_secs(30));

        fill(&writer, 1..7);
        assert_eq!(
            format!("{writer:?}"),
            "BufferWriter { head: 2, tail: 6, count: 4 }"
        );
        assert_eq!(
            format!("{buffer:?}"),
            "EventBuffer { head: 2, tail: 6, count: 4, max_items: 4, ttl: 30s }"
        );
    }

    #[test]
    fn test_fresh_buffer_starts_at_sentinel() {
        let (writer, buffer) = channel(10, LONG_TTL).unwrap();
        assert!(buffer.head().is_sentinel());
        assert!(buffer.is_empty());
        assert_eq!(writer.last_index(), None);
        assert!(buffer.head().next_no_block().unwrap().is_none());
    }

    #[test]
    fn test_size() {
        let (writer, buffer) = channel(100, LONG_TTL).unwrap();
        fill(&writer, 0..10);
        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer.tail().index(), 9);
        assert_eq!(writer.last_index(), Some(9));
    }

    #[test]
    fn test_len_bounded_by_capacity() {
        let (writer, buffer) = channel(7, LONG_TTL).unwrap();
        for i in 0..30u64 {
            writer.append(i, batch(i));
            assert_eq!(buffer.len(), ((i + 1) as usize).min(7));
        }
    }

    #[tokio::test]
    async fn test_slow_reader_gets_discontinuity() {
        let (writer, buffer) = channel(10, LONG_TTL).unwrap();
        fill(&writer, 0..10);

        let head = buffer.head();
        fill(&writer, 10..15);

        let err = head
            .next(&CancellationToken::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Discontinuity { .. }));

        let new_head = buffer.head();
        assert_eq!(new_head.index(), 4);
        assert_eq!(buffer.len(), 10);
        let first = new_head.next_no_block().unwrap().unwrap();
        assert_eq!(first.index(), 5);
    }

    #[test]
    fn test_eviction_reports_count() {
        let (writer, _buffer) = channel(3, LONG_TTL).unwrap();
        assert_eq!(writer.append(0, batch(0)), 0);
        assert_eq!(writer.append(1, batch(1)), 0);
        assert_eq!(writer.append(2, batch(2)), 0);
        assert_eq!(writer.append(3, batch(3)), 1);
    }

    #[test]
    fn test_capacity_one_keeps_latest() {
        let (writer, buffer) = channel(1, LONG_TTL).unwrap();
        fill(&writer, 0..5);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.head().index(), 3);
        assert_eq!(buffer.tail().index(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_all_old_keeps_latest() {
        let (writer, buffer) = channel(100, Duration::from_secs(1)).unwrap();
        fill(&writer, 0..10);
        assert_eq!(buffer.len(), 10);

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_eq!(writer.prune(), 10);

        assert_eq!(buffer.head().index(), 9);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.head().next_no_block().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_keeps_fresh_items() {
        let (writer, buffer) = channel(100, Duration::from_secs(10)).unwrap();
        fill(&writer, 0..5);
        tokio::time::advance(Duration::from_secs(11)).await;
        fill(&writer, 5..8);

        let old_head = buffer.head();
        writer.prune();

        // The anchor's own age is checked, so expired item 4 goes as well.
        assert_eq!(buffer.head().index(), 5);
        assert_eq!(buffer.len(), 2);
        assert!(matches!(
            old_head.next_no_block(),
            Err(StreamError::Discontinuity { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_noop_when_fresh() {
        let (writer, buffer) = channel(100, Duration::from_secs(10)).unwrap();
        fill(&writer, 0..5);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(writer.prune(), 0);
        assert!(buffer.head().is_sentinel());
        assert_eq!(buffer.len(), 5);
    }

    #[tokio::test]
    async fn test_head_is_idempotent() {
        let (writer, buffer) = channel(10, LONG_TTL).unwrap();
        fill(&writer, 0..3);

        let a = buffer.head();
        let b = buffer.head();
        assert!(Arc::ptr_eq(&a, &b));

        let cancel = CancellationToken::new();
        let (na, nb) = (
            a.next(&cancel, None).await.unwrap(),
            b.next(&cancel, None).await.unwrap(),
        );
        assert_eq!(na.index(), nb.index());
        assert!(Arc::ptr_eq(&na, &nb));
    }

    #[tokio::test]
    async fn test_ordering_from_head() {
        let (writer, buffer) = channel(100, LONG_TTL).unwrap();
        let mut item = buffer.head();
        fill(&writer, 0..50);

        let cancel = CancellationToken::new();
        for expect in 0..50u64 {
            item = item.next(&cancel, None).await.unwrap();
            assert_eq!(item.index(), expect);
            assert_eq!(item.events()[0].index(), expect);
        }
    }

    #[tokio::test]
    async fn test_dropping_writer_closes_waiters() {
        let (writer, buffer) = channel(10, LONG_TTL).unwrap();
        fill(&writer, 0..2);
        let tail = buffer.tail();
        let waiter = tokio::spawn(async move { tail.next(&CancellationToken::new(), None).await });
        tokio::task::yield_now().await;

        drop(writer);
        assert_eq!(waiter.await.unwrap().unwrap_err(), StreamError::Closed);

        // Retained items are still readable up to the tail.
        let first = buffer.head().next_no_block().unwrap().unwrap();
        assert_eq!(first.index(), 0);
    }

    #[tokio::test]
    async fn test_parked_readers_share_discontinuity() {
        let (writer, buffer) = channel(1, LONG_TTL).unwrap();
        writer.append(0, batch(0));
        let cancel = CancellationToken::new();

        let mut readers = Vec::new();
        for _ in 0..16 {
            let tail = buffer.tail();
            let cancel = cancel.clone();
            readers.push(tokio::spawn(async move { tail.next(&cancel, None).await }));
        }
        tokio::task::yield_now().await;

        fill(&writer, 1..3);
        for r in readers {
            assert_eq!(
                r.await.unwrap().unwrap_err(),
                StreamError::Discontinuity { index: 0 }
            );
        }
        assert_eq!(buffer.head().index(), 1);
    }

    #[test]
    fn test_drop_long_chain() {
        let (writer, buffer) = channel(200_000, LONG_TTL).unwrap();
        for i in 0..200_000u64 {
            writer.append(i, Vec::new());
        }
        drop(writer);
        drop(buffer);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fan_out_fuzz() {
        const READERS: usize = 1000;
        const MESSAGES: u64 = 1000;

        let (writer, buffer) = channel(1000, LONG_TTL).unwrap();
        // Load head before spawning so every reader starts from the same point.
        let head = buffer.head();

        let mut readers = tokio::task::JoinSet::new();
        for reader in 0..READERS {
            let mut item = Arc::clone(&head);
            readers.spawn(async move {
                let cancel = CancellationToken::new();
                for expect in 0..MESSAGES {
                    item = item
                        .next(&cancel, None)
                        .await
                        .map_err(|e| format!("reader {reader:05} failed at {expect}: {e}"))?;
                    let got = item.events()[0].index();
                    if got != expect {
                        return Err(format!("reader {reader:05} want={expect} got={got}"));
                    }
                }
                Ok::<(), String>(())
            });
        }

        let producer = tokio::spawn(async move {
            for i in 0..MESSAGES {
                writer.append(i, batch(i));
                let pause = {
                    let mut rng = rand::rng();
                    if rng.random_ratio(1, 20) {
                        Some(Duration::from_millis(rng.random_range(0..20)))
                    } else {
                        None
                    }
                };
                if let Some(pause) = pause {
                    tokio::time::sleep(pause).await;
                }
            }
            writer
        });

        while let Some(res) = readers.join_next().await {
            res.unwrap().unwrap();
        }
        drop(producer.await.unwrap());
    }
}
