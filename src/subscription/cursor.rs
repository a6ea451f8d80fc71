//! # Subscription: a filtered cursor over the event buffer.
//!
//! A [`Subscription`] walks the chain with [`BufferItem::next`], skips batches
//! that do not match its [`SubscribeRequest`], and handles discontinuities by
//! moving back to [`EventBuffer::head`].
//!
//! ## Flow
//! ```text
//! next(cancel)
//!   loop {
//!     ├─► cursor.next(cancel)
//!     │     ├─ Ok(item)             → skip if already delivered or nothing matches
//!     │     │                         otherwise return the filtered batch
//!     │     ├─ Err(Discontinuity)   → cursor = buffer.head(), return the error once
//!     │     └─ Err(Canceled/Closed) → return the error
//!   }
//! ```
//!
//! ## Rules
//! - Batches are yielded in commit order, each at most once
//! - A gap is always reported; the following call continues from the new head

use std::sync::Arc;

use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::request::{StartAt, SubscribeRequest};
use crate::buffer::{BufferItem, EventBuffer};
use crate::error::StreamError;
use crate::events::{Event, EventBatch};

/// Filtered, resynchronizing reader of the event buffer.
pub struct Subscription {
    buffer: EventBuffer,
    cursor: Arc<BufferItem>,
    request: SubscribeRequest,
    delivered_through: Option<u64>,
    resyncs: u64,
}

impl Subscription {
    /// Opens a subscription positioned according to `request.start()`.
    pub fn new(buffer: EventBuffer, request: SubscribeRequest) -> Self {
        let (cursor, delivered_through) = match request.start() {
            StartAt::Oldest => (buffer.head(), None),
            StartAt::Latest => (buffer.tail(), None),
            StartAt::AfterIndex(index) => (buffer.head(), Some(index)),
        };
        Self {
            buffer,
            cursor,
            request,
            delivered_through,
            resyncs: 0,
        }
    }

    /// Returns the next batch with at least one matching event.
    ///
    /// Only matching events are kept in the returned batch.
    ///
    /// ### Errors
    /// - [`StreamError::Discontinuity`] events were lost; the subscription has
    ///   already moved to the current head and may be polled again
    /// - [`StreamError::Canceled`] `cancel` fired
    /// - [`StreamError::Closed`] the publisher is gone
    pub async fn next(&mut self, cancel: &CancellationToken) -> Result<EventBatch, StreamError> {
        loop {
            let item = match self.cursor.next(cancel, None).await {
                Ok(item) => item,
                Err(err @ StreamError::Discontinuity { .. }) => {
                    self.resync();
                    return Err(err);
                }
                Err(err) => return Err(err),
            };
            self.cursor = item;

            if let Some(batch) = self.take_current() {
                return Ok(batch);
            }
        }
    }

    /// Returns the next matching batch if one is already available.
    pub fn try_next(&mut self) -> Result<Option<EventBatch>, StreamError> {
        loop {
            let item = match self.cursor.next_no_block() {
                Ok(Some(item)) => item,
                Ok(None) => return Ok(None),
                Err(err @ StreamError::Discontinuity { .. }) => {
                    self.resync();
                    return Err(err);
                }
                Err(err) => return Err(err),
            };
            self.cursor = item;

            if let Some(batch) = self.take_current() {
                return Ok(Some(batch));
            }
        }
    }

    /// Number of discontinuities this subscription has recovered from.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Index of the last item the cursor moved past.
    pub fn position(&self) -> u64 {
        self.cursor.index()
    }

    /// Adapts the subscription into a [`Stream`].
    ///
    /// Discontinuities are yielded as errors and the stream continues; the
    /// stream ends after `Closed` or when `cancel` fires.
    pub fn into_stream(
        self,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<EventBatch, StreamError>> {
        futures::stream::unfold(Some(self), move |state| {
            let cancel = cancel.clone();
            async move {
                let mut sub = state?;
                match sub.next(&cancel).await {
                    Ok(batch) => Some((Ok(batch), Some(sub))),
                    Err(StreamError::Canceled) => None,
                    Err(err) if err.is_recoverable() => Some((Err(err), Some(sub))),
                    Err(err) => Some((Err(err), None)),
                }
            }
        })
    }

    fn resync(&mut self) {
        self.cursor = self.buffer.head();
        self.resyncs += 1;
        debug!(
            head = self.cursor.index(),
            resyncs = self.resyncs,
            "subscription resynced after dropped events"
        );
    }

    /// Filters the batch under the cursor, marking it delivered.
    ///
    /// The writer only appends increasing indexes, so an already delivered
    /// index shows up only for `StartAt::AfterIndex` or after a resync.
    fn take_current(&mut self) -> Option<EventBatch> {
        let index = self.cursor.index();
        if self.delivered_through.is_some_and(|through| index <= through) {
            return None;
        }
        self.delivered_through = Some(index);

        let events: Vec<Event> = self
            .cursor
            .events()
            .iter()
            .filter(|e| self.request.matches(e))
            .cloned()
            .collect();
        if events.is_empty() {
            return None;
        }
        EventBatch::new(index, events).ok()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("position", &self.cursor.index())
            .field("delivered_through", &self.delivered_through)
            .field("resyncs", &self.resyncs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferWriter, channel};
    use crate::events::Topic;
    use futures::StreamExt;
    use std::time::Duration;

    fn setup(max_items: usize) -> (BufferWriter, EventBuffer) {
        channel(max_items, Duration::from_secs(3600)).unwrap()
    }

    fn append(writer: &BufferWriter, index: u64, topic: Topic, key: &str) {
        writer.append(index, vec![Event::new(topic, key, index)]);
    }

    #[tokio::test]
    async fn test_filters_by_topic_and_key() {
        let (writer, buffer) = setup(100);
        let req = SubscribeRequest::new().topic(Topic::Job, ["web"]);
        let mut sub = Subscription::new(buffer, req);

        append(&writer, 1, Topic::Job, "batch");
        append(&writer, 2, Topic::Node, "web");
        append(&writer, 3, Topic::Job, "web");

        let cancel = CancellationToken::new();
        let batch = sub.next(&cancel).await.unwrap();
        assert_eq!(batch.index(), 3);
        assert_eq!(batch.events()[0].key(), "web");
        assert_eq!(sub.position(), 3);
    }

    #[tokio::test]
    async fn test_keeps_only_matching_events_of_a_batch() {
        let (writer, buffer) = setup(100);
        let mut sub = Subscription::new(buffer, SubscribeRequest::new().topic(Topic::Node, ["*"]));

        writer.append(
            7,
            vec![
                Event::new(Topic::Job, "j", 7),
                Event::new(Topic::Node, "n1", 7),
                Event::new(Topic::Node, "n2", 7),
            ],
        );

        let batch = sub.try_next().unwrap().unwrap();
        let keys: Vec<&str> = batch.events().iter().map(Event::key).collect();
        assert_eq!(keys, vec!["n1", "n2"]);
        assert!(sub.try_next().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reports_gap_then_resumes_from_head() {
        let (writer, buffer) = setup(5);
        let mut sub = Subscription::new(buffer.clone(), SubscribeRequest::all());
        for i in 0..12 {
            append(&writer, i, Topic::Allocation, "a");
        }

        let cancel = CancellationToken::new();
        let err = sub.next(&cancel).await.unwrap_err();
        assert!(matches!(err, StreamError::Discontinuity { .. }));
        assert_eq!(sub.resyncs(), 1);

        let head = buffer.head().index();
        assert_eq!(head, 6);
        for expect in 7..12 {
            assert_eq!(sub.next(&cancel).await.unwrap().index(), expect);
        }
    }

    #[tokio::test]
    async fn test_start_latest_skips_history() {
        let (writer, buffer) = setup(100);
        for i in 0..5 {
            append(&writer, i, Topic::Job, "j");
        }
        let mut sub = Subscription::new(buffer, SubscribeRequest::all().start_at(StartAt::Latest));
        assert!(sub.try_next().unwrap().is_none());

        append(&writer, 5, Topic::Job, "j");
        assert_eq!(sub.try_next().unwrap().unwrap().index(), 5);
    }

    #[tokio::test]
    async fn test_start_after_index() {
        let (writer, buffer) = setup(100);
        for i in 0..5 {
            append(&writer, i, Topic::Job, "j");
        }
        let req = SubscribeRequest::all().start_at(StartAt::AfterIndex(2));
        let mut sub = Subscription::new(buffer, req);

        assert_eq!(sub.try_next().unwrap().unwrap().index(), 3);
        assert_eq!(sub.try_next().unwrap().unwrap().index(), 4);
        assert!(sub.try_next().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_next_waits_for_append() {
        let (writer, buffer) = setup(100);
        let mut sub = Subscription::new(buffer, SubscribeRequest::all());
        let reader = tokio::spawn(async move {
            let cancel = CancellationToken::new();
            sub.next(&cancel).await
        });
        tokio::task::yield_now().await;

        append(&writer, 1, Topic::Node, "n");
        assert_eq!(reader.await.unwrap().unwrap().index(), 1);
    }

    #[tokio::test]
    async fn test_stream_ends_on_close() {
        let (writer, buffer) = setup(100);
        let sub = Subscription::new(buffer, SubscribeRequest::all());
        for i in 0..3 {
            append(&writer, i, Topic::Job, "j");
        }
        drop(writer);

        let items: Vec<_> = sub.into_stream(CancellationToken::new()).collect().await;
        assert_eq!(items.len(), 4);
        let indexes: Vec<u64> = items[..3].iter().map(|r| r.as_ref().unwrap().index()).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
        assert_eq!(items[3].as_ref().unwrap_err(), &StreamError::Closed);
    }

    #[tokio::test]
    async fn test_stream_ends_on_cancel() {
        let (_writer, buffer) = setup(100);
        let cancel = CancellationToken::new();
        let sub = Subscription::new(buffer, SubscribeRequest::all());
        let mut stream = Box::pin(sub.into_stream(cancel.clone()));
        cancel.cancel();
        assert!(stream.next().await.is_none());
    }
}
