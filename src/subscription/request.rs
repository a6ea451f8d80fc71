//! # Subscription requests: what to read and where to start.

use std::collections::HashMap;

use crate::events::{Event, Topic};

/// Key that matches every key of a topic.
pub const WILDCARD: &str = "*";

/// Where a new subscription starts reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StartAt {
    /// Replay everything still retained, starting after [`EventBuffer::head`](crate::EventBuffer::head).
    #[default]
    Oldest,
    /// Only batches appended after the subscription is opened.
    Latest,
    /// Replay retained batches with an index greater than the given one.
    AfterIndex(u64),
}

/// Topic/key filter plus start position.
///
/// An empty topic map matches every event. A topic mapped to an empty key
/// list, or to a list containing [`WILDCARD`], matches every key of that topic.
/// [`Topic::All`] matches every topic.
///
/// # Example
/// ```
/// use commitstream::{Event, SubscribeRequest, Topic};
///
/// let req = SubscribeRequest::new()
///     .topic(Topic::Job, ["web", "api"])
///     .topic(Topic::Node, ["*"]);
///
/// assert!(req.matches(&Event::new(Topic::Job, "web", 1)));
/// assert!(!req.matches(&Event::new(Topic::Job, "batch", 1)));
/// assert!(req.matches(&Event::new(Topic::Node, "any-node", 1)));
/// assert!(!req.matches(&Event::new(Topic::Allocation, "web", 1)));
/// ```
#[derive(Clone, Debug, Default)]
pub struct SubscribeRequest {
    topics: HashMap<Topic, Vec<String>>,
    start: StartAt,
}

impl SubscribeRequest {
    /// Empty request: every topic, starting at the oldest retained batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every topic and key.
    pub fn all() -> Self {
        Self::new().topic(Topic::All, [WILDCARD])
    }

    /// Adds keys of interest for `topic`.
    pub fn topic<I, K>(mut self, topic: Topic, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.topics
            .entry(topic)
            .or_default()
            .extend(keys.into_iter().map(Into::into));
        self
    }

    /// Sets the start position.
    pub fn start_at(mut self, start: StartAt) -> Self {
        self.start = start;
        self
    }

    /// Start position.
    pub fn start(&self) -> StartAt {
        self.start
    }

    /// Returns `true` if `event` passes the topic/key filter.
    pub fn matches(&self, event: &Event) -> bool {
        if self.topics.is_empty() {
            return true;
        }
        [event.topic(), &Topic::All]
            .into_iter()
            .filter_map(|t| self.topics.get(t))
            .any(|keys| {
                keys.is_empty() || keys.iter().any(|k| k == WILDCARD || k == event.key())
            })
    }
}
