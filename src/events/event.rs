//! # Change events produced by the state-machine commit path.
//!
//! The [`Topic`] enum classifies what kind of entity changed; an [`Event`]
//! carries the topic, the entity key, the commit index and an opaque
//! [`Payload`]. Events committed atomically at one index travel together as an
//! [`EventBatch`].
//!
//! ## Ordering guarantees
//! The commit index is assigned by the authoritative commit order. Every event
//! in a batch carries the batch index; [`EventBatch::new`] rejects batches
//! that break this.
//!
//! ## Example
//! ```rust
//! use commitstream::{Event, EventBatch, Topic};
//!
//! let ev = Event::new(Topic::Job, "example-job", 42).with_payload("registered");
//!
//! assert_eq!(ev.topic(), &Topic::Job);
//! assert_eq!(ev.key(), "example-job");
//! assert_eq!(ev.payload().downcast_ref::<&str>(), Some(&"registered"));
//!
//! let batch = EventBatch::new(42, vec![ev]).unwrap();
//! assert_eq!(batch.len(), 1);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::PublishError;

/// Classification of the entity an event describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Job registered, updated or deregistered.
    Job,
    /// Allocation placed, updated or stopped.
    Allocation,
    /// Node registered, drained or status changed.
    Node,
    /// Evaluation created or updated.
    Evaluation,
    /// Deployment created, promoted or failed.
    Deployment,
    /// Any other entity kind, named by the producer.
    Custom(Arc<str>),
    /// Wildcard used by subscriptions; never carried by a published event.
    All,
}

impl Topic {
    /// Returns a stable label for logs.
    pub fn as_str(&self) -> &str {
        match self {
            Topic::Job => "Job",
            Topic::Allocation => "Allocation",
            Topic::Node => "Node",
            Topic::Evaluation => "Evaluation",
            Topic::Deployment => "Deployment",
            Topic::Custom(name) => name,
            Topic::All => "*",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque event payload.
///
/// Cheap to clone (`Arc`-backed) and shared by every reader of the event.
/// Consumers that know the concrete type recover it with [`downcast_ref`](Self::downcast_ref).
#[derive(Clone, Default)]
pub struct Payload(Option<Arc<dyn Any + Send + Sync>>);

impl Payload {
    /// Wraps a value as a payload.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    /// Payload with no content.
    pub fn empty() -> Self {
        Self(None)
    }

    /// Returns `true` if no value is attached.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Returns the payload as `T` if that is its concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|v| v.downcast_ref::<T>())
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Payload(..)"),
            None => f.write_str("Payload(empty)"),
        }
    }
}

/// A single immutable change.
#[derive(Clone, Debug)]
pub struct Event {
    topic: Topic,
    key: Arc<str>,
    index: u64,
    payload: Payload,
}

impl Event {
    /// Creates an event with an empty payload.
    pub fn new(topic: Topic, key: impl Into<Arc<str>>, index: u64) -> Self {
        Self {
            topic,
            key: key.into(),
            index,
            payload: Payload::empty(),
        }
    }

    /// Attaches a payload.
    #[inline]
    pub fn with_payload<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.payload = Payload::new(value);
        self
    }

    /// Topic of the changed entity.
    #[inline]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Key (usually the entity ID) of the changed entity.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Commit index this event belongs to.
    #[inline]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Opaque payload.
    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }
}

/// Events committed atomically at one index.
#[derive(Clone, Debug)]
pub struct EventBatch {
    index: u64,
    events: Vec<Event>,
}

impl EventBatch {
    /// Builds a batch, checking that every event carries `index`.
    pub fn new(index: u64, events: Vec<Event>) -> Result<Self, PublishError> {
        if let Some(bad) = events.iter().find(|e| e.index != index) {
            return Err(PublishError::IndexMismatch {
                batch: index,
                event: bad.index,
            });
        }
        Ok(Self { index, events })
    }

    /// Commit index shared by all events.
    #[inline]
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Events in commit order.
    #[inline]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Number of events.
    #[inline]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if the batch has no events.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub(crate) fn into_parts(self) -> (u64, Vec<Event>) {
        (self.index, self.events)
    }
}
