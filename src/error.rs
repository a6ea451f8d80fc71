//! Error types used by the event buffer, publisher and subscriptions.
//!
//! This module defines three error enums:
//!
//! - [`StreamError`]: errors observed by readers traversing the buffer.
//! - [`ConfigError`]: invalid publisher/buffer configuration, raised at construction.
//! - [`PublishError`]: errors reported to the commit path calling `publish`.
//!
//! All types provide helper methods (`as_label`, `as_message`) for logging/metrics.

use std::time::Duration;
use thiserror::Error;

/// # Errors observed by readers of the event buffer.
///
/// None of these change buffer state. A [`StreamError::Discontinuity`] is
/// recovered by re-reading [`EventBuffer::head`](crate::EventBuffer::head);
/// the others are left to the caller.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The reader's position was evicted (by count or by age) before it advanced past it.
    #[error("event at index {index} dropped from buffer; resync from head")]
    Discontinuity {
        /// Index of the evicted item the reader was parked on.
        index: u64,
    },

    /// The wait for the next item exceeded the caller's timeout.
    #[error("timed out after {timeout:?} waiting for next event")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// The wait was cancelled by the caller's token.
    #[error("context cancelled")]
    Canceled,

    /// The buffer was torn down while the reader was waiting.
    #[error("event buffer closed")]
    Closed,
}

impl StreamError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use commitstream::StreamError;
    ///
    /// let err = StreamError::Discontinuity { index: 4 };
    /// assert_eq!(err.as_label(), "stream_discontinuity");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            StreamError::Discontinuity { .. } => "stream_discontinuity",
            StreamError::Timeout { .. } => "stream_timeout",
            StreamError::Canceled => "stream_canceled",
            StreamError::Closed => "stream_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            StreamError::Discontinuity { index } => format!("dropped at index {index}"),
            StreamError::Timeout { timeout } => format!("timeout: {timeout:?}"),
            StreamError::Canceled => "context cancelled".to_string(),
            StreamError::Closed => "buffer closed".to_string(),
        }
    }

    /// Indicates whether the reader can continue on the same buffer.
    ///
    /// Returns `true` for everything except [`StreamError::Closed`]: a
    /// discontinuity resyncs from head, a timeout or cancellation may be retried.
    ///
    /// # Example
    /// ```
    /// use commitstream::StreamError;
    ///
    /// assert!(StreamError::Discontinuity { index: 1 }.is_recoverable());
    /// assert!(!StreamError::Closed.is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, StreamError::Closed)
    }
}

/// # Errors produced while validating configuration.
///
/// Fatal to startup: returned from [`EventPublisher::new`](crate::EventPublisher::new)
/// and [`PublisherConfig::validate`](crate::PublisherConfig::validate), never retried.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The buffer must retain at least one item.
    #[error("event buffer size must be at least 1")]
    ZeroBufferSize,

    /// Items must live for a non-zero time.
    #[error("event buffer ttl must be greater than zero")]
    ZeroTtl,

    /// The pruner needs a non-zero interval.
    #[error("prune interval must be greater than zero")]
    ZeroPruneTick,
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::ZeroBufferSize => "config_zero_buffer_size",
            ConfigError::ZeroTtl => "config_zero_ttl",
            ConfigError::ZeroPruneTick => "config_zero_prune_tick",
        }
    }
}

/// # Errors returned to the commit path by `publish`.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// An event in the batch carries a different index than the batch.
    #[error("event index {event} does not match batch index {batch}")]
    IndexMismatch {
        /// Index the batch was published under.
        batch: u64,
        /// Index carried by the offending event.
        event: u64,
    },

    /// The writer task has stopped; nothing more will be appended.
    #[error("event publisher closed")]
    Closed,
}

impl PublishError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use commitstream::PublishError;
    ///
    /// assert_eq!(PublishError::Closed.as_label(), "publish_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            PublishError::IndexMismatch { .. } => "publish_index_mismatch",
            PublishError::Closed => "publish_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            PublishError::IndexMismatch { batch, event } => {
                format!("batch={batch} event={event}")
            }
            PublishError::Closed => "publisher closed".to_string(),
        }
    }
}
