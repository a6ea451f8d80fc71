//! # Publisher configuration.
//!
//! Provides [`PublisherConfig`] centralized settings for the event publisher
//! and the buffer it owns. Supplied once at construction; there is no runtime
//! reconfiguration.
//!
//! ## Degenerate values
//! Zero values are rejected by [`PublisherConfig::validate`] rather than
//! treated as sentinels: a buffer must always be able to hold its latest item.

use std::time::Duration;

use crate::error::ConfigError;

/// Configuration for [`EventPublisher`](crate::EventPublisher).
///
/// ## Field semantics
/// - `buffer_size`: maximum items retained in the buffer (min 1)
/// - `ttl`: how long an item stays retained before the pruner may evict it
/// - `prune_tick`: interval of the background pruner
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Maximum number of batches retained for readers.
    ///
    /// Readers more than `buffer_size` batches behind observe a discontinuity.
    pub buffer_size: usize,

    /// Retention time of a batch.
    ///
    /// Expired batches are evicted on the next prune tick, except the latest one.
    pub ttl: Duration,

    /// Interval between prune passes.
    ///
    /// The pruner runs on this interval whether or not anything is published.
    pub prune_tick: Duration,
}

impl PublisherConfig {
    /// Sets the buffer size.
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Sets the retention time.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the prune interval.
    pub fn with_prune_tick(mut self, prune_tick: Duration) -> Self {
        self.prune_tick = prune_tick;
        self
    }

    /// Checks every field, returning the first violation.
    ///
    /// # Example
    /// ```
    /// use commitstream::{ConfigError, PublisherConfig};
    ///
    /// let cfg = PublisherConfig::default().with_buffer_size(0);
    /// assert_eq!(cfg.validate(), Err(ConfigError::ZeroBufferSize));
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        if self.ttl.is_zero() {
            return Err(ConfigError::ZeroTtl);
        }
        if self.prune_tick.is_zero() {
            return Err(ConfigError::ZeroPruneTick);
        }
        Ok(())
    }
}

impl Default for PublisherConfig {
    /// Default configuration:
    ///
    /// - `buffer_size = 100`
    /// - `ttl = 1h`
    /// - `prune_tick = 5s`
    fn default() -> Self {
        Self {
            buffer_size: 100,
            ttl: Duration::from_secs(60 * 60),
            prune_tick: Duration::from_secs(5),
        }
    }
}
