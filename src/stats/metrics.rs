//! Counters for hubs and their subscribers

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Live counters updated by a hub's control loop
#[derive(Debug, Default)]
pub(crate) struct HubCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
    subscribers: AtomicUsize,
}

impl HubCounters {
    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_subscribers(&self, count: usize) {
        self.subscribers.store(count, Ordering::Relaxed);
    }

    pub(crate) fn subscribers(&self) -> usize {
        self.subscribers.load(Ordering::Relaxed)
    }

    pub(crate) fn snapshot(&self) -> HubStats {
        HubStats {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            subscribers: self.subscribers(),
        }
    }
}

/// Hub-wide statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Values accepted by the control loop for fan-out
    pub published: u64,
    /// Individual inbox deliveries
    pub delivered: u64,
    /// Deliveries skipped because an inbox was full
    pub dropped: u64,
    /// Subscribers force-removed after stalling
    pub evicted: u64,
    /// Currently registered subscribers
    pub subscribers: usize,
}

impl HubStats {
    /// Fraction of attempted deliveries that were dropped
    pub fn drop_ratio(&self) -> f64 {
        let attempts = self.delivered + self.dropped;
        if attempts == 0 {
            0.0
        } else {
            self.dropped as f64 / attempts as f64
        }
    }
}

/// Counters shared between the control loop and one subscription
#[derive(Debug, Default)]
pub(crate) struct SubscriberCounters {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl SubscriberCounters {
    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Per-subscription statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    /// Values placed in the inbox
    pub delivered: u64,
    /// Values skipped because the inbox was full
    pub dropped: u64,
    /// Values read by the consumer
    pub received: u64,
    /// Values read and thrown away by latest-wins or skipping reads
    pub discarded: u64,
}
