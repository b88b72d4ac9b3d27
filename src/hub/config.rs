//! Hub configuration

use std::time::Duration;

use super::sizing::{BufferPlan, DEFAULT_TOTAL_BUFFERS};

/// How the control loop hands a value to a subscriber whose inbox is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Wait for room in the inbox. No subscriber misses a value, but a slow
    /// subscriber holds back every other one until it drains or is evicted.
    Blocking,
    /// Skip the subscriber and count a drop. Subscribers never wait on each
    /// other, at the cost of gaps in slow streams.
    DropOnFull,
}

/// Hub configuration options
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Name used in log events (usually the route or stream it feeds)
    pub name: String,

    /// Published values that may wait for fan-out (0 = direct hand-off)
    pub queue_capacity: usize,

    /// Delivery behaviour for full inboxes
    pub delivery: DeliveryPolicy,

    /// Longest a blocking delivery may wait before the subscriber is evicted
    /// (None = wait forever)
    pub stall_timeout: Option<Duration>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            name: "hub".to_string(),
            queue_capacity: BufferPlan::from_total(DEFAULT_TOTAL_BUFFERS).queue_capacity,
            delivery: DeliveryPolicy::Blocking,
            stall_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl HubConfig {
    /// Create a config with the given queue capacity
    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            queue_capacity: capacity,
            ..Default::default()
        }
    }

    /// Create a config a fixed pool of `plan.total` buffers can feed.
    ///
    /// Delivery is blocking with no stall timeout: a dropped or evicted
    /// subscriber could keep reading values long after the producer has
    /// recycled their buffers. See [`BufferPlan::validate_for`].
    pub fn from_plan(plan: &BufferPlan) -> Self {
        Self::with_queue_capacity(plan.queue_capacity).without_stall_timeout()
    }

    /// Set the name used in log events
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set the delivery policy
    pub fn delivery(mut self, policy: DeliveryPolicy) -> Self {
        self.delivery = policy;
        self
    }

    /// Set the stall timeout for blocking delivery
    pub fn stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    /// Never evict stalled subscribers
    pub fn without_stall_timeout(mut self) -> Self {
        self.stall_timeout = None;
        self
    }
}
