//! Buffer sizing policy
//!
//! A producer that fills frames into a fixed ring of buffers must never
//! overwrite a slot that some subscriber has not read yet. The number of
//! distinct values that can be alive at once is bounded by:
//!
//! ```text
//!   queue_capacity          values waiting for fan-out
//! + 1                       value being fanned out
//! + max(inbox_capacity, 1)  values buffered by the slowest subscriber
//! + 1                       value held by that subscriber's reader
//! + 1                       value being filled by the producer
//! ```
//!
//! All subscribers share the same values, so the bound does not grow with
//! the number of subscribers. `Bytes` payloads enforce this by reference
//! counting alone; the plan is for producers that keep their own pools.
//!
//! The bound only holds while the producer is throttled by the slowest
//! subscriber, which means blocking delivery with no stall timeout. A
//! subscriber that drops values, or one that is evicted and keeps reading its
//! inbox, holds stale values the producer has long since moved past.

use crate::error::{Error, Result};

use super::config::{DeliveryPolicy, HubConfig};

/// Total buffers used by the camera streams unless configured otherwise
pub const DEFAULT_TOTAL_BUFFERS: usize = 1024;

/// Split a total buffer budget into one queue or inbox share.
///
/// Half of the budget minus two, so that a hub queue and one subscriber inbox
/// sized this way still leave room for the values held outside any queue.
/// Budgets under four buffers get no queueing at all.
pub fn buffer_size_from_total(total: usize) -> usize {
    if total < 4 {
        return 0;
    }
    total / 2 - 2
}

/// Inbox slots actually allocated for a requested capacity
pub(crate) fn inbox_slots(capacity: usize) -> usize {
    capacity.max(1)
}

/// Queue and inbox capacities derived from a buffer budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPlan {
    /// Buffers available to the producer
    pub total: usize,
    /// Hub publish queue capacity
    pub queue_capacity: usize,
    /// Capacity of each subscriber inbox
    pub inbox_capacity: usize,
}

impl BufferPlan {
    /// Derive both capacities from a total budget
    pub fn from_total(total: usize) -> Self {
        let share = buffer_size_from_total(total);
        Self {
            total,
            queue_capacity: share,
            inbox_capacity: share,
        }
    }

    /// Build a plan from explicit capacities, with the smallest safe pool
    pub fn new(queue_capacity: usize, inbox_capacity: usize) -> Self {
        Self {
            total: Self::required_slots(queue_capacity, inbox_capacity),
            queue_capacity,
            inbox_capacity,
        }
    }

    /// Pool slots needed for the given capacities
    pub fn required_slots(queue_capacity: usize, inbox_capacity: usize) -> usize {
        queue_capacity + inbox_slots(inbox_capacity) + 3
    }

    /// Most distinct values that can be alive at the same time
    pub fn max_in_flight(&self) -> usize {
        Self::required_slots(self.queue_capacity, self.inbox_capacity)
    }

    /// Check that a pool of `total` buffers is never overwritten while read
    pub fn validate(&self) -> Result<()> {
        let required = self.max_in_flight();
        if self.total < required {
            return Err(Error::PoolTooSmall {
                slots: self.total,
                required,
            });
        }
        Ok(())
    }

    /// Check that a hub running `config` keeps a pool of this plan intact.
    ///
    /// Subscribers must also use an inbox no larger than `inbox_capacity`.
    pub fn validate_for(&self, config: &HubConfig) -> Result<()> {
        if config.delivery != DeliveryPolicy::Blocking {
            return Err(Error::UnsafeDelivery {
                reason: "dropping deliveries lets slow subscribers hold recycled buffers",
            });
        }
        if config.stall_timeout.is_some() {
            return Err(Error::UnsafeDelivery {
                reason: "evicted subscribers can still read recycled buffers",
            });
        }

        let required = Self::required_slots(config.queue_capacity, self.inbox_capacity);
        if self.total < required {
            return Err(Error::PoolTooSmall {
                slots: self.total,
                required,
            });
        }
        Ok(())
    }
}

impl Default for BufferPlan {
    fn default() -> Self {
        Self::from_total(DEFAULT_TOTAL_BUFFERS)
    }
}
