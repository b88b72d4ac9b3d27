//! Statistics for hubs and subscriptions

pub mod metrics;

pub(crate) use metrics::{HubCounters, SubscriberCounters};
pub use metrics::{HubStats, SubscriberStats};
