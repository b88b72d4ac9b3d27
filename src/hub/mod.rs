//! Broadcast hub for one producer and many consumers
//!
//! A hub takes the values one producer publishes (JPEG chunks, raw frames,
//! inference results) and hands each of them to every subscription that is
//! attached at the time, in publish order.
//!
//! # Architecture
//!
//! ```text
//!      [Producer]                                      [Consumers]
//!   hub.publish(v).await                          sub.recv().await
//!         │                                               ▲
//!         │ bounded by queue_capacity                     │ inbox (per subscriber)
//!         ▼                                               │
//!   ┌──────────────────────── control loop task ─────────┴─────┐
//!   │ commands: FIFO of Add | Remove | Publish                  │
//!   │ subscribers: BTreeMap<SubscriberId, inbox sender>         │
//!   │ phase: Idle → Running → Draining → Stopped                │
//!   └───────────────────────────────────────────────────────────┘
//!         ▲                        ▲
//!   hub.subscribe(n)        sub.unsubscribe() / drop(sub)
//! ```
//!
//! Only the control loop touches the registry, so joins, leaves and fan-out
//! are totally ordered without a lock around the subscriber set.
//!
//! # Flow control
//!
//! `publish` waits while `queue_capacity` values are pending. With
//! [`DeliveryPolicy::Blocking`], fan-out waits for room in each inbox, so a
//! slow subscriber holds back every other one; `stall_timeout` bounds that
//! wait and evicts the laggard. With [`DeliveryPolicy::DropOnFull`], full
//! inboxes are skipped and the drop is counted. Consumers that only care
//! about the freshest value read with [`Subscription::recv_latest`].
//!
//! # Payloads
//!
//! Values are cloned once per subscriber, so payloads should be cheap to
//! clone: `bytes::Bytes` or `Arc<_>`.

pub mod config;
mod control;
pub mod handle;
pub mod sizing;
pub mod state;
pub mod subscription;

pub use config::{DeliveryPolicy, HubConfig};
pub use control::SubscriberId;
pub use handle::Hub;
pub use sizing::{buffer_size_from_total, BufferPlan, DEFAULT_TOTAL_BUFFERS};
pub use state::HubPhase;
pub use subscription::Subscription;
