//! Broadcast fan-out for camera and inference streams
//!
//! A [`Hub`] takes values from one producer and delivers each of them, in
//! order, to every consumer subscribed at the time. Consumers come and go
//! freely; each has its own bounded inbox, and the hub guarantees that a
//! consumer that disappears never leaks and a hub that shuts down never hangs.
//!
//! Around the hub sit thin collaborators:
//! - [`ingest`]: a TCP socket that an encoder pipeline writes into, cut into
//!   chunks or fixed-size frames and published
//! - [`serve`]: HTTP MJPEG streams and WebSocket JSON feeds, one subscription
//!   per connection
//!
//! # Example
//! ```no_run
//! use bytes::Bytes;
//! use frame_hub::{BufferPlan, Hub, HubConfig, IngestConfig, IngestServer, ServeConfig, StreamServer};
//!
//! # async fn example() -> frame_hub::Result<()> {
//! let plan = BufferPlan::default();
//! let hub: Hub<Bytes> = Hub::with_config(HubConfig::from_plan(&plan).name("/mjpeg_stream1"));
//! hub.start();
//!
//! let ingest = IngestServer::new(IngestConfig::default(), hub.clone());
//! tokio::spawn(async move { ingest.run().await });
//!
//! StreamServer::new(ServeConfig::default().plan(&plan))
//!     .mjpeg("/mjpeg_stream1", hub)
//!     .run()
//!     .await
//! # }
//! ```

pub mod error;
pub mod hub;
pub mod ingest;
pub mod serve;
pub mod stats;

pub use error::{Error, Result};
pub use hub::{
    buffer_size_from_total, BufferPlan, DeliveryPolicy, Hub, HubConfig, HubPhase, Subscription,
};
pub use ingest::{FrameMode, FrameReader, IngestConfig, IngestServer};
pub use serve::{ServeConfig, StreamServer};
pub use stats::{HubStats, SubscriberStats};
