//! Consumer side: exposing hubs over HTTP
//!
//! Each HTTP or WebSocket connection opens its own subscription, relays it
//! until the stream ends, the client goes away, or nothing has moved for the
//! idle timeout, and unsubscribes on the way out.

pub mod config;
pub mod mjpeg;
pub mod server;
pub mod ws;

pub use config::{ServeConfig, DEFAULT_BOUNDARY};
pub use mjpeg::{content_type, mjpeg_handler, relay_body, MjpegRoute};
pub use server::StreamServer;
pub use ws::{feed_handler, FeedRoute};
