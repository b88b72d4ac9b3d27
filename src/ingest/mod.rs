//! Producer side: turning a pipeline's TCP output into hub values
//!
//! External encoder or camera pipelines connect to an ingest socket and
//! write either a multipart JPEG stream (relayed in chunks) or raw frames of
//! a known size. Each value read is published into one hub.

pub mod config;
pub mod listener;
pub mod reader;

pub use config::IngestConfig;
pub use listener::{IngestEnd, IngestServer, IngestSummary};
pub use reader::{FrameMode, FrameReader, DEFAULT_CHUNK_SIZE};
