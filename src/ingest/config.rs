//! Ingest configuration

use std::net::SocketAddr;

use super::reader::FrameMode;

/// Configuration for a producer-facing TCP socket
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Address the producer pipeline connects to
    pub bind_addr: SocketAddr,

    /// How the incoming byte stream is cut into values
    pub mode: FrameMode,

    /// Enable TCP_NODELAY on accepted sockets
    pub tcp_nodelay: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9990)),
            mode: FrameMode::default(),
            tcp_nodelay: true,
        }
    }
}

impl IngestConfig {
    /// Create a config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the framing mode
    pub fn mode(mut self, mode: FrameMode) -> Self {
        self.mode = mode;
        self
    }

    /// Relay the stream in chunks of at most `max_size` bytes
    pub fn chunked(self, max_size: usize) -> Self {
        self.mode(FrameMode::Chunked { max_size })
    }

    /// Cut the stream into frames of exactly `frame_size` bytes
    pub fn fixed(self, frame_size: usize) -> Self {
        self.mode(FrameMode::Fixed { frame_size })
    }
}
