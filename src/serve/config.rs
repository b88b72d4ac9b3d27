//! Serving configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::hub::BufferPlan;

/// Default multipart boundary between JPEG frames
pub const DEFAULT_BOUNDARY: &str = "frameboundary";

/// Configuration for the consumer-facing HTTP server
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// End a stream when no value arrives (or no write completes) for this long
    pub idle_timeout: Duration,

    /// Inbox capacity for each connection's subscription
    pub inbox_capacity: usize,

    /// Multipart boundary announced in MJPEG responses
    pub boundary: String,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 1337)),
            idle_timeout: Duration::from_secs(1),
            inbox_capacity: BufferPlan::default().inbox_capacity,
            boundary: DEFAULT_BOUNDARY.to_string(),
        }
    }
}

impl ServeConfig {
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

    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the per-connection inbox capacity
    pub fn inbox_capacity(mut self, capacity: usize) -> Self {
        self.inbox_capacity = capacity;
        self
    }

    /// Take the inbox capacity from a buffer plan
    pub fn plan(self, plan: &BufferPlan) -> Self {
        self.inbox_capacity(plan.inbox_capacity)
    }

    /// Set the multipart boundary
    pub fn boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = boundary.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServeConfig::default();

        assert_eq!(config.bind_addr.port(), 1337);
        assert_eq!(config.idle_timeout, Duration::from_secs(1));
        assert_eq!(config.inbox_capacity, 510);
        assert_eq!(config.boundary, "frameboundary");
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let config = ServeConfig::default()
            .bind(addr)
            .idle_timeout(Duration::from_millis(300))
            .plan(&BufferPlan::from_total(64))
            .boundary("edge");

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.idle_timeout, Duration::from_millis(300));
        assert_eq!(config.inbox_capacity, 30);
        assert_eq!(config.boundary, "edge");
    }
}
