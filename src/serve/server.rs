//! Stream server
//!
//! Composes MJPEG routes and WebSocket feeds onto one HTTP listener.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use serde::Serialize;
use tokio::net::TcpListener;

use crate::error::Result;
use crate::hub::Hub;

use super::config::ServeConfig;
use super::mjpeg::{mjpeg_handler, MjpegRoute};
use super::ws::{feed_handler, FeedRoute};

/// HTTP server exposing hubs to browsers
pub struct StreamServer {
    config: Arc<ServeConfig>,
    router: Router,
    routes: Vec<String>,
}

impl StreamServer {
    /// Create a server with no routes
    pub fn new(config: ServeConfig) -> Self {
        Self {
            config: Arc::new(config),
            router: Router::new(),
            routes: Vec::new(),
        }
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServeConfig {
        &self.config
    }

    /// Paths registered so far
    pub fn routes(&self) -> &[String] {
        &self.routes
    }

    /// Serve `hub` as an MJPEG stream at `path`
    pub fn mjpeg(mut self, path: &str, hub: Hub<Bytes>) -> Self {
        let route = MjpegRoute::new(hub, Arc::clone(&self.config));
        self.router = self
            .router
            .route(path, get(mjpeg_handler).with_state(route));
        self.routes.push(path.to_string());
        self
    }

    /// Serve `hub` as a JSON WebSocket feed at `path`
    pub fn feed<T>(mut self, path: &str, hub: Hub<T>, latest_only: bool) -> Self
    where
        T: Serialize + Clone + Send + Sync + 'static,
    {
        let route = FeedRoute::new(hub, Arc::clone(&self.config), latest_only);
        self.router = self
            .router
            .route(path, get(feed_handler::<T>).with_state(route));
        self.routes.push(path.to_string());
        self
    }

    /// Get the assembled router
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Bind and serve until the process exits
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Bind and serve until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    ///
    /// Open streams are allowed to finish; they end once their hubs shut down
    /// or go idle.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, routes = ?self.routes, "Stream server listening");

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        tracing::info!(addr = %addr, "Stream server stopped");
        Ok(())
    }
}
