//! WebSocket result feeds
//!
//! Structured values (detections, classifications) are pushed to browsers as
//! JSON text messages, one message per published value.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use serde::Serialize;

use crate::hub::{Hub, Subscription};

use super::config::ServeConfig;

/// Shared state for one WebSocket feed
pub struct FeedRoute<T> {
    hub: Hub<T>,
    config: Arc<ServeConfig>,
    latest_only: bool,
}

impl<T> FeedRoute<T> {
    /// Create feed state for `hub`.
    ///
    /// With `latest_only`, a client that falls behind skips straight to the
    /// newest value instead of receiving the backlog.
    pub fn new(hub: Hub<T>, config: Arc<ServeConfig>, latest_only: bool) -> Self {
        Self {
            hub,
            config,
            latest_only,
        }
    }
}

impl<T> Clone for FeedRoute<T> {
    fn clone(&self) -> Self {
        Self {
            hub: self.hub.clone(),
            config: Arc::clone(&self.config),
            latest_only: self.latest_only,
        }
    }
}

/// Handler upgrading to a WebSocket that streams one hub
pub async fn feed_handler<T>(
    ws: WebSocketUpgrade,
    State(route): State<FeedRoute<T>>,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Response
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    let peer = peer
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    ws.on_upgrade(move |socket| feed_socket(socket, route, peer))
}

async fn feed_socket<T>(mut socket: WebSocket, route: FeedRoute<T>, peer: String)
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    tracing::info!(peer = %peer, hub = %route.hub.config().name, "Websocket connection established");

    let mut subscription = route.hub.subscribe(route.config.inbox_capacity);
    let reason = pump(&mut socket, &mut subscription, &route).await;
    subscription.unsubscribe();

    if reason == "stream ended" {
        let close = socket.send(Message::Close(None));
        let _ = tokio::time::timeout(route.config.idle_timeout, close).await;
    }

    tracing::info!(peer = %peer, reason, "Websocket connection terminated");
}

/// Forward values until the stream or the socket ends. Returns why it stopped.
async fn pump<T>(
    socket: &mut WebSocket,
    subscription: &mut Subscription<T>,
    route: &FeedRoute<T>,
) -> &'static str
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    loop {
        let value = tokio::select! {
            value = next_value(subscription, route.latest_only) => value,
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => return "client closed",
                Some(Err(_)) => return "read error",
                // Clients have nothing to say; pings are answered by the socket
                Some(Ok(_)) => continue,
            },
        };

        let Some(value) = value else {
            return "stream ended";
        };

        let text = match serde_json::to_string(&value) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize feed value");
                continue;
            }
        };

        if !send_text(socket, text, route.config.idle_timeout).await {
            return "write failed";
        }
    }
}

async fn next_value<T>(subscription: &mut Subscription<T>, latest_only: bool) -> Option<T> {
    if latest_only {
        subscription.recv_latest().await
    } else {
        subscription.recv().await
    }
}

async fn send_text(socket: &mut WebSocket, text: String, deadline: Duration) -> bool {
    match tokio::time::timeout(deadline, socket.send(Message::Text(text))).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Websocket write error");
            false
        }
        Err(_) => {
            tracing::warn!(timeout_ms = deadline.as_millis() as u64, "Websocket write timed out");
            false
        }
    }
}
