//! MJPEG over HTTP
//!
//! The producer pipeline already emits a complete `multipart/x-mixed-replace`
//! byte stream, so each connection just relays the hub's chunks verbatim
//! behind the matching response header.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream;

use crate::hub::{Hub, Subscription};

use super::config::ServeConfig;

/// Shared state for one MJPEG route
#[derive(Clone)]
pub struct MjpegRoute {
    hub: Hub<Bytes>,
    config: Arc<ServeConfig>,
}

impl MjpegRoute {
    /// Create route state for `hub`
    pub fn new(hub: Hub<Bytes>, config: Arc<ServeConfig>) -> Self {
        Self { hub, config }
    }
}

/// `Content-Type` value for a multipart stream with the given boundary
pub fn content_type(boundary: &str) -> String {
    format!("multipart/x-mixed-replace; boundary=--{}", boundary)
}

/// Handler streaming one hub to one HTTP client
pub async fn mjpeg_handler(
    State(route): State<MjpegRoute>,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    let peer = peer
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    tracing::info!(peer = %peer, hub = %route.hub.config().name, "HTTP connection established");

    let subscription = route.hub.subscribe(route.config.inbox_capacity);
    let body = relay_body(subscription, route.config.idle_timeout, peer);

    (
        [
            (header::CONTENT_TYPE, content_type(&route.config.boundary)),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response()
}

struct RelayState {
    subscription: Subscription<Bytes>,
    idle_timeout: Duration,
    peer: String,
}

/// Turn a subscription into a response body.
///
/// The body ends when the subscription closes or no chunk arrives within
/// `idle_timeout`. Dropping the body (client gone) drops the subscription,
/// which unsubscribes it.
pub fn relay_body(subscription: Subscription<Bytes>, idle_timeout: Duration, peer: String) -> Body {
    let state = RelayState {
        subscription,
        idle_timeout,
        peer,
    };

    let chunks = stream::unfold(state, |mut state| async move {
        match tokio::time::timeout(state.idle_timeout, state.subscription.recv()).await {
            Ok(Some(chunk)) => Some((Ok::<_, Infallible>(chunk), state)),
            Ok(None) => {
                tracing::info!(peer = %state.peer, "HTTP connection closed");
                None
            }
            Err(_) => {
                tracing::warn!(peer = %state.peer, "Lost stream");
                None
            }
        }
    });

    Body::from_stream(chunks)
}
