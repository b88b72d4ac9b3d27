//! Subscriptions
//!
//! A subscription is one consumer's inbox into a hub. Only the control loop
//! writes to it and only the owning consumer reads from it.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::stats::{SubscriberCounters, SubscriberStats};

use super::control::{Command, SubscriberId};

/// Receiving half of a subscriber inbox
pub(crate) enum InboxReceiver<T> {
    Bounded(mpsc::Receiver<T>),
    Unbounded(mpsc::UnboundedReceiver<T>),
}

impl<T> InboxReceiver<T> {
    async fn recv(&mut self) -> Option<T> {
        match self {
            InboxReceiver::Bounded(rx) => rx.recv().await,
            InboxReceiver::Unbounded(rx) => rx.recv().await,
        }
    }

    fn try_recv(&mut self) -> Result<T, TryRecvError> {
        match self {
            InboxReceiver::Bounded(rx) => rx.try_recv(),
            InboxReceiver::Unbounded(rx) => rx.try_recv(),
        }
    }

    fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<T>> {
        match self {
            InboxReceiver::Bounded(rx) => rx.poll_recv(cx),
            InboxReceiver::Unbounded(rx) => rx.poll_recv(cx),
        }
    }

    fn is_closed(&self) -> bool {
        match self {
            InboxReceiver::Bounded(rx) => rx.is_closed(),
            InboxReceiver::Unbounded(rx) => rx.is_closed(),
        }
    }

    fn close(&mut self) {
        match self {
            InboxReceiver::Bounded(rx) => rx.close(),
            InboxReceiver::Unbounded(rx) => rx.close(),
        }
    }
}

/// A consumer's handle into a hub
///
/// Values arrive in publish order. The stream ends (`recv` returns `None`)
/// once the subscription is unsubscribed, evicted, or the hub shuts down;
/// values already in the inbox are still handed out first.
///
/// Dropping a subscription unsubscribes it.
pub struct Subscription<T> {
    id: SubscriberId,
    inbox: InboxReceiver<T>,
    /// None once unsubscribed, or when the hub refused the subscription
    control: Option<mpsc::UnboundedSender<Command<T>>>,
    counters: Arc<SubscriberCounters>,
    received: u64,
    discarded: u64,
    ended: bool,
}

impl<T> Subscription<T> {
    pub(crate) fn new(
        id: SubscriberId,
        inbox: InboxReceiver<T>,
        control: Option<mpsc::UnboundedSender<Command<T>>>,
        counters: Arc<SubscriberCounters>,
    ) -> Self {
        Self {
            id,
            inbox,
            control,
            counters,
            received: 0,
            discarded: 0,
            ended: false,
        }
    }

    /// Identifier of this subscription within its hub
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next value. Returns `None` at end of stream.
    pub async fn recv(&mut self) -> Option<T> {
        let value = self.inbox.recv().await;
        self.observe(value)
    }

    /// Take the next value if one is already buffered
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        let result = self.inbox.try_recv();
        match result {
            Ok(_) => self.received += 1,
            Err(TryRecvError::Disconnected) => self.ended = true,
            Err(TryRecvError::Empty) => {}
        }
        result
    }

    /// Wait for a value, then skip ahead to the newest buffered one.
    ///
    /// Stale values are discarded so a consumer that fell behind acts on the
    /// freshest data instead of working through a backlog.
    pub async fn recv_latest(&mut self) -> Option<T> {
        let mut latest = self.recv().await?;
        loop {
            match self.inbox.try_recv() {
                Ok(newer) => {
                    self.discarded += 1;
                    latest = newer;
                }
                Err(TryRecvError::Disconnected) => {
                    self.ended = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
            }
        }
        Some(latest)
    }

    /// Discard `skip` values, then return the one after them.
    ///
    /// Used by consumers that only process every n-th value, such as an
    /// inference loop running slower than the camera.
    pub async fn recv_skipping(&mut self, skip: usize) -> Option<T> {
        for _ in 0..skip {
            let value = self.inbox.recv().await;
            if value.is_none() {
                self.ended = true;
                return None;
            }
            self.discarded += 1;
        }
        self.recv().await
    }

    /// Leave the hub. Idempotent.
    ///
    /// The inbox is closed immediately, so fan-out never waits on it again;
    /// values already buffered can still be read.
    pub fn unsubscribe(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(Command::Remove(self.id));
            tracing::trace!(subscriber_id = self.id, "Unsubscribe requested");
        }
        self.inbox.close();
    }

    /// Whether the inbox is closed: unsubscribed, refused, evicted, or the
    /// hub has shut down.
    ///
    /// Values buffered before the close can still be read.
    pub fn is_closed(&self) -> bool {
        self.ended || self.control.is_none() || self.inbox.is_closed()
    }

    /// Get subscription statistics
    pub fn stats(&self) -> SubscriberStats {
        SubscriberStats {
            delivered: self.counters.delivered(),
            dropped: self.counters.dropped(),
            received: self.received,
            discarded: self.discarded,
        }
    }

    fn observe(&mut self, value: Option<T>) -> Option<T> {
        match value {
            Some(_) => self.received += 1,
            None => self.ended = true,
        }
        value
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

// Never pin-projected
impl<T> Unpin for Subscription<T> {}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let this = self.get_mut();
        match this.inbox.poll_recv(cx) {
            Poll::Ready(value) => Poll::Ready(this.observe(value)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("received", &self.received)
            .finish()
    }
}
