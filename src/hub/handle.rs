//! Hub handle
//!
//! The public face of a hub. Every operation either enqueues a command for
//! the control loop or flips the lifecycle phase; none of them touch the
//! subscriber registry directly.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot, Semaphore};

use crate::stats::{HubStats, SubscriberCounters};

use super::config::HubConfig;
use super::control::{Admission, Command, ControlLoop, InboxSender, Shared};
use super::sizing::inbox_slots;
use super::state::HubPhase;
use super::subscription::{InboxReceiver, Subscription};

/// Single-producer, multi-subscriber broadcast hub
///
/// Cloning a `Hub` gives another handle to the same hub. When the last
/// handle is dropped the hub shuts down.
///
/// # Example
/// ```no_run
/// use bytes::Bytes;
/// use frame_hub::{Hub, HubConfig};
///
/// # async fn example() {
/// let hub: Hub<Bytes> = Hub::with_config(HubConfig::with_queue_capacity(2));
/// hub.start();
///
/// let mut sub = hub.subscribe(4);
/// hub.publish(Bytes::from_static(b"frame")).await;
///
/// assert_eq!(sub.recv().await, Some(Bytes::from_static(b"frame")));
/// hub.shutdown();
/// # }
/// ```
pub struct Hub<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    config: HubConfig,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command<T>>,
    /// Taken by `start`
    pending: Mutex<Option<mpsc::UnboundedReceiver<Command<T>>>>,
    /// Queue capacity; None for direct hand-off
    admission: Option<Arc<Semaphore>>,
    next_subscriber_id: AtomicU64,
}

impl<T> Inner<T> {
    /// Enqueue a command if, and only if, the hub is running.
    ///
    /// The phase is held for the whole send so a shutdown can never slip in
    /// between the check and the enqueue.
    fn enqueue(&self, command: Command<T>) -> bool {
        let phase = self.shared.phase.borrow();
        if !phase.is_running() {
            return false;
        }
        self.commands.send(command).is_ok()
    }

    fn shutdown(&self) -> bool {
        let begun = self
            .shared
            .phase
            .send_if_modified(|phase| phase.begin_shutdown());

        if begun {
            if let Some(ref admission) = self.admission {
                admission.close();
            }
            tracing::info!(hub = %self.config.name, "Hub shutting down");
        }

        begun
    }
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T: Clone + Send + 'static> Hub<T> {
    /// Create a hub with the given queue capacity and default options
    pub fn new(queue_capacity: usize) -> Self {
        Self::with_config(HubConfig::with_queue_capacity(queue_capacity))
    }

    /// Create a hub with custom configuration.
    ///
    /// Queue capacities above [`Semaphore::MAX_PERMITS`] are clamped to it.
    pub fn with_config(mut config: HubConfig) -> Self {
        config.queue_capacity = config.queue_capacity.min(Semaphore::MAX_PERMITS);

        let (commands, pending) = mpsc::unbounded_channel();
        let admission = if config.queue_capacity > 0 {
            Some(Arc::new(Semaphore::new(config.queue_capacity)))
        } else {
            None
        };

        Self {
            inner: Arc::new(Inner {
                config,
                shared: Arc::new(Shared::new()),
                commands,
                pending: Mutex::new(Some(pending)),
                admission,
                next_subscriber_id: AtomicU64::new(1),
            }),
        }
    }

    /// Get the hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Spawn the control loop.
    ///
    /// Must be called from within a Tokio runtime. Returns false if the hub
    /// was already started or has been shut down.
    pub fn start(&self) -> bool {
        let pending = match self.inner.pending.lock() {
            Ok(mut pending) => pending.take(),
            Err(_) => None,
        };
        let Some(commands) = pending else {
            return false;
        };

        let control = ControlLoop::new(&self.inner.config, commands, Arc::clone(&self.inner.shared));
        if !self.inner.shared.phase.send_if_modified(|phase| phase.start()) {
            return false;
        }
        tokio::spawn(control.run());

        tracing::info!(
            hub = %self.inner.config.name,
            queue_capacity = self.inner.config.queue_capacity,
            delivery = ?self.inner.config.delivery,
            "Hub started"
        );
        true
    }

    /// Open a subscription with a bounded inbox.
    ///
    /// A capacity of 0 is served by a single-slot inbox. If the hub is not
    /// running, the returned subscription is already closed.
    pub fn subscribe(&self, capacity: usize) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(inbox_slots(capacity));
        self.register(InboxSender::Bounded(tx), InboxReceiver::Bounded(rx))
    }

    /// Open a subscription whose inbox never fills
    pub fn subscribe_unbounded(&self) -> Subscription<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.register(InboxSender::Unbounded(tx), InboxReceiver::Unbounded(rx))
    }

    fn register(&self, inbox: InboxSender<T>, receiver: InboxReceiver<T>) -> Subscription<T> {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let counters = Arc::new(SubscriberCounters::default());

        let command = Command::Add {
            id,
            inbox,
            counters: Arc::clone(&counters),
        };

        // On failure the command, and with it the inbox sender, is dropped
        if !self.inner.enqueue(command) {
            tracing::debug!(
                hub = %self.inner.config.name,
                subscriber_id = id,
                "Hub not running, subscription closed"
            );
            return Subscription::new(id, receiver, None, counters);
        }

        Subscription::new(id, receiver, Some(self.inner.commands.clone()), counters)
    }

    /// Hand a value to the control loop for fan-out.
    ///
    /// Waits while the publish queue is full. Returns false without waiting
    /// if the hub is not running, or if it shuts down before accepting the
    /// value. A true return means the hub took the value, not that any
    /// subscriber has received it.
    pub async fn publish(&self, value: T) -> bool {
        if !self.is_running() {
            return false;
        }

        let (admission, handoff) = match self.inner.admission {
            Some(ref queue) => match Arc::clone(queue).acquire_owned().await {
                Ok(permit) => (Admission::Queued(permit), None),
                Err(_) => return false,
            },
            None => {
                let (ack, accepted) = oneshot::channel();
                (Admission::Handoff(ack), Some(accepted))
            }
        };

        if !self.inner.enqueue(Command::Publish { value, admission }) {
            return false;
        }

        match handoff {
            Some(accepted) => accepted.await.is_ok(),
            None => true,
        }
    }

    /// Hand a value to the control loop only if a queue slot is free now.
    ///
    /// Never waits. A zero-capacity hub has no slot to hold the value, so
    /// this always fails there.
    pub fn try_publish(&self, value: T) -> bool {
        let Some(ref queue) = self.inner.admission else {
            return false;
        };
        let Ok(permit) = Arc::clone(queue).try_acquire_owned() else {
            return false;
        };

        self.inner.enqueue(Command::Publish {
            value,
            admission: Admission::Queued(permit),
        })
    }

    /// Remove a subscription from fan-out and close its inbox
    pub fn unsubscribe(&self, subscription: &mut Subscription<T>) {
        subscription.unsubscribe();
    }

    /// Stop the hub.
    ///
    /// Returns true only for the call that moved the hub out of the running
    /// phase. The control loop then closes every inbox and exits, abandoning
    /// any fan-out it was waiting on.
    pub fn shutdown(&self) -> bool {
        self.inner.shutdown()
    }

    /// Wait until the control loop has exited after a shutdown
    pub async fn stopped(&self) {
        let mut phase = self.inner.shared.phase.subscribe();
        let _ = phase.wait_for(|phase| *phase == HubPhase::Stopped).await;
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> HubPhase {
        *self.inner.shared.phase.borrow()
    }

    /// Whether the hub accepts values and subscribers
    pub fn is_running(&self) -> bool {
        self.phase().is_running()
    }

    /// Subscribers registered with the control loop.
    ///
    /// Reflects commands the control loop has already processed.
    pub fn subscriber_count(&self) -> usize {
        self.inner.shared.counters.subscribers()
    }

    /// Get hub statistics
    pub fn stats(&self) -> HubStats {
        self.inner.shared.counters.snapshot()
    }
}

impl<T> Clone for Hub<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Hub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("name", &self.inner.config.name)
            .field("phase", &*self.inner.shared.phase.borrow())
            .field("stats", &self.inner.shared.counters.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::hub::DeliveryPolicy;

    const WAIT: Duration = Duration::from_secs(2);

    /// Wait until the control loop has seen `count` subscribers
    async fn settle(hub: &Hub<u32>, count: usize) {
        timeout(WAIT, async {
            while hub.subscriber_count() != count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("subscriber count never settled");
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let hub: Hub<u32> = Hub::new(2);
        assert_eq!(hub.phase(), HubPhase::Idle);

        assert!(hub.start());
        assert!(!hub.start());
        assert!(hub.is_running());
    }

    #[tokio::test]
    async fn test_publish_before_start_fails() {
        let hub: Hub<u32> = Hub::new(2);

        assert!(!hub.publish(1).await);

        let mut sub = hub.subscribe(4);
        assert!(timeout(WAIT, sub.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ordering() {
        let hub: Hub<u32> = Hub::new(2);
        hub.start();

        let mut sub = hub.subscribe(4);
        let producer = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    assert!(hub.publish(i).await);
                }
            })
        };

        for expected in 0..100 {
            let value = timeout(WAIT, sub.recv()).await.unwrap();
            assert_eq!(value, Some(expected));
        }
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn test_fan_out_to_every_subscriber() {
        let hub: Hub<u32> = Hub::new(4);
        hub.start();

        let mut subs: Vec<_> = (0..5).map(|_| hub.subscribe(8)).collect();
        assert!(hub.publish(7).await);
        assert!(hub.publish(8).await);

        for sub in subs.iter_mut() {
            assert_eq!(timeout(WAIT, sub.recv()).await.unwrap(), Some(7));
            assert_eq!(timeout(WAIT, sub.recv()).await.unwrap(), Some(8));
        }

        let stats = hub.stats();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.delivered, 10);
        assert_eq!(stats.subscribers, 5);
    }

    #[tokio::test]
    async fn test_publish_with_no_subscribers() {
        let hub: Hub<u32> = Hub::new(0);
        hub.start();

        assert!(hub.publish(1).await);
        assert_eq!(hub.stats().published, 1);
        assert_eq!(hub.stats().delivered, 0);
    }

    #[tokio::test]
    async fn test_late_join_isolation() {
        let hub: Hub<u32> = Hub::new(2);
        hub.start();

        let mut early = hub.subscribe(4);
        assert!(hub.publish(1).await);

        let mut late = hub.subscribe(4);
        assert!(hub.publish(2).await);

        assert_eq!(timeout(WAIT, early.recv()).await.unwrap(), Some(1));
        assert_eq!(timeout(WAIT, early.recv()).await.unwrap(), Some(2));
        assert_eq!(timeout(WAIT, late.recv()).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_inbox() {
        let hub: Hub<u32> = Hub::new(2);
        hub.start();

        let mut keep = hub.subscribe(4);
        let mut leave = hub.subscribe(4);
        settle(&hub, 2).await;

        hub.unsubscribe(&mut leave);
        hub.unsubscribe(&mut leave);
        assert!(timeout(WAIT, leave.recv()).await.unwrap().is_none());
        assert!(leave.is_closed());

        assert!(hub.publish(3).await);
        assert_eq!(timeout(WAIT, keep.recv()).await.unwrap(), Some(3));
        settle(&hub, 1).await;
    }

    #[tokio::test]
    async fn test_dropped_subscription_leaves_registry() {
        let hub: Hub<u32> = Hub::new(2);
        hub.start();

        let sub = hub.subscribe(1);
        settle(&hub, 1).await;

        drop(sub);
        settle(&hub, 0).await;
    }

    #[tokio::test]
    async fn test_shutdown_once() {
        let hub: Hub<u32> = Hub::new(2);
        hub.start();

        let mut sub = hub.subscribe(4);
        assert!(hub.shutdown());
        assert!(!hub.shutdown());
        assert!(!hub.start());

        assert!(!hub.publish(1).await);
        assert!(timeout(WAIT, sub.recv()).await.unwrap().is_none());

        timeout(WAIT, hub.stopped()).await.unwrap();
        assert_eq!(hub.phase(), HubPhase::Stopped);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_after_shutdown_is_closed() {
        let hub: Hub<u32> = Hub::new(2);
        hub.start();
        hub.shutdown();

        let mut sub = hub.subscribe(4);
        assert!(timeout(WAIT, sub.recv()).await.unwrap().is_none());

        let mut sub = hub.subscribe_unbounded();
        assert!(timeout(WAIT, sub.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_zero_capacity_handoff() {
        let hub: Hub<u32> = Hub::new(0);
        hub.start();

        let mut sub = hub.subscribe(4);
        assert!(timeout(WAIT, hub.publish(5)).await.unwrap());
        assert_eq!(hub.stats().published, 1);
        assert_eq!(timeout(WAIT, sub.recv()).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_full_queue_blocks_publisher() {
        let config = HubConfig::with_queue_capacity(1).without_stall_timeout();
        let hub: Hub<u32> = Hub::with_config(config);
        hub.start();

        let mut sub = hub.subscribe(1);
        settle(&hub, 1).await;

        // 1 fills the inbox, 2 blocks fan-out, 3 fills the queue
        assert!(hub.publish(1).await);
        assert!(hub.publish(2).await);
        assert!(timeout(WAIT, hub.publish(3)).await.unwrap());
        assert!(timeout(Duration::from_millis(100), hub.publish(4)).await.is_err());

        assert_eq!(timeout(WAIT, sub.recv()).await.unwrap(), Some(1));
        assert_eq!(timeout(WAIT, sub.recv()).await.unwrap(), Some(2));
        assert_eq!(timeout(WAIT, sub.recv()).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_try_publish_never_waits() {
        let config = HubConfig::with_queue_capacity(1).without_stall_timeout();
        let hub: Hub<u32> = Hub::with_config(config);
        assert!(!hub.try_publish(0));
        hub.start();

        let mut sub = hub.subscribe(1);
        settle(&hub, 1).await;

        assert!(hub.try_publish(1));
        assert_eq!(timeout(WAIT, sub.recv()).await.unwrap(), Some(1));

        // 2 fills the inbox, 3 blocks fan-out, 4 holds the only queue slot
        assert!(hub.publish(2).await);
        assert!(hub.publish(3).await);
        assert!(timeout(WAIT, hub.publish(4)).await.unwrap());
        assert!(!hub.try_publish(5));

        // A blocking publish on the same full queue stays pending
        let mut blocked = tokio_test::task::spawn(hub.publish(6));
        tokio_test::assert_pending!(blocked.poll());

        assert_eq!(timeout(WAIT, sub.recv()).await.unwrap(), Some(2));
        assert_eq!(timeout(WAIT, sub.recv()).await.unwrap(), Some(3));
        assert_eq!(timeout(WAIT, sub.recv()).await.unwrap(), Some(4));

        let accepted = timeout(WAIT, async {
            loop {
                if let std::task::Poll::Ready(accepted) = blocked.poll() {
                    break accepted;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(accepted);
        assert_eq!(timeout(WAIT, sub.recv()).await.unwrap(), Some(6));
    }

    #[tokio::test]
    async fn test_huge_queue_capacity_clamped() {
        let hub: Hub<u32> = Hub::new(usize::MAX);
        assert_eq!(hub.config().queue_capacity, Semaphore::MAX_PERMITS);

        hub.start();
        let mut sub = hub.subscribe(1);
        assert!(hub.publish(1).await);
        assert_eq!(timeout(WAIT, sub.recv()).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_try_publish_zero_capacity() {
        let hub: Hub<u32> = Hub::new(0);
        hub.start();
        assert!(!hub.try_publish(1));
        assert_eq!(hub.stats().published, 0);
    }

    #[tokio::test]
    async fn test_blocking_slow_subscriber_stalls_others() {
        let config = HubConfig::with_queue_capacity(4).without_stall_timeout();
        let hub: Hub<u32> = Hub::with_config(config);
        hub.start();

        let mut slow = hub.subscribe(1);
        let mut fast = hub.subscribe(8);
        settle(&hub, 2).await;

        for i in 0..3 {
            assert!(hub.publish(i).await);
        }

        // The slow inbox holds 0; fan-out of 1 waits on it before reaching fast
        assert_eq!(timeout(WAIT, fast.recv()).await.unwrap(), Some(0));
        assert!(timeout(Duration::from_millis(100), fast.recv()).await.is_err());

        assert_eq!(timeout(WAIT, slow.recv()).await.unwrap(), Some(0));
        assert_eq!(timeout(WAIT, fast.recv()).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_stalled_subscriber_evicted() {
        let config = HubConfig::with_queue_capacity(4).stall_timeout(Duration::from_millis(50));
        let hub: Hub<u32> = Hub::with_config(config);
        hub.start();

        let mut stuck = hub.subscribe(1);
        let mut fast = hub.subscribe(8);
        settle(&hub, 2).await;

        for i in 0..3 {
            assert!(hub.publish(i).await);
        }

        for expected in 0..3 {
            assert_eq!(timeout(WAIT, fast.recv()).await.unwrap(), Some(expected));
        }

        // Evicted: keeps what was buffered, then ends
        assert!(stuck.is_closed());
        assert_eq!(timeout(WAIT, stuck.recv()).await.unwrap(), Some(0));
        assert!(timeout(WAIT, stuck.recv()).await.unwrap().is_none());
        assert_eq!(hub.stats().evicted, 1);
        settle(&hub, 1).await;
    }

    #[tokio::test]
    async fn test_drop_on_full_isolates_subscribers() {
        let config = HubConfig::with_queue_capacity(4).delivery(DeliveryPolicy::DropOnFull);
        let hub: Hub<u32> = Hub::with_config(config);
        hub.start();

        let mut slow = hub.subscribe(1);
        let mut fast = hub.subscribe(8);
        settle(&hub, 2).await;

        for i in 0..4 {
            assert!(hub.publish(i).await);
        }
        for expected in 0..4 {
            assert_eq!(timeout(WAIT, fast.recv()).await.unwrap(), Some(expected));
        }

        assert_eq!(timeout(WAIT, slow.recv()).await.unwrap(), Some(0));
        assert_eq!(slow.stats().dropped, 3);
        assert_eq!(hub.stats().dropped, 3);
    }

    #[tokio::test]
    async fn test_shutdown_preempts_stalled_fan_out() {
        let config = HubConfig::with_queue_capacity(1).without_stall_timeout();
        let hub: Hub<u32> = Hub::with_config(config);
        hub.start();

        let mut stuck = hub.subscribe(1);
        settle(&hub, 1).await;

        assert!(hub.publish(1).await);
        assert!(hub.publish(2).await);

        assert!(hub.shutdown());
        timeout(WAIT, hub.stopped()).await.expect("shutdown hung on a full inbox");

        assert_eq!(timeout(WAIT, stuck.recv()).await.unwrap(), Some(1));
        assert!(timeout(WAIT, stuck.recv()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_releases_blocked_publisher() {
        let config = HubConfig::with_queue_capacity(1).without_stall_timeout();
        let hub: Hub<u32> = Hub::with_config(config);
        hub.start();

        let _stuck = hub.subscribe(1);
        settle(&hub, 1).await;

        assert!(hub.publish(1).await);
        assert!(hub.publish(2).await);
        assert!(hub.publish(3).await);

        let blocked = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.publish(4).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        hub.shutdown();
        assert!(!timeout(WAIT, blocked).await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_dropping_last_handle_shuts_down() {
        let hub: Hub<u32> = Hub::new(2);
        hub.start();

        let mut sub = hub.subscribe(4);
        drop(hub);

        assert!(timeout(WAIT, sub.recv()).await.unwrap().is_none());
    }
}
