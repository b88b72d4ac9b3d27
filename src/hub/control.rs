//! Hub control loop
//!
//! One task per hub owns the subscriber registry. Subscriber additions,
//! removals and published values all arrive on a single FIFO channel and are
//! applied one at a time, which gives every subscriber the same view of the
//! publish order and makes joins and leaves atomic with respect to fan-out.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch, OwnedSemaphorePermit};

use crate::stats::{HubCounters, SubscriberCounters};

use super::config::{DeliveryPolicy, HubConfig};
use super::state::HubPhase;

/// Identifier handed out to each subscription of a hub
pub type SubscriberId = u64;

/// State shared between a hub handle and its control loop
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) phase: watch::Sender<HubPhase>,
    pub(crate) counters: HubCounters,
}

impl Shared {
    pub(crate) fn new() -> Self {
        let (phase, _) = watch::channel(HubPhase::Idle);
        Self {
            phase,
            counters: HubCounters::default(),
        }
    }
}

/// Proof that a published value was admitted to the queue
pub(crate) enum Admission {
    /// Holds one unit of queue capacity until the control loop dequeues it
    Queued(OwnedSemaphorePermit),
    /// Zero-capacity queue: the publisher waits for this signal
    Handoff(oneshot::Sender<()>),
}

impl Admission {
    fn release(self) {
        match self {
            Admission::Queued(permit) => drop(permit),
            Admission::Handoff(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

/// Sending half of a subscriber inbox
pub(crate) enum InboxSender<T> {
    Bounded(mpsc::Sender<T>),
    Unbounded(mpsc::UnboundedSender<T>),
}

/// Requests serialized through the control loop
pub(crate) enum Command<T> {
    Add {
        id: SubscriberId,
        inbox: InboxSender<T>,
        counters: Arc<SubscriberCounters>,
    },
    Remove(SubscriberId),
    Publish {
        value: T,
        admission: Admission,
    },
}

struct Subscriber<T> {
    inbox: InboxSender<T>,
    counters: Arc<SubscriberCounters>,
}

/// Result of handing one value to one subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    Dropped,
    /// Receiver is gone
    Closed,
    /// Blocking delivery outlived the stall timeout
    Stalled,
    /// Shutdown arrived while waiting
    Shutdown,
}

/// The single owner of a hub's subscriber registry
pub(crate) struct ControlLoop<T> {
    name: String,
    delivery: DeliveryPolicy,
    stall_timeout: Option<Duration>,
    commands: mpsc::UnboundedReceiver<Command<T>>,
    phase: watch::Receiver<HubPhase>,
    subscribers: BTreeMap<SubscriberId, Subscriber<T>>,
    shared: Arc<Shared>,
}

impl<T: Clone + Send + 'static> ControlLoop<T> {
    pub(crate) fn new(
        config: &HubConfig,
        commands: mpsc::UnboundedReceiver<Command<T>>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            delivery: config.delivery,
            stall_timeout: config.stall_timeout,
            commands,
            phase: shared.phase.subscribe(),
            subscribers: BTreeMap::new(),
            shared,
        }
    }

    /// Process commands until shutdown, then close every inbox
    pub(crate) async fn run(mut self) {
        loop {
            let command = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.phase) => break,
                command = self.commands.recv() => command,
            };

            match command {
                Some(command) => {
                    if !self.handle(command).await {
                        break;
                    }
                }
                None => break,
            }
        }

        self.drain();
    }

    /// Apply one command. Returns false once shutdown has been observed.
    async fn handle(&mut self, command: Command<T>) -> bool {
        match command {
            Command::Add {
                id,
                inbox,
                counters,
            } => {
                self.subscribers.insert(id, Subscriber { inbox, counters });
                self.update_gauge();
                tracing::debug!(
                    hub = %self.name,
                    subscriber_id = id,
                    subscribers = self.subscribers.len(),
                    "Subscriber added"
                );
                true
            }
            Command::Remove(id) => {
                // Dropping the sender closes the inbox
                if self.subscribers.remove(&id).is_some() {
                    self.update_gauge();
                    tracing::debug!(
                        hub = %self.name,
                        subscriber_id = id,
                        subscribers = self.subscribers.len(),
                        "Subscriber removed"
                    );
                }
                true
            }
            Command::Publish { value, admission } => {
                admission.release();
                self.shared.counters.record_published();
                self.fan_out(value).await
            }
        }
    }

    /// Deliver a value to every registered subscriber in join order
    async fn fan_out(&mut self, value: T) -> bool {
        let mut gone = Vec::new();

        for (&id, subscriber) in self.subscribers.iter() {
            let outcome = deliver(
                subscriber,
                value.clone(),
                self.delivery,
                self.stall_timeout,
                &mut self.phase,
            )
            .await;

            match outcome {
                Delivery::Delivered => {
                    subscriber.counters.record_delivered();
                    self.shared.counters.record_delivered();
                }
                Delivery::Dropped => {
                    subscriber.counters.record_dropped();
                    self.shared.counters.record_dropped();
                    tracing::trace!(hub = %self.name, subscriber_id = id, "Inbox full, value dropped");
                }
                Delivery::Closed => gone.push(id),
                Delivery::Stalled => {
                    self.shared.counters.record_evicted();
                    tracing::warn!(
                        hub = %self.name,
                        subscriber_id = id,
                        stall_timeout_ms = self.stall_timeout.map(|t| t.as_millis() as u64),
                        "Subscriber stalled, evicting"
                    );
                    gone.push(id);
                }
                Delivery::Shutdown => return false,
            }
        }

        if !gone.is_empty() {
            for id in gone {
                self.subscribers.remove(&id);
                tracing::debug!(hub = %self.name, subscriber_id = id, "Subscriber dropped from fan-out");
            }
            self.update_gauge();
        }

        true
    }

    /// Close every inbox and release anything still queued
    fn drain(&mut self) {
        let closed = self.subscribers.len();
        self.subscribers.clear();

        // Queued publishes are discarded; hand-off publishers see the ack drop
        self.commands.close();
        let mut discarded = 0usize;
        while let Ok(command) = self.commands.try_recv() {
            if matches!(command, Command::Publish { .. }) {
                discarded += 1;
            }
        }

        self.update_gauge();
        self.shared.phase.send_modify(|phase| phase.finish());

        let stats = self.shared.counters.snapshot();
        tracing::info!(
            hub = %self.name,
            closed_subscribers = closed,
            discarded,
            published = stats.published,
            delivered = stats.delivered,
            dropped = stats.dropped,
            evicted = stats.evicted,
            "Hub stopped"
        );
    }

    fn update_gauge(&self) {
        self.shared.counters.set_subscribers(self.subscribers.len());
    }
}

/// Resolves once the hub leaves the running phase
async fn shutdown_requested(phase: &mut watch::Receiver<HubPhase>) {
    let _ = phase.wait_for(|phase| phase.is_terminal()).await;
}

async fn deliver<T>(
    subscriber: &Subscriber<T>,
    value: T,
    policy: DeliveryPolicy,
    stall_timeout: Option<Duration>,
    phase: &mut watch::Receiver<HubPhase>,
) -> Delivery {
    let tx = match &subscriber.inbox {
        InboxSender::Unbounded(tx) => {
            return match tx.send(value) {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Closed,
            };
        }
        InboxSender::Bounded(tx) => tx,
    };

    let value = match tx.try_send(value) {
        Ok(()) => return Delivery::Delivered,
        Err(TrySendError::Closed(_)) => return Delivery::Closed,
        Err(TrySendError::Full(value)) => value,
    };

    if policy == DeliveryPolicy::DropOnFull {
        return Delivery::Dropped;
    }

    let send = async {
        match stall_timeout {
            Some(limit) => match tokio::time::timeout(limit, tx.send(value)).await {
                Ok(Ok(())) => Delivery::Delivered,
                Ok(Err(_)) => Delivery::Closed,
                Err(_) => Delivery::Stalled,
            },
            None => match tx.send(value).await {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Closed,
            },
        }
    };

    tokio::select! {
        biased;
        _ = shutdown_requested(phase) => Delivery::Shutdown,
        outcome = send => outcome,
    }
}
