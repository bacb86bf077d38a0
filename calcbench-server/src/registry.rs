//! Per-client routing of asynchronously produced results.
//!
//! Every client identity owns at most one bounded queue. Producers hand a
//! result to [`SubscriberRegistry::dispatch`], which never waits: a missing
//! subscriber or a full queue drops the result and counts the drop. The
//! result stream that registered the queue drains it through a
//! [`Subscription`], whose drop releases the registry entry.
use async_channel::{bounded, Receiver, Sender, TrySendError};
use calcbench_core::{labels, Reply};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    QueueFull,
    NoSubscriber,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: u64,
    pub dropped_queue_full: u64,
    pub dropped_no_subscriber: u64,
}

impl DispatchStats {
    pub fn dropped(&self) -> u64 {
        self.dropped_queue_full + self.dropped_no_subscriber
    }
}

#[derive(Default)]
struct DispatchCounters {
    delivered: AtomicU64,
    queue_full: AtomicU64,
    no_subscriber: AtomicU64,
}

struct Slot {
    generation: u64,
    sender: Sender<Reply>,
}

pub struct SubscriberRegistry {
    capacity: usize,
    next_generation: AtomicU64,
    subscribers: Mutex<HashMap<String, Slot>>,
    counters: DispatchCounters,
}

impl SubscriberRegistry {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            next_generation: AtomicU64::new(0),
            subscribers: Mutex::new(HashMap::new()),
            counters: DispatchCounters::default(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Open a fresh queue for `client_id`.
    ///
    /// An existing subscription for the same identity is replaced and its
    /// queue closed, so whoever drains it sees end-of-stream once the items
    /// already queued are consumed.
    pub fn register(self: &Arc<Self>, client_id: &str) -> Subscription {
        let (sender, receiver) = bounded(self.capacity);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let (replaced, subscribers) = {
            let mut map = self.lock();
            let replaced = map.insert(client_id.to_string(), Slot { generation, sender });
            (replaced, map.len())
        };

        if let Some(old) = replaced {
            old.sender.close();
            info!("Replaced existing subscription for client {client_id}");
        } else {
            debug!("Registered client {client_id}");
        }
        metrics::gauge!(labels::SUBSCRIBERS).set(subscribers as f64);

        Subscription {
            client_id: client_id.to_string(),
            generation,
            receiver,
            registry: self.clone(),
        }
    }

    /// Best-effort, non-blocking delivery of `reply` to `client_id`.
    pub fn dispatch(&self, client_id: &str, reply: Reply) -> DispatchOutcome {
        let outcome = {
            let map = self.lock();
            match map.get(client_id) {
                None => DispatchOutcome::NoSubscriber,
                Some(slot) => match slot.sender.try_send(reply) {
                    Ok(()) => DispatchOutcome::Delivered,
                    Err(TrySendError::Full(_)) => DispatchOutcome::QueueFull,
                    Err(TrySendError::Closed(_)) => DispatchOutcome::NoSubscriber,
                },
            }
        };

        match outcome {
            DispatchOutcome::Delivered => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(labels::DISPATCH_DELIVERED).increment(1);
            }
            DispatchOutcome::QueueFull => {
                self.counters.queue_full.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(labels::DISPATCH_DROPPED, "reason" => labels::REASON_QUEUE_FULL)
                    .increment(1);
                warn!("Queue full for client {client_id}, dropping result");
            }
            DispatchOutcome::NoSubscriber => {
                self.counters.no_subscriber.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(labels::DISPATCH_DROPPED, "reason" => labels::REASON_NO_SUBSCRIBER)
                    .increment(1);
                warn!("No subscriber for client {client_id}, dropping result");
            }
        }
        outcome
    }

    /// Remove and close the queue for `client_id`. Unknown identities are
    /// ignored.
    pub fn unregister(&self, client_id: &str) {
        let removed = self.lock().remove(client_id);
        if let Some(slot) = removed {
            slot.sender.close();
            debug!("Unregistered client {client_id}");
            metrics::gauge!(labels::SUBSCRIBERS).set(self.len() as f64);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.lock().contains_key(client_id)
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            dropped_queue_full: self.counters.queue_full.load(Ordering::Relaxed),
            dropped_no_subscriber: self.counters.no_subscriber.load(Ordering::Relaxed),
        }
    }

    /// Drop the entry only if it still belongs to `generation`, so a stale
    /// stream ending late never removes its replacement.
    fn release(&self, client_id: &str, generation: u64) {
        let removed = {
            let mut map = self.lock();
            match map.get(client_id) {
                Some(slot) if slot.generation == generation => map.remove(client_id),
                _ => None,
            }
        };
        if let Some(slot) = removed {
            slot.sender.close();
            debug!("Released subscription for client {client_id}");
            metrics::gauge!(labels::SUBSCRIBERS).set(self.len() as f64);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // Entries are plain sender handles; a panic elsewhere leaves them usable.
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Receiving end of one registration. Dropping it releases the entry.
pub struct Subscription {
    client_id: String,
    generation: u64,
    receiver: Receiver<Reply>,
    registry: Arc<SubscriberRegistry>,
}

impl Subscription {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Next queued result, or `None` once the queue has been closed and
    /// drained.
    pub async fn recv(&self) -> Option<Reply> {
        self.receiver.recv().await.ok()
    }

    pub fn try_recv(&self) -> Option<Reply> {
        self.receiver.try_recv().ok()
    }

    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.release(&self.client_id, self.generation);
    }
}
