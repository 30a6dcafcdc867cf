//! Topic pub/sub with per-subscription worker queues

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::handler::{BrokerError, MessageHandler};

/// Default per-subscription queue capacity
const DEFAULT_QUEUE_CAPACITY: usize = 256;

// =============================================================================
// Subscription Queue
// =============================================================================

/// Bounded FIFO owned by one subscription
///
/// Producers push under a short lock; the worker drains in arrival order,
/// which yields per-producer FIFO. At capacity the oldest message is dropped
/// and counted.
struct SubscriptionQueue {
    messages: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
    capacity: usize,
    dropped: AtomicU64,
}

impl SubscriptionQueue {
    fn new(capacity: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    fn push(&self, payload: Vec<u8>) {
        {
            let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
            if messages.len() >= self.capacity {
                messages.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            messages.push_back(payload);
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Vec<u8>> {
        let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        messages.pop_front()
    }
}

struct Subscription {
    id: Uuid,
    topic: String,
    queue: Arc<SubscriptionQueue>,
    cancel: CancellationToken,
}

// =============================================================================
// Broker
// =============================================================================

/// Per-subscription drop counts and totals
#[derive(Debug, Clone, Default)]
pub struct BrokerStats {
    /// Number of distinct topics with subscribers
    pub topics: usize,

    /// Number of live subscriptions
    pub subscriptions: usize,

    /// Messages dropped to overflow, per subscription id
    pub dropped: HashMap<Uuid, u64>,
}

impl BrokerStats {
    /// Total messages dropped across all subscriptions
    #[must_use]
    pub fn dropped_total(&self) -> u64 {
        self.dropped.values().sum()
    }
}

struct BrokerInner {
    subscriptions: RwLock<HashMap<String, Vec<Arc<Subscription>>>>,
    queue_capacity: usize,
    shutdown: CancellationToken,
}

/// In-process topic pub/sub
///
/// Topics are exact-match strings. Every subscriber on a topic receives
/// every message; delivery happens on the subscription's own worker task.
#[derive(Clone)]
pub struct InProcessBroker {
    inner: Arc<BrokerInner>,
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessBroker {
    /// Create a broker with the default queue capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a broker with a custom per-subscription queue capacity
    #[must_use]
    pub fn with_queue_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                subscriptions: RwLock::new(HashMap::new()),
                queue_capacity: capacity.max(1),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Attach a handler to a topic
    ///
    /// Returns the subscription id. The handler runs on a dedicated worker
    /// task; a handler error is logged and delivery continues.
    pub fn subscribe(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Uuid, BrokerError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(BrokerError::Closed);
        }

        let subscription = Arc::new(Subscription {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            queue: Arc::new(SubscriptionQueue::new(self.inner.queue_capacity)),
            cancel: self.inner.shutdown.child_token(),
        });

        {
            let mut subs = self
                .inner
                .subscriptions
                .write()
                .unwrap_or_else(|e| e.into_inner());
            subs.entry(topic.to_string())
                .or_default()
                .push(subscription.clone());
        }

        let id = subscription.id;
        tokio::spawn(run_worker(subscription, handler));
        Ok(id)
    }

    /// Remove every subscription on a topic
    pub fn unsubscribe(&self, topic: &str) {
        let removed = {
            let mut subs = self
                .inner
                .subscriptions
                .write()
                .unwrap_or_else(|e| e.into_inner());
            subs.remove(topic)
        };
        for sub in removed.into_iter().flatten() {
            sub.cancel.cancel();
        }
    }

    /// Remove one subscription by id
    pub fn unsubscribe_by_id(&self, id: Uuid) {
        let mut subs = self
            .inner
            .subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner());
        for entries in subs.values_mut() {
            if let Some(pos) = entries.iter().position(|s| s.id == id) {
                let sub = entries.remove(pos);
                sub.cancel.cancel();
                break;
            }
        }
        subs.retain(|_, entries| !entries.is_empty());
    }

    /// Handle for publishing
    #[must_use]
    pub fn producer(&self) -> Producer {
        Producer {
            inner: self.inner.clone(),
        }
    }

    /// Current topic/subscription counts and drop counters
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        let subs = self
            .inner
            .subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner());

        let mut stats = BrokerStats {
            topics: subs.len(),
            ..Default::default()
        };
        for entries in subs.values() {
            for sub in entries {
                stats.subscriptions += 1;
                stats
                    .dropped
                    .insert(sub.id, sub.queue.dropped.load(Ordering::Relaxed));
            }
        }
        stats
    }

    /// Cancel every worker and refuse further subscriptions
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let mut subs = self
            .inner
            .subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner());
        subs.clear();
    }
}

impl std::fmt::Debug for InProcessBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("InProcessBroker")
            .field("topics", &stats.topics)
            .field("subscriptions", &stats.subscriptions)
            .finish()
    }
}

/// Publishing handle, cheap to clone
#[derive(Clone)]
pub struct Producer {
    inner: Arc<BrokerInner>,
}

impl Producer {
    /// Enqueue `payload` for every current subscriber on `topic`
    ///
    /// A topic with no subscribers is a successful no-op.
    pub fn send_message(&self, topic: &str, payload: &[u8]) -> Result<(), BrokerError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(BrokerError::Closed);
        }

        let targets: Vec<Arc<Subscription>> = {
            let subs = self
                .inner
                .subscriptions
                .read()
                .unwrap_or_else(|e| e.into_inner());
            subs.get(topic).cloned().unwrap_or_default()
        };

        for sub in targets {
            sub.queue.push(payload.to_vec());
        }
        Ok(())
    }
}

/// Drain one subscription's queue until cancelled
async fn run_worker(subscription: Arc<Subscription>, handler: Arc<dyn MessageHandler>) {
    loop {
        if let Some(payload) = subscription.queue.pop() {
            if let Err(err) = handler.handle(&subscription.topic, &payload).await {
                tracing::warn!(
                    topic = %subscription.topic,
                    subscription = %subscription.id,
                    error = %err,
                    "message handler failed"
                );
            }
            continue;
        }

        tokio::select! {
            () = subscription.cancel.cancelled() => break,
            () = subscription.queue.notify.notified() => {}
        }
    }
}
