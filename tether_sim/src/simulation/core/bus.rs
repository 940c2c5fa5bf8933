// tether_sim/src/simulation/core/bus.rs

//! An in-process publish/subscribe bus keyed by channel name.
//!
//! Every subscription owns a delivery task fed by an unbounded queue, so a
//! slow handler never blocks publishers or other subscribers. Delivery is
//! fire-and-forget: no acknowledgement, no retry, FIFO per publisher.
//!
//! The bus runs its tasks on a small private tokio runtime. Publishing and
//! subscribing are plain synchronous calls, so the tick thread never awaits.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("failed to start the bus runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

type Payload = Arc<[u8]>;

struct Outlet {
    id: u64,
    tx: mpsc::UnboundedSender<Payload>,
}

struct BusInner {
    runtime: Runtime,
    channels: RwLock<HashMap<String, Vec<Outlet>>>,
    next_id: AtomicU64,
    /// Payloads queued but not yet handled.
    in_flight: Arc<watch::Sender<usize>>,
}

/// Cheap to clone; all clones share the same channels.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let channels = self.inner.channels.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<_> = channels.keys().collect();
        names.sort();
        f.debug_struct("MessageBus").field("channels", &names).finish()
    }
}

impl MessageBus {
    pub fn new() -> Result<Self, BusError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("tether-bus")
            .enable_time()
            .build()
            .map_err(BusError::Runtime)?;
        let (in_flight, _) = watch::channel(0usize);
        Ok(Self {
            inner: Arc::new(BusInner {
                runtime,
                channels: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                in_flight: Arc::new(in_flight),
            }),
        })
    }

    /// Registers `handler` on `channel`. The handler runs on a bus task
    /// until the returned subscription is dropped or unsubscribed.
    pub fn subscribe<F>(&self, channel: &str, mut handler: F) -> Subscription
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Payload>();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let in_flight = Arc::clone(&self.inner.in_flight);
        let name = channel.to_string();

        let task = self.inner.runtime.spawn(async move {
            while let Some(payload) = rx.recv().await {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&payload[..])));
                if outcome.is_err() {
                    error!("Handler on channel '{}' panicked; delivery continues.", name);
                }
                in_flight.send_modify(|n| *n = n.saturating_sub(1));
            }
        });

        self.inner
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_default()
            .push(Outlet { id, tx });
        debug!("Subscribed #{} to channel '{}'.", id, channel);

        Subscription {
            bus: self.clone(),
            channel: channel.to_string(),
            id,
            task: Some(task),
        }
    }

    /// Fans `payload` out to every current subscriber of `channel`.
    /// Returns how many subscribers it was queued for.
    pub fn publish(&self, channel: &str, payload: &[u8]) -> usize {
        let channels = self.inner.channels.read().unwrap_or_else(PoisonError::into_inner);
        let Some(outlets) = channels.get(channel) else {
            return 0;
        };
        let payload: Payload = Arc::from(payload);
        let mut delivered = 0;
        for outlet in outlets {
            self.inner.in_flight.send_modify(|n| *n += 1);
            if outlet.tx.send(Arc::clone(&payload)).is_ok() {
                delivered += 1;
            } else {
                self.inner.in_flight.send_modify(|n| *n = n.saturating_sub(1));
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map_or(0, Vec::len)
    }

    /// Blocks until every queued payload has been handled or `timeout`
    /// elapses. Returns `true` when the bus went idle.
    ///
    /// Must be called from outside any async context.
    pub fn settle(&self, timeout: Duration) -> bool {
        let mut idle = self.inner.in_flight.subscribe();
        self.inner.runtime.block_on(async move {
            matches!(
                tokio::time::timeout(timeout, idle.wait_for(|n| *n == 0)).await,
                Ok(Ok(_))
            )
        })
    }

    fn detach(&self, channel: &str, id: u64) {
        let mut channels = self.inner.channels.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(outlets) = channels.get_mut(channel) {
            outlets.retain(|o| o.id != id);
            if outlets.is_empty() {
                channels.remove(channel);
            }
        }
    }
}

/// A live registration on one channel. Dropping it detaches the handler and
/// waits for already-queued payloads to drain.
pub struct Subscription {
    bus: MessageBus,
    channel: String,
    id: u64,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .finish()
    }
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn unsubscribe(mut self) {
        self.close();
    }

    fn close(&mut self) {
        // Dropping the sender ends the task once its queue is empty.
        self.bus.detach(&self.channel, self.id);
        if let Some(task) = self.task.take() {
            // Inside a runtime (e.g. from a handler) we cannot block on it.
            if Handle::try_current().is_err() && self.bus.inner.runtime.block_on(task).is_err() {
                error!("Delivery task for '{}' exited abnormally.", self.channel);
            }
        }
        debug!("Unsubscribed #{} from channel '{}'.", self.id, self.channel);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.close();
        }
    }
}
