//! Fan-out of loop events to any number of observers.
//!
//! Each subscriber owns a bounded queue. Publishing never waits: when a
//! subscriber's queue is full the message is dropped for that subscriber only,
//! so a slow browser tab can never stall the control loop.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::event::{EventKind, IterationEvent};

/// Per-subscriber queue capacity.
pub const SUBSCRIBER_CAPACITY: usize = 64;

#[derive(Default)]
struct BrokerState {
    subscribers: Vec<(u64, mpsc::Sender<String>)>,
    next_id: u64,
    /// Serialized payload of the most recent `task_info` event.
    task_info: Option<String>,
}

/// Shared handle to the broker. Clones refer to the same subscriber list.
#[derive(Clone, Default)]
pub struct EventBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl EventBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `event` and offer it to every subscriber without blocking.
    pub fn publish(&self, event: &IterationEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(err) => {
                warn!(err = %err, "failed to serialize event");
                return;
            }
        };

        let mut state = self.lock();
        if event.kind == EventKind::TaskInfo {
            state.task_info = Some(payload.clone());
        }
        for (id, tx) in &state.subscribers {
            if tx.try_send(payload.clone()).is_err() {
                debug!(subscriber = id, "subscriber queue full, dropping event");
            }
        }
    }

    /// Register a new subscriber.
    ///
    /// The retained `task_info` payload, if any, is queued first so late
    /// joiners learn the current task without waiting for the next event.
    pub fn subscribe(&self) -> (mpsc::Receiver<String>, Subscription) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let mut state = self.lock();
        if let Some(task_info) = &state.task_info {
            let _ = tx.try_send(task_info.clone());
        }
        let id = state.next_id;
        state.next_id += 1;
        state.subscribers.push((id, tx));
        debug!(subscriber = id, total = state.subscribers.len(), "subscriber added");
        drop(state);

        (
            rx,
            Subscription {
                broker: self.clone(),
                id,
                active: true,
            },
        )
    }

    /// Retained `task_info` payload, if one was published.
    pub fn task_info(&self) -> Option<String> {
        self.lock().task_info.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn remove(&self, id: u64) {
        let mut state = self.lock();
        // Dropping the sender closes the subscriber's queue.
        state.subscribers.retain(|(sub_id, _)| *sub_id != id);
        debug!(subscriber = id, total = state.subscribers.len(), "subscriber removed");
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Publish on an optional broker; `None` is a no-op.
pub fn emit(broker: Option<&EventBroker>, event: &IterationEvent) {
    if let Some(broker) = broker {
        broker.publish(event);
    }
}

/// Registration handle returned by [`EventBroker::subscribe`].
///
/// Unsubscribes on drop.
pub struct Subscription {
    broker: EventBroker,
    id: u64,
    active: bool,
}

impl Subscription {
    /// Remove the queue from the broker and close it.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.active {
            self.active = false;
            self.broker.remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}
