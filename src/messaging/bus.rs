use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
/// Event bus for pub/sub messaging
///
/// Any number of listeners receive a clone of every published event on their
/// own channel. Subscribing hands back the receiver plus a `Subscription`
/// whose `unsubscribe` removes the listener again.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Subscriber ID for tracking subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(usize);

struct Subscriber<E> {
    id: SubscriberId,
    sender: Sender<E>,
}

type Registry<E> = Arc<RwLock<Vec<Subscriber<E>>>>;

/// Broadcasts events of type `E` to all subscribers
pub struct EventBus<E> {
    subscribers: Registry<E>,
    next_id: Arc<AtomicUsize>,
}

/// Handle returned from `subscribe`; dropping it keeps the subscription
pub struct Subscription<E> {
    id: SubscriberId,
    registry: Registry<E>,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Stop receiving events; the receiver sees a disconnected channel
    pub fn unsubscribe(self) {
        self.registry.write().retain(|s| s.id != self.id);
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Subscribe to events, returns a receiver and its subscription handle
    pub fn subscribe(&self) -> (Receiver<E>, Subscription<E>) {
        let (tx, rx) = unbounded();
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));

        self.subscribers.write().push(Subscriber { id, sender: tx });

        (
            rx,
            Subscription {
                id,
                registry: Arc::clone(&self.subscribers),
            },
        )
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.write().retain(|s| s.id != id);
    }

    /// Publish an event to all subscribers
    ///
    /// Subscribers whose receiver was dropped are pruned.
    pub fn publish(&self, event: E) {
        let mut closed = Vec::new();
        {
            let subscribers = self.subscribers.read();
            for subscriber in subscribers.iter() {
                if subscriber.sender.try_send(event.clone()).is_err() {
                    closed.push(subscriber.id);
                }
            }
        }
        if !closed.is_empty() {
            self.subscribers.write().retain(|s| !closed.contains(&s.id));
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn clear(&self) {
        self.subscribers.write().clear();
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
            next_id: Arc::clone(&self.next_id),
        }
    }
}
