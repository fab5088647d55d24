//! Subscriber registry with explicit unsubscribe handles.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::mpsc;

struct Registry<T> {
    next_id: AtomicU64,
    senders: Mutex<HashMap<u64, mpsc::UnboundedSender<T>>>,
}

impl<T> Registry<T> {
    fn remove(&self, id: u64) {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// A set of subscribers that all receive every published item.
pub struct Subscribers<T> {
    registry: Arc<Registry<T>>,
}

impl<T: Clone> Subscribers<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(1),
                senders: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Subscription<T> {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry
            .senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `item` to every subscriber. Returns how many received it.
    pub fn publish(&self, item: T) -> usize {
        let mut senders = self
            .registry
            .senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        senders.retain(|_, tx| tx.send(item.clone()).is_ok());
        senders.len()
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.registry
            .senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if nobody is subscribed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Subscribers<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T> fmt::Debug for Subscribers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers").finish_non_exhaustive()
    }
}

/// Handle to a registered subscriber.
///
/// The subscriber is removed from its registry when the handle is dropped or
/// [`unsubscribe`](Self::unsubscribe) is called.
pub struct Subscription<T> {
    id: u64,
    rx: mpsc::UnboundedReceiver<T>,
    registry: Weak<Registry<T>>,
}

impl<T> Subscription<T> {
    /// Wait for the next item. `None` once the registry is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take the next item if one is already queued.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Unregister now.
    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_receives_item() {
        let subscribers = Subscribers::new();
        let mut a = subscribers.subscribe();
        let mut b = subscribers.subscribe();

        assert_eq!(subscribers.publish(5u8), 2);
        assert_eq!(a.recv().await, Some(5));
        assert_eq!(b.recv().await, Some(5));
    }

    #[test]
    fn drop_unregisters() {
        let subscribers = Subscribers::<u8>::new();
        let a = subscribers.subscribe();
        let _b = subscribers.subscribe();
        assert_eq!(subscribers.len(), 2);

        drop(a);
        assert_eq!(subscribers.len(), 1);
    }

    #[test]
    fn unsubscribe_unregisters() {
        let subscribers = Subscribers::<u8>::new();
        let a = subscribers.subscribe();
        a.unsubscribe();
        assert!(subscribers.is_empty());
        assert_eq!(subscribers.publish(1), 0);
    }

    #[test]
    fn unsubscribed_handle_receives_nothing_more() {
        let subscribers = Subscribers::<u8>::new();
        let mut kept = subscribers.subscribe();
        let gone = subscribers.subscribe();
        gone.unsubscribe();

        subscribers.publish(9);
        assert_eq!(kept.try_recv(), Some(9));
        assert_eq!(kept.try_recv(), None);
    }

    #[tokio::test]
    async fn recv_ends_when_registry_dropped() {
        let subscribers = Subscribers::<u8>::new();
        let mut sub = subscribers.subscribe();
        drop(subscribers);
        assert_eq!(sub.recv().await, None);
    }
}
