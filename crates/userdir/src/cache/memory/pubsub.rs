//! In-memory change broadcaster.
//!
//! Fans each published event out to every registered subscriber through a
//! bounded per-subscriber queue. Publishing never waits: a subscriber whose
//! queue is full simply misses that event, and nobody else is affected.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// Queue capacity per subscriber when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Identity of one subscriber within its broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of one publish, for observability only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Subscribers that had room for the event.
    pub delivered: usize,
    /// Subscribers whose queue was full.
    pub dropped: usize,
}

type Registry<T> = RwLock<HashMap<SubscriberId, mpsc::Sender<T>>>;

struct Inner<T> {
    subscribers: Registry<T>,
    next_id: AtomicU64,
    capacity: usize,
}

impl<T> Inner<T> {
    // Membership edits never leave the map half-updated, so a poisoned lock
    // is still usable.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<SubscriberId, mpsc::Sender<T>>> {
        self.subscribers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<SubscriberId, mpsc::Sender<T>>> {
        self.subscribers.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.write().remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber_id = %id, "Subscriber removed");
        }
        removed
    }
}

/// Registry of live subscribers with non-blocking fan-out.
///
/// Cloning yields another handle to the same registry.
pub struct ChangeBroadcaster<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ChangeBroadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ChangeBroadcaster<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBroadcaster")
            .field("capacity", &self.inner.capacity)
            .field("subscribers", &self.inner.read().len())
            .finish()
    }
}

impl<T> Default for ChangeBroadcaster<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl<T> ChangeBroadcaster<T>
where
    T: Clone + Send + 'static,
{
    /// Creates a broadcaster whose subscriber queues hold `capacity` events.
    ///
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Registers a new subscriber.
    ///
    /// Only events published after this call are delivered. Dropping the
    /// returned [`Subscription`] unsubscribes it.
    pub fn subscribe(&self) -> Subscription<T> {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.inner.capacity);

        let count = {
            let mut subscribers = self.inner.write();
            subscribers.insert(id, sender);
            subscribers.len()
        };
        tracing::debug!(subscriber_id = %id, subscribers = count, "Subscriber added");

        Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.inner),
            registered: true,
        }
    }

    /// Removes a subscriber and closes its queue.
    ///
    /// Events already queued can still be drained, after which the
    /// subscriber's `recv` returns `None`. Unknown or already removed IDs are
    /// ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.remove(id);
    }

    /// Offers `event` to every subscriber without waiting.
    ///
    /// A full queue costs that subscriber this event and nothing else.
    /// Subscribers whose receiving side is gone are pruned.
    pub fn publish(&self, event: T) -> Delivery {
        let mut delivery = Delivery::default();
        let mut closed = Vec::new();

        {
            let subscribers = self.inner.read();
            for (id, sender) in subscribers.iter() {
                match sender.try_send(event.clone()) {
                    Ok(()) => delivery.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        delivery.dropped += 1;
                        tracing::warn!(subscriber_id = %id, "Dropping event: subscriber queue is full");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }

        for id in closed {
            self.inner.remove(id);
        }

        tracing::trace!(
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            "Event published"
        );
        delivery
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.read().len()
    }

    /// Capacity of each subscriber queue.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

/// One registered subscriber: its identity and its queue.
///
/// The registration is released when this value is dropped, so a consumer
/// loop cannot leak its slot on any exit path.
pub struct Subscription<T> {
    id: SubscriberId,
    receiver: mpsc::Receiver<T>,
    registry: Weak<Inner<T>>,
    registered: bool,
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("registered", &self.registered)
            .finish()
    }
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for the next event.
    ///
    /// Returns `None` once the subscription was removed and its queue is
    /// drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Takes the next queued event without waiting.
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Removes this subscriber from its broadcaster.
    ///
    /// Events already queued remain readable. Calling this more than once is
    /// a no-op.
    pub fn unsubscribe(&mut self) {
        if !self.registered {
            return;
        }
        self.registered = false;
        if let Some(inner) = self.registry.upgrade() {
            inner.remove(self.id);
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let broadcaster = ChangeBroadcaster::new(4);
        let mut subscription = broadcaster.subscribe();

        let delivery = broadcaster.publish("e1");

        assert_eq!(delivery, Delivery { delivered: 1, dropped: 0 });
        assert_eq!(subscription.recv().await, Some("e1"));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_in_publish_order() {
        let broadcaster = ChangeBroadcaster::new(8);
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();

        for n in 0..5 {
            broadcaster.publish(n);
        }

        for n in 0..5 {
            assert_eq!(first.recv().await, Some(n));
            assert_eq!(second.recv().await, Some(n));
        }
    }

    #[tokio::test]
    async fn test_publish_no_subscribers() {
        let broadcaster: ChangeBroadcaster<&str> = ChangeBroadcaster::default();

        let delivery = broadcaster.publish("nobody");

        assert_eq!(delivery, Delivery::default());
    }

    #[tokio::test]
    async fn test_full_queue_drops_only_for_that_subscriber() {
        let broadcaster = ChangeBroadcaster::new(1);
        let mut s1 = broadcaster.subscribe();
        let mut s2 = broadcaster.subscribe();

        let first = broadcaster.publish("e1");
        assert_eq!(first, Delivery { delivered: 2, dropped: 0 });

        assert_eq!(s1.recv().await, Some("e1"));
        let second = broadcaster.publish("e2");
        assert_eq!(second, Delivery { delivered: 1, dropped: 1 });

        assert_eq!(s1.recv().await, Some("e2"));
        assert_eq!(s2.recv().await, Some("e1"));
        assert_eq!(s2.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_unsubscribed_receives_nothing_more() {
        let broadcaster = ChangeBroadcaster::new(1);
        let mut s1 = broadcaster.subscribe();
        let mut s2 = broadcaster.subscribe();

        broadcaster.publish("e1");
        assert_eq!(s1.recv().await, Some("e1"));
        assert_eq!(s2.recv().await, Some("e1"));

        broadcaster.unsubscribe(s1.id());
        let delivery = broadcaster.publish("e3");

        assert_eq!(delivery.delivered, 1);
        assert_eq!(s1.recv().await, None);
        assert_eq!(s2.recv().await, Some("e3"));
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let broadcaster = ChangeBroadcaster::<u32>::new(1);
        let mut subscription = broadcaster.subscribe();
        let id = subscription.id();

        broadcaster.unsubscribe(id);
        broadcaster.unsubscribe(id);
        subscription.unsubscribe();
        subscription.unsubscribe();

        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_queued_events_survive_unsubscribe() {
        let broadcaster = ChangeBroadcaster::new(4);
        let mut subscription = broadcaster.subscribe();

        broadcaster.publish(1);
        broadcaster.publish(2);
        subscription.unsubscribe();
        broadcaster.publish(3);

        assert_eq!(subscription.recv().await, Some(1));
        assert_eq!(subscription.recv().await, Some(2));
        assert_eq!(subscription.recv().await, None);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let broadcaster = ChangeBroadcaster::<u32>::new(1);
        let subscription = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);

        drop(subscription);

        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_panicking_consumer_releases_its_slot() {
        let broadcaster = ChangeBroadcaster::<u32>::new(1);
        let subscription = broadcaster.subscribe();

        let consumer = tokio::spawn(async move {
            let _subscription = subscription;
            panic!("transport blew up");
        });

        assert!(consumer.await.is_err());
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_no_backlog() {
        let broadcaster = ChangeBroadcaster::new(4);
        broadcaster.publish("before");

        let mut late = broadcaster.subscribe();
        broadcaster.publish("after");

        assert_eq!(late.recv().await, Some("after"));
        assert_eq!(late.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_resubscribe_gets_new_identity() {
        let broadcaster = ChangeBroadcaster::<u32>::new(1);
        let first = broadcaster.subscribe();
        let first_id = first.id();
        drop(first);

        let second = broadcaster.subscribe();

        assert_ne!(first_id, second.id());
        assert_eq!(broadcaster.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_with_many_full_queues_does_not_block() {
        let broadcaster = ChangeBroadcaster::new(1);
        let subscriptions: Vec<_> = (0..100).map(|_| broadcaster.subscribe()).collect();
        broadcaster.publish(0);

        let delivery = tokio::time::timeout(Duration::from_millis(100), async {
            broadcaster.publish(1)
        })
        .await
        .expect("publish must not block");

        assert_eq!(delivery, Delivery { delivered: 0, dropped: 100 });
        assert_eq!(broadcaster.subscriber_count(), subscriptions.len());
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned_on_publish() {
        let broadcaster = ChangeBroadcaster::<u32>::new(1);
        let mut live = broadcaster.subscribe();

        // A registration whose consumer vanished without unsubscribing.
        let (sender, receiver) = mpsc::channel(1);
        broadcaster.inner.write().insert(SubscriberId(u64::MAX), sender);
        drop(receiver);
        assert_eq!(broadcaster.subscriber_count(), 2);

        let delivery = broadcaster.publish(7);

        assert_eq!(delivery, Delivery { delivered: 1, dropped: 0 });
        assert_eq!(broadcaster.subscriber_count(), 1);
        assert_eq!(live.recv().await, Some(7));
    }

    #[tokio::test]
    async fn test_subscription_outlives_broadcaster() {
        let broadcaster = ChangeBroadcaster::<u32>::new(1);
        let mut subscription = broadcaster.subscribe();
        broadcaster.publish(1);
        drop(broadcaster);

        assert_eq!(subscription.recv().await, Some(1));
        assert_eq!(subscription.recv().await, None);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let broadcaster = ChangeBroadcaster::<u32>::new(0);
        assert_eq!(broadcaster.capacity(), 1);
    }
}
