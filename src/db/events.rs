//! Subscriptions to committed writes.
//!
//! Writers enqueue their events while still holding the registry write lock,
//! so the queue is in commit order. After the lock is released the writer
//! drains the queue unless another thread is already draining it, in which
//! case that thread delivers the events. Listeners therefore never see two
//! commits out of order, and may query the registry, manage subscriptions or
//! upsert from inside a callback.

use geocell_types::DataUpdated;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Receives a `DataUpdated` event for every geohash written by a committed upsert.
pub trait DataListener: Send + Sync {
    fn on_data_updated(&self, event: &DataUpdated);
}

impl<F> DataListener for F
where
    F: Fn(&DataUpdated) + Send + Sync,
{
    fn on_data_updated(&self, event: &DataUpdated) {
        self(event)
    }
}

/// Handle returned by `Registry::subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub(crate) struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, Arc<dyn DataListener>)>>,
    pending: Mutex<VecDeque<Vec<DataUpdated>>>,
    draining: Mutex<()>,
}

impl EventBus {
    pub(crate) fn subscribe(&self, listener: Arc<dyn DataListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sub, _)| *sub != id);
        listeners.len() != before
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Queue one commit's events. Call while holding the registry write lock.
    pub(crate) fn enqueue(&self, events: Vec<DataUpdated>) {
        if !events.is_empty() {
            self.pending.lock().push_back(events);
        }
    }

    /// Deliver queued events in commit order.
    ///
    /// Returns at once if another thread is draining; that thread picks up
    /// whatever was queued before it lets go of the drain lock.
    pub(crate) fn drain(&self) {
        loop {
            let Some(guard) = self.draining.try_lock() else {
                return;
            };

            loop {
                let next = self.pending.lock().pop_front();
                match next {
                    Some(events) => self.publish(&events),
                    None => break,
                }
            }

            drop(guard);
            // a writer may have queued after our last pop but failed try_lock
            if self.pending.lock().is_empty() {
                return;
            }
        }
    }

    pub(crate) fn publish(&self, events: &[DataUpdated]) {
        if events.is_empty() {
            return;
        }

        // snapshot so listeners can re-enter subscribe/unsubscribe
        let listeners: Vec<Arc<dyn DataListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for event in events {
            for listener in &listeners {
                listener.on_data_updated(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(geohash: &str, id: u64) -> DataUpdated {
        DataUpdated {
            geohash: geohash.into(),
            id,
            replaced: false,
        }
    }

    #[test]
    fn test_publish_reaches_every_listener() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        bus.subscribe(Arc::new(move |e: &DataUpdated| sink.lock().push(e.id)));
        let sink = Arc::clone(&seen);
        bus.subscribe(Arc::new(move |e: &DataUpdated| sink.lock().push(e.id * 10)));

        bus.publish(&[event("g1", 1), event("g2", 2)]);
        assert_eq!(*seen.lock(), vec![1, 10, 2, 20]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::default();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        let id = bus.subscribe(Arc::new(move |_: &DataUpdated| {
            c.fetch_add(1, Ordering::Relaxed);
        }));

        bus.publish(&[event("g1", 1)]);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(&[event("g1", 1)]);

        assert_eq!(count.load(Ordering::Relaxed), 1);
        assert_eq!(bus.len(), 0);
    }

    #[test]
    fn test_drain_delivers_in_queue_order() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(Arc::new(move |e: &DataUpdated| sink.lock().push(e.id)));

        bus.enqueue(vec![event("g1", 1), event("g2", 1)]);
        bus.enqueue(Vec::new());
        bus.enqueue(vec![event("g1", 2)]);
        bus.drain();

        assert_eq!(*seen.lock(), vec![1, 1, 2]);
        assert!(bus.pending.lock().is_empty());
    }

    #[test]
    fn test_nested_enqueue_is_delivered_after_current() {
        let bus = Arc::new(EventBus::default());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let inner = Arc::clone(&bus);
        bus.subscribe(Arc::new(move |e: &DataUpdated| {
            sink.lock().push(e.id);
            if e.id == 1 {
                inner.enqueue(vec![event("g1", 2)]);
                // already draining on this thread; returns without delivering
                inner.drain();
                sink.lock().push(100);
            }
        }));

        bus.enqueue(vec![event("g1", 1)]);
        bus.drain();
        assert_eq!(*seen.lock(), vec![1, 100, 2]);
    }
}
