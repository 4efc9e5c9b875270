//! Named signal channels
//!
//! A `Signal<T>` is a per-instance listener list with explicit
//! subscribe/unsubscribe. Drivers and the fade engine each own their
//! signals; there is no global registry.
//!
//! Listeners are invoked outside the internal lock, so a listener may
//! subscribe or unsubscribe (itself included) while being called.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Listener callback type
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned by [`Signal::subscribe`], used to unsubscribe later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A named signal with an ordered list of listeners
pub struct Signal<T> {
    name: &'static str,
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, Listener<T>)>>,
}

impl<T> Signal<T> {
    /// Create an empty signal
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Signal name (e.g. "connected", "value")
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a listener. Listeners fire in subscription order.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// Number of live listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Invoke every listener with `payload`
    pub fn emit(&self, payload: &T) {
        // Snapshot so listeners run without the lock held
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in snapshot {
            listener(payload);
        }
    }
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_emit_in_subscription_order() {
        let signal: Signal<u32> = Signal::new("test");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let a = Arc::clone(&seen);
        signal.subscribe(move |v| a.lock().push(("a", *v)));
        let b = Arc::clone(&seen);
        signal.subscribe(move |v| b.lock().push(("b", *v)));

        signal.emit(&7);
        assert_eq!(*seen.lock(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn test_unsubscribe() {
        let signal: Signal<()> = Signal::new("test");
        let count = Arc::new(Mutex::new(0));

        let c = Arc::clone(&count);
        let id = signal.subscribe(move |_| *c.lock() += 1);

        signal.emit(&());
        assert!(signal.unsubscribe(id));
        assert!(!signal.unsubscribe(id));
        signal.emit(&());

        assert_eq!(*count.lock(), 1);
        assert_eq!(signal.listener_count(), 0);
    }

    #[test]
    fn test_listener_can_unsubscribe_during_emit() {
        let signal: Arc<Signal<()>> = Arc::new(Signal::new("test"));
        let id_slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let sig = Arc::clone(&signal);
        let slot = Arc::clone(&id_slot);
        let id = signal.subscribe(move |_| {
            if let Some(id) = *slot.lock() {
                sig.unsubscribe(id);
            }
        });
        *id_slot.lock() = Some(id);

        signal.emit(&());
        assert_eq!(signal.listener_count(), 0);
    }
}
