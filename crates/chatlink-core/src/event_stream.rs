//! Listener registry used for transport status and activity streams.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, Weak,
};

type EventHandler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listeners<T> {
    entries: Vec<(u64, EventHandler<T>)>,
}

/// Broadcasts events to registered listeners.
///
/// Cloning an `EventStream` yields another handle onto the same listener set.
pub struct EventStream<T> {
    listeners: Arc<Mutex<Listeners<T>>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for EventStream<T> {
    fn clone(&self) -> Self {
        Self {
            listeners: Arc::clone(&self.listeners),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T> Default for EventStream<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventStream<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Listeners {
                entries: Vec::new(),
            })),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Registers `handler` and returns the handle that removes it again.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
        T: 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.entries.push((id, Arc::new(handler)));
        }
        let weak: Weak<Mutex<Listeners<T>>> = Arc::downgrade(&self.listeners);
        Subscription {
            detach: Some(Box::new(move || {
                if let Some(listeners) = weak.upgrade() {
                    if let Ok(mut listeners) = listeners.lock() {
                        listeners.entries.retain(|(entry_id, _)| *entry_id != id);
                    }
                }
            })),
        }
    }

    /// Delivers `event` to every listener registered at call time.
    ///
    /// Handlers run outside the registry lock, and a panicking handler does not
    /// prevent the remaining handlers from running.
    pub fn emit(&self, event: &T) {
        let handlers = match self.listeners.lock() {
            Ok(listeners) => listeners
                .entries
                .iter()
                .map(|(_, handler)| Arc::clone(handler))
                .collect::<Vec<_>>(),
            Err(_) => return,
        };
        for handler in handlers {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(event)));
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .map(|listeners| listeners.entries.len())
            .unwrap_or(0)
    }
}

/// Handle returned by [`EventStream::subscribe`].
///
/// Dropping the handle leaves the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.detach.is_some())
            .finish()
    }
}
