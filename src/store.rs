//! Subscribable state containers.
//!
//! Each container holds one snapshot behind a lock. Mutations go through
//! [`Store::update`], which applies the change atomically and notifies every
//! listener synchronously with the new snapshot, so readers never observe a
//! partially-applied update.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

type Listener<T> = Box<dyn Fn(&T) + Send>;

/// A shared snapshot with synchronous change notification.
pub struct Store<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    state: Mutex<T>,
    listeners: Mutex<Vec<(usize, Listener<T>)>>,
    next_id: AtomicUsize,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> Store<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(initial),
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicUsize::new(0),
            }),
        }
    }

    /// Get a snapshot of the current state.
    pub fn get(&self) -> T {
        self.inner.state.lock().unwrap().clone()
    }

    /// Apply a mutation and notify all listeners with the resulting snapshot.
    pub fn update<F: FnOnce(&mut T)>(&self, f: F) {
        let snapshot = {
            let mut state = self.inner.state.lock().unwrap();
            f(&mut state);
            state.clone()
        };
        self.notify(&snapshot);
    }

    /// Register a listener, invoking it immediately with the current snapshot.
    ///
    /// The listener stays registered until the returned [`Subscription`] is
    /// dropped or explicitly unsubscribed.
    pub fn subscribe<F: Fn(&T) + Send + 'static>(&self, listener: F) -> Subscription {
        let snapshot = self.get();
        listener(&snapshot);

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap()
            .push((id, Box::new(listener)));

        let inner = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = Weak::upgrade(&inner) {
                    inner
                        .listeners
                        .lock()
                        .unwrap()
                        .retain(|(listener_id, _)| *listener_id != id);
                }
            })),
        }
    }

    fn notify(&self, snapshot: &T) {
        let listeners = self.inner.listeners.lock().unwrap();
        for (_, listener) in listeners.iter() {
            listener(snapshot);
        }
    }
}

/// Guard for a registered listener. Dropping it removes the listener.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Remove the listener now instead of waiting for drop.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscribe_notifies_immediately() {
        let store = Store::new(7u32);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        let _sub = store.subscribe(move |value| seen_clone.lock().unwrap().push(*value));

        assert_eq!(*seen.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_update_notifies_with_new_snapshot() {
        let store = Store::new(0u32);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        let _sub = store.subscribe(move |value| seen_clone.lock().unwrap().push(*value));

        store.update(|value| *value = 1);
        store.update(|value| *value += 1);

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(store.get(), 2);
    }

    #[test]
    fn test_dropped_subscription_stops_notifications() {
        let store = Store::new(0u32);
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = Arc::clone(&count);
        let sub = store.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        drop(sub);

        store.update(|value| *value = 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_unsubscribe() {
        let store = Store::new(0u32);
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = Arc::clone(&count);
        let sub = store.subscribe(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        sub.unsubscribe();

        store.update(|value| *value = 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listeners_observe_fully_applied_updates() {
        let store = Store::new((0u32, 0u32));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        let _sub = store.subscribe(move |pair| seen_clone.lock().unwrap().push(*pair));

        store.update(|pair| {
            pair.0 = 1;
            pair.1 = 2;
        });

        assert_eq!(*seen.lock().unwrap(), vec![(0, 0), (1, 2)]);
    }
}
