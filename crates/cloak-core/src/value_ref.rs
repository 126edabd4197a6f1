//! Publish/subscribe cell for live values.
//!
//! A [`ValueRef`] holds the current value and a set of subscriber callbacks.
//! Setting a different value replaces it and calls every subscriber
//! synchronously, after the internal lock is released, so a callback may
//! read the cell or subscribe again.

#![allow(clippy::disallowed_types, reason = "Callbacks run synchronously outside the lock")]

use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    value: T,
    next_id: u64,
    listeners: BTreeMap<u64, Listener<T>>,
}

/// Shared, observable value. Clones refer to the same cell.
pub struct ValueRef<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Clone for ValueRef<T> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueRef").field("value", &lock(&self.inner).value).finish()
    }
}

// A listener that panicked leaves the value itself intact
fn lock<T>(inner: &Arc<Mutex<Inner<T>>>) -> MutexGuard<'_, Inner<T>> {
    inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl<T: Clone + PartialEq> ValueRef<T> {
    /// Cell holding `value`, with no subscribers.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner { value, next_id: 0, listeners: BTreeMap::new() })),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        lock(&self.inner).value.clone()
    }

    /// Replace the value. Subscribers are notified only if it changed.
    ///
    /// Returns whether the value changed.
    pub fn set(&self, value: T) -> bool {
        let listeners: Vec<Listener<T>> = {
            let mut inner = lock(&self.inner);
            if inner.value == value {
                return false;
            }
            inner.value = value.clone();
            inner.listeners.values().cloned().collect()
        };

        for listener in listeners {
            listener(&value);
        }
        true
    }

    /// Call `listener` with every future value until the returned
    /// [`Subscription`] is dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription
    where
        T: Send + 'static,
    {
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.insert(id, Arc::new(listener));

        let weak: Weak<Mutex<Inner<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            unsubscribe: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    lock(&inner).listeners.remove(&id);
                }
            })),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).listeners.len()
    }
}

/// Live subscription to a [`ValueRef`]. Unsubscribes on drop.
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("active", &self.unsubscribe.is_some()).finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}
