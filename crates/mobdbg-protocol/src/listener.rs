//! Listener registries owned by the object that emits to them.
//!
//! Callbacks are snapshotted before they run, so a listener may add or
//! remove listeners (including itself) while being called. A panicking
//! listener is logged and does not stop the others.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handle returned by [`ListenerSet::add`], used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registry<T> {
    next_id: u64,
    callbacks: Vec<(ListenerId, Callback<T>)>,
}

/// A set of callbacks notified with `&T`.
pub struct ListenerSet<T> {
    registry: Mutex<Registry<T>>,
}

impl<T> ListenerSet<T> {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                next_id: 1,
                callbacks: Vec::new(),
            }),
        }
    }

    /// Register a callback.
    pub fn add(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let mut registry = lock(&self.registry);
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;
        registry.callbacks.push((id, Arc::new(callback)));
        id
    }

    /// Unregister a callback. Returns `false` if it was already gone.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut registry = lock(&self.registry);
        let before = registry.callbacks.len();
        registry.callbacks.retain(|(existing, _)| *existing != id);
        registry.callbacks.len() != before
    }

    /// Drop every callback.
    pub fn clear(&self) {
        lock(&self.registry).callbacks.clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every listener with `value`.
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<(ListenerId, Callback<T>)> = lock(&self.registry).callbacks.clone();
        for (id, callback) in snapshot {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(value))) {
                tracing::warn!(listener = id.0, panic = panic_message(&*payload), "listener panicked");
            }
        }
    }
}

impl<T> Default for ListenerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ListenerSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet").field("len", &self.len()).finish()
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
