//! Listener registries.
//!
//! A [`ListenerRegistry`] maps an event name to the callbacks subscribed to
//! it. Each subscription gets a [`ListenerId`] so it can be removed again;
//! Rust closures have no identity to compare.
//!
//! Registries only store callbacks. Invoking them is the dispatcher's job:
//! it clones the `Arc`s out under the lock and runs them after releasing it,
//! so a callback may subscribe or unsubscribe without deadlocking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identifier of one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lst_{}", self.0)
    }
}

/// Process-wide id source; ids are unique across every registry.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

fn next_listener_id() -> ListenerId {
    ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
}

/// Event name -> ordered list of callbacks.
pub struct ListenerRegistry<F: ?Sized> {
    listeners: HashMap<String, Vec<(ListenerId, Arc<F>)>>,
}

impl<F: ?Sized> Default for ListenerRegistry<F> {
    fn default() -> Self {
        Self {
            listeners: HashMap::new(),
        }
    }
}

impl<F: ?Sized> std::fmt::Debug for ListenerRegistry<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("event_count", &self.listeners.len())
            .field("total_listeners", &self.listener_count())
            .finish()
    }
}

impl<F: ?Sized> ListenerRegistry<F> {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `callback` to `event`.
    pub fn add(&mut self, event: &str, callback: Arc<F>) -> ListenerId {
        let id = next_listener_id();
        self.listeners
            .entry(event.to_string())
            .or_default()
            .push((id, callback));
        log::debug!("[Dispatch] Registered listener {} for '{}'", id, event);
        id
    }

    /// Remove subscription `id` from `event`.
    ///
    /// Returns `false` (and does nothing) if it was not registered there.
    pub fn remove(&mut self, event: &str, id: ListenerId) -> bool {
        let Some(callbacks) = self.listeners.get_mut(event) else {
            return false;
        };
        let Some(idx) = callbacks.iter().position(|(existing, _)| *existing == id) else {
            return false;
        };
        callbacks.remove(idx);
        if callbacks.is_empty() {
            self.listeners.remove(event);
        }
        log::debug!("[Dispatch] Unregistered listener {} from '{}'", id, event);
        true
    }

    /// Snapshot of the callbacks registered for `event`.
    #[must_use]
    pub fn snapshot(&self, event: &str) -> Vec<Arc<F>> {
        self.listeners
            .get(event)
            .map(|v| v.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }

    /// Whether any callbacks are registered for `event`.
    #[must_use]
    pub fn has_listeners(&self, event: &str) -> bool {
        self.listeners.get(event).is_some_and(|v| !v.is_empty())
    }

    /// Total number of callbacks across all events.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }
}
