//! Rooms: named sub-channels with their own listener registry.
//!
//! A [`Room`] is created on demand the first time an event addressed to it
//! arrives, and lives as long as the [`RoomRegistry`] that holds it. The
//! registry is injected into the session rather than being a global, so it
//! outlives reconnects but independent sessions stay isolated.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use super::listeners::{ListenerId, ListenerRegistry};

/// Callback subscribed to a room event; receives the event payload.
pub type RoomListener = dyn Fn(&Value) + Send + Sync;

struct RoomInner {
    name: String,
    listeners: Mutex<ListenerRegistry<RoomListener>>,
}

/// Cloneable handle to a named room.
#[derive(Clone)]
pub struct Room {
    inner: Arc<RoomInner>,
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("name", &self.inner.name)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl PartialEq for Room {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Room {
    fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(RoomInner {
                name: name.to_string(),
                listeners: Mutex::new(ListenerRegistry::new()),
            }),
        }
    }

    /// Room name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Subscribe to `event` within this room.
    pub fn on<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(event, Arc::new(callback))
    }

    /// Remove a subscription. No-op (returns `false`) if it is not registered
    /// for `event` on this room.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(event, id)
    }

    /// Number of callbacks subscribed across all events.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listener_count()
    }

    pub(crate) fn snapshot(&self, event: &str) -> Vec<Arc<RoomListener>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot(event)
    }
}

/// Shared name -> room table.
#[derive(Clone, Default)]
pub struct RoomRegistry {
    rooms: Arc<Mutex<HashMap<String, Room>>>,
}

impl std::fmt::Debug for RoomRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomRegistry")
            .field("rooms", &self.names())
            .finish()
    }
}

impl RoomRegistry {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a room by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Room> {
        self.rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Return the room named `name`, creating it if needed.
    ///
    /// The flag is `true` when this call created it.
    pub fn get_or_create(&self, name: &str) -> (Room, bool) {
        let mut rooms = self.rooms.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(room) = rooms.get(name) {
            return (room.clone(), false);
        }
        let room = Room::new(name);
        rooms.insert(name.to_string(), room.clone());
        (room, true)
    }

    /// Number of rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no room exists yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted room names.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
