//! Event and room dispatch.
//!
//! # Scopes
//!
//! ```text
//!   {"type":"event","event":"chat","room":"r1","payload":..}
//!          │
//!          ├──► global registry   "$remote.chat"  (always)
//!          │
//!          └──► RoomRegistry["r1"] ──► room registry "chat"  (when room is set)
//!                    │
//!                    └── created on demand ──► global "room.new" (synchronously)
//! ```
//!
//! Routing does not invoke listeners. It returns a [`DispatchBatch`] that the
//! connection manager runs once it has finished processing the frame, so
//! listeners always observe the state *after* classification (for example a
//! completed handshake). The only synchronous notification is `room.new`,
//! which fires during routing so its listeners can attach room-scoped
//! callbacks before the triggering event is delivered to the room.
//!
//! Each listener runs inside `catch_unwind`: a panicking callback is logged
//! and its siblings still run.

pub mod listeners;
pub mod room;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::constants::{
    LOCAL_CONNECTION_CLOSED, LOCAL_CONNECTION_ERROR, LOCAL_ROOM_CREATED, REMOTE_EVENT_PREFIX,
};
use crate::protocol::EventMessage;

pub use listeners::{ListenerId, ListenerRegistry};
pub use room::{Room, RoomListener, RoomRegistry};

/// What a global listener is called with.
#[derive(Debug, Clone)]
pub enum Event {
    /// An event pushed by the peer.
    Remote {
        /// Event name (without the `$remote.` prefix).
        name: String,
        /// Event payload.
        payload: Value,
        /// Room the event was addressed to, if any.
        room: Option<String>,
    },
    /// A room was created on demand.
    RoomCreated(Room),
    /// The transport closed.
    Closed(String),
    /// The transport reported an error.
    Error(String),
}

/// Callback subscribed in the global scope.
pub type GlobalListener = dyn Fn(&Event) + Send + Sync;

/// Routes decoded events to global and room listeners.
#[derive(Clone)]
pub struct Dispatcher {
    global: Arc<Mutex<ListenerRegistry<GlobalListener>>>,
    rooms: RoomRegistry,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("global", &*self.global.lock().unwrap_or_else(PoisonError::into_inner))
            .field("rooms", &self.rooms)
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher over a (possibly shared) room table.
    #[must_use]
    pub fn new(rooms: RoomRegistry) -> Self {
        Self {
            global: Arc::new(Mutex::new(ListenerRegistry::new())),
            rooms,
        }
    }

    /// The room table.
    #[must_use]
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Subscribe to a raw global event name (`"room.new"`,
    /// `"realtime.closed"`, `"$remote.chat"`, ...).
    pub fn on<F>(&self, name: &str, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.global
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(name, Arc::new(callback))
    }

    /// Subscribe to a remote event; sugar for `on("$remote." + event)`.
    ///
    /// The callback receives the payload and the room name, if any.
    pub fn on_remote<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value, Option<&str>) + Send + Sync + 'static,
    {
        self.on(&remote_key(event), move |evt| {
            if let Event::Remote { payload, room, .. } = evt {
                callback(payload, room.as_deref());
            }
        })
    }

    /// Subscribe to on-demand room creation.
    pub fn on_room_created<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&Room) + Send + Sync + 'static,
    {
        self.on(LOCAL_ROOM_CREATED, move |evt| {
            if let Event::RoomCreated(room) = evt {
                callback(room);
            }
        })
    }

    /// Route an inbound event. Creates the addressed room if needed.
    pub fn route_event(&self, message: EventMessage) -> DispatchBatch {
        let EventMessage {
            event: name,
            payload,
            room,
        } = message;

        let room_handle = room.as_deref().map(|room_name| {
            let (handle, created) = self.rooms.get_or_create(room_name);
            if created {
                log::debug!("[Dispatch] Room '{}' created", room_name);
                self.notify_now(LOCAL_ROOM_CREATED, &Event::RoomCreated(handle.clone()));
            }
            handle
        });

        let room_payload = room_handle.as_ref().map(|_| Arc::new(payload.clone()));
        let mut batch = DispatchBatch::default();
        let event = Arc::new(Event::Remote {
            name: name.clone(),
            payload,
            room,
        });
        batch.push_global(&self.snapshot(&remote_key(&name)), &name, &event);

        if let (Some(handle), Some(payload)) = (room_handle, room_payload) {
            for listener in handle.snapshot(&name) {
                batch.deliveries.push(Delivery::Room {
                    room: handle.name().to_string(),
                    name: name.clone(),
                    listener,
                    payload: Arc::clone(&payload),
                });
            }
        }

        batch
    }

    /// Schedule the local "connection closed" notification.
    #[must_use]
    pub fn connection_closed(&self, reason: &str) -> DispatchBatch {
        self.local(LOCAL_CONNECTION_CLOSED, Event::Closed(reason.to_string()))
    }

    /// Schedule the local "connection error" notification.
    #[must_use]
    pub fn connection_error(&self, info: &str) -> DispatchBatch {
        self.local(LOCAL_CONNECTION_ERROR, Event::Error(info.to_string()))
    }

    fn local(&self, name: &str, event: Event) -> DispatchBatch {
        let mut batch = DispatchBatch::default();
        batch.push_global(&self.snapshot(name), name, &Arc::new(event));
        batch
    }

    fn notify_now(&self, name: &str, event: &Event) {
        for listener in self.snapshot(name) {
            invoke_isolated(name, || listener(event));
        }
    }

    fn snapshot(&self, name: &str) -> Vec<Arc<GlobalListener>> {
        self.global
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot(name)
    }
}

fn remote_key(event: &str) -> String {
    format!("{REMOTE_EVENT_PREFIX}{event}")
}

enum Delivery {
    Global {
        name: String,
        listener: Arc<GlobalListener>,
        event: Arc<Event>,
    },
    Room {
        room: String,
        name: String,
        listener: Arc<RoomListener>,
        payload: Arc<Value>,
    },
}

/// Listener invocations scheduled by routing, run later with [`DispatchBatch::run`].
#[derive(Default)]
#[must_use = "a dispatch batch does nothing until it is run"]
pub struct DispatchBatch {
    deliveries: Vec<Delivery>,
}

impl std::fmt::Debug for DispatchBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchBatch")
            .field("deliveries", &self.deliveries.len())
            .finish()
    }
}

impl DispatchBatch {
    fn push_global(&mut self, listeners: &[Arc<GlobalListener>], name: &str, event: &Arc<Event>) {
        for listener in listeners {
            self.deliveries.push(Delivery::Global {
                name: name.to_string(),
                listener: Arc::clone(listener),
                event: Arc::clone(event),
            });
        }
    }

    /// Append another batch.
    pub fn append(&mut self, mut other: DispatchBatch) {
        self.deliveries.append(&mut other.deliveries);
    }

    /// Number of scheduled invocations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    /// Whether nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }

    /// Invoke every scheduled listener. Returns how many panicked.
    pub fn run(self) -> usize {
        let mut failures = 0;
        for delivery in self.deliveries {
            let ok = match delivery {
                Delivery::Global {
                    name,
                    listener,
                    event,
                } => invoke_isolated(&name, || listener(&event)),
                Delivery::Room {
                    room,
                    name,
                    listener,
                    payload,
                } => invoke_isolated(&format!("{room}/{name}"), || listener(&payload)),
            };
            if !ok {
                failures += 1;
            }
        }
        failures
    }
}

/// Run one listener, containing a panic. Returns `false` if it panicked.
fn invoke_isolated(name: &str, f: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(panic) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "non-string panic payload".to_string()
            };
            log::error!("[Dispatch] Listener for '{}' panicked: {}", name, message);
            false
        }
    }
}
