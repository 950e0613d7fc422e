//! Connection manager and the public session API.
//!
//! [`Session::new`] spawns the engine task (see [`engine`]) and returns a
//! handle. The handle only sends commands and registers listeners; the
//! engine owns the transport, the handshake and the pending call table.
//!
//! # Example
//!
//! ```ignore
//! let session = Session::websocket(SessionConfig::new("wss://rt.example.com/ws"))?;
//! session.on_remote("chat", |payload, room| println!("{room:?}: {payload}"));
//! session.connect().await?;
//! let profile = session.call("getProfile", json!({"uid": 7})).await?;
//! ```

mod engine;
mod handshake;
pub mod state;

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::codec::Codec;
use crate::config::SessionConfig;
use crate::constants::{LOCAL_CONNECTION_CLOSED, LOCAL_CONNECTION_ERROR};
use crate::dispatch::{Dispatcher, Event, ListenerId, Room, RoomRegistry};
use crate::error::SessionError;
use crate::transport::{Connector, WsConnector};

use engine::{Command, Engine};
pub use state::ConnectionState;

/// Handle to a persistent, self-reconnecting session.
///
/// Dropping the handle shuts the engine down.
#[derive(Debug)]
pub struct Session {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    dispatcher: Dispatcher,
    task: Option<JoinHandle<()>>,
}

impl Session {
    /// Create a session over `connector`, sharing `rooms`.
    ///
    /// Must be called from within a tokio runtime. The keepalive timer starts
    /// here; nothing is opened until [`Session::connect`].
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        rooms: RoomRegistry,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let codec = Codec::from_config(&config)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            SessionError::Config(format!("a session needs a tokio runtime: {e}"))
        })?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let dispatcher = Dispatcher::new(rooms);

        let engine = Engine::new(
            config,
            codec,
            connector,
            dispatcher.clone(),
            state_tx,
            command_rx,
        );
        let task = runtime.spawn(engine.run());

        Ok(Self {
            commands,
            state,
            dispatcher,
            task: Some(task),
        })
    }

    /// Session over WebSocket with a private room table.
    ///
    /// `config.headers` go out with every handshake request.
    pub fn websocket(config: SessionConfig) -> Result<Self, SessionError> {
        let connector = WsConnector::from_config(&config);
        Self::new(config, Arc::new(connector), RoomRegistry::new())
    }

    /// Start connecting and wait for the handshake to complete.
    ///
    /// Calling it again is harmless; it then just waits for readiness.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.commands
            .send(Command::Connect)
            .map_err(|_| SessionError::Closed)?;
        self.ready().await
    }

    /// Wait until the connection is ready (immediately if it already is).
    pub async fn ready(&self) -> Result<(), SessionError> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| s.is_ready())
            .await
            .map(|_| ())
            .map_err(|_| SessionError::Closed)
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Call `method` (sent as `<role>.<method>`) and wait for its result.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, SessionError> {
        self.caller().call(method, params).await
    }

    /// Cloneable handle for issuing calls from listeners and other tasks.
    #[must_use]
    pub fn caller(&self) -> CallHandle {
        CallHandle {
            commands: self.commands.clone(),
        }
    }

    /// Subscribe to a raw global event name.
    pub fn on<F>(&self, name: &str, callback: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.dispatcher.on(name, callback)
    }

    /// Subscribe to a remote event, with or without a room.
    pub fn on_remote<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value, Option<&str>) + Send + Sync + 'static,
    {
        self.dispatcher.on_remote(event, callback)
    }

    /// Subscribe to on-demand room creation.
    pub fn on_room_created<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&Room) + Send + Sync + 'static,
    {
        self.dispatcher.on_room_created(callback)
    }

    /// Subscribe to connection closes (the reason is passed).
    pub fn on_closed<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.dispatcher.on(LOCAL_CONNECTION_CLOSED, move |event| {
            if let Event::Closed(reason) = event {
                callback(reason);
            }
        })
    }

    /// Subscribe to transport and codec errors.
    pub fn on_error<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.dispatcher.on(LOCAL_CONNECTION_ERROR, move |event| {
            if let Event::Error(info) = event {
                callback(info);
            }
        })
    }

    /// Look up a room that has already received traffic.
    #[must_use]
    pub fn room(&self, name: &str) -> Option<Room> {
        self.dispatcher.rooms().get(name)
    }

    /// The room table.
    #[must_use]
    pub fn rooms(&self) -> &RoomRegistry {
        self.dispatcher.rooms()
    }

    /// Close the transport, fail pending calls and stop the engine.
    pub async fn shutdown(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("[Realtime] Engine task failed: {}", e);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// Cloneable call submitter.
#[derive(Debug, Clone)]
pub struct CallHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl CallHandle {
    /// Submit a call.
    ///
    /// The call is handed to the engine before this returns, so calls keep
    /// their issue order; the returned future only waits for the outcome.
    pub fn call(
        &self,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, SessionError>> + Send + 'static {
        let (responder, outcome) = oneshot::channel();
        let submitted = self
            .commands
            .send(Command::Call {
                method: method.to_string(),
                params,
                responder,
            })
            .is_ok();

        async move {
            if !submitted {
                return Err(SessionError::Closed);
            }
            outcome.await.unwrap_or(Err(SessionError::Closed))
        }
    }
}
