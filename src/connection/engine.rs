//! The connection manager task.
//!
//! One tokio task owns the transport, the session credentials, the pending
//! call table and the outbox. Everything else talks to it through
//! [`Command`]s, so all protocol state is mutated from a single context.
//!
//! # Loop shape
//!
//! ```text
//! wait for Connect ──► open ──► run_connection ──► lost ──► delay ──┐
//!                       ▲                                           │
//!                       └───────────────────────────────────────────┘
//! ```
//!
//! The keepalive interval starts when the engine is spawned and ticks in
//! every phase. While not ready its calls are queued like any other (at
//! most one queued keepalive at a time) or skipped under `fail_fast`.

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::handshake::{answer_challenge, Handshake, SessionCredentials};
use super::state::{ConnectionState, SharedConnectionState};
use crate::codec::Codec;
use crate::config::{PendingPolicy, SessionConfig};
use crate::constants::{
    EVENT_LIVENESS_CHALLENGE, EVENT_PING, EVENT_SESSION_ASSIGNED, KEEPALIVE_RESULT,
};
use crate::correlator::{Correlator, Responder, Settlement};
use crate::dispatch::{DispatchBatch, Dispatcher};
use crate::error::SessionError;
use crate::protocol::{CallResult, EventMessage, Message, TypedMessage};
use crate::transport::{Connector, Transport, TransportEvent};

/// Request sent from session handles to the engine.
#[derive(Debug)]
pub(crate) enum Command {
    /// Start connecting (no-op once started).
    Connect,
    /// Issue a call.
    Call {
        method: String,
        params: Value,
        responder: Responder,
    },
    /// Close the transport and stop.
    Shutdown,
}

/// A registered call waiting to be written.
#[derive(Debug)]
struct Outgoing {
    id: String,
    message: Message,
    keepalive: bool,
}

/// Why a connection ended.
#[derive(Debug)]
enum ConnectionExit {
    Shutdown,
    Lost(Loss),
}

/// How a connection was lost.
#[derive(Debug)]
enum Loss {
    /// Transport or codec error; reported to `rt.error` listeners too.
    Error(String),
    /// Orderly close by the peer.
    Closed(String),
}

/// What woke the connected loop.
enum Wake {
    Transport(TransportEvent),
    Command(Option<Command>),
    Keepalive,
}

type Step = Result<(), ConnectionExit>;

pub(crate) struct Engine {
    config: SessionConfig,
    codec: Codec,
    connector: Arc<dyn Connector>,
    dispatcher: Dispatcher,
    correlator: Correlator,
    state: SharedConnectionState,
    commands: mpsc::UnboundedReceiver<Command>,
    session: Option<SessionCredentials>,
    outbox: VecDeque<Outgoing>,
    keepalive: Interval,
}

impl Engine {
    pub fn new(
        config: SessionConfig,
        codec: Codec,
        connector: Arc<dyn Connector>,
        dispatcher: Dispatcher,
        state: SharedConnectionState,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let period = config.keepalive_interval();
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            correlator: Correlator::new(config.role.clone()),
            config,
            codec,
            connector,
            dispatcher,
            state,
            commands,
            session: None,
            outbox: VecDeque::new(),
            keepalive,
        }
    }

    pub async fn run(mut self) {
        if self.wait_for_start().await {
            self.connection_loop().await;
        }
        self.finish();
    }

    /// Idle until the first `Connect`. Returns `false` on shutdown.
    async fn wait_for_start(&mut self) -> bool {
        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Connect) => return true,
                    Some(Command::Call { method, params, responder }) => {
                        self.admit(&method, params, Some(responder), false);
                    }
                    Some(Command::Shutdown) | None => return false,
                },
                _ = self.keepalive.tick() => self.admit_keepalive(),
            }
        }
    }

    async fn connection_loop(&mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            log::info!("[Realtime] Connecting to {}", self.config.url);

            let exit = match self.connector.open(&self.config.url).await {
                Ok(transport) => {
                    log::info!("[Realtime] Transport open");
                    self.run_connection(transport).await
                }
                Err(e) => ConnectionExit::Lost(Loss::Error(e.to_string())),
            };

            let loss = match exit {
                ConnectionExit::Shutdown => return,
                ConnectionExit::Lost(loss) => loss,
            };
            self.connection_lost(&loss);

            if !self.wait_reconnect_delay().await {
                return;
            }
        }
    }

    /// Drive one open transport until it is lost or shutdown is requested.
    async fn run_connection(&mut self, mut transport: Box<dyn Transport>) -> ConnectionExit {
        let exit = match self.serve(transport.as_mut()).await {
            Ok(()) => ConnectionExit::Shutdown,
            Err(exit) => exit,
        };
        if matches!(exit, ConnectionExit::Shutdown) {
            self.set_state(ConnectionState::Closing);
        }
        transport.close().await;
        exit
    }

    async fn serve(&mut self, transport: &mut dyn Transport) -> Step {
        self.set_state(ConnectionState::AwaitingHandshake);

        let mut handshake = Handshake::new(self.session.is_some());
        let hello = match &self.session {
            Some(session) => {
                log::info!("[Realtime] Resuming session {}", session.id);
                Message::session_resume(session.id.clone(), session.secret.clone())
            }
            None => Message::session_new(),
        };
        self.send(transport, &hello).await?;
        self.send(transport, &Message::role(self.config.role.clone()))
            .await?;

        loop {
            let wake = tokio::select! {
                event = transport.next_event() => Wake::Transport(event),
                cmd = self.commands.recv() => Wake::Command(cmd),
                _ = self.keepalive.tick() => Wake::Keepalive,
            };

            match wake {
                Wake::Transport(TransportEvent::Message(frame)) => match self.codec.decode(frame) {
                    Ok(message) => self.on_message(transport, &mut handshake, message).await?,
                    Err(e) if !e.is_fatal() => log::debug!("[Realtime] Dropping frame: {}", e),
                    Err(e) => return Err(ConnectionExit::Lost(Loss::Error(e.to_string()))),
                },
                Wake::Transport(TransportEvent::Error(info)) => {
                    return Err(ConnectionExit::Lost(Loss::Error(info)));
                }
                Wake::Transport(TransportEvent::Closed(reason)) => {
                    return Err(ConnectionExit::Lost(Loss::Closed(reason)));
                }
                Wake::Command(Some(Command::Call {
                    method,
                    params,
                    responder,
                })) => {
                    if let Some(out) = self.admit(&method, params, Some(responder), false) {
                        self.transmit(transport, out).await?;
                    }
                }
                Wake::Command(Some(Command::Connect)) => {}
                Wake::Command(Some(Command::Shutdown) | None) => return Ok(()),
                Wake::Keepalive => {
                    if let Some(out) = self.keepalive_call() {
                        self.transmit(transport, out).await?;
                    }
                }
            }
        }
    }

    /// Classify one decoded inbound message.
    async fn on_message(
        &mut self,
        transport: &mut dyn Transport,
        handshake: &mut Handshake,
        message: Message,
    ) -> Step {
        match message {
            Message::Typed(TypedMessage::Event(event)) => {
                self.on_event(transport, handshake, event).await
            }
            Message::Typed(TypedMessage::CallResult(result)) => {
                self.on_call_result(result);
                Ok(())
            }
            other => {
                log::debug!("[Realtime] Ignoring unexpected inbound '{}'", other.kind());
                Ok(())
            }
        }
    }

    async fn on_event(
        &mut self,
        transport: &mut dyn Transport,
        handshake: &mut Handshake,
        event: EventMessage,
    ) -> Step {
        if event.event == EVENT_PING {
            log::trace!("[Realtime] <- event '{}'", event.event);
        } else {
            log::debug!("[Realtime] <- event '{}'", event.event);
        }

        let mut completed = false;
        match event.event.as_str() {
            EVENT_SESSION_ASSIGNED => match SessionCredentials::from_payload(&event.payload) {
                Some(credentials) => {
                    log::info!("[Realtime] Session assigned: {}", credentials.id);
                    self.session = Some(credentials);
                    completed = handshake.session_assigned();
                }
                None => log::warn!("[Realtime] Malformed session assignment: {}", event.payload),
            },
            EVENT_LIVENESS_CHALLENGE => match answer_challenge(&event.payload) {
                Some(answer) => {
                    self.send(transport, &Message::ChallengeAnswer { answer })
                        .await?;
                    completed = handshake.challenge_answered();
                }
                None => log::warn!("[Realtime] Non-numeric challenge ignored: {}", event.payload),
            },
            _ => {}
        }

        let batch = self.dispatcher.route_event(event);

        let flushed = if completed {
            log::info!("[Realtime] Handshake complete, connection ready");
            self.set_state(ConnectionState::Ready);
            self.flush_outbox(transport).await
        } else {
            Ok(())
        };

        batch.run();
        flushed
    }

    fn on_call_result(&mut self, result: CallResult) {
        let id = result.id.clone();
        let quiet = result.result.as_ref().and_then(Value::as_str) == Some(KEEPALIVE_RESULT);
        match self.correlator.settle(result) {
            Settlement::Resolved if quiet => log::trace!("[Realtime] <- result {}", id),
            Settlement::Resolved => log::debug!("[Realtime] <- result {}", id),
            Settlement::Rejected => log::debug!("[Realtime] <- error result {}", id),
            Settlement::Stale => log::debug!("[Realtime] Stale result {} ignored", id),
        }
    }

    /// Register a call. Returns it if it can be written now; otherwise it is
    /// queued (or rejected under `fail_fast`).
    fn admit(
        &mut self,
        method: &str,
        params: Value,
        responder: Option<Responder>,
        keepalive: bool,
    ) -> Option<Outgoing> {
        let ready = self.state.borrow().is_ready();
        if !ready && self.config.pending_policy == PendingPolicy::FailFast {
            if let Some(responder) = responder {
                let _ = responder.send(Err(SessionError::HandshakeIncomplete));
            }
            return None;
        }

        let (id, message) = self.correlator.issue(method, params, responder);
        let out = Outgoing {
            id,
            message,
            keepalive,
        };
        if ready {
            Some(out)
        } else {
            log::debug!("[Realtime] Queued call {} until ready", out.id);
            self.outbox.push_back(out);
            None
        }
    }

    /// Keepalive tick while a transport may be writable.
    fn keepalive_call(&mut self) -> Option<Outgoing> {
        if !self.state.borrow().is_ready() {
            self.admit_keepalive();
            return None;
        }
        let method = self.config.keepalive_method.clone();
        self.admit(&method, Value::Object(Map::new()), None, true)
    }

    /// Keepalive tick while nothing can be written: queue at most one.
    fn admit_keepalive(&mut self) {
        if self.config.pending_policy == PendingPolicy::FailFast {
            log::trace!("[Realtime] Keepalive skipped, not ready");
            return;
        }
        if self.outbox.iter().any(|out| out.keepalive) {
            return;
        }
        let method = self.config.keepalive_method.clone();
        let _ = self.admit(&method, Value::Object(Map::new()), None, true);
    }

    async fn flush_outbox(&mut self, transport: &mut dyn Transport) -> Step {
        if !self.outbox.is_empty() {
            log::debug!("[Realtime] Flushing {} queued call(s)", self.outbox.len());
        }
        while let Some(out) = self.outbox.pop_front() {
            self.transmit(transport, out).await?;
        }
        Ok(())
    }

    /// Write a registered call. On transport failure it goes back to the
    /// front of the outbox and the connection is lost.
    async fn transmit(&mut self, transport: &mut dyn Transport, out: Outgoing) -> Step {
        let frame = match self.codec.encode(&out.message) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("[Realtime] Failed to encode call {}: {}", out.id, e);
                self.correlator.reject(&out.id, e.into());
                return Ok(());
            }
        };

        if out.keepalive {
            log::trace!("[Realtime] -> keepalive {}", out.id);
        } else {
            log::debug!("[Realtime] -> call {}", out.id);
        }

        match transport.send(frame).await {
            Ok(()) => {
                self.correlator.mark_dispatched(&out.id);
                Ok(())
            }
            Err(e) => {
                self.outbox.push_front(out);
                Err(ConnectionExit::Lost(Loss::Error(e.to_string())))
            }
        }
    }

    /// Encode and write a protocol (non-call) message.
    async fn send(&self, transport: &mut dyn Transport, message: &Message) -> Step {
        log::debug!("[Realtime] -> {}", message.kind());
        let frame = self
            .codec
            .encode(message)
            .map_err(|e| ConnectionExit::Lost(Loss::Error(e.to_string())))?;
        transport
            .send(frame)
            .await
            .map_err(|e| ConnectionExit::Lost(Loss::Error(e.to_string())))
    }

    fn connection_lost(&mut self, loss: &Loss) {
        let mut batch = DispatchBatch::default();
        let reason = match loss {
            Loss::Error(info) => {
                log::warn!("[Realtime] Connection error: {}", info);
                batch.append(self.dispatcher.connection_error(info));
                info
            }
            Loss::Closed(reason) => {
                log::info!("[Realtime] Connection closed: {}", reason);
                reason
            }
        };
        batch.append(self.dispatcher.connection_closed(reason));

        if self.config.reset_pending_on_disconnect {
            let orphaned = self.correlator.reset_dispatched();
            if orphaned > 0 {
                log::info!("[Realtime] Reset {} in-flight call(s)", orphaned);
            }
        }

        self.set_state(ConnectionState::Disconnected);
        batch.run();
    }

    /// Sit out the reconnect delay, still serving commands and keepalive.
    /// Returns `false` on shutdown.
    async fn wait_reconnect_delay(&mut self) -> bool {
        let delay = self.config.reconnect_delay();
        log::info!("[Realtime] Reconnecting in {}s", delay.as_secs());

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                () = &mut sleep => return true,
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Call { method, params, responder }) => {
                        self.admit(&method, params, Some(responder), false);
                    }
                    Some(Command::Connect) => {}
                    Some(Command::Shutdown) | None => return false,
                },
                _ = self.keepalive.tick() => self.admit_keepalive(),
            }
        }
    }

    fn finish(&mut self) {
        self.set_state(ConnectionState::Closing);
        self.outbox.clear();
        let failed = self.correlator.fail_all();

        self.commands.close();
        while let Ok(cmd) = self.commands.try_recv() {
            if let Command::Call { responder, .. } = cmd {
                let _ = responder.send(Err(SessionError::Closed));
            }
        }

        log::info!("[Realtime] Session closed ({} pending call(s) failed)", failed);
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            log::debug!("[Realtime] State {} -> {}", current, state);
            *current = state;
            true
        });
    }
}
