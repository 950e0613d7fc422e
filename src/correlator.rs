//! Call correlation.
//!
//! Every outbound call gets an id that is unique among the calls still
//! outstanding. The [`Correlator`] keeps one [`PendingCall`] per id and
//! settles it exactly once when the matching `call.result` arrives; a result
//! for an unknown id is stale and ignored.
//!
//! There is no timeout. A call without a response stays pending until the
//! connection drops (see [`Correlator::reset_dispatched`]) or the session
//! shuts down.

use std::collections::HashMap;

use rand::Rng;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::SessionError;
use crate::protocol::{CallResult, Message};

/// Where a call's outcome is delivered.
pub type Responder = oneshot::Sender<Result<Value, SessionError>>;

/// An outstanding call.
#[derive(Debug)]
pub struct PendingCall {
    /// Namespaced method, for logging.
    pub method: String,
    /// Whether the call frame has been written to a transport.
    pub dispatched: bool,
    /// `None` for fire-and-forget calls (keepalive).
    responder: Option<Responder>,
}

impl PendingCall {
    fn settle(self, outcome: Result<Value, SessionError>) {
        if let Some(responder) = self.responder {
            // The caller may have stopped waiting.
            let _ = responder.send(outcome);
        }
    }
}

/// Result of matching an inbound `call.result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The call succeeded and was resolved.
    Resolved,
    /// The call failed and was rejected.
    Rejected,
    /// No outstanding call has this id (late or duplicate response).
    Stale,
}

/// Table of outstanding calls keyed by correlation id.
#[derive(Debug)]
pub struct Correlator {
    namespace: String,
    pending: HashMap<String, PendingCall>,
    seq: u64,
}

impl Correlator {
    /// Correlator that prefixes every method with `namespace.`.
    #[must_use]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pending: HashMap::new(),
            seq: 0,
        }
    }

    /// Register a call and build its wire record.
    ///
    /// Returns the correlation id and the message to send.
    pub fn issue(
        &mut self,
        method: &str,
        params: Value,
        responder: Option<Responder>,
    ) -> (String, Message) {
        let id = self.next_id();
        let method = format!("{}.{}", self.namespace, method);
        let message = Message::call(method.clone(), params, id.clone());
        self.pending.insert(
            id.clone(),
            PendingCall {
                method,
                dispatched: false,
                responder,
            },
        );
        (id, message)
    }

    /// Record that the call frame for `id` was written.
    pub fn mark_dispatched(&mut self, id: &str) {
        if let Some(call) = self.pending.get_mut(id) {
            call.dispatched = true;
        }
    }

    /// Match an inbound result against the table.
    pub fn settle(&mut self, result: CallResult) -> Settlement {
        let CallResult {
            id,
            success,
            result,
            error,
        } = result;

        if success {
            if self.resolve(&id, result.unwrap_or(Value::Null)) {
                Settlement::Resolved
            } else {
                Settlement::Stale
            }
        } else if self.reject(&id, SessionError::Remote(error.unwrap_or(Value::Null))) {
            Settlement::Rejected
        } else {
            Settlement::Stale
        }
    }

    /// Fulfil call `id`. Returns `false` if it is not outstanding.
    pub fn resolve(&mut self, id: &str, result: Value) -> bool {
        match self.pending.remove(id) {
            Some(call) => {
                call.settle(Ok(result));
                true
            }
            None => false,
        }
    }

    /// Reject call `id`. Returns `false` if it is not outstanding.
    pub fn reject(&mut self, id: &str, error: SessionError) -> bool {
        match self.pending.remove(id) {
            Some(call) => {
                call.settle(Err(error));
                true
            }
            None => false,
        }
    }

    /// Reject every call that was written to the lost connection with
    /// [`SessionError::ConnectionReset`]. Calls that were never sent stay.
    ///
    /// Returns how many were rejected.
    pub fn reset_dispatched(&mut self) -> usize {
        let orphaned: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, call)| call.dispatched)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &orphaned {
            self.reject(id, SessionError::ConnectionReset);
        }
        orphaned.len()
    }

    /// Reject everything with [`SessionError::Closed`].
    pub fn fail_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, call) in self.pending.drain() {
            call.settle(Err(SessionError::Closed));
        }
        count
    }

    /// Whether `id` is outstanding.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Number of outstanding calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no call is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// `cb<millis>-<seq>-<rand>`, regenerated on the (unlikely) collision.
    fn next_id(&mut self) -> String {
        let mut rng = rand::rng();
        loop {
            self.seq = self.seq.wrapping_add(1);
            let id = format!(
                "cb{}-{}-{}",
                chrono::Utc::now().timestamp_millis(),
                self.seq,
                rng.random_range(0..100_000u32)
            );
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }
}
