//! Sans-IO session state machine.
//!
//! The session never touches the socket. It is fed [`TransportEvent`]s by
//! its owner, keeps the observable [`ConnectionState`], parses inbound
//! frames into [`Envelope`]s and routes payloads to [`Subscription`]s by
//! envelope type. Outbound envelopes are queued on the attached
//! [`ConnectionHandle`].

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::{mpsc, watch};

use super::{CommandSink, ConnectionHandle, ConnectionState, TransportEvent};
use crate::diagnostics::Diagnostics;
use crate::error::{ProtocolError, TransportError};
use crate::protocol::{Command, Envelope};

/// Receiving end for one envelope type.
///
/// Yields payloads in the order the socket delivered them. Once the
/// session is closed the channel ends.
pub struct Subscription {
    event_type: String,
    rx: mpsc::UnboundedReceiver<Value>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event_type", &self.event_type)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Envelope type this subscription receives.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Try to receive the next payload (non-blocking).
    ///
    /// Returns `None` if no payloads are pending.
    pub fn try_recv(&mut self) -> Option<Value> {
        self.rx.try_recv().ok()
    }

    /// Wait for the next payload. `None` once the session is closed.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}

/// The client's view of its single backend connection.
#[derive(Debug)]
pub struct TransportSession {
    state: watch::Sender<ConnectionState>,
    connection: Option<ConnectionHandle>,
    subscriptions: HashMap<String, Vec<mpsc::UnboundedSender<Value>>>,
    diagnostics: Diagnostics,
    torn_down: bool,
}

impl Default for TransportSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportSession {
    /// A session with no connection, in [`ConnectionState::Disconnected`].
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            connection: None,
            subscriptions: HashMap::new(),
            diagnostics: Diagnostics::new(),
            torn_down: false,
        }
    }

    /// Attach a connection and move to `Connecting`.
    pub fn attach(&mut self, connection: ConnectionHandle) {
        if self.torn_down {
            log::debug!("[Transport] Ignoring attach on a closed session");
            return;
        }
        self.connection = Some(connection);
        self.set_state(ConnectionState::Connecting { attempt: 0 });
    }

    /// Current connectivity.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Observe connectivity changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Register interest in one envelope type.
    pub fn subscribe(&mut self, event_type: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions
            .entry(event_type.to_string())
            .or_default()
            .push(tx);
        Subscription {
            event_type: event_type.to_string(),
            rx,
        }
    }

    /// Queue an envelope for the backend.
    ///
    /// Only allowed while `Open`.
    pub fn send(&mut self, envelope: Envelope) -> Result<(), TransportError> {
        let state = self.state();
        if !state.is_open() {
            return Err(TransportError::NotOpen {
                state,
                command: envelope.kind,
            });
        }
        let Some(connection) = &self.connection else {
            return Err(TransportError::ConnectionLost);
        };

        log::debug!("[Transport] -> {}", envelope.kind);
        if let Err(e) = connection.send(envelope.to_text()) {
            self.diagnostics.report(e.clone());
            return Err(e);
        }
        Ok(())
    }

    /// Handle one raw text frame.
    ///
    /// Malformed frames are dropped and reported; nothing is returned to
    /// the caller.
    pub fn on_message(&mut self, raw: &str) {
        match Envelope::parse(raw) {
            Ok(envelope) => {
                self.dispatch(&envelope.kind, envelope.payload);
            }
            Err(e) => self.diagnostics.report(e),
        }
    }

    /// Deliver `payload` to every subscriber of `event_type`.
    ///
    /// Returns the number of subscribers reached. Closed subscribers are
    /// pruned.
    pub fn dispatch(&mut self, event_type: &str, payload: Value) -> usize {
        let Some(senders) = self.subscriptions.get_mut(event_type) else {
            log::trace!("[Transport] Ignoring '{}' (no subscribers)", event_type);
            return 0;
        };

        senders.retain(|tx| !tx.is_closed());
        let delivered = match senders.split_last() {
            None => 0,
            Some((last, rest)) => {
                let mut delivered = 0;
                for tx in rest {
                    if tx.send(payload.clone()).is_ok() {
                        delivered += 1;
                    }
                }
                if last.send(payload).is_ok() {
                    delivered += 1;
                }
                delivered
            }
        };

        if senders.is_empty() {
            self.subscriptions.remove(event_type);
        }
        log::trace!("[Transport] <- {} ({} subscriber(s))", event_type, delivered);
        delivered
    }

    /// Apply one event from the connection task.
    ///
    /// Returns the new state when the event changed it.
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<ConnectionState> {
        if self.torn_down {
            return None;
        }

        match event {
            TransportEvent::Connecting { attempt, .. } => {
                self.transition(ConnectionState::Connecting { attempt })
            }
            TransportEvent::Open => {
                let changed = self.transition(ConnectionState::Open);
                if let Err(e) = self.send(Command::GetData.into_envelope()) {
                    log::warn!("[Transport] Initial get_data failed: {}", e);
                }
                changed
            }
            TransportEvent::Message(raw) => {
                self.on_message(&raw);
                None
            }
            TransportEvent::Unexpected(kind) => {
                self.diagnostics.report(ProtocolError::UnexpectedFrame(kind));
                None
            }
            TransportEvent::Closed { code, reason } => {
                log::info!("[Transport] Closed ({}): {}", code, reason);
                self.transition(ConnectionState::Closed)
            }
            TransportEvent::Error(reason) => {
                self.diagnostics
                    .report(TransportError::Socket(reason.clone()));
                self.transition(ConnectionState::Errored(reason))
            }
            TransportEvent::GaveUp { attempts } => self.transition(ConnectionState::Errored(
                format!("gave up after {attempts} reconnection attempt(s)"),
            )),
        }
    }

    /// Tear the session down. Idempotent and terminal.
    ///
    /// Releases the connection, ends every subscription and moves to
    /// `Closed`. Later transport events are ignored.
    pub fn close(&mut self) {
        if !self.torn_down {
            log::info!("[Transport] Closing session");
        }
        self.torn_down = true;
        self.connection = None;
        self.subscriptions.clear();
        self.set_state(ConnectionState::Closed);
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.torn_down
    }

    /// Recovered errors seen by this session.
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Mutable access for sibling components that report through the
    /// same sink.
    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    fn transition(&mut self, next: ConnectionState) -> Option<ConnectionState> {
        if *self.state.borrow() == next {
            return None;
        }
        log::info!("[Transport] {} -> {}", *self.state.borrow(), next);
        self.set_state(next.clone());
        Some(next)
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_replace(next);
    }
}

impl CommandSink for TransportSession {
    fn send_command(&mut self, command: Command) -> Result<(), TransportError> {
        self.send(command.into_envelope())
    }
}
