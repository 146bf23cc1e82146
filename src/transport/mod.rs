//! Transport session: the single backend connection.
//!
//! # Architecture
//!
//! ```text
//!   CompanionClient (one task)            connection task (tokio::spawn)
//!         │                                        │
//!         │  TransportSession::send(envelope)      │
//!         │ ── outbound frames (mpsc) ───────────► │ ── WsWriter ──► backend
//!         │                                        │
//!         │ ◄── TransportEvent (mpsc) ──────────── │ ◄── WsReader ── backend
//!         │  handle_event → on_message → dispatch  │
//!         ▼                                        │
//!   Subscription("data"), Subscription("item_database")
//! ```
//!
//! [`session::TransportSession`] is a sans-IO state machine: it decides
//! when sending is allowed, parses envelopes and routes payloads to
//! subscribers. [`connection`] owns the socket and the reconnect loop and
//! only reports what happened on the wire. Events are handled strictly in
//! the order the socket delivered them.

pub mod connection;
pub mod session;

use std::fmt;

pub use connection::{ConnectionEndpoint, ConnectionHandle, ReconnectPolicy, TransportEvent};
pub use session::{Subscription, TransportSession};

use crate::error::TransportError;
use crate::protocol::Command;

/// Connectivity of the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection attached yet.
    #[default]
    Disconnected,
    /// Handshake in progress or waiting to retry. `attempt` is 0 for the
    /// first connect and counts reconnection attempts afterwards.
    Connecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// Connected; sends are accepted.
    Open,
    /// Closed by the peer or torn down locally.
    Closed,
    /// Failed at the transport level.
    Errored(String),
}

impl ConnectionState {
    /// Returns `true` when sends are accepted.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting { attempt: 0 } => write!(f, "connecting"),
            Self::Connecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Errored(reason) => write!(f, "errored: {reason}"),
        }
    }
}

/// Anything that can carry a [`Command`] to the backend.
///
/// Stores issue commands through this seam so they never hold a
/// reference to the session itself.
pub trait CommandSink {
    /// Send one command.
    fn send_command(&mut self, command: Command) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
        assert_eq!(ConnectionState::Connecting { attempt: 0 }.to_string(), "connecting");
        assert_eq!(
            ConnectionState::Connecting { attempt: 3 }.to_string(),
            "reconnecting (attempt 3)"
        );
        assert_eq!(
            ConnectionState::Errored("reset".to_string()).to_string(),
            "errored: reset"
        );
    }

    #[test]
    fn test_only_open_is_open() {
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Closed.is_open());
        assert!(!ConnectionState::Connecting { attempt: 0 }.is_open());
        assert!(!ConnectionState::default().is_open());
    }
}
