//! Error taxonomy for the client core.
//!
//! Transport and protocol errors are recovered locally (reported to
//! [`Diagnostics`](crate::diagnostics::Diagnostics), offending message
//! dropped). Validation errors go back to the caller. [`NotFound`] is an
//! ordinary lookup result.

use std::fmt;

use crate::transport::ConnectionState;

/// Failure to move a frame over the connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// A send was attempted while the connection was not open.
    #[error("connection is {state}, cannot send '{command}'")]
    NotOpen {
        /// State at the time of the send.
        state: ConnectionState,
        /// Envelope type that was refused.
        command: String,
    },
    /// The connection task is gone.
    #[error("connection task has stopped")]
    ConnectionLost,
    /// The WebSocket handshake failed.
    #[error("connect failed: {0}")]
    Connect(String),
    /// The socket failed or closed unexpectedly.
    #[error("socket error: {0}")]
    Socket(String),
}

/// A message from the backend that does not follow the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is not a JSON object.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    /// The envelope has no string `type`.
    #[error("envelope has no 'type' field")]
    MissingType,
    /// The payload is a JSON document encoded inside a string.
    #[error("payload of '{event_type}' is a JSON-encoded string, expected a JSON value")]
    EncodedPayload {
        /// Envelope type.
        event_type: String,
    },
    /// The payload does not match the schema for its type.
    #[error("invalid '{event_type}' payload: {reason}")]
    InvalidPayload {
        /// Envelope type.
        event_type: String,
        /// Decoder message.
        reason: String,
    },
    /// A non-text frame arrived.
    #[error("unexpected {0} frame")]
    UnexpectedFrame(&'static str),
    /// A catalog record's `id` disagrees with the key it was sent under.
    #[error("catalog item keyed {key} carries id {id}")]
    ItemIdMismatch {
        /// Map key the record is indexed by.
        key: u32,
        /// The record's own `id`.
        id: u32,
    },
}

/// A required bot form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BotField {
    /// Account name.
    Username,
    /// Account password.
    Password,
    /// Session token.
    Token,
    /// Login method.
    LoginMethod,
}

impl BotField {
    /// Wire name of the field.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Password => "password",
            Self::Token => "token",
            Self::LoginMethod => "loginMethod",
        }
    }
}

impl fmt::Display for BotField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The bot form is missing one or more required fields.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing required field(s): {}", join_fields(.missing))]
pub struct ValidationError {
    /// Every missing field, in form order.
    pub missing: Vec<BotField>,
}

fn join_fields(fields: &[BotField]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// No catalog entry has the requested id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("item {id} not found")]
pub struct NotFound {
    /// The requested id.
    pub id: u32,
}

/// Any error produced by the client core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// See [`TransportError`].
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// See [`ProtocolError`].
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// See [`ValidationError`].
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// See [`NotFound`].
    #[error(transparent)]
    NotFound(#[from] NotFound),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_names_fields() {
        let err = ValidationError {
            missing: vec![BotField::Password, BotField::LoginMethod],
        };
        assert_eq!(
            err.to_string(),
            "missing required field(s): password, loginMethod"
        );
    }

    #[test]
    fn test_not_open_message() {
        let err = TransportError::NotOpen {
            state: ConnectionState::Connecting { attempt: 0 },
            command: "get_data".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "connection is connecting, cannot send 'get_data'"
        );
    }

    #[test]
    fn test_umbrella_from() {
        let err: Error = NotFound { id: 7 }.into();
        assert_eq!(err.to_string(), "item 7 not found");
        assert!(matches!(err, Error::NotFound(NotFound { id: 7 })));
    }
}
