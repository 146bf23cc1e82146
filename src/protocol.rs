//! Wire contract shared with the backend.
//!
//! Every frame in either direction is a JSON object
//! `{"type": <string>, "payload": <JSON>}`. Payloads are structured JSON
//! values; a payload that arrives as a JSON document wrapped in a string is
//! refused instead of being decoded twice.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::roster::BotConfig;

/// Envelope type names.
pub mod types {
    /// Client → server: request roster and session metadata.
    pub const GET_DATA: &str = "get_data";
    /// Client → server: request the full item catalog.
    pub const GET_ITEM_DATABASE: &str = "get_item_database";
    /// Client → server: register a bot.
    pub const ADD_BOT: &str = "add_bot";
    /// Server → client: full roster snapshot.
    pub const DATA: &str = "data";
    /// Server → client: catalog snapshot.
    pub const ITEM_DATABASE: &str = "item_database";
}

/// The `{type, payload}` wrapper used for every message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Message body, `null` when the type carries none.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Build an envelope.
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Parse one text frame.
    ///
    /// The frame must be a JSON object with a string `type`; a missing
    /// `payload` becomes `null`.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))?;

        let Value::Object(mut fields) = value else {
            return Err(ProtocolError::MalformedEnvelope(
                "frame is not a JSON object".to_string(),
            ));
        };

        let kind = match fields.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => return Err(ProtocolError::MissingType),
        };
        let payload = fields.remove("payload").unwrap_or(Value::Null);

        Ok(Self { kind, payload })
    }

    /// Serialize to a text frame.
    #[must_use]
    pub fn to_text(&self) -> String {
        serde_json::json!({ "type": self.kind, "payload": self.payload }).to_string()
    }
}

/// Decode the payload of a known event type into `T`.
///
/// String payloads are rejected up front so that a double-encoded body
/// surfaces as [`ProtocolError::EncodedPayload`] instead of a confusing
/// schema error.
pub fn decode_payload<T: DeserializeOwned>(
    event_type: &str,
    payload: Value,
) -> Result<T, ProtocolError> {
    if payload.is_string() {
        return Err(ProtocolError::EncodedPayload {
            event_type: event_type.to_string(),
        });
    }
    serde_json::from_value(payload).map_err(|e| ProtocolError::InvalidPayload {
        event_type: event_type.to_string(),
        reason: e.to_string(),
    })
}

/// Commands the client sends.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Ask for roster and session metadata.
    GetData,
    /// Ask for the full item catalog.
    GetItemDatabase,
    /// Register a bot account.
    AddBot(BotConfig),
}

impl Command {
    /// Envelope type of this command.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GetData => types::GET_DATA,
            Self::GetItemDatabase => types::GET_ITEM_DATABASE,
            Self::AddBot(_) => types::ADD_BOT,
        }
    }

    /// Wrap the command for the wire.
    #[must_use]
    pub fn into_envelope(self) -> Envelope {
        let kind = self.kind();
        let payload = match self {
            Self::GetData | Self::GetItemDatabase => Value::Null,
            Self::AddBot(config) => serde_json::json!({
                "username": config.username,
                "password": config.password,
                "token": config.token,
                "loginMethod": config.login_method,
            }),
        };
        Envelope::new(kind, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::LoginMethod;

    #[test]
    fn test_parse_envelope() {
        let env = Envelope::parse(r#"{"type":"data","payload":{"bots":[]}}"#)
            .expect("valid envelope");
        assert_eq!(env.kind, "data");
        assert_eq!(env.payload, serde_json::json!({ "bots": [] }));
    }

    #[test]
    fn test_parse_envelope_without_payload() {
        let env = Envelope::parse(r#"{"type":"ping"}"#).expect("valid envelope");
        assert_eq!(env.kind, "ping");
        assert!(env.payload.is_null());
    }

    #[test]
    fn test_parse_rejects_missing_type() {
        assert_eq!(
            Envelope::parse(r#"{"payload":{}}"#),
            Err(ProtocolError::MissingType)
        );
        assert_eq!(
            Envelope::parse(r#"{"type":5,"payload":{}}"#),
            Err(ProtocolError::MissingType)
        );
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(matches!(
            Envelope::parse("get_data"),
            Err(ProtocolError::MalformedEnvelope(_))
        ));
        assert!(matches!(
            Envelope::parse("[1,2]"),
            Err(ProtocolError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_decode_payload_rejects_encoded_string() {
        let payload = Value::String(r#"{"bots":[]}"#.to_string());
        let err = decode_payload::<Value>("data", payload).expect_err("string payload");
        assert_eq!(
            err,
            ProtocolError::EncodedPayload {
                event_type: "data".to_string()
            }
        );
    }

    #[test]
    fn test_command_envelopes() {
        let env = Command::GetItemDatabase.into_envelope();
        assert_eq!(env.kind, "get_item_database");
        assert!(env.payload.is_null());
        let wire: Value = serde_json::from_str(&env.to_text()).expect("valid json");
        assert_eq!(
            wire,
            serde_json::json!({ "type": "get_item_database", "payload": null })
        );

        let env = Command::AddBot(BotConfig {
            username: "cloei".to_string(),
            password: "123123".to_string(),
            token: "adnudiiem".to_string(),
            login_method: LoginMethod::Google,
        })
        .into_envelope();
        assert_eq!(env.kind, "add_bot");
        assert_eq!(
            env.payload,
            serde_json::json!({
                "username": "cloei",
                "password": "123123",
                "token": "adnudiiem",
                "loginMethod": "GOOGLE",
            })
        );
    }
}
