//! Bot roster store.
//!
//! Holds the bots reported by the backend and the current selection. The
//! roster is an immutable snapshot replaced wholesale on every `data`
//! event; new bots are registered by composing an `add_bot` command from
//! a validated [`BotForm`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{BotField, ValidationError};
use crate::protocol::Command;
use crate::transport::CommandSink;

/// How a bot authenticates with the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LoginMethod {
    /// Username and password.
    #[default]
    Legacy,
    /// Google account.
    Google,
    /// Apple account.
    Apple,
    /// Ubisoft Connect account.
    Ubisoft,
}

impl LoginMethod {
    /// All methods, in the order the add-bot form lists them.
    pub const ALL: [Self; 4] = [Self::Legacy, Self::Google, Self::Apple, Self::Ubisoft];

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "LEGACY",
            Self::Google => "GOOGLE",
            Self::Apple => "APPLE",
            Self::Ubisoft => "UBISOFT",
        }
    }

    /// Numeric code used by the legacy form (`3` legacy .. `0` Ubisoft).
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Legacy => 3,
            Self::Google => 2,
            Self::Apple => 1,
            Self::Ubisoft => 0,
        }
    }

    /// Inverse of [`code`](Self::code).
    #[must_use]
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            3 => Some(Self::Legacy),
            2 => Some(Self::Google),
            1 => Some(Self::Apple),
            0 => Some(Self::Ubisoft),
            _ => None,
        }
    }
}

impl fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoginMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u64>() {
            return Self::from_code(code).ok_or_else(|| format!("unknown login method code: {code}"));
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "google" => Ok(Self::Google),
            "apple" => Ok(Self::Apple),
            "ubisoft" | "ubisoft connect" | "ubisoft_connect" => Ok(Self::Ubisoft),
            other => Err(format!(
                "unknown login method '{other}' (expected legacy, google, apple or ubisoft)"
            )),
        }
    }
}

impl<'de> Deserialize<'de> for LoginMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Code(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Name(name) => name.parse().map_err(serde::de::Error::custom),
            Raw::Code(code) => Self::from_code(code)
                .ok_or_else(|| serde::de::Error::custom(format!("unknown login method code: {code}"))),
        }
    }
}

/// A validated add-bot request. All four fields are non-empty.
#[derive(Clone, PartialEq, Eq)]
pub struct BotConfig {
    /// Account name.
    pub username: String,
    /// Account password.
    pub password: String,
    /// Session token.
    pub token: String,
    /// How to log in.
    pub login_method: LoginMethod,
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("token", &"[REDACTED]")
            .field("login_method", &self.login_method)
            .finish()
    }
}

/// Snapshot of the add-bot form taken at submit time.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BotForm {
    /// Account name as typed.
    pub username: String,
    /// Password as typed.
    pub password: String,
    /// Token as typed.
    pub token: String,
    /// Selected login method, `None` when nothing was chosen.
    pub login_method: Option<LoginMethod>,
}

impl fmt::Debug for BotForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotForm")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("token", &"[REDACTED]")
            .field("login_method", &self.login_method)
            .finish()
    }
}

impl BotForm {
    /// Check every field and build the config.
    ///
    /// Text fields count as missing when blank after trimming. On success
    /// the values are carried over exactly as typed.
    pub fn validate(&self) -> Result<BotConfig, ValidationError> {
        let mut missing = Vec::new();
        if self.username.trim().is_empty() {
            missing.push(BotField::Username);
        }
        if self.password.trim().is_empty() {
            missing.push(BotField::Password);
        }
        if self.token.trim().is_empty() {
            missing.push(BotField::Token);
        }
        let Some(login_method) = self.login_method else {
            missing.push(BotField::LoginMethod);
            return Err(ValidationError { missing });
        };
        if !missing.is_empty() {
            return Err(ValidationError { missing });
        }

        Ok(BotConfig {
            username: self.username.clone(),
            password: self.password.clone(),
            token: self.token.clone(),
            login_method,
        })
    }
}

/// One bot as reported by the backend. Identity is `username`.
#[derive(Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bot {
    /// Account name.
    pub username: String,
    /// How the bot logs in.
    #[serde(default)]
    pub login_method: LoginMethod,
    /// Account password, when the backend echoes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Session token, when the backend echoes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Connection status text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// World the bot is in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub world: Option<String>,
    /// Gem balance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gems: Option<i64>,
    /// Latency to the game server in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping: Option<u32>,
    /// Any further fields, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl fmt::Debug for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bot")
            .field("username", &self.username)
            .field("login_method", &self.login_method)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("status", &self.status)
            .field("world", &self.world)
            .field("gems", &self.gems)
            .field("ping", &self.ping)
            .field("extra", &self.extra)
            .finish()
    }
}

/// Game session metadata sent alongside the roster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Game client version the backend speaks.
    #[serde(default)]
    pub game_version: Option<String>,
    /// Game protocol number.
    #[serde(default)]
    pub protocol: Option<u32>,
}

/// Payload of a `data` event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSnapshot {
    /// Session metadata.
    #[serde(flatten)]
    pub session: SessionInfo,
    /// Every configured bot.
    #[serde(default)]
    pub bots: Vec<Bot>,
}

/// Whether a composed command reached the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the backend.
    Sent,
    /// The connection refused it; the reason was logged.
    Dropped(crate::error::TransportError),
}

/// Validate `form` and emit exactly one `add_bot` command through `sink`.
///
/// A form with missing fields emits nothing and returns the
/// [`ValidationError`] naming them. A valid command that the connection
/// refuses is reported as [`Delivery::Dropped`].
pub fn compose_add_bot_command(
    form: &BotForm,
    sink: &mut impl CommandSink,
) -> Result<Delivery, ValidationError> {
    let config = form.validate()?;
    let username = config.username.clone();

    match sink.send_command(Command::AddBot(config)) {
        Ok(()) => {
            log::info!("[Roster] Requested add_bot for '{}'", username);
            Ok(Delivery::Sent)
        }
        Err(e) => {
            log::warn!("[Roster] add_bot for '{}' not sent: {}", username, e);
            Ok(Delivery::Dropped(e))
        }
    }
}

/// The current roster and selection.
#[derive(Debug, Default)]
pub struct RosterStore {
    bots: Vec<Bot>,
    session: SessionInfo,
    selected: Option<String>,
    received: bool,
}

impl RosterStore {
    /// An empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the roster with `snapshot`.
    ///
    /// The selection survives only if its username is still present.
    pub fn replace_roster(&mut self, snapshot: RosterSnapshot) {
        let RosterSnapshot { session, bots } = snapshot;

        if let Some(selected) = &self.selected {
            if !bots.iter().any(|b| &b.username == selected) {
                log::info!("[Roster] Selected bot '{}' is gone, clearing selection", selected);
                self.selected = None;
            }
        }

        log::debug!("[Roster] Replaced roster ({} bot(s))", bots.len());
        self.bots = bots;
        self.session = session;
        self.received = true;
    }

    /// Select a bot by username. Returns `false` if no such bot exists.
    pub fn select(&mut self, username: &str) -> bool {
        if self.get(username).is_none() {
            return false;
        }
        self.selected = Some(username.to_string());
        true
    }

    /// Drop the selection.
    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// The selected bot, if any.
    #[must_use]
    pub fn selected(&self) -> Option<&Bot> {
        self.selected.as_deref().and_then(|name| self.get(name))
    }

    /// Find a bot by username.
    #[must_use]
    pub fn get(&self, username: &str) -> Option<&Bot> {
        self.bots.iter().find(|b| b.username == username)
    }

    /// All bots, in backend order.
    #[must_use]
    pub fn bots(&self) -> &[Bot] {
        &self.bots
    }

    /// Session metadata from the latest snapshot.
    #[must_use]
    pub fn session(&self) -> &SessionInfo {
        &self.session
    }

    /// Whether any `data` event has arrived yet.
    #[must_use]
    pub fn has_received(&self) -> bool {
        self.received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<Command>,
        refuse: bool,
    }

    impl CommandSink for RecordingSink {
        fn send_command(&mut self, command: Command) -> Result<(), TransportError> {
            if self.refuse {
                return Err(TransportError::ConnectionLost);
            }
            self.sent.push(command);
            Ok(())
        }
    }

    fn form() -> BotForm {
        BotForm {
            username: "cloei".to_string(),
            password: "123123".to_string(),
            token: "adnudiiem".to_string(),
            login_method: Some(LoginMethod::Legacy),
        }
    }

    fn bot(name: &str) -> Bot {
        serde_json::from_value(serde_json::json!({
            "username": name,
            "loginMethod": "LEGACY",
        }))
        .expect("valid bot")
    }

    #[test]
    fn test_login_method_parsing() {
        assert_eq!("google".parse::<LoginMethod>(), Ok(LoginMethod::Google));
        assert_eq!("APPLE".parse::<LoginMethod>(), Ok(LoginMethod::Apple));
        assert_eq!("Ubisoft Connect".parse::<LoginMethod>(), Ok(LoginMethod::Ubisoft));
        assert_eq!("3".parse::<LoginMethod>(), Ok(LoginMethod::Legacy));
        assert_eq!("0".parse::<LoginMethod>(), Ok(LoginMethod::Ubisoft));
        assert!("steam".parse::<LoginMethod>().is_err());
        assert!("7".parse::<LoginMethod>().is_err());
    }

    #[test]
    fn test_login_method_wire_form() {
        assert_eq!(
            serde_json::to_value(LoginMethod::Ubisoft).expect("serialize"),
            serde_json::json!("UBISOFT")
        );
        let parsed: LoginMethod = serde_json::from_value(serde_json::json!(2)).expect("code");
        assert_eq!(parsed, LoginMethod::Google);
    }

    #[test]
    fn test_compose_emits_one_command() {
        let mut sink = RecordingSink::default();
        let delivery = compose_add_bot_command(&form(), &mut sink).expect("valid form");

        assert_eq!(delivery, Delivery::Sent);
        assert_eq!(sink.sent.len(), 1);
        let Command::AddBot(config) = &sink.sent[0] else {
            panic!("expected add_bot, got {:?}", sink.sent[0]);
        };
        assert_eq!(config.username, "cloei");
        assert_eq!(config.password, "123123");
        assert_eq!(config.token, "adnudiiem");
        assert_eq!(config.login_method, LoginMethod::Legacy);
    }

    #[test]
    fn test_compose_rejects_each_missing_field() {
        let cases: [(fn(&mut BotForm), BotField); 4] = [
            (|f| f.username.clear(), BotField::Username),
            (|f| f.password = "   ".to_string(), BotField::Password),
            (|f| f.token.clear(), BotField::Token),
            (|f| f.login_method = None, BotField::LoginMethod),
        ];

        for (blank, field) in cases {
            let mut f = form();
            blank(&mut f);
            let mut sink = RecordingSink::default();
            let err = compose_add_bot_command(&f, &mut sink).expect_err("must fail");
            assert_eq!(err.missing, vec![field]);
            assert!(sink.sent.is_empty());
        }
    }

    #[test]
    fn test_compose_lists_all_missing_fields() {
        let mut sink = RecordingSink::default();
        let err = compose_add_bot_command(&BotForm::default(), &mut sink).expect_err("empty form");
        assert_eq!(
            err.missing,
            vec![
                BotField::Username,
                BotField::Password,
                BotField::Token,
                BotField::LoginMethod
            ]
        );
        assert!(sink.sent.is_empty());
    }

    #[test]
    fn test_compose_keeps_values_verbatim() {
        let mut f = form();
        f.password = " pass word ".to_string();
        let config = f.validate().expect("valid");
        assert_eq!(config.password, " pass word ");
    }

    #[test]
    fn test_compose_reports_refused_send() {
        let mut sink = RecordingSink {
            refuse: true,
            ..Default::default()
        };
        let delivery = compose_add_bot_command(&form(), &mut sink).expect("valid form");
        assert_eq!(delivery, Delivery::Dropped(TransportError::ConnectionLost));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = form().validate().expect("valid");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("123123"));
        assert!(!rendered.contains("adnudiiem"));
        assert!(rendered.contains("cloei"));
    }

    #[test]
    fn test_snapshot_decoding_keeps_extra_fields() {
        let snapshot: RosterSnapshot = serde_json::from_value(serde_json::json!({
            "gameVersion": "4.64",
            "protocol": 208,
            "bots": [{
                "username": "cloei",
                "loginMethod": "GOOGLE",
                "status": "online",
                "gems": 1200,
                "ping": 45,
                "world": "START",
                "netId": 7
            }]
        }))
        .expect("valid snapshot");

        assert_eq!(snapshot.session.game_version.as_deref(), Some("4.64"));
        assert_eq!(snapshot.session.protocol, Some(208));
        let bot = &snapshot.bots[0];
        assert_eq!(bot.login_method, LoginMethod::Google);
        assert_eq!(bot.gems, Some(1200));
        assert_eq!(bot.extra.get("netId"), Some(&serde_json::json!(7)));
    }

    #[test]
    fn test_replace_keeps_selection_if_present() {
        let mut store = RosterStore::new();
        store.replace_roster(RosterSnapshot {
            bots: vec![bot("a"), bot("b")],
            ..Default::default()
        });
        assert!(store.select("b"));

        store.replace_roster(RosterSnapshot {
            bots: vec![bot("b"), bot("c")],
            ..Default::default()
        });
        assert_eq!(store.selected().map(|b| b.username.as_str()), Some("b"));
    }

    #[test]
    fn test_replace_clears_vanished_selection() {
        let mut store = RosterStore::new();
        store.replace_roster(RosterSnapshot {
            bots: vec![bot("a"), bot("b")],
            ..Default::default()
        });
        store.select("a");

        store.replace_roster(RosterSnapshot {
            bots: vec![bot("b")],
            ..Default::default()
        });
        assert!(store.selected().is_none());
        assert_eq!(store.bots().len(), 1);
    }

    #[test]
    fn test_select_unknown_bot() {
        let mut store = RosterStore::new();
        assert!(!store.select("ghost"));
        assert!(store.selected().is_none());
        assert!(!store.has_received());
    }
}
