//! Mate - companion client for the Mate bot backend.
//!
//! This crate keeps a roster of bot accounts and browses the backend's
//! item catalog over one persistent WebSocket connection.
//!
//! # Architecture
//!
//! - **Transport** - sans-IO session state machine plus a spawned
//!   connection task that owns the socket and reconnects with backoff
//! - **Catalog** - lazily fetched, immutable item snapshot with lookup,
//!   search and pagination
//! - **Roster** - bot list, selection and `add_bot` composition
//! - **Sprite** - atlas tile to pixel offset and local asset mapping
//! - **Client** - coordinator that owns all of the above
//!
//! # Modules
//!
//! - [`transport`] - connection lifecycle and message routing
//! - [`catalog`] - item catalog store and browsing view
//! - [`roster`] - bot roster store
//! - [`config`] - configuration loading/saving

// Library modules
pub mod catalog;
pub mod client;
pub mod protocol;
pub mod roster;
pub mod sprite;
pub mod transport;
pub mod ws;

pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod env;
pub mod error;

// Re-export commonly used types
pub use catalog::{CatalogStore, CatalogView, ItemRecord};
pub use client::{ClientUpdate, CompanionClient};
pub use config::Config;
pub use error::{Error, NotFound, ProtocolError, TransportError, ValidationError};
pub use roster::{BotForm, LoginMethod, RosterStore};
pub use transport::{ConnectionState, TransportSession};
