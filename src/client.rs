//! Client coordinator.
//!
//! [`CompanionClient`] owns the transport session, both stores and the
//! event stream from the connection task. Everything runs on the task
//! that owns the client: each [`TransportEvent`] is applied to the
//! session, and whatever the session dispatched is drained into the
//! stores before the next event is looked at.

use tokio::sync::{mpsc, watch};

use crate::catalog::{CatalogStore, IngestOutcome, IngestSummary};
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::error::{ProtocolError, ValidationError};
use crate::protocol::{self, types};
use crate::roster::{compose_add_bot_command, BotForm, Delivery, RosterSnapshot, RosterStore};
use crate::sprite::SpriteMapper;
use crate::transport::{
    ConnectionHandle, ConnectionState, Subscription, TransportEvent, TransportSession,
};

/// Something the consumer may want to redraw for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientUpdate {
    /// Connectivity changed.
    Connectivity(ConnectionState),
    /// A new roster snapshot replaced the old one.
    RosterReplaced {
        /// Bots in the new roster.
        bots: usize,
    },
    /// The catalog snapshot was installed.
    CatalogLoaded(IngestSummary),
}

/// The companion client: one connection, one roster, one catalog.
#[derive(Debug)]
pub struct CompanionClient {
    session: TransportSession,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    data: Subscription,
    item_database: Subscription,
    roster: RosterStore,
    catalog: CatalogStore,
    sprites: SpriteMapper,
}

impl CompanionClient {
    /// Spawn the connection task for `config` and wire up the stores.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn connect(config: &Config) -> Self {
        let url = config.ws_url();
        log::info!("[Client] Starting session against {}", url);
        let (handle, events) = ConnectionHandle::spawn(&url, config.reconnect.clone());
        Self::from_parts(handle, events, config.sprite_mapper())
    }

    /// Build a client around an existing connection handle and its event
    /// stream.
    #[must_use]
    pub fn from_parts(
        handle: ConnectionHandle,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        sprites: SpriteMapper,
    ) -> Self {
        let mut session = TransportSession::new();
        let data = session.subscribe(types::DATA);
        let item_database = session.subscribe(types::ITEM_DATABASE);
        session.attach(handle);

        Self {
            session,
            events,
            data,
            item_database,
            roster: RosterStore::new(),
            catalog: CatalogStore::new(),
            sprites,
        }
    }

    /// Wait for the next event and apply it.
    ///
    /// Returns `None` once the connection task has finished and every
    /// event has been applied.
    pub async fn next_update(&mut self) -> Option<Vec<ClientUpdate>> {
        let event = self.events.recv().await?;
        Some(self.handle_transport_event(event))
    }

    /// Apply one event from the connection task.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Vec<ClientUpdate> {
        let mut updates = Vec::new();

        if let Some(state) = self.session.handle_event(event) {
            if !state.is_open() {
                self.catalog.connection_lost();
            }
            updates.push(ClientUpdate::Connectivity(state));
        }

        while let Some(payload) = self.data.try_recv() {
            match protocol::decode_payload::<RosterSnapshot>(types::DATA, payload) {
                Ok(snapshot) => {
                    let bots = snapshot.bots.len();
                    self.roster.replace_roster(snapshot);
                    updates.push(ClientUpdate::RosterReplaced { bots });
                }
                Err(e) => self.session.diagnostics_mut().report(e),
            }
        }

        while let Some(payload) = self.item_database.try_recv() {
            match self.catalog.ingest(payload) {
                Ok(IngestOutcome::Loaded(summary)) => {
                    for &(key, id) in &summary.id_mismatches {
                        self.session
                            .diagnostics_mut()
                            .report(ProtocolError::ItemIdMismatch { key, id });
                    }
                    updates.push(ClientUpdate::CatalogLoaded(summary));
                }
                Ok(IngestOutcome::AlreadyLoaded) => {}
                Err(e) => self.session.diagnostics_mut().report(e),
            }
        }

        updates
    }

    /// Ask for the catalog if it has not been requested yet.
    ///
    /// Returns `true` when a request went out.
    pub fn request_catalog(&mut self) -> bool {
        self.catalog.request_catalog(&mut self.session)
    }

    /// Validate the form and send one `add_bot` command.
    pub fn add_bot(&mut self, form: &BotForm) -> Result<Delivery, ValidationError> {
        compose_add_bot_command(form, &mut self.session)
    }

    /// Select a bot by username.
    pub fn select_bot(&mut self, username: &str) -> bool {
        self.roster.select(username)
    }

    /// Current connectivity.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Observe connectivity changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.session.watch_state()
    }

    /// The roster store.
    #[must_use]
    pub fn roster(&self) -> &RosterStore {
        &self.roster
    }

    /// The catalog store.
    #[must_use]
    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    /// Sprite mapper for catalog entries.
    #[must_use]
    pub fn sprites(&self) -> &SpriteMapper {
        &self.sprites
    }

    /// Recovered errors.
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        self.session.diagnostics()
    }

    /// Tear the session down and stop the connection task.
    pub fn close(&mut self) {
        self.session.close();
    }

    /// Close and wait until the connection task has written any queued
    /// frames and released the socket.
    pub async fn shutdown(&mut self) {
        self.close();
        while self.events.recv().await.is_some() {}
    }
}
