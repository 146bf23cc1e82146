//! Catalog store: the once-per-session item snapshot.
//!
//! The catalog is requested lazily with a single `get_item_database`
//! command and swapped in whole when the `item_database` event arrives.
//! Readers hold an `Arc<Catalog>` and never observe a partial update.
//!
//! Items are kept in ascending id order with an id index beside them, so
//! lookup is O(1) and pagination is a slice.

pub mod item;
pub mod view;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

pub use item::{CatalogPayload, ItemRecord};
pub use view::{page_window, CatalogView};

use crate::error::{NotFound, ProtocolError};
use crate::protocol::{self, Command};
use crate::transport::CommandSink;

/// Progress of the one catalog request a session makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchState {
    /// Nothing sent yet, or the last attempt could not complete.
    #[default]
    NotRequested,
    /// `get_item_database` was sent; waiting for the snapshot.
    Pending,
    /// The snapshot arrived. Final for the session.
    Loaded,
}

/// An immutable catalog snapshot.
#[derive(Debug, Default)]
pub struct Catalog {
    version: u32,
    total_count: u32,
    items: Vec<ItemRecord>,
    index: HashMap<u32, usize>,
    lowercase_names: Vec<String>,
}

impl Catalog {
    /// Build a snapshot from a decoded payload.
    ///
    /// Items are indexed by their map key. Records are stored exactly as
    /// received, including an `id` that disagrees with its key.
    #[must_use]
    pub fn from_payload(payload: CatalogPayload) -> Self {
        let CatalogPayload {
            version,
            item_count,
            items,
        } = payload;

        let mut records = Vec::with_capacity(items.len());
        let mut index = HashMap::with_capacity(items.len());
        let mut lowercase_names = Vec::with_capacity(items.len());
        for (key, record) in items {
            index.insert(key, records.len());
            lowercase_names.push(record.name.to_lowercase());
            records.push(record);
        }

        Self {
            version,
            total_count: item_count,
            items: records,
            index,
            lowercase_names,
        }
    }

    /// Catalog version reported by the backend.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Item count reported by the backend.
    #[must_use]
    pub fn total_count(&self) -> u32 {
        self.total_count
    }

    /// Number of items actually stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` when no items are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items in ascending id order.
    #[must_use]
    pub fn items(&self) -> &[ItemRecord] {
        &self.items
    }

    /// `(key, id)` pairs where a record's own `id` differs from its key.
    #[must_use]
    pub fn id_mismatches(&self) -> Vec<(u32, u32)> {
        let mut pairs: Vec<(u32, u32)> = self
            .index
            .iter()
            .filter_map(|(&key, &i)| {
                let id = self.items[i].id;
                (id != key).then_some((key, id))
            })
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Find an item by id.
    pub fn lookup(&self, id: u32) -> Result<&ItemRecord, NotFound> {
        self.index
            .get(&id)
            .map(|&i| &self.items[i])
            .ok_or(NotFound { id })
    }

    /// Case-insensitive substring search on item names.
    ///
    /// A blank query applies no filter. Otherwise the query is matched as
    /// typed, surrounding whitespace included. Matches keep catalog order.
    #[must_use]
    pub fn search(&self, query: &str) -> Matches<'_> {
        if query.trim().is_empty() {
            return Matches::Unfiltered;
        }
        let needle = query.to_lowercase();
        Matches::Found(
            self.lowercase_names
                .iter()
                .zip(&self.items)
                .filter(|(name, _)| name.contains(&needle))
                .map(|(_, item)| item)
                .collect(),
        )
    }

    /// Number of pages of `page_size` items.
    #[must_use]
    pub fn total_pages(&self, page_size: usize) -> usize {
        self.items.len().div_ceil(page_size.max(1))
    }

    /// One page of the full catalog.
    ///
    /// `page` is 1-based and clamped to the valid range first.
    #[must_use]
    pub fn paginate(&self, page: usize, page_size: usize) -> Page<'_> {
        let page_size = page_size.max(1);
        let total_pages = self.total_pages(page_size);
        if total_pages == 0 {
            return Page {
                number: 1,
                total_pages,
                items: &[],
            };
        }

        let number = page.clamp(1, total_pages);
        let start = (number - 1) * page_size;
        let end = (start + page_size).min(self.items.len());
        Page {
            number,
            total_pages,
            items: &self.items[start..end],
        }
    }
}

/// Result of [`Catalog::search`].
#[derive(Debug, PartialEq)]
pub enum Matches<'a> {
    /// The query was blank; browse by page instead.
    Unfiltered,
    /// Items whose name contains the query.
    Found(Vec<&'a ItemRecord>),
}

/// One page of the catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Page<'a> {
    /// The page actually shown, after clamping.
    pub number: usize,
    /// Total number of pages.
    pub total_pages: usize,
    /// Items on this page.
    pub items: &'a [ItemRecord],
}

/// What one ingest did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    /// Catalog version.
    pub version: u32,
    /// Items stored.
    pub stored: usize,
    /// Items the backend claimed to send, when it disagrees with `stored`.
    pub count_mismatch: Option<u32>,
    /// `(key, id)` of records whose `id` differs from their map key.
    pub id_mismatches: Vec<(u32, u32)>,
}

/// Result of feeding an `item_database` payload to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The snapshot was installed.
    Loaded(IngestSummary),
    /// A snapshot was already installed this session; the payload was
    /// dropped.
    AlreadyLoaded,
}

/// Owner of the session's catalog snapshot and fetch state.
#[derive(Debug, Default)]
pub struct CatalogStore {
    fetch: FetchState,
    catalog: Option<Arc<Catalog>>,
}

impl CatalogStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for the catalog unless it is already loaded or on its way.
    ///
    /// Returns `true` when a command was sent by this call.
    pub fn request_catalog(&mut self, sink: &mut impl CommandSink) -> bool {
        if self.fetch != FetchState::NotRequested {
            log::trace!("[Catalog] Request skipped ({:?})", self.fetch);
            return false;
        }

        match sink.send_command(Command::GetItemDatabase) {
            Ok(()) => {
                log::info!("[Catalog] Requested item database");
                self.fetch = FetchState::Pending;
                true
            }
            Err(e) => {
                log::warn!("[Catalog] Item database request not sent: {}", e);
                false
            }
        }
    }

    /// The connection carrying a pending request went away; allow a new
    /// request on the next connection.
    pub fn connection_lost(&mut self) {
        if self.fetch == FetchState::Pending {
            log::info!("[Catalog] Connection lost while waiting for catalog, will re-request");
            self.fetch = FetchState::NotRequested;
        }
    }

    /// Decode and install an `item_database` payload.
    ///
    /// The payload is decoded completely before anything is replaced; a
    /// malformed payload leaves the store untouched.
    pub fn ingest(&mut self, payload: Value) -> Result<IngestOutcome, ProtocolError> {
        if self.fetch == FetchState::Loaded {
            log::debug!("[Catalog] Ignoring repeated item database");
            return Ok(IngestOutcome::AlreadyLoaded);
        }

        let payload: CatalogPayload =
            protocol::decode_payload(protocol::types::ITEM_DATABASE, payload)?;
        let catalog = Catalog::from_payload(payload);

        let stored = catalog.len();
        let claimed = catalog.total_count();
        let count_mismatch = (usize::try_from(claimed).ok() != Some(stored)).then_some(claimed);
        if count_mismatch.is_some() {
            log::warn!(
                "[Catalog] Backend reported {} items but sent {}",
                claimed,
                stored
            );
        }

        let id_mismatches = catalog.id_mismatches();
        let summary = IngestSummary {
            version: catalog.version(),
            stored,
            count_mismatch,
            id_mismatches,
        };
        log::info!(
            "[Catalog] Loaded version {} ({} items)",
            summary.version,
            summary.stored
        );

        self.catalog = Some(Arc::new(catalog));
        self.fetch = FetchState::Loaded;
        Ok(IngestOutcome::Loaded(summary))
    }

    /// Current fetch state.
    #[must_use]
    pub fn fetch_state(&self) -> FetchState {
        self.fetch
    }

    /// The installed snapshot, if any.
    #[must_use]
    pub fn catalog(&self) -> Option<Arc<Catalog>> {
        self.catalog.clone()
    }

    /// Find an item by id. Absent while nothing is loaded.
    pub fn lookup(&self, id: u32) -> Result<&ItemRecord, NotFound> {
        match &self.catalog {
            Some(catalog) => catalog.lookup(id),
            None => Err(NotFound { id }),
        }
    }

    /// Search the installed snapshot. A non-blank query on an empty store
    /// finds nothing.
    #[must_use]
    pub fn search(&self, query: &str) -> Matches<'_> {
        match &self.catalog {
            Some(catalog) => catalog.search(query),
            None if query.trim().is_empty() => Matches::Unfiltered,
            None => Matches::Found(Vec::new()),
        }
    }

    /// One page of the installed snapshot.
    #[must_use]
    pub fn paginate(&self, page: usize, page_size: usize) -> Page<'_> {
        match &self.catalog {
            Some(catalog) => catalog.paginate(page, page_size),
            None => Page {
                number: 1,
                total_pages: 0,
                items: &[],
            },
        }
    }

    /// Number of pages in the installed snapshot.
    #[must_use]
    pub fn total_pages(&self, page_size: usize) -> usize {
        self.catalog
            .as_ref()
            .map_or(0, |catalog| catalog.total_pages(page_size))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::constants::PAGE_SIZE;
    use crate::error::TransportError;
    use serde_json::json;

    #[derive(Default)]
    struct CountingSink {
        sent: Vec<Command>,
        open: bool,
    }

    impl CommandSink for CountingSink {
        fn send_command(&mut self, command: Command) -> Result<(), TransportError> {
            if !self.open {
                return Err(TransportError::ConnectionLost);
            }
            self.sent.push(command);
            Ok(())
        }
    }

    /// A payload with items `1..=count`, named `Item N` except every tenth
    /// which is `Magic Door N`.
    pub(crate) fn payload(count: u32) -> Value {
        let items: serde_json::Map<String, Value> = (1..=count)
            .map(|id| {
                let name = if id % 10 == 0 {
                    format!("Magic Door {id}")
                } else {
                    format!("Item {id}")
                };
                (id.to_string(), json!({ "id": id, "name": name }))
            })
            .collect();
        json!({ "version": 7, "itemCount": count, "items": items })
    }

    fn loaded(count: u32) -> CatalogStore {
        let mut store = CatalogStore::new();
        store.ingest(payload(count)).expect("valid payload");
        store
    }

    #[test]
    fn test_request_sent_once() {
        let mut store = CatalogStore::new();
        let mut sink = CountingSink {
            open: true,
            ..Default::default()
        };

        assert!(store.request_catalog(&mut sink));
        for _ in 0..4 {
            assert!(!store.request_catalog(&mut sink));
        }
        assert_eq!(sink.sent, vec![Command::GetItemDatabase]);
        assert_eq!(store.fetch_state(), FetchState::Pending);
    }

    #[test]
    fn test_failed_request_can_retry() {
        let mut store = CatalogStore::new();
        let mut sink = CountingSink::default();

        assert!(!store.request_catalog(&mut sink));
        assert_eq!(store.fetch_state(), FetchState::NotRequested);

        sink.open = true;
        assert!(store.request_catalog(&mut sink));
        assert_eq!(sink.sent.len(), 1);
    }

    #[test]
    fn test_connection_loss_rearms_pending_only() {
        let mut store = CatalogStore::new();
        let mut sink = CountingSink {
            open: true,
            ..Default::default()
        };
        store.request_catalog(&mut sink);
        store.connection_lost();
        assert_eq!(store.fetch_state(), FetchState::NotRequested);

        store.request_catalog(&mut sink);
        store.ingest(payload(3)).expect("valid payload");
        store.connection_lost();
        assert_eq!(store.fetch_state(), FetchState::Loaded);
        assert!(!store.request_catalog(&mut sink));
        assert_eq!(sink.sent.len(), 2);
    }

    #[test]
    fn test_ingest_then_lookup() {
        let store = loaded(120);
        assert_eq!(store.lookup(42).map(|i| i.name.as_str()), Ok("Item 42"));
        assert_eq!(store.lookup(999), Err(NotFound { id: 999 }));
        let catalog = store.catalog().expect("loaded");
        assert_eq!(catalog.version(), 7);
        assert_eq!(catalog.total_count(), 120);
    }

    #[test]
    fn test_lookup_before_load() {
        assert_eq!(CatalogStore::new().lookup(1), Err(NotFound { id: 1 }));
    }

    #[test]
    fn test_malformed_ingest_leaves_store_untouched() {
        let mut store = loaded(5);
        let before = store.catalog().expect("loaded");

        // Already loaded, so even a valid payload is ignored.
        assert_eq!(store.ingest(payload(9)), Ok(IngestOutcome::AlreadyLoaded));
        assert!(Arc::ptr_eq(&before, &store.catalog().expect("loaded")));

        let mut fresh = CatalogStore::new();
        let err = fresh
            .ingest(json!({ "version": 1, "itemCount": 1, "items": [1, 2] }))
            .expect_err("items must be a map");
        assert!(matches!(err, ProtocolError::InvalidPayload { .. }));
        assert!(fresh.catalog().is_none());
        assert_eq!(fresh.fetch_state(), FetchState::NotRequested);

        let err = fresh
            .ingest(Value::String(payload(2).to_string()))
            .expect_err("encoded payload");
        assert!(matches!(err, ProtocolError::EncodedPayload { .. }));
    }

    #[test]
    fn test_count_mismatch_is_reported() {
        let mut store = CatalogStore::new();
        let mut raw = payload(4);
        raw["itemCount"] = json!(6);
        let outcome = store.ingest(raw).expect("mismatch is not fatal");
        assert_eq!(
            outcome,
            IngestOutcome::Loaded(IngestSummary {
                version: 7,
                stored: 4,
                count_mismatch: Some(6),
                id_mismatches: Vec::new(),
            })
        );
        assert_eq!(store.paginate(1, PAGE_SIZE).items.len(), 4);
    }

    #[test]
    fn test_pagination_covers_catalog_once() {
        let store = loaded(120);
        let catalog = store.catalog().expect("loaded");
        assert_eq!(catalog.total_pages(PAGE_SIZE), 3);

        let sizes: Vec<usize> = (1..=3)
            .map(|p| catalog.paginate(p, PAGE_SIZE).items.len())
            .collect();
        assert_eq!(sizes, vec![50, 50, 20]);

        let mut ids: Vec<u32> = (1..=3)
            .flat_map(|p| catalog.paginate(p, PAGE_SIZE).items.iter().map(|i| i.id))
            .collect();
        let total = ids.len();
        ids.dedup();
        assert_eq!(ids.len(), total);
        assert_eq!(ids, (1..=120).collect::<Vec<_>>());
    }

    #[test]
    fn test_pagination_clamps_page() {
        let store = loaded(120);
        assert_eq!(store.paginate(0, PAGE_SIZE).number, 1);
        let last = store.paginate(99, PAGE_SIZE);
        assert_eq!(last.number, 3);
        assert_eq!(last.items.first().map(|i| i.id), Some(101));

        let fresh = CatalogStore::new();
        let empty = fresh.paginate(4, PAGE_SIZE);
        assert_eq!(empty.number, 1);
        assert_eq!(empty.total_pages, 0);
        assert!(empty.items.is_empty());
    }

    #[test]
    fn test_search_is_case_insensitive_and_ordered() {
        let store = loaded(120);
        let Matches::Found(hits) = store.search("magic DOOR") else {
            panic!("expected a filtered result");
        };
        let ids: Vec<u32> = hits.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120]);
    }

    #[test]
    fn test_blank_search_is_unfiltered() {
        let store = loaded(10);
        assert_eq!(store.search(""), Matches::Unfiltered);
        assert_eq!(store.search("   "), Matches::Unfiltered);
        assert_eq!(CatalogStore::new().search("dirt"), Matches::Found(Vec::new()));
    }

    #[test]
    fn test_ingest_keeps_records_as_sent() {
        let submitted = json!({
            "id": 9,
            "name": "Lava",
            "texture_x": 4,
            "render_type": 2,
            "seedColor": 77,
            "tags": ["hot", "liquid"]
        });
        let mut store = CatalogStore::new();
        let outcome = store
            .ingest(json!({
                "version": 1,
                "itemCount": 1,
                "items": { "5": submitted.clone() }
            }))
            .expect("valid payload");

        let IngestOutcome::Loaded(summary) = outcome else {
            panic!("expected a fresh load");
        };
        assert_eq!(summary.id_mismatches, vec![(5, 9)]);

        let record = store.lookup(5).expect("indexed by key");
        let expected: ItemRecord = serde_json::from_value(submitted.clone()).expect("record");
        assert_eq!(record, &expected);
        assert_eq!(store.lookup(9), Err(NotFound { id: 9 }));

        let echoed = serde_json::to_value(record).expect("serialize");
        for (key, value) in submitted.as_object().expect("object") {
            assert_eq!(&echoed[key], value, "field {key} changed");
        }
    }

    #[test]
    fn test_search_matches_query_as_typed() {
        let mut store = CatalogStore::new();
        store
            .ingest(json!({
                "version": 1,
                "itemCount": 2,
                "items": {
                    "1": { "id": 1, "name": "Door" },
                    "2": { "id": 2, "name": "Magic Door" }
                }
            }))
            .expect("valid payload");

        let Matches::Found(hits) = store.search(" door") else {
            panic!("expected a filtered result");
        };
        let ids: Vec<u32> = hits.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![2]);
    }
}
