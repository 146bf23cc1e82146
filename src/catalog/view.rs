//! Browsing state for the catalog grid.

use std::ops::RangeInclusive;

use super::{CatalogStore, ItemRecord, Matches};
use crate::constants::{PAGE_SIZE, PAGE_WINDOW};

/// Page numbers to offer around `current`, at most four.
///
/// The window slides with `current` and stops at the last page. Empty when
/// there are no pages.
#[must_use]
pub fn page_window(current: usize, total: usize) -> RangeInclusive<usize> {
    let start = current
        .saturating_sub(1)
        .min(total.saturating_sub(PAGE_WINDOW));
    let end = current.saturating_add(PAGE_WINDOW - 1).min(total);

    // `start + 1 > end` yields an empty range.
    (start + 1)..=end
}

/// Query and page of the catalog browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogView {
    query: String,
    page: usize,
    page_size: usize,
}

impl Default for CatalogView {
    fn default() -> Self {
        Self {
            query: String::new(),
            page: 1,
            page_size: PAGE_SIZE,
        }
    }
}

/// What the browser shows for the current view.
#[derive(Debug, PartialEq)]
pub enum Visible<'a> {
    /// A page of the full catalog.
    Page {
        /// Page shown.
        number: usize,
        /// Total pages.
        total_pages: usize,
        /// Items on the page.
        items: &'a [ItemRecord],
        /// Page numbers to offer.
        window: RangeInclusive<usize>,
    },
    /// Every item matching the query.
    Search(Vec<&'a ItemRecord>),
}

impl CatalogView {
    /// A view on page 1 with no query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current query.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Current page, 1-based.
    #[must_use]
    pub fn page(&self) -> usize {
        self.page
    }

    /// Items per page.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Change the query and go back to page 1.
    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.page = 1;
    }

    /// Jump to `page`, clamped to the catalog.
    pub fn goto(&mut self, page: usize, store: &CatalogStore) {
        let total = store.total_pages(self.page_size);
        self.page = page.clamp(1, total.max(1));
    }

    /// Next page, if any.
    pub fn next_page(&mut self, store: &CatalogStore) {
        self.goto(self.page.saturating_add(1), store);
    }

    /// Previous page, if any.
    pub fn previous_page(&mut self, store: &CatalogStore) {
        self.goto(self.page.saturating_sub(1), store);
    }

    /// First page.
    pub fn first_page(&mut self) {
        self.page = 1;
    }

    /// Last page.
    pub fn last_page(&mut self, store: &CatalogStore) {
        self.goto(usize::MAX, store);
    }

    /// Resolve the view against `store`.
    #[must_use]
    pub fn visible<'a>(&self, store: &'a CatalogStore) -> Visible<'a> {
        match store.search(&self.query) {
            Matches::Found(items) => Visible::Search(items),
            Matches::Unfiltered => {
                let page = store.paginate(self.page, self.page_size);
                Visible::Page {
                    number: page.number,
                    total_pages: page.total_pages,
                    items: page.items,
                    window: page_window(page.number, page.total_pages),
                }
            }
        }
    }
}
