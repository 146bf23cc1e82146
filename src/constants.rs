//! Application-wide constants for the companion client.
//!
//! Constants are grouped by domain:
//!
//! - **Catalog**: paging and window sizes
//! - **Sprites**: atlas geometry and asset naming
//! - **Transport**: endpoint and reconnection defaults
//! - **Diagnostics**: retention limits

use std::time::Duration;

// ============================================================================
// Catalog
// ============================================================================

/// Items shown per catalog page.
pub const PAGE_SIZE: usize = 50;

/// Maximum number of page buttons in the navigation window.
pub const PAGE_WINDOW: usize = 4;

// ============================================================================
// Sprites
// ============================================================================

/// Edge length of one atlas tile in pixels.
pub const TILE_SIZE: i32 = 32;

/// Compressed texture extension used by the game engine.
pub const ENGINE_TEXTURE_EXTENSION: &str = "rttex";

/// Extension of the locally available, decoded atlas images.
pub const LOCAL_TEXTURE_EXTENSION: &str = "png";

/// Atlas holding the shared tree sprites drawn under seed icons.
pub const TREE_ATLAS: &str = "tiles_page1.rttex";

/// Atlas row of tree base sprites.
pub const TREE_BASE_ROW: u32 = 19;

/// Atlas row of tree overlay sprites.
pub const TREE_OVERLAY_ROW: u32 = 18;

// ============================================================================
// Transport
// ============================================================================

/// Default backend endpoint.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:3000/ws";

/// First reconnection delay.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Ceiling for the reconnection delay.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Reconnection attempts before the client gives up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 8;

/// Upper bound of the random jitter added to each backoff.
pub const RECONNECT_JITTER_MS: u64 = 1_000;

/// How long CLI commands wait for a backend response.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Diagnostics
// ============================================================================

/// Number of recent error entries kept for display.
pub const DIAGNOSTICS_HISTORY: usize = 32;
