//! Catalog entry and the `item_database` payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One static catalog entry.
///
/// Every attribute defaults to zero or empty so partial records still load.
/// Attributes without a field here are kept in `extra` and written back
/// unchanged.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemRecord {
    // Identity
    pub id: u32,
    pub name: String,
    pub description: String,
    pub flags: u32,
    pub action_type: u32,
    pub material: u32,
    pub rarity: u32,
    pub max_item: u32,

    // Rendering
    pub texture_file_name: String,
    pub texture_hash: u32,
    pub texture_x: u32,
    pub texture_y: u32,
    pub render_type: u32,
    pub visual_effect: u32,
    pub is_stripey_wallpaper: u32,
    pub base_color: u32,
    /// Tint of the tree overlay, packed as BGRA.
    pub overlay_color: u32,
    pub texture_path_2: String,

    // Gameplay
    pub collision_type: u32,
    pub block_health: u32,
    pub drop_chance: u32,
    pub clothing_type: u32,
    pub cooking_ingredient: u32,
    pub ingredient: u32,
    pub grow_time: u32,
    pub is_rayman: u32,
    pub punch_option: String,
    pub extra_options: String,
    pub extra_option2: String,

    // Audio
    pub file_name: String,
    pub file_hash: u32,
    pub audio_volume: u32,

    // Pet
    pub pet_name: String,
    pub pet_prefix: String,
    pub pet_suffix: String,
    pub pet_ability: String,

    // Seed and tree variants
    pub seed_base_sprite: u32,
    pub seed_overlay_sprite: u32,
    pub tree_base_sprite: u32,
    pub tree_overlay_sprite: u32,

    /// Attributes this client does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItemRecord {
    /// Seeds carry odd ids; the block they grow into is `id - 1`.
    #[must_use]
    pub fn is_seed(&self) -> bool {
        self.id % 2 == 1
    }
}

/// Payload of an `item_database` event.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPayload {
    /// Catalog version.
    #[serde(default)]
    pub version: u32,
    /// Number of items the backend claims to have sent.
    #[serde(default)]
    pub item_count: u32,
    /// Items keyed by id, iterated in ascending id order.
    #[serde(default)]
    pub items: BTreeMap<u32, ItemRecord>,
}
