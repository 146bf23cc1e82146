//! Sprite atlas mapping.
//!
//! Catalog entries point at a 32×32 tile inside a texture atlas. The
//! mapper turns tile coordinates into a background pixel offset and
//! resolves the engine's atlas name to an image that exists locally.

use std::path::{Path, PathBuf};

use crate::catalog::ItemRecord;
use crate::constants::{
    ENGINE_TEXTURE_EXTENSION, LOCAL_TEXTURE_EXTENSION, TILE_SIZE, TREE_ATLAS, TREE_BASE_ROW,
    TREE_OVERLAY_ROW,
};

/// Where to find one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteRef {
    /// Background offset in pixels, `(-x·32, -y·32)`.
    pub offset: (i32, i32),
    /// Atlas image to draw from.
    pub asset: PathBuf,
}

/// An RGBA tint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    /// Red.
    pub r: u8,
    /// Green.
    pub g: u8,
    /// Blue.
    pub b: u8,
    /// Alpha.
    pub a: u8,
}

impl Rgba {
    /// No tint.
    pub const WHITE: Self = Self {
        r: 0xFF,
        g: 0xFF,
        b: 0xFF,
        a: 0xFF,
    };

    /// Unpack a color stored as `0xBBGGRRAA`.
    #[must_use]
    pub fn from_bgra(color: u32) -> Self {
        Self {
            b: (color >> 24) as u8,
            g: ((color >> 16) & 0xFF) as u8,
            r: ((color >> 8) & 0xFF) as u8,
            a: (color & 0xFF) as u8,
        }
    }
}

/// One layer of an item icon, drawn bottom to top.
#[derive(Debug, Clone, PartialEq)]
pub struct IconLayer {
    /// Tile to draw.
    pub sprite: SpriteRef,
    /// Tint applied to the tile.
    pub tint: Rgba,
    /// Size relative to the full cell (1.0 fills it, centered).
    pub scale: f32,
}

/// Pixel offset of tile `(tile_x, tile_y)`.
///
/// Coordinates too large for an `i32` offset saturate at `i32::MIN`.
#[must_use]
pub fn pixel_offset(tile_x: u32, tile_y: u32) -> (i32, i32) {
    (tile_to_pixels(tile_x), tile_to_pixels(tile_y))
}

fn tile_to_pixels(tile: u32) -> i32 {
    let pixels = -i64::from(tile) * i64::from(TILE_SIZE);
    i32::try_from(pixels).unwrap_or(i32::MIN)
}

/// Tile shift applied to a seed's own sprite, by render type.
#[must_use]
pub fn render_spread(render_type: u32) -> (u32, u32) {
    match render_type {
        2 | 5 => (4, 1),
        4 => (4, 0),
        3 | 7 | 8 | 9 | 10 => (3, 0),
        _ => (0, 0),
    }
}

/// Stateless mapper, optionally rooted at a local asset directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpriteMapper {
    asset_root: Option<PathBuf>,
}

impl SpriteMapper {
    /// A mapper that resolves assets under `asset_root`, or relative
    /// paths when `None`.
    #[must_use]
    pub fn new(asset_root: Option<PathBuf>) -> Self {
        Self { asset_root }
    }

    /// Offset and asset for tile `(tile_x, tile_y)` of `texture_file`.
    #[must_use]
    pub fn map_sprite(&self, texture_file: &str, tile_x: u32, tile_y: u32) -> SpriteRef {
        SpriteRef {
            offset: pixel_offset(tile_x, tile_y),
            asset: self.resolve_asset(texture_file),
        }
    }

    /// Local image path for an engine texture name.
    ///
    /// `.rttex` (any case) becomes `.png`; other names are kept.
    #[must_use]
    pub fn resolve_asset(&self, texture_file: &str) -> PathBuf {
        let path = Path::new(texture_file);
        let is_engine_texture = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(ENGINE_TEXTURE_EXTENSION));

        let file = if is_engine_texture {
            path.with_extension(LOCAL_TEXTURE_EXTENSION)
        } else {
            path.to_path_buf()
        };

        match &self.asset_root {
            Some(root) => root.join(file),
            None => file,
        }
    }

    /// Sprite of the item itself.
    #[must_use]
    pub fn item_sprite(&self, item: &ItemRecord) -> SpriteRef {
        self.map_sprite(&item.texture_file_name, item.texture_x, item.texture_y)
    }

    /// Layers that make up the item's icon.
    ///
    /// Seeds draw a tree base, a tinted tree overlay and a quarter-size
    /// copy of their own tile shifted by the render-type spread. Everything
    /// else is its own tile.
    #[must_use]
    pub fn icon_layers(&self, item: &ItemRecord) -> Vec<IconLayer> {
        if !item.is_seed() {
            return vec![IconLayer {
                sprite: self.item_sprite(item),
                tint: Rgba::WHITE,
                scale: 1.0,
            }];
        }

        let (spread_x, spread_y) = render_spread(item.render_type);
        vec![
            IconLayer {
                sprite: self.map_sprite(TREE_ATLAS, item.tree_base_sprite, TREE_BASE_ROW),
                tint: Rgba::WHITE,
                scale: 1.0,
            },
            IconLayer {
                sprite: self.map_sprite(TREE_ATLAS, item.tree_overlay_sprite, TREE_OVERLAY_ROW),
                tint: Rgba::from_bgra(item.overlay_color),
                scale: 1.0,
            },
            IconLayer {
                sprite: self.map_sprite(
                    &item.texture_file_name,
                    item.texture_x.saturating_add(spread_x),
                    item.texture_y.saturating_add(spread_y),
                ),
                tint: Rgba::WHITE,
                scale: 0.25,
            },
        ]
    }
}
