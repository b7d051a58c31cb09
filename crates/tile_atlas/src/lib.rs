//! Tile-backed image storage: the sparse, partially-backed images a
//! renderer samples brushes and clip masks from.
//!
//! This crate owns bookkeeping only -- which [`interval_atlas::TileKey`]
//! names which tile, and whether a tile is `Color`/`White`/`Empty` -- never
//! pixel storage. A `RenderBackend` owns the GPU-side texture array this
//! bookkeeping addresses into.

mod atlas;
mod image;
mod mip_element;

pub use atlas::{ImageAtlas, ImageAtlasError};
pub use image::{Image, ImageId, ImageKind, RenderTag};
pub use mip_element::{ImageMipElement, MipLevel, TileClassification, TileRegion};

/// Border kept around each tile's content to give bilinear sampling a
/// seam-free edge.
pub const TILE_PADDING: u32 = 1;
/// Usable content area of one tile, excluding [`TILE_PADDING`] on each side.
pub const TILE_SIZE_WITHOUT_PADDING: u32 = 32;
/// Full backing-store footprint of one tile.
pub const TILE_SIZE: u32 = TILE_SIZE_WITHOUT_PADDING + 2 * TILE_PADDING;

static_assertions::const_assert_eq!(TILE_SIZE, 34);
