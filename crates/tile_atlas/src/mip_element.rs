//! A grid of fixed-size tiles covering one or two consecutive mip levels.

use interval_atlas::TileKey;

use crate::TILE_SIZE_WITHOUT_PADDING;

/// One tile's content, classified as: `Color` tiles have pixels
/// allocated in the atlas (possibly not yet -- `None` is a reservation
/// awaiting lazy allocation at "mark in use" time); `White` and `Empty`
/// share a single backend-owned tile and never consume atlas storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileClassification {
    Empty,
    White,
    Color(Option<TileKey>),
}

impl TileClassification {
    pub const fn is_color(self) -> bool {
        matches!(self, TileClassification::Color(_))
    }

    pub const fn is_white(self) -> bool {
        matches!(self, TileClassification::White)
    }

    pub const fn is_empty(self) -> bool {
        matches!(self, TileClassification::Empty)
    }

    /// `None` for `White`/`Empty` tiles (shared backend tile, no storage of
    /// our own) and for a `Color` tile whose storage has not been allocated
    /// yet; `Some` once a `Color` tile has a live [`TileKey`].
    pub const fn color_tile_key(self) -> Option<TileKey> {
        match self {
            TileClassification::Color(key) => key,
            _ => None,
        }
    }
}

/// A tile-aligned rectangular region, in tile coordinates, used to describe
/// which tiles of a partially-backed mip element become `Color` tiles
///.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRegion {
    pub tile_x: u32,
    pub tile_y: u32,
    pub tiles_wide: u32,
    pub tiles_high: u32,
}

impl TileRegion {
    pub const fn contains(self, tile_x: u32, tile_y: u32) -> bool {
        tile_x >= self.tile_x
            && tile_y >= self.tile_y
            && tile_x < self.tile_x + self.tiles_wide
            && tile_y < self.tile_y + self.tiles_high
    }
}

/// One mip level's tile grid: pixel size plus a row-major grid of
/// [`TileClassification`]s at `TILE_SIZE_WITHOUT_PADDING` granularity.
#[derive(Debug, Clone)]
pub struct MipLevel {
    size: (u32, u32),
    tiles_per_row: u32,
    tiles_per_column: u32,
    tiles: Vec<TileClassification>,
}

impl MipLevel {
    fn tile_grid_dims(size: (u32, u32)) -> (u32, u32) {
        let tiles_per_row = size.0.div_ceil(TILE_SIZE_WITHOUT_PADDING).max(1);
        let tiles_per_column = size.1.div_ceil(TILE_SIZE_WITHOUT_PADDING).max(1);
        (tiles_per_row, tiles_per_column)
    }

    /// Every tile initialised to `Empty` (the fully-uncovered default).
    pub fn new_empty(size: (u32, u32)) -> Self {
        let (tiles_per_row, tiles_per_column) = Self::tile_grid_dims(size);
        Self {
            size,
            tiles_per_row,
            tiles_per_column,
            tiles: vec![TileClassification::Empty; (tiles_per_row * tiles_per_column) as usize],
        }
    }

    /// Every tile initialised to `White` (the fully-covered default used by
    /// non-sparse fallback rendering before any clip combine is applied).
    pub fn new_white(size: (u32, u32)) -> Self {
        let (tiles_per_row, tiles_per_column) = Self::tile_grid_dims(size);
        Self {
            size,
            tiles_per_row,
            tiles_per_column,
            tiles: vec![TileClassification::White; (tiles_per_row * tiles_per_column) as usize],
        }
    }

    /// `Color` (storage not yet allocated) inside `regions`, `Empty`
    /// elsewhere -- the partially-backed image describes.
    pub fn new_partially_backed(size: (u32, u32), regions: &[TileRegion]) -> Self {
        let mut level = Self::new_empty(size);
        for tile_y in 0..level.tiles_per_column {
            for tile_x in 0..level.tiles_per_row {
                if regions.iter().any(|r| r.contains(tile_x, tile_y)) {
                    level.set(tile_x, tile_y, TileClassification::Color(None));
                }
            }
        }
        level
    }

    pub const fn size(&self) -> (u32, u32) {
        self.size
    }

    pub const fn tiles_per_row(&self) -> u32 {
        self.tiles_per_row
    }

    pub const fn tiles_per_column(&self) -> u32 {
        self.tiles_per_column
    }

    fn index(&self, tile_x: u32, tile_y: u32) -> usize {
        debug_assert!(tile_x < self.tiles_per_row && tile_y < self.tiles_per_column);
        (tile_y * self.tiles_per_row + tile_x) as usize
    }

    pub fn get(&self, tile_x: u32, tile_y: u32) -> TileClassification {
        self.tiles[self.index(tile_x, tile_y)]
    }

    pub fn set(&mut self, tile_x: u32, tile_y: u32, classification: TileClassification) {
        let index = self.index(tile_x, tile_y);
        self.tiles[index] = classification;
    }

    pub fn iter_tiles(&self) -> impl Iterator<Item = (u32, u32, TileClassification)> + '_ {
        self.tiles.iter().enumerate().map(move |(index, &c)| {
            let index = index as u32;
            (index % self.tiles_per_row, index / self.tiles_per_row, c)
        })
    }

    /// Tiles whose [`TileClassification::Color`] storage is reserved but not
    /// yet allocated -- exactly the tiles `ImageAtlas::mark_in_use` must
    /// service.
    pub fn pending_color_tiles(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.iter_tiles()
            .filter(|&(_, _, c)| matches!(c, TileClassification::Color(None)))
            .map(|(x, y, _)| (x, y))
    }
}

/// Two consecutive mip levels sharing one backing allocation decision
///; the final element of a chain may hold only one.
#[derive(Debug, Clone)]
pub struct ImageMipElement {
    level0: MipLevel,
    level1: Option<MipLevel>,
}

impl ImageMipElement {
    pub fn new(level0: MipLevel, level1: Option<MipLevel>) -> Self {
        Self { level0, level1 }
    }

    /// Half of `size`, rounded up, following the usual mip-chain halving.
    pub fn half_size(size: (u32, u32)) -> (u32, u32) {
        (size.0.div_ceil(2).max(1), size.1.div_ceil(2).max(1))
    }

    pub fn num_levels(&self) -> u32 {
        if self.level1.is_some() { 2 } else { 1 }
    }

    pub fn level(&self, index: u32) -> Option<&MipLevel> {
        match index {
            0 => Some(&self.level0),
            1 => self.level1.as_ref(),
            _ => None,
        }
    }

    pub fn level_mut(&mut self, index: u32) -> Option<&mut MipLevel> {
        match index {
            0 => Some(&mut self.level0),
            1 => self.level1.as_mut(),
            _ => None,
        }
    }

    pub fn is_dangling_tail(&self) -> bool {
        self.level1.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partially_backed_level_marks_only_requested_regions() {
        let region = TileRegion {
            tile_x: 1,
            tile_y: 0,
            tiles_wide: 1,
            tiles_high: 1,
        };
        let level = MipLevel::new_partially_backed((96, 32), &[region]);
        assert_eq!(level.tiles_per_row(), 3);
        assert!(level.get(1, 0).is_color());
        assert!(level.get(0, 0).is_empty());
        assert!(level.get(2, 0).is_empty());
    }

    #[test]
    fn pending_color_tiles_lists_unallocated_color_tiles_only() {
        let region = TileRegion {
            tile_x: 0,
            tile_y: 0,
            tiles_wide: 2,
            tiles_high: 1,
        };
        let mut level = MipLevel::new_partially_backed((64, 32), &[region]);
        level.set(1, 0, TileClassification::Color(Some(interval_atlas::TileKey::EMPTY)));
        let pending: Vec<_> = level.pending_color_tiles().collect();
        assert_eq!(pending, vec![(0, 0)]);
    }

    #[test]
    fn mip_element_without_second_level_is_dangling_tail() {
        let element = ImageMipElement::new(MipLevel::new_empty((4, 4)), None);
        assert_eq!(element.num_levels(), 1);
        assert!(element.is_dangling_tail());
    }
}
