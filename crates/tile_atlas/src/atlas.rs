//! `ImageAtlas`: the tile-backed image factory and its
//! lock/reclaim/flush lifecycle. This crate owns tile *allocation
//! decisions* only -- which [`TileKey`] names which color tile -- never GPU
//! storage, which is the backend's job.

use std::collections::{HashMap, HashSet};

use interval_atlas::{AtlasLayout, BackendId, LayeredRectAtlas, LayeredRectAtlasError, TileKey};
use render_protocol::Colorspace;

use crate::TILE_SIZE_WITHOUT_PADDING;
use crate::image::{Image, ImageId, ImageKind, RenderTag};
use crate::mip_element::{ImageMipElement, MipLevel, TileClassification, TileRegion};

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum ImageAtlasError {
    #[error("image atlas has no free color tile slots")]
    AtlasFull,
    #[error("image id is not registered in this atlas")]
    UnknownImage,
}

impl From<LayeredRectAtlasError> for ImageAtlasError {
    fn from(_: LayeredRectAtlasError) -> Self {
        ImageAtlasError::AtlasFull
    }
}

/// : tile-backed image factory plus the frame-scoped
/// lock/unlock guard that keeps a color tile from being reclaimed while a
/// frame is in flight.
pub struct ImageAtlas {
    color_tiles: LayeredRectAtlas,
    images: HashMap<ImageId, Image>,
    next_image_id: u64,
    lock_depth: u32,
    reclaim_queue: Vec<TileKey>,
    visible_tiles: HashSet<TileKey>,
    pending_blit: Vec<TileKey>,
}

impl ImageAtlas {
    pub fn new(layout: AtlasLayout, backend_id: BackendId) -> Self {
        Self {
            color_tiles: LayeredRectAtlas::new(layout, backend_id),
            images: HashMap::new(),
            next_image_id: 0,
            lock_depth: 0,
            reclaim_queue: Vec::new(),
            visible_tiles: HashSet::new(),
            pending_blit: Vec::new(),
        }
    }

    fn allocate_image_id(&mut self) -> ImageId {
        let id = ImageId::new(self.next_image_id);
        self.next_image_id += 1;
        id
    }

    fn build_fully_backed_chain(&mut self, num_mip_levels: u32, size: (u32, u32)) -> Vec<ImageMipElement> {
        let mut elements = Vec::new();
        let mut remaining = num_mip_levels.max(1);
        let mut level_size = size;
        while remaining > 0 {
            let level0 = MipLevel::new_partially_backed(
                level_size,
                &[full_region(level0_tile_dims(level_size))],
            );
            if remaining == 1 {
                elements.push(ImageMipElement::new(level0, None));
                break;
            }
            let half = ImageMipElement::half_size(level_size);
            let level1 = MipLevel::new_partially_backed(half, &[full_region(level0_tile_dims(half))]);
            elements.push(ImageMipElement::new(level0, Some(level1)));
            remaining -= 2;
            level_size = ImageMipElement::half_size(half);
        }
        elements
    }

    /// `create_image`: a fully-backed (every tile reserved as
    /// `Color`, storage allocated lazily) image with `num_mip_levels` levels.
    pub fn create_image(&mut self, num_mip_levels: u32, size: (u32, u32)) -> Image {
        let mip_elements = self.build_fully_backed_chain(num_mip_levels, size);
        let id = self.allocate_image_id();
        let image = Image::new(id, ImageKind::Assembled, Colorspace::Linear, mip_elements);
        image
    }

    /// `create_mip_element`: only tiles inside `tile_regions`
    /// become `Color` tiles; the rest stay `Empty`.
    pub fn create_mip_element(
        &self,
        size: (u32, u32),
        num_levels: u32,
        tile_regions: &[TileRegion],
    ) -> ImageMipElement {
        let level0 = MipLevel::new_partially_backed(size, tile_regions);
        if num_levels <= 1 {
            return ImageMipElement::new(level0, None);
        }
        let half = ImageMipElement::half_size(size);
        let half_regions: Vec<TileRegion> = tile_regions
            .iter()
            .map(|r| TileRegion {
                tile_x: r.tile_x / 2,
                tile_y: r.tile_y / 2,
                tiles_wide: r.tiles_wide.div_ceil(2).max(1),
                tiles_high: r.tiles_high.div_ceil(2).max(1),
            })
            .collect();
        let level1 = MipLevel::new_partially_backed(half, &half_regions);
        ImageMipElement::new(level0, Some(level1))
    }

    /// `create_rendered_image`: ties the image to a
    /// `VirtualBuffer` render job via `render_tag`.
    pub fn create_rendered_image(
        &mut self,
        render_tag: RenderTag,
        mip_chain: Vec<ImageMipElement>,
        colorspace: Colorspace,
    ) -> Image {
        let id = self.allocate_image_id();
        Image::new(id, ImageKind::Rendered { render_tag }, colorspace, mip_chain)
    }

    pub fn register(&mut self, image: Image) -> ImageId {
        let id = image.id();
        self.images.insert(id, image);
        id
    }

    pub fn image(&self, id: ImageId) -> Option<&Image> {
        self.images.get(&id)
    }

    pub fn image_mut(&mut self, id: ImageId) -> Option<&mut Image> {
        self.images.get_mut(&id)
    }

    /// During a frame, locked resources cannot be reclaimed; unlock permits
    /// tile recycling once no references remain.
    pub fn lock_resources(&mut self) {
        self.lock_depth += 1;
    }

    pub fn unlock_resources(&mut self) {
        debug_assert!(self.lock_depth > 0, "unlock_resources called without a matching lock");
        self.lock_depth = self.lock_depth.saturating_sub(1);
        if self.lock_depth == 0 {
            for key in self.reclaim_queue.drain(..) {
                let _ = self.color_tiles.free(key);
            }
        }
    }

    pub const fn is_locked(&self) -> bool {
        self.lock_depth > 0
    }

    /// Allocates color-tile storage for every `Color(None)` tile of `image`
    /// and marks it in use. Allocation is lazy: the first time an image
    /// is marked in use after its owning `VirtualBuffer` completes.
    pub fn mark_in_use(&mut self, image_id: ImageId) -> Result<(), ImageAtlasError> {
        let image = self.images.get_mut(&image_id).ok_or(ImageAtlasError::UnknownImage)?;
        for element in image.mip_elements_mut() {
            for level_index in 0..element.num_levels() {
                let Some(level) = element.level_mut(level_index) else {
                    continue;
                };
                let pending: Vec<(u32, u32)> = level.pending_color_tiles().collect();
                for (tile_x, tile_y) in pending {
                    let key = self.color_tiles.alloc()?;
                    level.set(tile_x, tile_y, TileClassification::Color(Some(key)));
                }
            }
        }
        image.mark_in_use();
        Ok(())
    }

    /// Releases every color tile an image owns, honouring `lock_resources`
    /// (queued for reclaim rather than freed immediately while locked).
    pub fn release_image(&mut self, image_id: ImageId) {
        let Some(image) = self.images.remove(&image_id) else {
            return;
        };
        for element in image.mip_elements() {
            for level_index in 0..element.num_levels() {
                let Some(level) = element.level(level_index) else {
                    continue;
                };
                for (_, _, classification) in level.iter_tiles() {
                    if let Some(key) = classification.color_tile_key() {
                        if self.lock_depth > 0 {
                            self.reclaim_queue.push(key);
                        } else {
                            let _ = self.color_tiles.free(key);
                        }
                    }
                }
            }
        }
    }

    /// Queues a tile as having just been blitted this batch; not yet
    /// sample-visible until [`Self::flush`].
    pub fn mark_blitted(&mut self, key: TileKey) {
        self.pending_blit.push(key);
    }

    /// Called by the scheduler after all blits of a scratch batch, making
    /// blitted tiles visible to subsequent samples.
    pub fn flush(&mut self) {
        for key in self.pending_blit.drain(..) {
            self.visible_tiles.insert(key);
        }
    }

    pub fn is_visible(&self, key: TileKey) -> bool {
        self.visible_tiles.contains(&key)
    }

    pub fn allocated_color_tiles(&self) -> u32 {
        self.color_tiles.allocated_slots()
    }
}

fn level0_tile_dims(size: (u32, u32)) -> (u32, u32) {
    (
        size.0.div_ceil(TILE_SIZE_WITHOUT_PADDING).max(1),
        size.1.div_ceil(TILE_SIZE_WITHOUT_PADDING).max(1),
    )
}

fn full_region(tile_dims: (u32, u32)) -> TileRegion {
    TileRegion {
        tile_x: 0,
        tile_y: 0,
        tiles_wide: tile_dims.0,
        tiles_high: tile_dims.1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atlas() -> ImageAtlas {
        ImageAtlas::new(AtlasLayout::Tiny8, BackendId::new(0))
    }

    #[test]
    fn create_image_chain_has_two_levels_per_element_except_tail() {
        let mut atlas = atlas();
        let image = atlas.create_image(5, (128, 128));
        let id = atlas.register(image);
        let image = atlas.image(id).unwrap();
        assert_eq!(image.num_mip_levels(), 5);
        let elements = image.mip_elements();
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0].num_levels(), 2);
        assert_eq!(elements[1].num_levels(), 2);
        assert_eq!(elements[2].num_levels(), 1);
    }

    #[test]
    fn mark_in_use_allocates_storage_for_pending_color_tiles() {
        let mut atlas = atlas();
        let image = atlas.create_image(1, (32, 32));
        let id = atlas.register(image);
        assert_eq!(atlas.allocated_color_tiles(), 0);
        atlas.mark_in_use(id).unwrap();
        assert_eq!(atlas.allocated_color_tiles(), 1);
        assert!(atlas.image(id).unwrap().in_use());
    }

    #[test]
    fn release_while_locked_defers_reclaim_until_unlock() {
        let mut atlas = atlas();
        let image = atlas.create_image(1, (32, 32));
        let id = atlas.register(image);
        atlas.mark_in_use(id).unwrap();
        assert_eq!(atlas.allocated_color_tiles(), 1);

        atlas.lock_resources();
        atlas.release_image(id);
        assert_eq!(atlas.allocated_color_tiles(), 1, "still locked, tile not reclaimed yet");

        atlas.unlock_resources();
        assert_eq!(atlas.allocated_color_tiles(), 0);
    }

    #[test]
    fn flush_makes_blitted_tiles_visible() {
        let mut atlas = atlas();
        let image = atlas.create_image(1, (32, 32));
        let id = atlas.register(image);
        atlas.mark_in_use(id).unwrap();
        let key = atlas.image(id).unwrap().mip_elements()[0]
            .level(0)
            .unwrap()
            .get(0, 0)
            .color_tile_key()
            .unwrap();

        assert!(!atlas.is_visible(key));
        atlas.mark_blitted(key);
        assert!(!atlas.is_visible(key), "not visible until flush");
        atlas.flush();
        assert!(atlas.is_visible(key));
    }

    #[test]
    fn create_mip_element_only_backs_requested_regions() {
        let atlas = atlas();
        let region = TileRegion {
            tile_x: 0,
            tile_y: 0,
            tiles_wide: 1,
            tiles_high: 1,
        };
        let element = atlas.create_mip_element((64, 32), 2, &[region]);
        assert_eq!(element.num_levels(), 2);
        assert!(element.level(0).unwrap().get(0, 0).is_color());
        assert!(element.level(0).unwrap().get(1, 0).is_empty());
    }
}
