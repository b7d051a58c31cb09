//! `MaskDrawer`: converts a mask `Image` + channel + filter
//! into per-tile draw calls against a material.

use astral_geom::Transformation;
use render_protocol::{
    Filter, MaskChannel, MaskType, RenderBackend, RenderValue, ScaleTranslate, ShaderId,
    VertexRange,
};
use tile_atlas::{Image, TileClassification};

use crate::command_list::{DrawCommand, RenderValueBundle};
use crate::filler::{ClipCombineDecision, ClipCombineMode, TileFillState, clip_combine_decision};
use crate::virtual_buffer::VirtualBuffer;

/// A mask tile's coverage, restated as the `TileFillState` the clip-combine
/// dispatch (`.7`) reasons about: a color tile genuinely mixes
/// coverage within its pixels, white is fully covered, empty is fully
/// uncovered.
fn fill_state_for_tile(classification: TileClassification) -> TileFillState {
    match classification {
        TileClassification::Color(_) => TileFillState::Mixed,
        TileClassification::White => TileFillState::Inside,
        TileClassification::Empty => TileFillState::Outside,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostSamplingMode {
    Direct,
    Inverted,
}

/// The two shader families `MaskDrawer` emits into.
#[derive(Debug, Clone, Copy)]
pub struct MaskDrawerShaders {
    pub masked_rect: ShaderId,
    pub material_rect: ShaderId,
}

pub struct MaskDrawRequest<'a> {
    pub mask_image: &'a Image,
    pub mask_channel: MaskChannel,
    pub mask_type: MaskType,
    pub filter: Filter,
    pub post_sampling_mode: PostSamplingMode,
    pub material: RenderValue<render_protocol::Brush>,
    /// Logical-to-mask-pixel transform.
    pub mask_to_logical: Transformation,
    /// Logical-to-material transform, composed with the inverse of
    /// `mask_to_logical` so the material samples consistently regardless of
    /// the mask's placement.
    pub material_to_logical: Transformation,
    /// When this mask is being drawn as a `ClipElement` combined against an
    /// already-classified fill tile, the mode that decides whether each tile
    /// is reused from the clip buffer directly or re-rendered. `None` when
    /// this draw has no overlapping fill tile to combine against.
    pub clip_combine_mode: Option<ClipCombineMode>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaskDrawStats {
    pub masked_rects: u32,
    pub material_rects: u32,
    /// Tiles whose `ClipElement` was borrowed directly instead of
    /// re-rendered, per `clip_combine_decision`.
    pub clip_tiles_reused: u32,
}

/// Scans shader properties and always returns true; kept as a full scan
/// rather than short-circuited to true, since nothing here depends on
/// telling the two cases apart yet.
pub fn emits_partially_covered_fragments(_mask_type: MaskType) -> bool {
    true
}

pub fn emits_transparent_fragments(_mask_channel: MaskChannel) -> bool {
    true
}

pub struct MaskDrawer {
    pub shaders: MaskDrawerShaders,
}

impl MaskDrawer {
    pub fn new(shaders: MaskDrawerShaders) -> Self {
        Self { shaders }
    }

    /// : walks `request.mask_image`'s tile classification and
    /// emits one `MaskedRectShader` rect per color tile and, depending on
    /// `post_sampling_mode`, one ordinary material rect per white (direct)
    /// or empty (inverted) tile. Surrounded by `pause_snapshot` so snapshot
    /// systems never observe this buffer mid-walk.
    pub fn draw<B: RenderBackend>(
        &self,
        buffer: &mut VirtualBuffer,
        request: &MaskDrawRequest,
        backend: &mut B,
    ) -> MaskDrawStats {
        let _guard = buffer.begin_pause_snapshot();
        let mut stats = MaskDrawStats::default();

        let transparent = emits_transparent_fragments(request.mask_channel);
        let partial_coverage = emits_partially_covered_fragments(request.mask_type);

        let Some(level) = request.mask_image.mip_elements().first().and_then(|e| e.level(0)) else {
            return stats;
        };

        let composed = request.material_to_logical.concat(request.mask_to_logical.inverse());
        let transformation = backend.create_value(composed);

        for (tile_x, tile_y, classification) in level.iter_tiles() {
            if let Some(mode) = request.clip_combine_mode {
                let fill_state = fill_state_for_tile(classification);
                if let ClipCombineDecision::ReuseClipTile = clip_combine_decision(mode, fill_state) {
                    stats.clip_tiles_reused += 1;
                    continue;
                }
            }

            match classification {
                TileClassification::Color(_) => {
                    let command =
                        self.masked_rect_command(tile_x, tile_y, request, transparent, transformation);
                    buffer.draw_generic(command, partial_coverage);
                    stats.masked_rects += 1;
                }
                TileClassification::White if request.post_sampling_mode == PostSamplingMode::Direct => {
                    let command =
                        self.material_rect_command(tile_x, tile_y, request, transparent, transformation);
                    buffer.draw_generic(command, partial_coverage);
                    stats.material_rects += 1;
                }
                TileClassification::Empty if request.post_sampling_mode == PostSamplingMode::Inverted => {
                    let command =
                        self.material_rect_command(tile_x, tile_y, request, transparent, transformation);
                    buffer.draw_generic(command, partial_coverage);
                    stats.material_rects += 1;
                }
                _ => {}
            }
        }

        stats
    }

    fn masked_rect_command(
        &self,
        tile_x: u32,
        tile_y: u32,
        request: &MaskDrawRequest,
        transparent: bool,
        transformation: RenderValue<render_protocol::Transformation>,
    ) -> DrawCommand {
        self.tile_command(
            self.shaders.masked_rect,
            tile_x,
            tile_y,
            request,
            transparent,
            transformation,
        )
    }

    fn material_rect_command(
        &self,
        tile_x: u32,
        tile_y: u32,
        request: &MaskDrawRequest,
        transparent: bool,
        transformation: RenderValue<render_protocol::Transformation>,
    ) -> DrawCommand {
        self.tile_command(
            self.shaders.material_rect,
            tile_x,
            tile_y,
            request,
            transparent,
            transformation,
        )
    }

    fn tile_command(
        &self,
        shader: ShaderId,
        tile_x: u32,
        tile_y: u32,
        request: &MaskDrawRequest,
        transparent: bool,
        transformation: RenderValue<render_protocol::Transformation>,
    ) -> DrawCommand {
        DrawCommand {
            shader,
            values: RenderValueBundle {
                transformation,
                material: request.material,
                clip_mask: None,
                fb_fetch_emulation: None,
            },
            blend_mode: render_protocol::BlendMode::SrcOver,
            vertex_range: VertexRange { begin: 0, end: 6 },
            scale_translate: ScaleTranslate {
                scale: (1, 1),
                translate: (tile_x as i32, tile_y as i32),
            },
            clip_window: None,
            permute_xy: false,
            z: 0,
            emits_transparent_fragments: transparent,
            bounding_box: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use render_protocol::{
        BlendMode, ClearParams, ClipWindowStrategy, ColorWriteMask, Colorspace, DepthBufferMode,
        DrawRenderDataRequest, FrameStats, RenderTargetId, StencilState, UberShaderMethod,
        UberShadingKey,
    };
    use slotmap::SlotMap;
    use tile_atlas::{Image, ImageKind, ImageMipElement, MipLevel, TileRegion};

    struct NullBackend;

    impl RenderBackend for NullBackend {
        type Error = std::convert::Infallible;
        fn begin(&mut self) {}
        fn end(&mut self, _stats_out: &mut FrameStats) {}
        fn create_value<T: 'static>(&mut self, _value: T) -> RenderValue<T> {
            RenderValue::new(0)
        }
        fn draw_render_data(&mut self, _request: DrawRenderDataRequest) -> Result<(), Self::Error> {
            Ok(())
        }
        fn begin_render_target(&mut self, _clear: ClearParams, _target: RenderTargetId) {}
        fn end_render_target(&mut self) {}
        fn set_stencil_state(&mut self, _state: StencilState) {}
        fn color_write_mask(&mut self, _mask: ColorWriteMask) {}
        fn depth_buffer_mode(&mut self, _mode: DepthBufferMode) {}
        fn set_fragment_shader_emit(&mut self, _colorspace: Colorspace) {}
        fn begin_accumulate(&mut self, _clip_kind: ClipWindowStrategy, _method: UberShaderMethod) {}
        fn accumulate_shader(&mut self, _shader: ShaderId) {}
        fn end_accumulate(&mut self) -> UberShadingKey {
            UberShadingKey::new(0)
        }
        fn uber_shader_of_all(&self) -> UberShadingKey {
            UberShadingKey::new(0)
        }
        fn requires_framebuffer_pixels(&self, _blend_mode: BlendMode) -> bool {
            false
        }
    }

    fn buffer() -> VirtualBuffer {
        let mut map: SlotMap<crate::virtual_buffer::VirtualBufferId, ()> = SlotMap::with_key();
        let id = map.insert(());
        VirtualBuffer::new(id, crate::virtual_buffer::VirtualBufferKind::ImageBuffer)
    }

    /// scenario 5: 4 color tiles, 5 white tiles, 7 empty tiles,
    /// `post_sampling_mode=direct` -> 4 masked-rect draws + 5 material rects,
    /// no draws for the empty tiles.
    fn scenario_5_image() -> Image {
        // 4x4 grid = 16 tiles: 4 color, 5 white, 7 empty.
        let mut level = MipLevel::new_empty((128, 128));
        let color_region = TileRegion { tile_x: 0, tile_y: 0, tiles_wide: 2, tiles_high: 2 };
        for ty in 0..2 {
            for tx in 0..2 {
                let _ = color_region;
                level.set(tx, ty, TileClassification::Color(None));
            }
        }
        for tx in 2..4 {
            for ty in 0..2 {
                level.set(tx, ty, TileClassification::White);
            }
        }
        level.set(0, 2, TileClassification::White);
        level.set(1, 2, TileClassification::White);
        level.set(2, 2, TileClassification::Empty);
        level.set(3, 2, TileClassification::Empty);
        level.set(0, 3, TileClassification::Empty);
        level.set(1, 3, TileClassification::Empty);
        level.set(2, 3, TileClassification::Empty);
        level.set(3, 3, TileClassification::Empty);

        let element = ImageMipElement::new(level, None);
        Image::new(
            tile_atlas_image_id_for_test(),
            ImageKind::Assembled,
            render_protocol::Colorspace::Linear,
            vec![element],
        )
    }

    fn tile_atlas_image_id_for_test() -> tile_atlas::ImageId {
        let mut atlas = tile_atlas::ImageAtlas::new(interval_atlas::AtlasLayout::Tiny8, interval_atlas::BackendId::new(0));
        let image = atlas.create_image(1, (4, 4));
        atlas.register(image)
    }

    #[test]
    fn scenario_5_emits_expected_draw_counts() {
        let image = scenario_5_image();
        let mut buffer = buffer();
        let request = MaskDrawRequest {
            mask_image: &image,
            mask_channel: MaskChannel::R,
            mask_type: MaskType::Coverage,
            filter: Filter::Linear,
            post_sampling_mode: PostSamplingMode::Direct,
            material: RenderValue::invalid(),
            mask_to_logical: Transformation::default(),
            material_to_logical: Transformation::default(),
            clip_combine_mode: None,
        };
        let drawer = MaskDrawer::new(MaskDrawerShaders {
            masked_rect: ShaderId(1),
            material_rect: ShaderId(2),
        });
        let stats = drawer.draw(&mut buffer, &request, &mut NullBackend);
        assert_eq!(stats.masked_rects, 4);
        assert_eq!(stats.material_rects, 5);
    }

    #[test]
    fn draw_resolves_material_transform_through_the_backend() {
        let image = scenario_5_image();
        let mut buffer = buffer();
        let request = MaskDrawRequest {
            mask_image: &image,
            mask_channel: MaskChannel::R,
            mask_type: MaskType::Coverage,
            filter: Filter::Linear,
            post_sampling_mode: PostSamplingMode::Direct,
            material: RenderValue::invalid(),
            mask_to_logical: Transformation::default(),
            material_to_logical: Transformation::default(),
            clip_combine_mode: None,
        };
        let drawer = MaskDrawer::new(MaskDrawerShaders {
            masked_rect: ShaderId(1),
            material_rect: ShaderId(2),
        });
        drawer.draw(&mut buffer, &request, &mut NullBackend);
        let command = buffer.commands().unwrap().typicals().first().unwrap();
        assert!(
            command.values.transformation.valid(),
            "transformation must be resolved through the backend, not left invalid"
        );
    }

    #[test]
    fn clip_combine_mode_reuses_tiles_the_fill_already_resolves() {
        let image = scenario_5_image();
        let mut buffer = buffer();
        let request = MaskDrawRequest {
            mask_image: &image,
            mask_channel: MaskChannel::R,
            mask_type: MaskType::Coverage,
            filter: Filter::Linear,
            post_sampling_mode: PostSamplingMode::Direct,
            material: RenderValue::invalid(),
            mask_to_logical: Transformation::default(),
            material_to_logical: Transformation::default(),
            clip_combine_mode: Some(crate::filler::ClipCombineMode::Both),
        };
        let drawer = MaskDrawer::new(MaskDrawerShaders {
            masked_rect: ShaderId(1),
            material_rect: ShaderId(2),
        });
        let stats = drawer.draw(&mut buffer, &request, &mut NullBackend);
        // the 7 empty tiles map to TileFillState::Outside, which always
        // reuses the clip tile regardless of combine mode; the 4 color and
        // 5 white tiles still draw since they're Mixed/Inside.
        assert_eq!(stats.masked_rects, 4);
        assert_eq!(stats.material_rects, 5);
        assert_eq!(stats.clip_tiles_reused, 7);
    }

    #[test]
    fn inverted_mode_draws_material_for_empty_tiles_only() {
        let image = scenario_5_image();
        let mut buffer = buffer();
        let request = MaskDrawRequest {
            mask_image: &image,
            mask_channel: MaskChannel::R,
            mask_type: MaskType::Coverage,
            filter: Filter::Linear,
            post_sampling_mode: PostSamplingMode::Inverted,
            material: RenderValue::invalid(),
            mask_to_logical: Transformation::default(),
            material_to_logical: Transformation::default(),
            clip_combine_mode: None,
        };
        let drawer = MaskDrawer::new(MaskDrawerShaders {
            masked_rect: ShaderId(1),
            material_rect: ShaderId(2),
        });
        let stats = drawer.draw(&mut buffer, &request, &mut NullBackend);
        assert_eq!(stats.masked_rects, 4);
        assert_eq!(stats.material_rects, 7);
    }
}
