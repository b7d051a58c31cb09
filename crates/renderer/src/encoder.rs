//! Encoder façades: a single `Encoder` handle type over a
//! `VirtualBuffer`, tagged with the kind of surface it was opened for,
//! rather than a deep `RenderEncoderBase` subclass hierarchy. Staleness
//! across a `begin`/`end` pair is detected by comparing a generation
//! counter captured at creation against the live one.

use astral_geom::{ClipGeometry, ClipGeometryGroup, Transformation};
use render_protocol::{Colorspace, ContourSource, FillStcPass, MaskChannel, MaskType, VertexRange};

use crate::command_list::DrawCommand;
use crate::scheduler::Renderer;
use crate::stc::BoundingBox;
use crate::virtual_buffer::{VirtualBuffer, VirtualBufferId, VirtualBufferKind};

/// Which public façade an `Encoder` was opened as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    Surface,
    Image,
    Mask,
    ShadowMap,
    Layer,
    StrokeMask,
}

impl EncoderKind {
    const fn accepts_path_strokes(self) -> bool {
        matches!(self, EncoderKind::Mask | EncoderKind::StrokeMask)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EncoderError {
    /// `begin_cnt` moved on since this handle was created, or the buffer it
    /// names was dropped.
    #[error("encoder handle is stale: used across a begin/end pair or after its buffer was released")]
    Stale,
    #[error("operation is not valid for an encoder of kind {0:?}")]
    WrongKind(EncoderKind),
}

/// `clip_element`: names a channel/mask-type interpretation of
/// a buffer's image, without re-deriving the interpretation each call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderClipElement {
    buffer: VirtualBufferId,
    mask_type: MaskType,
    mask_channel: MaskChannel,
}

impl RenderClipElement {
    pub const fn buffer(&self) -> VirtualBufferId {
        self.buffer
    }

    pub const fn mask_type(&self) -> MaskType {
        self.mask_type
    }

    pub const fn mask_channel(&self) -> MaskChannel {
        self.mask_channel
    }
}

/// Inputs to `generate_child_buffer` that describe the image the child
/// buffer renders into.
#[derive(Debug, Clone, Copy)]
pub struct ImageSpec {
    pub num_mip_levels: u32,
    pub colorspace: Colorspace,
}

/// A lightweight, `Copy` handle over one `VirtualBuffer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoder {
    buffer: VirtualBufferId,
    kind: EncoderKind,
    begin_cnt: u64,
}

impl Encoder {
    pub(crate) const fn new(buffer: VirtualBufferId, kind: EncoderKind, begin_cnt: u64) -> Self {
        Self { buffer, kind, begin_cnt }
    }

    pub const fn kind(&self) -> EncoderKind {
        self.kind
    }

    pub const fn buffer_id(&self) -> VirtualBufferId {
        self.buffer
    }

    fn live<'r>(&self, renderer: &'r mut Renderer) -> Result<&'r mut VirtualBuffer, EncoderError> {
        if renderer.begin_cnt() != self.begin_cnt {
            return Err(EncoderError::Stale);
        }
        renderer.buffer_mut(self.buffer).ok_or(EncoderError::Stale)
    }

    pub fn draw_generic(
        &self,
        renderer: &mut Renderer,
        command: DrawCommand,
        has_partial_coverage_material: bool,
    ) -> Result<(), EncoderError> {
        self.live(renderer)?.draw_generic(command, has_partial_coverage_material);
        Ok(())
    }

    pub fn add_occluder(&self, renderer: &mut Renderer, command: DrawCommand) -> Result<(), EncoderError> {
        self.live(renderer)?.add_occluder(command);
        Ok(())
    }

    /// `begin_pause_snapshot`: the returned guard borrows the
    /// live `VirtualBuffer` for its lifetime, so the caller must drop it
    /// before making another `Encoder` call against the same buffer.
    pub fn begin_pause_snapshot<'r>(
        &self,
        renderer: &'r mut Renderer,
    ) -> Result<crate::virtual_buffer::PauseSnapshotGuard<'r>, EncoderError> {
        Ok(self.live(renderer)?.begin_pause_snapshot())
    }

    /// `copy_commands`: moves commands (and, for mask
    /// encoders, STC sub-ranges) from `src`'s buffer into this one.
    pub fn copy_commands(
        &self,
        renderer: &mut Renderer,
        src: Encoder,
        bb: BoundingBox,
        bb_pad: f32,
        delete_contained: bool,
    ) -> Result<(), EncoderError> {
        if renderer.begin_cnt() != self.begin_cnt || renderer.begin_cnt() != src.begin_cnt {
            return Err(EncoderError::Stale);
        }
        let Some([dst_buffer, src_buffer]) = renderer.buffer_pair_mut(self.buffer, src.buffer) else {
            return Err(EncoderError::Stale);
        };
        dst_buffer.copy_commands(src_buffer, bb, bb_pad, delete_contained);
        Ok(())
    }

    pub fn issue_finish(&self, renderer: &mut Renderer) -> Result<(), EncoderError> {
        self.live(renderer)?.issue_finish();
        Ok(())
    }

    pub fn add_dependency(&self, renderer: &mut Renderer, dependency: Encoder) -> Result<(), EncoderError> {
        self.live(renderer)?.add_dependency(dependency.buffer);
        Ok(())
    }

    /// `generate_child_buffer`: intersects this buffer's
    /// clip geometry with `relative_bbox` mapped through the current
    /// transformation, pads by `pixel_slack`, scales by `scale_factor`,
    /// and clips the result to the tile grid.
    pub fn generate_child_buffer(
        &self,
        renderer: &mut Renderer,
        kind: VirtualBufferKind,
        relative_bbox: BoundingBox,
        pixel_slack: f32,
        scale_factor: f32,
        image_spec: ImageSpec,
        tile_size: u32,
    ) -> Result<Encoder, EncoderError> {
        let begin_cnt = renderer.begin_cnt();
        if begin_cnt != self.begin_cnt {
            return Err(EncoderError::Stale);
        }
        let parent = renderer.buffer(self.buffer).ok_or(EncoderError::Stale)?;
        let parent_transform = parent.transformation().transformation();
        let inherited = parent_transform;
        let parent_clip = parent.clip_geometry_group().map(|g| g.geometry().bounding_box());

        let mapped = map_bounding_box(relative_bbox, parent_transform);
        let padded = (
            mapped.0 - pixel_slack,
            mapped.1 - pixel_slack,
            mapped.2 + pixel_slack,
            mapped.3 + pixel_slack,
        );
        let intersected = match parent_clip.flatten() {
            Some(parent_bb) => intersect(padded, parent_bb),
            None => padded,
        };
        let scaled = (
            intersected.0 * scale_factor,
            intersected.1 * scale_factor,
            intersected.2 * scale_factor,
            intersected.3 * scale_factor,
        );
        let clipped = clip_to_tile_grid(scaled, tile_size);

        let width = (clipped.2 - clipped.0).max(0.0).round() as u32;
        let height = (clipped.3 - clipped.1).max(0.0).round() as u32;
        let child_kind = crate::virtual_buffer::classify_kind_for_region(kind, (width, height));

        let child_id = renderer.insert_buffer(child_kind);
        if let Some(child) = renderer.buffer_mut(child_id) {
            child.set_render_size((width, height));
            child.transformation_mut().set_transformation(inherited);

            let geometry = ClipGeometry::new(
                vec![
                    (clipped.0, clipped.1),
                    (clipped.2, clipped.1),
                    (clipped.2, clipped.3),
                    (clipped.0, clipped.3),
                ],
                (scale_factor, scale_factor),
                (0.0, 0.0),
            );
            child.set_clip_geometry_group(ClipGeometryGroup::new(geometry, (width, height), tile_size));
        }
        if !child_kind.is_structural() {
            let mip_element = renderer
                .atlas_mut()
                .create_mip_element((width, height), image_spec.num_mip_levels, &[]);
            let render_tag = renderer.alloc_render_tag();
            let image = renderer.atlas_mut().create_rendered_image(
                render_tag,
                vec![mip_element],
                image_spec.colorspace,
            );
            let image_id = renderer.atlas_mut().register(image);
            if let Some(child) = renderer.buffer_mut(child_id) {
                child.set_image(image_id);
            }
        }

        Ok(Encoder { buffer: child_id, kind: self.kind, begin_cnt })
    }

    /// `image_with_mips`: chains `max_lod` child buffers, each
    /// sampling and downsampling the previous level; depends on its parent
    /// so the scheduler renders levels in order.
    pub fn image_with_mips(
        &self,
        renderer: &mut Renderer,
        max_lod: u32,
        image_spec: ImageSpec,
        tile_size: u32,
    ) -> Result<Vec<Encoder>, EncoderError> {
        let mut chain = Vec::new();
        let mut previous = *self;
        let mut size = renderer.buffer(self.buffer).ok_or(EncoderError::Stale)?.render_size();
        for _ in 0..max_lod {
            size = tile_atlas::ImageMipElement::half_size(size);
            let child = previous.generate_child_buffer(
                renderer,
                VirtualBufferKind::SubImageBuffer { parent: previous.buffer },
                (0.0, 0.0, size.0 as f32, size.1 as f32),
                0.0,
                0.5,
                image_spec,
                tile_size,
            )?;
            child.add_dependency(renderer, previous)?;
            chain.push(child);
            previous = child;
        }
        Ok(chain)
    }

    /// `clip_element`: memoised per `(buffer, mask_type,
    /// mask_channel)` on the `Renderer` so repeated calls with the same
    /// arguments return the same interpretation without re-deriving it.
    pub fn clip_element(
        &self,
        renderer: &mut Renderer,
        mask_type: MaskType,
        mask_channel: MaskChannel,
    ) -> Result<RenderClipElement, EncoderError> {
        if renderer.begin_cnt() != self.begin_cnt {
            return Err(EncoderError::Stale);
        }
        Ok(renderer.clip_element_cache_mut().entry((self.buffer, mask_type, mask_channel)).or_insert(
            RenderClipElement { buffer: self.buffer, mask_type, mask_channel },
        ).clone())
    }

    /// resolved Open Question: `RenderEncoderMask::add_path_strokes`
    /// appends the stroke's approximated geometry as STC `contour_fuzz`
    /// only -- a stroke has no interior/exterior, so it contributes AA
    /// coverage and never stencil winding. `allocate_vertex_range` is the
    /// caller-supplied bridge to the (out-of-scope) backend streaming
    /// allocator that actually uploads each curve's vertices.
    pub fn add_path_strokes<C: ContourSource>(
        &self,
        renderer: &mut Renderer,
        source: &C,
        tolerance: f32,
        mut allocate_vertex_range: impl FnMut(&C::Curve) -> (VertexRange, Option<BoundingBox>),
    ) -> Result<(), EncoderError> {
        if !self.kind.accepts_path_strokes() {
            // Reported as a recoverable error, not a panic: callers may hold
            // an `Encoder` of unknown kind (e.g. from a generic cache) and
            // need to branch on this rather than crash.
            return Err(EncoderError::WrongKind(self.kind));
        }
        let buffer = self.live(renderer)?;
        for curve in source.stroke_approximated_geometry(tolerance) {
            let (vertices, bounding_box) = allocate_vertex_range(&curve);
            buffer
                .stc_mut()
                .pass_mut(FillStcPass::ContourFuzz)
                .add_range(vertices, bounding_box);
        }
        Ok(())
    }
}

fn map_bounding_box(bb: BoundingBox, transform: Transformation) -> BoundingBox {
    let corners = [(bb.0, bb.1), (bb.2, bb.1), (bb.2, bb.3), (bb.0, bb.3)];
    let mapped: Vec<(f32, f32)> = corners
        .iter()
        .map(|&(x, y)| {
            let m = transform.matrix;
            (
                m.m00 * x + m.m01 * y + transform.translate.0,
                m.m10 * x + m.m11 * y + transform.translate.1,
            )
        })
        .collect();
    let min_x = mapped.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let min_y = mapped.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    let max_x = mapped.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
    let max_y = mapped.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);
    (min_x, min_y, max_x, max_y)
}

fn intersect(a: BoundingBox, b: BoundingBox) -> BoundingBox {
    (a.0.max(b.0), a.1.max(b.1), a.2.min(b.2), a.3.min(b.3))
}

fn clip_to_tile_grid(bb: BoundingBox, tile_size: u32) -> BoundingBox {
    let ts = tile_size as f32;
    (
        (bb.0 / ts).floor() * ts,
        (bb.1 / ts).floor() * ts,
        (bb.2 / ts).ceil() * ts,
        (bb.3 / ts).ceil() * ts,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{RendererConfig, StcShaders};
    use render_protocol::{ClipWindowStrategy, ShaderId, UberShaderMethod};
    use tile_atlas::ImageAtlas;

    fn renderer() -> Renderer {
        let atlas = ImageAtlas::new(interval_atlas::AtlasLayout::Tiny8, interval_atlas::BackendId::new(0));
        let shadow_atlas = ImageAtlas::new(interval_atlas::AtlasLayout::Tiny8, interval_atlas::BackendId::new(1));
        Renderer::new(
            atlas,
            shadow_atlas,
            RendererConfig {
                clip_window_strategy: ClipWindowStrategy::DepthOcclude,
                uber_shader_method: UberShaderMethod::None,
                stc_shaders: StcShaders {
                    contour_stencil: ShaderId(1),
                    conic_triangles_stencil: ShaderId(2),
                    conic_triangle_fuzz: ShaderId(3),
                    contour_fuzz: ShaderId(4),
                },
            },
        )
    }

    #[test]
    fn stale_handle_is_rejected_after_begin_cnt_moves() {
        let mut renderer = renderer();
        let encoder = renderer.create_encoder(VirtualBufferKind::ImageBuffer, EncoderKind::Image);
        renderer.begin();
        let result = encoder.issue_finish(&mut renderer);
        assert_eq!(result, Err(EncoderError::Stale));
    }

    #[test]
    fn live_handle_issues_finish() {
        let mut renderer = renderer();
        let encoder = renderer.create_encoder(VirtualBufferKind::ImageBuffer, EncoderKind::Image);
        encoder.issue_finish(&mut renderer).unwrap();
        assert_eq!(
            renderer.buffer(encoder.buffer_id()).unwrap().state(),
            crate::virtual_buffer::VirtualBufferState::Finished
        );
    }

    #[test]
    fn clip_element_is_memoised_for_the_same_arguments() {
        let mut renderer = renderer();
        let encoder = renderer.create_encoder(VirtualBufferKind::ImageBuffer, EncoderKind::Image);
        let first = encoder.clip_element(&mut renderer, MaskType::Coverage, MaskChannel::R).unwrap();
        let second = encoder.clip_element(&mut renderer, MaskType::Coverage, MaskChannel::R).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn add_path_strokes_rejects_non_mask_encoders() {
        let mut renderer = renderer();
        let encoder = renderer.create_encoder(VirtualBufferKind::ImageBuffer, EncoderKind::Image);

        struct NoCurves;
        impl ContourSource for NoCurves {
            type Curve = ();
            fn fill_approximated_geometry(&self, _tolerance: f32) -> Vec<()> {
                Vec::new()
            }
            fn stroke_approximated_geometry(&self, _tolerance: f32) -> Vec<()> {
                Vec::new()
            }
        }

        let result = encoder.add_path_strokes(&mut renderer, &NoCurves, 0.1, |_| {
            (VertexRange { begin: 0, end: 0 }, None)
        });
        assert_eq!(result, Err(EncoderError::WrongKind(EncoderKind::Image)));
    }
}
