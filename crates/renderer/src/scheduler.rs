//! `Renderer` (the scheduler): the ready-queue walk that turns
//! finished `VirtualBuffer`s into backend draw calls, scratch-target
//! batches, and `ImageAtlas` blits.

use std::collections::{HashMap, HashSet};

use render_protocol::{
    BlendMode, ClearParams, ClipWindowStrategy, ColorWriteMask, DepthBufferMode, FillStcPass,
    FrameStats, RenderBackend, RenderTargetId, ShaderId, StencilState, UberShaderMethod,
};
use slotmap::SlotMap;
use tile_atlas::ImageAtlas;

use crate::virtual_buffer::{
    VirtualBuffer, VirtualBufferId, VirtualBufferKind, VirtualBufferState, MAX_RENDERABLE,
};

/// Shader handles `FillSTCShader` is bound to for each of the four STC
/// passes; the scheduler never constructs geometry, it
/// only knows which shader id to submit each pass's vertex ranges under.
#[derive(Debug, Clone, Copy)]
pub struct StcShaders {
    pub contour_stencil: ShaderId,
    pub conic_triangles_stencil: ShaderId,
    pub conic_triangle_fuzz: ShaderId,
    pub contour_fuzz: ShaderId,
}

impl StcShaders {
    fn shader_for(&self, pass: FillStcPass) -> ShaderId {
        match pass {
            FillStcPass::ContourStencil => self.contour_stencil,
            FillStcPass::ConicTrianglesStencil => self.conic_triangles_stencil,
            FillStcPass::ConicTriangleFuzz => self.conic_triangle_fuzz,
            FillStcPass::ContourFuzz => self.contour_fuzz,
        }
    }
}

/// Configuration knobs enumerated in that the scheduler itself
/// consults (as opposed to ones only a material/brush cares about).
#[derive(Debug, Clone, Copy)]
pub struct RendererConfig {
    pub clip_window_strategy: ClipWindowStrategy,
    pub uber_shader_method: UberShaderMethod,
    pub stc_shaders: StcShaders,
}

/// : the one batch of virtual buffers rendered together into a
/// single scratch render target.
#[derive(Debug, Default)]
struct ScratchBatch {
    color: Vec<VirtualBufferId>,
    mask: Vec<VirtualBufferId>,
    /// Shadow-map buffers: depth-min blended into the
    /// same scratch target as the color/mask buffers, rather than into a
    /// dedicated pre-pass -- the dependency DAG already orders a shadow map
    /// that samples another shadow map after its dependency resolves, so a
    /// separate "direct shadow map" pre-pass adds no
    /// ordering the ready-queue walk doesn't already provide.
    shadow: Vec<VirtualBufferId>,
    width: u32,
    height: u32,
}

/// Greedy shelf-packer: lays buffers out left-to-right, wrapping to a new
/// row when the current row would exceed `MAX_RENDERABLE` width, then rounds
/// the summed row heights up to the next power of two.
fn pack_batch(
    ready: &[VirtualBufferId],
    buffers: &SlotMap<VirtualBufferId, VirtualBuffer>,
) -> ScratchBatch {
    let mut batch = ScratchBatch::default();
    let mut row_width = 0u32;
    let mut row_height = 0u32;
    let mut total_height = 0u32;

    for &id in ready {
        let buffer = &buffers[id];
        let (w, h) = buffer.render_size();
        if w == 0 || h == 0 {
            // DegenerateBuffer-sized request: still scheduled, contributes
            // no scratch footprint.
            if buffer.is_mask() {
                batch.mask.push(id);
            } else {
                batch.color.push(id);
            }
            continue;
        }
        if row_width + w > MAX_RENDERABLE && row_width > 0 {
            total_height += row_height;
            row_width = 0;
            row_height = 0;
        }
        row_width += w;
        row_height = row_height.max(h);
        if buffer.is_mask() {
            batch.mask.push(id);
        } else {
            batch.color.push(id);
        }
    }
    total_height += row_height;

    batch.width = MAX_RENDERABLE;
    batch.height = total_height.max(1).next_power_of_two();
    batch
}

/// step 6: the stencil comparison each fill-rule bucket's cover
/// pass uses. Complements invert the equality test; odd/even rules narrow
/// the compared bits to parity.
fn cover_stencil_state(rule: crate::virtual_buffer::FillRule) -> StencilState {
    use crate::virtual_buffer::FillRule;
    let (compare_not_equal_zero, compare_mask) = match rule {
        FillRule::NonZero => (true, StencilState::COVER_MASK_NONZERO),
        FillRule::ComplementNonZero => (false, StencilState::COVER_MASK_NONZERO),
        FillRule::OddEven => (true, StencilState::COVER_MASK_ODD_EVEN),
        FillRule::ComplementOddEven => (false, StencilState::COVER_MASK_ODD_EVEN),
    };
    StencilState {
        incr_on_front_face: false,
        decr_on_back_face: false,
        compare_not_equal_zero,
        compare_mask,
    }
}

/// The CW+1/CCW-1 winding-parity increment pass every STC fill shares,
/// regardless of its eventual fill rule.
const STENCIL_INCREMENT_STATE: StencilState = StencilState {
    incr_on_front_face: true,
    decr_on_back_face: true,
    compare_not_equal_zero: false,
    compare_mask: 0xFF,
};

/// `Renderer`: owns the image atlas, the shadow-map atlas, and
/// every live `VirtualBuffer`, and performs the topological batch-render
/// walk on `end()`. No statics -- every piece of
/// mutable state the scheduler needs is a field here.
pub struct Renderer {
    buffers: SlotMap<VirtualBufferId, VirtualBuffer>,
    atlas: ImageAtlas,
    shadow_atlas: ImageAtlas,
    config: RendererConfig,
    stats: FrameStats,
    begin_cnt: u64,
    next_scratch_target_id: u32,
    next_render_tag: u32,
    clip_element_cache: HashMap<
        (VirtualBufferId, render_protocol::MaskType, render_protocol::MaskChannel),
        crate::encoder::RenderClipElement,
    >,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError<E: std::error::Error + 'static> {
    #[error("backend error: {0}")]
    Backend(#[source] E),
    #[error(
        "no virtual buffer is ready to render but {0} are still pending -- dependency cycle"
    )]
    ForwardProgressViolation(usize),
}

impl Renderer {
    pub fn new(atlas: ImageAtlas, shadow_atlas: ImageAtlas, config: RendererConfig) -> Self {
        Self {
            buffers: SlotMap::with_key(),
            atlas,
            shadow_atlas,
            config,
            stats: FrameStats::default(),
            begin_cnt: 0,
            next_scratch_target_id: 0,
            next_render_tag: 0,
            clip_element_cache: HashMap::new(),
        }
    }

    pub const fn begin_cnt(&self) -> u64 {
        self.begin_cnt
    }

    pub fn insert_buffer(&mut self, kind: VirtualBufferKind) -> VirtualBufferId {
        self.buffers.insert_with_key(|id| VirtualBuffer::new(id, kind))
    }

    /// : wraps a freshly inserted `VirtualBuffer` in an `Encoder`
    /// handle stamped with the current `begin_cnt`, so any use of the handle
    /// after the next `begin()` is rejected as stale.
    pub fn create_encoder(
        &mut self,
        buffer_kind: VirtualBufferKind,
        encoder_kind: crate::encoder::EncoderKind,
    ) -> crate::encoder::Encoder {
        let id = self.insert_buffer(buffer_kind);
        crate::encoder::Encoder::new(id, encoder_kind, self.begin_cnt)
    }

    pub fn buffer(&self, id: VirtualBufferId) -> Option<&VirtualBuffer> {
        self.buffers.get(id)
    }

    pub fn buffer_mut(&mut self, id: VirtualBufferId) -> Option<&mut VirtualBuffer> {
        self.buffers.get_mut(id)
    }

    /// Two independent mutable borrows into the buffer arena, for
    /// `copy_commands`-style operations that read and mutate two buffers at
    /// once. `None` if either id is missing or they name the same buffer.
    pub fn buffer_pair_mut(
        &mut self,
        a: VirtualBufferId,
        b: VirtualBufferId,
    ) -> Option<[&mut VirtualBuffer; 2]> {
        if a == b {
            return None;
        }
        self.buffers.get_disjoint_mut([a, b])
    }

    pub fn clip_element_cache_mut(
        &mut self,
    ) -> &mut HashMap<
        (VirtualBufferId, render_protocol::MaskType, render_protocol::MaskChannel),
        crate::encoder::RenderClipElement,
    > {
        &mut self.clip_element_cache
    }

    pub fn alloc_render_tag(&mut self) -> tile_atlas::RenderTag {
        let tag = tile_atlas::RenderTag(self.next_render_tag);
        self.next_render_tag += 1;
        tag
    }

    pub const fn atlas(&self) -> &ImageAtlas {
        &self.atlas
    }

    pub fn atlas_mut(&mut self) -> &mut ImageAtlas {
        &mut self.atlas
    }

    pub const fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// `begin`: bumps the handle-invalidation counter, resets
    /// stat counters, locks the atlases for the duration of the frame.
    pub fn begin(&mut self) {
        self.begin_cnt += 1;
        self.stats = FrameStats::default();
        self.atlas.lock_resources();
        self.shadow_atlas.lock_resources();
    }

    /// `end_abort`: unlocks the atlases and resets frame state
    /// without any backend submissions.
    pub fn end_abort(&mut self) {
        self.atlas.unlock_resources();
        self.shadow_atlas.unlock_resources();
        self.buffers.retain(|_, buffer| buffer.state() == VirtualBufferState::Recording);
    }

    fn pending_image_or_shadow(&self) -> Vec<VirtualBufferId> {
        self.buffers
            .iter()
            .filter(|(_, b)| {
                matches!(
                    b.kind(),
                    VirtualBufferKind::ImageBuffer
                        | VirtualBufferKind::SubImageBuffer { .. }
                        | VirtualBufferKind::ShadowMapBuffer
                ) && b.state() == VirtualBufferState::Finished
            })
            .map(|(id, _)| id)
            .collect()
    }

    /// `end`: the full frame-end walk. Steps 4-8 repeat until
    /// every image/shadow-map buffer has rendered; step 9 then renders
    /// user-supplied render-target buffers directly.
    pub fn end<B: RenderBackend>(&mut self, backend: &mut B) -> Result<FrameStats, SchedulerError<B::Error>> {
        let _span = tracing::info_span!("renderer_end").entered();
        backend.begin();

        let mut satisfied: HashSet<VirtualBufferId> = HashSet::new();
        loop {
            let pending = self.pending_image_or_shadow();
            if pending.is_empty() {
                break;
            }
            let ready: Vec<VirtualBufferId> = pending
                .iter()
                .copied()
                .filter(|id| self.buffers[*id].ready_to_render(&satisfied))
                .collect();

            if ready.is_empty() {
                // : forward-progress assertion -- no buffer in
                // the pending set has all dependencies satisfied, which can
                // only mean a dependency cycle. Reported as a recoverable
                // error rather than a panic so the caller can abort the
                // frame instead of the process.
                return Err(SchedulerError::ForwardProgressViolation(pending.len()));
            }

            let batch = pack_batch(&ready, &self.buffers);
            self.render_scratch_batch(&batch, backend)?;
            for &id in ready.iter() {
                satisfied.insert(id);
            }
        }

        self.render_target_buffers(backend)?;

        self.atlas.unlock_resources();
        self.shadow_atlas.unlock_resources();

        let mut stats = FrameStats::default();
        backend.end(&mut stats);
        stats.merge(&self.stats);
        self.stats = stats;
        Ok(self.stats)
    }

    /// step 5-8: render one scratch-target batch -- color
    /// buffers (occluders/opaques/typicals, z-disjoint under
    /// `depth_occlude`), then mask buffers (STC stencil, four cover passes,
    /// AA fuzz), then blit every batch member's tiles into its atlas.
    fn render_scratch_batch<B: RenderBackend>(
        &mut self,
        batch: &ScratchBatch,
        backend: &mut B,
    ) -> Result<(), SchedulerError<B::Error>> {
        let target = RenderTargetId(self.next_scratch_target_id);
        self.next_scratch_target_id += 1;
        backend.begin_render_target(
            ClearParams { color: Some([0.0; 4]), clear_depth: true, clear_stencil: true },
            target,
        );
        self.stats.number_scratch_render_targets_used += 1;

        for &id in batch.color.iter().chain(batch.mask.iter()) {
            let is_shadow = self.buffers[id].kind() == VirtualBufferKind::ShadowMapBuffer;
            let atlas = if is_shadow { &mut self.shadow_atlas } else { &mut self.atlas };
            let Some(buffer) = self.buffers.get_mut(id) else { continue };
            buffer.begin_rendering();
            if buffer.about_to_render_content(atlas).is_err() {
                self.stats.number_virtual_buffer_backing_allocation_failed += 1;
            }
        }

        let mut color = batch.color.clone();
        if self.config.uber_shader_method == UberShaderMethod::None {
            color.sort_by_key(|id| self.buffers[*id].first_shader_used().map(|s| s.0).unwrap_or(0));
        }
        self.render_color_buffers(&color, backend)?;
        self.render_mask_buffers(&batch.mask, backend)?;

        backend.end_render_target();

        for &id in batch.color.iter().chain(batch.mask.iter()) {
            self.blit_buffer(id);
            if let Some(buffer) = self.buffers.get_mut(id) {
                buffer.mark_rendered();
                buffer.mark_blitted();
            }
        }
        self.atlas.flush();
        self.shadow_atlas.flush();
        Ok(())
    }

    /// step 5: occluders -> opaques front-to-back -> typicals
    /// back-to-front, with disjoint z-regions per buffer under
    /// `depth_occlude` (each buffer reserves `number_z() + 1` slots, the
    /// extra one for a trailing depth-rect occluding it from later buffers).
    fn render_color_buffers<B: RenderBackend>(
        &mut self,
        order: &[VirtualBufferId],
        backend: &mut B,
    ) -> Result<(), SchedulerError<B::Error>> {
        let depth_occlude = self.config.clip_window_strategy == ClipWindowStrategy::DepthOcclude;
        let mut start_zs: HashMap<VirtualBufferId, i32> = HashMap::new();
        if depth_occlude {
            let mut next_z = 0;
            for &id in order {
                start_zs.insert(id, next_z);
                let n = self.buffers[id].commands().map(|c| c.number_z()).unwrap_or(0);
                next_z += n + 1;
            }
        }

        let uber_key = backend.uber_shader_of_all();
        for &id in order {
            let buffer = &self.buffers[id];
            let Some(commands) = buffer.commands() else { continue };
            let start_z = *start_zs.get(&id).unwrap_or(&0);
            backend.depth_buffer_mode(if depth_occlude { DepthBufferMode::Occlude } else { DepthBufferMode::Off });
            backend.color_write_mask(ColorWriteMask::ALL);
            commands
                .send_commands_to_backend(backend, start_z, uber_key)
                .map_err(SchedulerError::Backend)?;
            self.stats.number_draw_commands_sent += commands.occluders().len() as u64
                + commands.opaques().len() as u64
                + commands.typicals().len() as u64;
        }
        Ok(())
    }

    /// step 6: STC stencil increments/decrements (CW+1/CCW-1),
    /// four fill-rule-bucketed cover passes, then AA fuzz with stencil off.
    /// Buffers within each pass are shader-sorted globally since STC/mask
    /// blending is commutative.
    fn render_mask_buffers<B: RenderBackend>(
        &mut self,
        mask_buffers: &[VirtualBufferId],
        backend: &mut B,
    ) -> Result<(), SchedulerError<B::Error>> {
        if mask_buffers.is_empty() {
            return Ok(());
        }
        let uber_key = backend.uber_shader_of_all();

        backend.set_stencil_state(STENCIL_INCREMENT_STATE);
        backend.color_write_mask(ColorWriteMask::NONE);
        backend.depth_buffer_mode(DepthBufferMode::Off);
        for pass in [FillStcPass::ContourStencil, FillStcPass::ConicTrianglesStencil] {
            self.send_stc_pass(mask_buffers, pass, backend)?;
        }

        for rule in [
            crate::virtual_buffer::FillRule::NonZero,
            crate::virtual_buffer::FillRule::ComplementNonZero,
            crate::virtual_buffer::FillRule::OddEven,
            crate::virtual_buffer::FillRule::ComplementOddEven,
        ] {
            let bucket: Vec<VirtualBufferId> = mask_buffers
                .iter()
                .copied()
                .filter(|id| self.buffers[*id].fill_rule() == Some(rule))
                .collect();
            if bucket.is_empty() {
                continue;
            }
            backend.set_stencil_state(cover_stencil_state(rule));
            backend.color_write_mask(ColorWriteMask::ALL);
            for &id in &bucket {
                if let Some(commands) = self.buffers[id].commands() {
                    commands
                        .send_commands_sorted_by_shader_to_backend(backend, 0, uber_key)
                        .map_err(SchedulerError::Backend)?;
                }
            }
        }

        backend.depth_buffer_mode(DepthBufferMode::Off);
        for pass in [FillStcPass::ConicTriangleFuzz, FillStcPass::ContourFuzz] {
            self.send_stc_pass(mask_buffers, pass, backend)?;
        }
        Ok(())
    }

    fn send_stc_pass<B: RenderBackend>(
        &self,
        mask_buffers: &[VirtualBufferId],
        pass: FillStcPass,
        backend: &mut B,
    ) -> Result<(), SchedulerError<B::Error>> {
        let shader = self.config.stc_shaders.shader_for(pass);
        let uber_key = backend.uber_shader_of_all();
        let mut ranges: Vec<render_protocol::VertexRange> = Vec::new();
        for &id in mask_buffers {
            let builder = self.buffers[id].stc().pass(pass);
            let backing = builder.backing();
            for index in 0..backing.len() {
                ranges.push(backing.range(index));
            }
        }
        for vertex_range in ranges {
            backend
                .draw_render_data(render_protocol::DrawRenderDataRequest {
                    z: 0,
                    shader,
                    uber_key,
                    scale_translate: render_protocol::ScaleTranslate { scale: (1, 1), translate: (0, 0) },
                    clip_window: None,
                    permute_xy: false,
                    vertex_range,
                })
                .map_err(SchedulerError::Backend)?;
        }
        Ok(())
    }

    /// step 9: after all image/shadow batches, render every
    /// user-supplied `RenderTargetBuffer` directly to its own target.
    fn render_target_buffers<B: RenderBackend>(&mut self, backend: &mut B) -> Result<(), SchedulerError<B::Error>> {
        let targets: Vec<VirtualBufferId> = self
            .buffers
            .iter()
            .filter(|(_, b)| b.kind() == VirtualBufferKind::RenderTargetBuffer && b.state() == VirtualBufferState::Finished)
            .map(|(id, _)| id)
            .collect();

        let uber_key = backend.uber_shader_of_all();
        for id in targets {
            if let Some(buffer) = self.buffers.get_mut(id) {
                buffer.begin_rendering();
            }
            let target = RenderTargetId(self.next_scratch_target_id);
            self.next_scratch_target_id += 1;
            backend.begin_render_target(
                ClearParams { color: Some([0.0; 4]), clear_depth: true, clear_stencil: true },
                target,
            );
            if let Some(commands) = self.buffers[id].commands() {
                commands.send_commands_to_backend(backend, 0, uber_key).map_err(SchedulerError::Backend)?;
            }
            backend.end_render_target();
            if let Some(buffer) = self.buffers.get_mut(id) {
                buffer.mark_rendered();
            }
        }
        Ok(())
    }

    fn blit_buffer(&mut self, id: VirtualBufferId) {
        let Some(image_id) = self.buffers.get(id).and_then(VirtualBuffer::image) else { return };
        let is_shadow = self.buffers[id].kind() == VirtualBufferKind::ShadowMapBuffer;
        let atlas = if is_shadow { &mut self.shadow_atlas } else { &mut self.atlas };
        let Some(image) = atlas.image(image_id) else { return };
        let keys: Vec<interval_atlas::TileKey> = image
            .mip_elements()
            .iter()
            .flat_map(|element| (0..element.num_levels()).filter_map(|l| element.level(l)))
            .flat_map(|level| level.iter_tiles())
            .filter_map(|(_, _, classification)| classification.color_tile_key())
            .collect();
        for key in keys {
            atlas.mark_blitted(key);
        }
    }
}

/// : a non-empty pending set with no ready buffer indicates a
/// dependency cycle -- exercised directly since `Renderer::end` requires a
/// `RenderBackend` impl that the unit test suite below provides.
#[cfg(test)]
mod tests {
    use super::*;
    use render_protocol::{Colorspace, DrawRenderDataRequest, RenderValue, UberShadingKey, VertexRange};

    struct NullBackend {
        draws: Vec<ShaderId>,
    }

    impl RenderBackend for NullBackend {
        type Error = std::convert::Infallible;
        fn begin(&mut self) {}
        fn end(&mut self, _stats_out: &mut FrameStats) {}
        fn create_value<T: 'static>(&mut self, _value: T) -> RenderValue<T> {
            RenderValue::new(0)
        }
        fn draw_render_data(&mut self, request: DrawRenderDataRequest) -> Result<(), Self::Error> {
            self.draws.push(request.shader);
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

    fn config() -> RendererConfig {
        RendererConfig {
            clip_window_strategy: ClipWindowStrategy::DepthOcclude,
            uber_shader_method: UberShaderMethod::None,
            stc_shaders: StcShaders {
                contour_stencil: ShaderId(1),
                conic_triangles_stencil: ShaderId(2),
                conic_triangle_fuzz: ShaderId(3),
                contour_fuzz: ShaderId(4),
            },
        }
    }

    fn renderer() -> Renderer {
        let atlas = ImageAtlas::new(interval_atlas::AtlasLayout::Tiny8, interval_atlas::BackendId::new(0));
        let shadow_atlas = ImageAtlas::new(interval_atlas::AtlasLayout::Tiny8, interval_atlas::BackendId::new(1));
        Renderer::new(atlas, shadow_atlas, config())
    }

    /// scenario 4: three color buffers 256x256, 128x128, 512x512,
    /// no dependencies, `depth_occlude` -- all fit one 2048x512 scratch
    /// target with disjoint z-slots.
    #[test]
    fn scenario_4_batches_three_independent_color_buffers_into_one_scratch_target() {
        let mut renderer = renderer();
        let mut ids = Vec::new();
        for size in [(256u32, 256u32), (128, 128), (512, 512)] {
            let id = renderer.insert_buffer(VirtualBufferKind::ImageBuffer);
            let buffer = renderer.buffer_mut(id).unwrap();
            buffer.set_render_size(size);
            buffer.issue_finish();
            ids.push(id);
        }

        let batch = pack_batch(&ids, &renderer.buffers);
        assert_eq!(batch.width, MAX_RENDERABLE);
        assert_eq!(batch.height, 512);
        assert_eq!(batch.color.len(), 3);
        assert!(batch.mask.is_empty());
    }

    #[test]
    fn forward_progress_violation_is_reported_for_a_dependency_cycle() {
        let mut renderer = renderer();
        let a = renderer.insert_buffer(VirtualBufferKind::ImageBuffer);
        let b = renderer.insert_buffer(VirtualBufferKind::ImageBuffer);
        renderer.buffer_mut(a).unwrap().add_dependency(b);
        renderer.buffer_mut(b).unwrap().add_dependency(a);
        renderer.buffer_mut(a).unwrap().issue_finish();
        renderer.buffer_mut(b).unwrap().issue_finish();

        let mut backend = NullBackend { draws: Vec::new() };
        renderer.begin();
        let result = renderer.end(&mut backend);
        assert!(matches!(result, Err(SchedulerError::ForwardProgressViolation(2))));
    }

    #[test]
    fn mask_buffers_route_through_fill_rule_buckets() {
        let mut renderer = renderer();
        let id = renderer.insert_buffer(VirtualBufferKind::ImageBuffer);
        {
            let buffer = renderer.buffer_mut(id).unwrap();
            buffer.set_is_mask(true);
            buffer.set_fill_rule(Some(crate::virtual_buffer::FillRule::NonZero));
            buffer.stc_mut().pass_mut(FillStcPass::ContourStencil).add_range(VertexRange { begin: 0, end: 3 }, None);
            buffer.issue_finish();
        }

        let mut backend = NullBackend { draws: Vec::new() };
        renderer.begin();
        let stats = renderer.end(&mut backend).unwrap();
        assert!(backend.draws.contains(&ShaderId(1)), "contour stencil pass shader must be submitted");
        let _ = stats;
    }
}
