//! `VirtualBuffer`: the unit of deferred rendering. Owns its
//! commands, dependency edges, target region, and finish/render/blit
//! lifecycle.

use std::collections::HashSet;

use astral_geom::{CachedTransformation, ClipGeometryGroup, Transformation};
use slotmap::new_key_type;

use crate::command_list::DrawCommandList;
use crate::stc::{BoundingBox, BuilderSet};

new_key_type! {
    /// Stable arena identity for a `VirtualBuffer`.
    pub struct VirtualBufferId;
}

/// The maximum render-target footprint a single `VirtualBuffer` may own in
/// either dimension before the size policy splits it into tiled
/// sub-buffers.
pub const MAX_RENDERABLE: u32 = 2048;
pub const SCRATCH_SIZE: u32 = MAX_RENDERABLE;

static_assertions::const_assert_eq!(MAX_RENDERABLE, SCRATCH_SIZE);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    OddEven,
    ComplementOddEven,
    NonZero,
    ComplementNonZero,
}

impl FillRule {
    pub const fn complement(self) -> Self {
        match self {
            FillRule::OddEven => FillRule::ComplementOddEven,
            FillRule::ComplementOddEven => FillRule::OddEven,
            FillRule::NonZero => FillRule::ComplementNonZero,
            FillRule::ComplementNonZero => FillRule::NonZero,
        }
    }
}

/// `VirtualBuffer` category tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualBufferKind {
    RenderTargetBuffer,
    ImageBuffer,
    /// Renders a rectangle of another buffer's image; the parent must be
    /// finished but not yet rendered.
    SubImageBuffer { parent: VirtualBufferId },
    ShadowMapBuffer,
    /// Structural only, owns no commands (e.g. a parent buffer after its
    /// size-policy split, or a buffer whose only purpose is to group
    /// dependencies).
    AssembledBuffer,
    /// Zero-area; all draws against it are no-ops.
    DegenerateBuffer,
}

impl VirtualBufferKind {
    pub const fn is_structural(self) -> bool {
        matches!(
            self,
            VirtualBufferKind::AssembledBuffer | VirtualBufferKind::DegenerateBuffer
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualBufferState {
    Recording,
    Finished,
    Rendering,
    Rendered,
    Blitted,
}

/// RAII guard for `begin_pause_snapshot`/`end_pause_snapshot`: increments on construction, decrements on drop. While the
/// counter is positive, snapshot systems may not steal commands from this
/// buffer and `issue_finish` is ignored.
pub struct PauseSnapshotGuard<'a> {
    buffer: &'a mut VirtualBuffer,
}

impl Drop for PauseSnapshotGuard<'_> {
    fn drop(&mut self) {
        self.buffer.pause_snapshot_counter = self.buffer.pause_snapshot_counter.saturating_sub(1);
    }
}

/// : the deferred render job. Commands accumulate against it
/// while `recording`; once finished and its dependencies are satisfied the
/// scheduler renders it and blits its image tiles into the atlas.
pub struct VirtualBuffer {
    id: VirtualBufferId,
    kind: VirtualBufferKind,
    state: VirtualBufferState,
    commands: Option<DrawCommandList>,
    transformation: CachedTransformation,
    transformation_stack: Vec<Transformation>,
    clip_geometry_group: Option<ClipGeometryGroup>,
    fill_rule: Option<FillRule>,
    stc: BuilderSet,
    start_z: i32,
    pause_snapshot_counter: u32,
    finish_issued: bool,
    dependencies: HashSet<VirtualBufferId>,
    image: Option<tile_atlas::ImageId>,
    render_size: (u32, u32),
    is_mask: bool,
}

impl VirtualBuffer {
    pub fn new(id: VirtualBufferId, kind: VirtualBufferKind) -> Self {
        let commands = if kind.is_structural() { None } else { Some(DrawCommandList::new()) };
        Self {
            id,
            kind,
            state: VirtualBufferState::Recording,
            commands,
            transformation: CachedTransformation::default(),
            transformation_stack: Vec::new(),
            clip_geometry_group: None,
            fill_rule: None,
            stc: BuilderSet::new(),
            start_z: 0,
            pause_snapshot_counter: 0,
            finish_issued: false,
            dependencies: HashSet::new(),
            image: None,
            render_size: (0, 0),
            is_mask: false,
        }
    }

    /// The pixel footprint the scheduler must reserve a scratch-target
    /// region for. Zero until set by the encoder that
    /// created this buffer.
    pub const fn render_size(&self) -> (u32, u32) {
        self.render_size
    }

    pub fn set_render_size(&mut self, size: (u32, u32)) {
        self.render_size = size;
    }

    /// Whether this buffer's blending is commutative (mask/shadow-map
    /// geometry), letting the scheduler reorder and shader-sort it freely
    /// within a batch.
    pub const fn is_mask(&self) -> bool {
        self.is_mask
    }

    pub fn set_is_mask(&mut self, is_mask: bool) {
        self.is_mask = is_mask;
    }

    /// First shader used by this buffer's opaque partition, if any --
    /// `FirstShaderUsedSorter`'s sort key when uber-shading is off.
    pub fn first_shader_used(&self) -> Option<render_protocol::ShaderId> {
        self.commands
            .as_ref()
            .and_then(|list| list.opaques().first().or_else(|| list.typicals().first()))
            .map(|command| command.shader)
    }

    pub const fn id(&self) -> VirtualBufferId {
        self.id
    }

    pub const fn kind(&self) -> VirtualBufferKind {
        self.kind
    }

    pub const fn state(&self) -> VirtualBufferState {
        self.state
    }

    pub fn commands(&self) -> Option<&DrawCommandList> {
        self.commands.as_ref()
    }

    pub fn commands_mut(&mut self) -> Option<&mut DrawCommandList> {
        self.commands.as_mut()
    }

    pub fn transformation(&self) -> &CachedTransformation {
        &self.transformation
    }

    pub fn transformation_mut(&mut self) -> &mut CachedTransformation {
        &mut self.transformation
    }

    pub fn set_clip_geometry_group(&mut self, group: ClipGeometryGroup) {
        self.clip_geometry_group = Some(group);
    }

    pub fn clip_geometry_group(&self) -> Option<&ClipGeometryGroup> {
        self.clip_geometry_group.as_ref()
    }

    pub fn set_fill_rule(&mut self, rule: Option<FillRule>) {
        self.fill_rule = rule;
    }

    pub fn fill_rule(&self) -> Option<FillRule> {
        self.fill_rule
    }

    pub fn stc(&self) -> &BuilderSet {
        &self.stc
    }

    pub fn stc_mut(&mut self) -> &mut BuilderSet {
        &mut self.stc
    }

    pub fn image(&self) -> Option<tile_atlas::ImageId> {
        self.image
    }

    pub fn set_image(&mut self, image: tile_atlas::ImageId) {
        self.image = Some(image);
    }

    pub const fn start_z(&self) -> i32 {
        self.start_z
    }

    pub fn set_start_z(&mut self, z: i32) {
        self.start_z = z;
    }

    pub fn is_recording(&self) -> bool {
        self.state == VirtualBufferState::Recording && !self.finish_issued
    }

    fn assert_commands_are_mutable(&self) {
        debug_assert!(
            self.is_recording(),
            "VirtualBuffer commands may only be added while recording and not yet finished"
        );
    }

    /// `draw_generic`: appends a draw; the caller has already
    /// resolved the emulated-framebuffer-fetch dependency (the backend
    /// tells us whether `blend_mode` needs source pixels, per ).
    pub fn draw_generic(&mut self, command: crate::command_list::DrawCommand, has_partial_coverage_material: bool) {
        self.assert_commands_are_mutable();
        if self.kind == VirtualBufferKind::DegenerateBuffer {
            return;
        }
        if let Some(list) = self.commands.as_mut() {
            list.append(command, has_partial_coverage_material);
        }
    }

    /// `add_occluder`: a depth-only rect.
    pub fn add_occluder(&mut self, command: crate::command_list::DrawCommand) {
        self.assert_commands_are_mutable();
        if self.kind == VirtualBufferKind::DegenerateBuffer {
            return;
        }
        if let Some(list) = self.commands.as_mut() {
            list.append_occluder(command);
        }
    }

    /// Increments the pause-snapshot counter for the lifetime of the
    /// returned guard.
    pub fn begin_pause_snapshot(&mut self) -> PauseSnapshotGuard<'_> {
        self.pause_snapshot_counter += 1;
        PauseSnapshotGuard { buffer: self }
    }

    pub const fn pause_snapshot_counter(&self) -> u32 {
        self.pause_snapshot_counter
    }

    /// Clamps to >= 0.
    pub fn set_pause_snapshot_counter(&mut self, value: i64) {
        self.pause_snapshot_counter = value.max(0) as u32;
    }

    /// `copy_commands`: moves commands whose coarse bounding
    /// box intersects `bb` padded by `bb_pad` from `src` into `self`,
    /// optionally deleting from `src` those fully contained in `bb`. Also
    /// moves `src`'s STC sub-ranges for every pass under the same bounding
    /// boxes, so a snapshotted fill's stencil/AA geometry follows its draw
    /// commands into the child buffer instead of being dropped or
    /// duplicated.
    pub fn copy_commands(
        &mut self,
        src: &mut VirtualBuffer,
        bb: BoundingBox,
        bb_pad: f32,
        delete_contained: bool,
    ) {
        let expanded = (bb.0 - bb_pad, bb.1 - bb_pad, bb.2 + bb_pad, bb.3 + bb_pad);
        if let (Some(src_list), Some(dst_list)) = (src.commands.as_mut(), self.commands.as_mut()) {
            src_list.copy_commands(dst_list, expanded, bb, delete_contained);
        }
        self.stc.copy_stc(&mut src.stc, expanded, bb, delete_contained);
    }

    /// `issue_finish`: idempotent; ignored while the
    /// pause-snapshot counter is positive (caller must balance the
    /// sequencing itself).
    pub fn issue_finish(&mut self) {
        if self.finish_issued {
            return;
        }
        if self.pause_snapshot_counter > 0 {
            return;
        }
        self.finish_issued = true;
        self.state = VirtualBufferState::Finished;
    }

    pub const fn finish_issued(&self) -> bool {
        self.finish_issued
    }

    pub fn add_dependency(&mut self, dependency: VirtualBufferId) {
        self.dependencies.insert(dependency);
    }

    pub fn dependencies(&self) -> impl Iterator<Item = VirtualBufferId> + '_ {
        self.dependencies.iter().copied()
    }

    pub fn remaining_dependencies(&self, satisfied: &HashSet<VirtualBufferId>) -> usize {
        self.dependencies.difference(satisfied).count()
    }

    /// Required before rendering: all dependencies
    /// must have completed.
    pub fn ready_to_render(&self, satisfied: &HashSet<VirtualBufferId>) -> bool {
        self.state == VirtualBufferState::Finished && self.remaining_dependencies(satisfied) == 0
    }

    pub fn begin_rendering(&mut self) {
        debug_assert_eq!(self.state, VirtualBufferState::Finished);
        self.state = VirtualBufferState::Rendering;
    }

    pub fn mark_rendered(&mut self) {
        debug_assert_eq!(self.state, VirtualBufferState::Rendering);
        self.state = VirtualBufferState::Rendered;
    }

    pub fn mark_blitted(&mut self) {
        debug_assert_eq!(self.state, VirtualBufferState::Rendered);
        self.state = VirtualBufferState::Blitted;
    }

    /// `about_to_render_content`: returns `Err` if atlas
    /// allocation cannot be satisfied; the scheduler skips this buffer and
    /// reports the failure as a stat, rather than failing
    /// the frame.
    pub fn about_to_render_content(
        &mut self,
        atlas: &mut tile_atlas::ImageAtlas,
    ) -> Result<(), tile_atlas::ImageAtlasError> {
        let Some(image) = self.image else {
            return Ok(());
        };
        atlas.mark_in_use(image)
    }
}

/// : a zero-area render region always becomes a
/// `DegenerateBuffer`; all commands against it are no-ops.
pub fn classify_kind_for_region(requested: VirtualBufferKind, size: (u32, u32)) -> VirtualBufferKind {
    if size.0 == 0 || size.1 == 0 {
        VirtualBufferKind::DegenerateBuffer
    } else {
        requested
    }
}

/// size policy: how many tiles of at most `MAX_RENDERABLE`
/// are needed to exactly cover `size`, and their offsets.
pub fn tile_oversized_region(size: (u32, u32)) -> Vec<(u32, u32, u32, u32)> {
    let mut tiles = Vec::new();
    let mut y = 0;
    while y < size.1 {
        let h = (size.1 - y).min(MAX_RENDERABLE);
        let mut x = 0;
        while x < size.0 {
            let w = (size.0 - x).min(MAX_RENDERABLE);
            tiles.push((x, y, w, h));
            x += w;
        }
        y += h;
    }
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn new_buffer(kind: VirtualBufferKind) -> VirtualBuffer {
        let mut map: SlotMap<VirtualBufferId, ()> = SlotMap::with_key();
        let id = map.insert(());
        VirtualBuffer::new(id, kind)
    }

    #[test]
    fn zero_area_region_becomes_degenerate() {
        let kind = classify_kind_for_region(VirtualBufferKind::ImageBuffer, (0, 10));
        assert_eq!(kind, VirtualBufferKind::DegenerateBuffer);
    }

    #[test]
    fn issue_finish_is_idempotent() {
        let mut buffer = new_buffer(VirtualBufferKind::ImageBuffer);
        buffer.issue_finish();
        assert_eq!(buffer.state(), VirtualBufferState::Finished);
        buffer.issue_finish();
        assert_eq!(buffer.state(), VirtualBufferState::Finished);
    }

    #[test]
    fn finish_is_ignored_while_pause_snapshot_is_held() {
        let mut buffer = new_buffer(VirtualBufferKind::ImageBuffer);
        let guard = buffer.begin_pause_snapshot();
        drop(guard);
        assert_eq!(buffer.pause_snapshot_counter(), 0);

        let _guard = buffer.begin_pause_snapshot();
        buffer.issue_finish();
        assert_eq!(buffer.state(), VirtualBufferState::Recording);
    }

    #[test]
    fn degenerate_buffer_has_no_command_list() {
        let buffer = new_buffer(VirtualBufferKind::DegenerateBuffer);
        assert!(buffer.commands().is_none());
    }

    #[test]
    fn oversized_region_tiles_exactly() {
        let tiles = tile_oversized_region((3000, 1000));
        let total_area: u64 = tiles.iter().map(|&(_, _, w, h)| w as u64 * h as u64).sum();
        assert_eq!(total_area, 3000u64 * 1000);
        assert!(tiles.iter().all(|&(_, _, w, h)| w <= MAX_RENDERABLE && h <= MAX_RENDERABLE));
    }

    #[test]
    fn ready_to_render_requires_dependencies_satisfied() {
        let mut buffer = new_buffer(VirtualBufferKind::ImageBuffer);
        let mut other_map: SlotMap<VirtualBufferId, ()> = SlotMap::with_key();
        let dep = other_map.insert(());
        buffer.add_dependency(dep);
        buffer.issue_finish();

        let satisfied = HashSet::new();
        assert!(!buffer.ready_to_render(&satisfied));

        let mut satisfied = HashSet::new();
        satisfied.insert(dep);
        assert!(buffer.ready_to_render(&satisfied));
    }

    #[test]
    fn copy_commands_also_moves_stc_geometry_into_the_child() {
        use render_protocol::{AntiAlias, FillStcPass, VertexRange};

        let mut src = new_buffer(VirtualBufferKind::ImageBuffer);
        src.stc_mut().add_stc(
            FillStcPass::ContourStencil,
            AntiAlias::None,
            VertexRange { begin: 0, end: 3 },
            Some((0.0, 0.0, 1.0, 1.0)),
        );
        src.stc_mut().add_stc(
            FillStcPass::ContourStencil,
            AntiAlias::None,
            VertexRange { begin: 3, end: 6 },
            Some((100.0, 100.0, 101.0, 101.0)),
        );

        let mut dst = new_buffer(VirtualBufferKind::ImageBuffer);
        dst.copy_commands(&mut src, (0.0, 0.0, 2.0, 2.0), 0.0, true);

        let dst_builder = dst.stc().pass(FillStcPass::ContourStencil);
        assert_eq!(dst_builder.backing().len(), 1, "only the intersecting range moved");

        let src_builder = src.stc().pass(FillStcPass::ContourStencil);
        assert_eq!(src_builder.backing().len(), 1, "the contained range was removed from src");
        assert_eq!(
            src_builder.backing().optional_bb(0),
            Some((100.0, 100.0, 101.0, 101.0))
        );
    }
}
