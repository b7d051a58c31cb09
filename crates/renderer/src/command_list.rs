//! `DrawCommandList`: an append-only per-`VirtualBuffer`
//! command log, partitioned so the scheduler can emit depth-buffer-friendly
//! submission order.

use render_protocol::{
    Brush, ClipWindow, DrawRenderDataRequest, EmulateFramebufferFetch, ImageSampler, RenderBackend,
    RenderValue, ScaleTranslate, ShaderId, Transformation, UberShadingKey, VertexRange,
};

use crate::stc::BoundingBox;

fn intersects(a: BoundingBox, b: BoundingBox) -> bool {
    a.0 < b.2 && b.0 < a.2 && a.1 < b.3 && b.1 < a.3
}

fn contained_in(inner: BoundingBox, outer: BoundingBox) -> bool {
    inner.0 >= outer.0 && inner.1 >= outer.1 && inner.2 <= outer.2 && inner.3 <= outer.3
}

/// Which partition a [`DrawCommand`] landed in; exposed so
/// [`DrawCommandList::copy_commands`] can preserve it across a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Occluder,
    Opaque,
    Typical,
}

/// The render-value handles one draw call binds.
#[derive(Debug, Clone, Copy)]
pub struct RenderValueBundle {
    pub transformation: RenderValue<Transformation>,
    pub material: RenderValue<Brush>,
    pub clip_mask: Option<RenderValue<ImageSampler>>,
    pub fb_fetch_emulation: Option<RenderValue<EmulateFramebufferFetch>>,
}

#[derive(Debug, Clone, Copy)]
pub struct DrawCommand {
    pub shader: ShaderId,
    pub values: RenderValueBundle,
    pub blend_mode: render_protocol::BlendMode,
    pub vertex_range: VertexRange,
    pub scale_translate: ScaleTranslate,
    pub clip_window: Option<RenderValue<ClipWindow>>,
    pub permute_xy: bool,
    /// Local z-slot, 0-based; the scheduler adds the buffer's `start_z`.
    pub z: i32,
    /// True if the shader emits fragments whose coverage is not fully
    /// opaque (glyph AA edges, fuzz passes, partial-coverage materials).
    pub emits_transparent_fragments: bool,
    /// Coarse pixel-space bounding box, used only by `copy_commands` to
    /// decide whether a command moves between buffers. `None`
    /// means "no coarse box available", which always moves.
    pub bounding_box: Option<BoundingBox>,
    is_opaque: bool,
}

/// A contiguous range of the typicals partition captured for a post-hoc
/// uber-shader override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubListMarker {
    begin: u32,
    end: u32,
}

impl SubListMarker {
    pub const fn range(self) -> (u32, u32) {
        (self.begin, self.end)
    }
}

/// Per-`VirtualBuffer` command log. Commands land in exactly one of three
/// partitions in append order; `send_*` methods replay a partition in the
/// depth-buffer-friendly order the scheduler needs.
#[derive(Debug, Default)]
pub struct DrawCommandList {
    occluders: Vec<DrawCommand>,
    opaques: Vec<DrawCommand>,
    typicals: Vec<DrawCommand>,
    next_z: i32,
}

fn compute_is_opaque(
    blend_mode: render_protocol::BlendMode,
    has_clip_mask: bool,
    has_partial_coverage_material: bool,
    emits_transparent_fragments: bool,
) -> bool {
    matches!(
        blend_mode,
        render_protocol::BlendMode::Src | render_protocol::BlendMode::SrcOver
    ) && !has_clip_mask
        && !has_partial_coverage_material
        && !emits_transparent_fragments
}

impl DrawCommandList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a depth-only occluder rect.
    pub fn append_occluder(&mut self, mut command: DrawCommand) {
        command.z = self.allocate_z();
        self.occluders.push(command);
    }

    /// Appends a regular draw; computes `is_opaque` and downgrades
    /// `src-over` to `src` when eligible so the backend may use early-Z
    ///.
    pub fn append(&mut self, mut command: DrawCommand, has_partial_coverage_material: bool) {
        let has_clip_mask = command.values.clip_mask.is_some();
        command.is_opaque = compute_is_opaque(
            command.blend_mode,
            has_clip_mask,
            has_partial_coverage_material,
            command.emits_transparent_fragments,
        );
        if command.is_opaque {
            command.blend_mode = command.blend_mode.downgrade_src_over_to_src();
        }
        command.z = self.allocate_z();
        if command.is_opaque {
            self.opaques.push(command);
        } else {
            self.typicals.push(command);
        }
    }

    fn allocate_z(&mut self) -> i32 {
        let z = self.next_z;
        self.next_z += 1;
        z
    }

    /// Number of z-slots this list needs; the scheduler assigns `start_z`
    /// so that buffers' z-regions are disjoint.
    pub fn number_z(&self) -> i32 {
        self.next_z
    }

    pub fn mark(&self) -> SubListMarker {
        let len = self.typicals.len() as u32;
        SubListMarker { begin: len, end: len }
    }

    pub fn close_marker(&self, marker: SubListMarker) -> SubListMarker {
        SubListMarker {
            begin: marker.begin,
            end: self.typicals.len() as u32,
        }
    }

    pub fn accumulate_opaques_shaders<B: RenderBackend>(
        &self,
        backend: &mut B,
        clip_kind: render_protocol::ClipWindowStrategy,
        method: render_protocol::UberShaderMethod,
    ) -> UberShadingKey {
        backend.begin_accumulate(clip_kind, method);
        for command in &self.opaques {
            backend.accumulate_shader(command.shader);
        }
        backend.end_accumulate()
    }

    pub fn accumulate_typical_shaders<B: RenderBackend>(
        &self,
        backend: &mut B,
        clip_kind: render_protocol::ClipWindowStrategy,
        method: render_protocol::UberShaderMethod,
    ) -> UberShadingKey {
        backend.begin_accumulate(clip_kind, method);
        for command in &self.typicals {
            backend.accumulate_shader(command.shader);
        }
        backend.end_accumulate()
    }

    fn send_one<B: RenderBackend>(
        command: &DrawCommand,
        backend: &mut B,
        start_z: i32,
        uber_key: UberShadingKey,
    ) -> Result<(), B::Error> {
        backend.draw_render_data(DrawRenderDataRequest {
            z: start_z + command.z,
            shader: command.shader,
            uber_key,
            scale_translate: command.scale_translate,
            clip_window: command.clip_window,
            permute_xy: command.permute_xy,
            vertex_range: command.vertex_range,
        })
    }

    /// Occluders first, depth-only.
    pub fn send_occluders_to_backend<B: RenderBackend>(
        &self,
        backend: &mut B,
        start_z: i32,
        uber_key: UberShadingKey,
    ) -> Result<(), B::Error> {
        let _span = tracing::trace_span!("send_occluders_to_backend", count = self.occluders.len()).entered();
        for command in &self.occluders {
            Self::send_one(command, backend, start_z, uber_key)?;
        }
        Ok(())
    }

    /// Opaques front-to-back via the z-slot allocator (increasing z).
    pub fn send_opaque_commands_to_backend<B: RenderBackend>(
        &self,
        backend: &mut B,
        start_z: i32,
        uber_key: UberShadingKey,
    ) -> Result<(), B::Error> {
        let _span = tracing::trace_span!("send_opaque_commands_to_backend", count = self.opaques.len()).entered();
        for command in &self.opaques {
            Self::send_one(command, backend, start_z, uber_key)?;
        }
        Ok(())
    }

    /// Occluders, then opaques, then typicals back-to-front on the same z
    /// axis.
    pub fn send_commands_to_backend<B: RenderBackend>(
        &self,
        backend: &mut B,
        start_z: i32,
        uber_key: UberShadingKey,
    ) -> Result<(), B::Error> {
        let _span = tracing::trace_span!("send_commands_to_backend", count = self.typicals.len()).entered();
        self.send_occluders_to_backend(backend, start_z, uber_key)?;
        self.send_opaque_commands_to_backend(backend, start_z, uber_key)?;
        for command in self.typicals.iter().rev() {
            Self::send_one(command, backend, start_z, uber_key)?;
        }
        Ok(())
    }

    /// Used for masks and shadows, where blending is commutative, so draws
    /// may be globally sorted by shader across many buffers to reduce
    /// switches.
    pub fn send_commands_sorted_by_shader_to_backend<B: RenderBackend>(
        &self,
        backend: &mut B,
        start_z: i32,
        uber_key: UberShadingKey,
    ) -> Result<(), B::Error> {
        let _span = tracing::trace_span!("send_commands_sorted_by_shader_to_backend").entered();
        let mut all: Vec<&DrawCommand> = self.opaques.iter().chain(self.typicals.iter()).collect();
        all.sort_by_key(|command| command.shader.0);
        for command in all {
            Self::send_one(command, backend, start_z, uber_key)?;
        }
        Ok(())
    }

    pub fn occluders(&self) -> &[DrawCommand] {
        &self.occluders
    }

    pub fn opaques(&self) -> &[DrawCommand] {
        &self.opaques
    }

    pub fn typicals(&self) -> &[DrawCommand] {
        &self.typicals
    }

    pub fn is_empty(&self) -> bool {
        self.occluders.is_empty() && self.opaques.is_empty() && self.typicals.is_empty()
    }

    /// Appends a command that already carries a computed `is_opaque`
    /// decision to the named partition, without re-deriving it, used when
    /// moving commands between buffers.
    fn push_raw(&mut self, partition: Partition, mut command: DrawCommand) {
        command.z = self.allocate_z();
        match partition {
            Partition::Occluder => self.occluders.push(command),
            Partition::Opaque => self.opaques.push(command),
            Partition::Typical => self.typicals.push(command),
        }
    }

    /// `copy_commands`: moves commands whose bounding box
    /// intersects `bbox_expanded` (`bb + bb_pad`) from `self` into `dst`;
    /// when `delete_contained` is set, also removes from `self` any command
    /// whose bounding box is fully inside `bbox_contained` (`bb`). A command
    /// with no bounding box always moves and is never deleted.
    pub fn copy_commands(
        &mut self,
        dst: &mut DrawCommandList,
        bbox_expanded: BoundingBox,
        bbox_contained: BoundingBox,
        delete_contained: bool,
    ) {
        for (partition, list) in [
            (Partition::Occluder, &mut self.occluders),
            (Partition::Opaque, &mut self.opaques),
            (Partition::Typical, &mut self.typicals),
        ] {
            let mut keep = Vec::with_capacity(list.len());
            for command in list.drain(..) {
                let moves = match command.bounding_box {
                    None => true,
                    Some(bb) => intersects(bb, bbox_expanded),
                };
                if moves {
                    dst.push_raw(partition, command);
                }
                let delete = delete_contained
                    && command
                        .bounding_box
                        .is_some_and(|bb| contained_in(bb, bbox_contained));
                if !delete {
                    keep.push(command);
                }
            }
            *list = keep;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use render_protocol::BlendMode;

    fn command(blend_mode: BlendMode, clip_mask: Option<RenderValue<ImageSampler>>, transparent: bool) -> DrawCommand {
        DrawCommand {
            shader: ShaderId(0),
            values: RenderValueBundle {
                transformation: RenderValue::invalid(),
                material: RenderValue::invalid(),
                clip_mask,
                fb_fetch_emulation: None,
            },
            blend_mode,
            vertex_range: VertexRange { begin: 0, end: 3 },
            scale_translate: ScaleTranslate { scale: (1, 1), translate: (0, 0) },
            clip_window: None,
            permute_xy: false,
            z: 0,
            emits_transparent_fragments: transparent,
            bounding_box: None,
            is_opaque: false,
        }
    }

    #[test]
    fn src_over_with_no_clip_mask_is_opaque_and_downgraded_to_src() {
        let mut list = DrawCommandList::new();
        list.append(command(BlendMode::SrcOver, None, false), false);
        assert_eq!(list.opaques().len(), 1);
        assert_eq!(list.opaques()[0].blend_mode, BlendMode::Src);
        assert!(list.typicals().is_empty());
    }

    #[test]
    fn clip_mask_forces_typical_partition() {
        let mut list = DrawCommandList::new();
        list.append(command(BlendMode::SrcOver, Some(RenderValue::new(0)), false), false);
        assert!(list.opaques().is_empty());
        assert_eq!(list.typicals().len(), 1);
    }

    #[test]
    fn transparent_fragment_shader_is_never_opaque() {
        let mut list = DrawCommandList::new();
        list.append(command(BlendMode::Src, None, true), false);
        assert!(list.opaques().is_empty());
        assert_eq!(list.typicals().len(), 1);
    }

    #[test]
    fn append_order_is_preserved_within_a_partition() {
        let mut list = DrawCommandList::new();
        for i in 0..3 {
            let mut cmd = command(BlendMode::Xor, None, true);
            cmd.shader = ShaderId(i);
            list.append(cmd, false);
        }
        let shaders: Vec<u32> = list.typicals().iter().map(|c| c.shader.0).collect();
        assert_eq!(shaders, vec![0, 1, 2]);
    }

    #[test]
    fn copy_commands_moves_intersecting_and_deletes_contained() {
        let mut src = DrawCommandList::new();
        let mut inside = command(BlendMode::Xor, None, true);
        inside.bounding_box = Some((0.0, 0.0, 1.0, 1.0));
        let mut far = command(BlendMode::Xor, None, true);
        far.bounding_box = Some((100.0, 100.0, 101.0, 101.0));
        src.append(inside, false);
        src.append(far, false);

        let mut dst = DrawCommandList::new();
        src.copy_commands(&mut dst, (0.0, 0.0, 2.0, 2.0), (0.0, 0.0, 2.0, 2.0), true);

        assert_eq!(dst.typicals().len(), 1, "only the intersecting command moved");
        assert_eq!(src.typicals().len(), 1, "the contained command was deleted from src");
        assert_eq!(src.typicals()[0].bounding_box, Some((100.0, 100.0, 101.0, 101.0)));
    }

    #[test]
    fn number_z_counts_every_appended_command() {
        let mut list = DrawCommandList::new();
        list.append_occluder(command(BlendMode::Src, None, false));
        list.append(command(BlendMode::SrcOver, None, false), false);
        list.append(command(BlendMode::Xor, None, true), false);
        assert_eq!(list.number_z(), 3);
    }
}
