//! `STCData` / `BuilderSet`: staging and backing for
//! stencil-then-cover fill geometry, one sub-range per pass.

use render_protocol::{FillStcPass, VertexRange};

/// Axis-aligned `(min_x, min_y, max_x, max_y)` box in pixel coordinates,
/// the same shape `ClipGeometry::bounding_box` returns.
pub type BoundingBox = (f32, f32, f32, f32);

fn intersects(a: BoundingBox, b: BoundingBox) -> bool {
    a.0 < b.2 && b.0 < a.2 && a.1 < b.3 && b.1 < a.3
}

fn contained_in(inner: BoundingBox, outer: BoundingBox) -> bool {
    inner.0 >= outer.0 && inner.1 >= outer.1 && inner.2 <= outer.2 && inner.3 <= outer.3
}

/// One sub-element: a vertex range plus an optional bounding box narrowing
/// the pixel region that range's draw covers.
#[derive(Debug, Clone, Copy)]
struct SubRange {
    vertices: VertexRange,
    bounding_box: Option<BoundingBox>,
}

/// Shared backing for sub-ranges of one STC pass, reused across many
/// `STCData` objects to avoid many tiny per-buffer allocations.
#[derive(Debug, Default)]
pub struct SubSTCDataBacking {
    ranges: Vec<SubRange>,
}

impl SubSTCDataBacking {
    pub fn add_range(&mut self, vertices: VertexRange, bounding_box: Option<BoundingBox>) -> usize {
        self.ranges.push(SubRange { vertices, bounding_box });
        self.ranges.len() - 1
    }

    pub fn range(&self, index: usize) -> VertexRange {
        self.ranges[index].vertices
    }

    pub fn optional_bb(&self, index: usize) -> Option<BoundingBox> {
        self.ranges[index].bounding_box
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Compacts out the entries at `indices`, as produced by
    /// `Builder::copy_stc`'s `deleted` output.
    fn remove_ranges(&mut self, indices: &[usize]) {
        if indices.is_empty() {
            return;
        }
        let drop: std::collections::HashSet<usize> = indices.iter().copied().collect();
        let old = std::mem::take(&mut self.ranges);
        self.ranges = old
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !drop.contains(i))
            .map(|(_, range)| range)
            .collect();
    }
}

/// `STCData`: a transformation-tagged handle over a
/// contiguous span of sub-ranges in one pass's `SubSTCDataBacking`.
#[derive(Debug, Clone, Copy)]
pub struct STCData {
    begin: usize,
    end: usize,
}

impl STCData {
    pub const fn empty() -> Self {
        Self { begin: 0, end: 0 }
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub fn indices(&self) -> std::ops::Range<usize> {
        self.begin..self.end
    }
}

/// One `SubSTCDataBacking` plus the live `STCData` spans drawn from it, for
/// a single [`FillStcPass`].
#[derive(Debug, Default)]
pub struct Builder {
    backing: SubSTCDataBacking,
}

impl Builder {
    /// Appends one sub-range and returns an `STCData` naming just it; callers
    /// typically grow an existing `STCData` by widening its `end` instead, but
    /// a fresh draw (e.g. a new tile job) starts from a single range.
    pub fn add_range(&mut self, vertices: VertexRange, bounding_box: Option<BoundingBox>) -> STCData {
        let index = self.backing.add_range(vertices, bounding_box);
        STCData { begin: index, end: index + 1 }
    }

    pub fn extend(&mut self, data: &mut STCData, vertices: VertexRange, bounding_box: Option<BoundingBox>) {
        let index = self.backing.add_range(vertices, bounding_box);
        debug_assert_eq!(index, data.end, "Builder ranges must be appended contiguously");
        data.end = index + 1;
    }

    pub fn backing(&self) -> &SubSTCDataBacking {
        &self.backing
    }

    /// The surgical copy describes: moves the sub-ranges of
    /// `src` (indexed by `src_data`) whose bounding box intersects `bbox`
    /// into `self`, appended to `dst_data`; when `delete_contained` is set,
    /// sub-ranges whose bounding box is fully inside `bbox` are removed from
    /// `src` rather than merely left behind. A sub-range with no bounding
    /// box (unconditionally present) is always copied and never deleted.
    pub fn copy_stc(
        &mut self,
        dst_data: &mut STCData,
        src: &Builder,
        src_data: &STCData,
        bbox: BoundingBox,
        delete_contained: bool,
        deleted: &mut Vec<usize>,
    ) {
        for index in src_data.indices() {
            let vertices = src.backing.range(index);
            let bb = src.backing.optional_bb(index);
            let moves = match bb {
                None => true,
                Some(bb) => intersects(bb, bbox),
            };
            if !moves {
                continue;
            }
            let new_index = self.backing.add_range(vertices, bb);
            if dst_data.is_empty() {
                dst_data.begin = new_index;
            }
            dst_data.end = new_index + 1;

            if delete_contained {
                if let Some(bb) = bb {
                    if contained_in(bb, bbox) {
                        deleted.push(index);
                    }
                }
            }
        }
    }

    /// Physically removes the backing entries `copy_stc` reported as
    /// `deleted`, so a later full-backing pass (`send_stc_pass`) doesn't
    /// resubmit geometry that moved into a child buffer.
    pub fn remove_ranges(&mut self, indices: &[usize]) {
        self.backing.remove_ranges(indices);
    }
}

/// One [`Builder`] per [`FillStcPass`].
#[derive(Debug, Default)]
pub struct BuilderSet {
    builders: [Builder; 4],
}

impl BuilderSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pass(&self, pass: FillStcPass) -> &Builder {
        &self.builders[pass.index()]
    }

    pub fn pass_mut(&mut self, pass: FillStcPass) -> &mut Builder {
        &mut self.builders[pass.index()]
    }

    /// Adds geometry to a pass, skipping the two anti-alias passes when
    /// anti-aliasing is disabled.
    pub fn add_stc(
        &mut self,
        pass: FillStcPass,
        anti_alias: render_protocol::AntiAlias,
        vertices: VertexRange,
        bounding_box: Option<BoundingBox>,
    ) -> Option<STCData> {
        if pass.is_anti_alias_pass() && anti_alias == render_protocol::AntiAlias::None {
            return None;
        }
        Some(self.pass_mut(pass).add_range(vertices, bounding_box))
    }

    /// Moves STC geometry from `src` into `self`, one pass at a time,
    /// mirroring `DrawCommandList::copy_commands`'s bounding-box semantics:
    /// the whole of `src`'s current backing for each pass is walked,
    /// entries whose box intersects `bbox_expanded` are copied into `self`,
    /// and when `delete_contained` is set, entries fully inside
    /// `bbox_contained` are also removed from `src` so a later full-backing
    /// pass doesn't resubmit them.
    pub fn copy_stc(
        &mut self,
        src: &mut BuilderSet,
        bbox_expanded: BoundingBox,
        bbox_contained: BoundingBox,
        delete_contained: bool,
    ) {
        for pass in FillStcPass::ALL {
            let src_len = src.pass(pass).backing().len();
            let src_data = STCData { begin: 0, end: src_len };
            let mut dst_data = STCData::empty();
            let mut deleted = Vec::new();
            {
                let dst_builder = self.pass_mut(pass);
                let src_builder = src.pass(pass);
                dst_builder.copy_stc(&mut dst_data, src_builder, &src_data, bbox_expanded, delete_contained, &mut deleted);
            }
            if !deleted.is_empty() {
                src.pass_mut(pass).remove_ranges(&deleted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vr(begin: u32, end: u32) -> VertexRange {
        VertexRange { begin, end }
    }

    #[test]
    fn copy_stc_moves_only_intersecting_subranges_and_deletes_contained() {
        let mut src = Builder::default();
        let mut src_data = src.add_range(vr(0, 3), Some((0.0, 0.0, 1.0, 1.0)));
        src.extend(&mut src_data, vr(3, 6), Some((10.0, 10.0, 11.0, 11.0)));
        src.extend(&mut src_data, vr(6, 9), None);

        let bbox = (0.0, 0.0, 2.0, 2.0);
        let mut dst = Builder::default();
        let mut dst_data = STCData::empty();
        let mut deleted = Vec::new();
        dst.copy_stc(&mut dst_data, &src, &src_data, bbox, true, &mut deleted);

        // the fully-contained range and the unconditional range move; the
        // far-away range does not.
        assert_eq!(dst_data.len(), 2);
        assert_eq!(deleted, vec![0]);
    }

    #[test]
    fn copy_stc_twice_with_same_bbox_is_idempotent_after_deletion_is_applied() {
        let mut src = Builder::default();
        let mut src_data = src.add_range(vr(0, 3), Some((0.0, 0.0, 1.0, 1.0)));
        src.extend(&mut src_data, vr(3, 6), Some((10.0, 10.0, 11.0, 11.0)));

        let bbox = (0.0, 0.0, 2.0, 2.0);
        let mut dst = Builder::default();
        let mut dst_data = STCData::empty();
        let mut deleted = Vec::new();
        dst.copy_stc(&mut dst_data, &src, &src_data, bbox, true, &mut deleted);
        assert_eq!(dst_data.len(), 1);

        // simulate the caller removing deleted indices from the live range
        // set: a second pass over what remains (index 1 only) copies
        // nothing new from the deleted region.
        let remaining = STCData { begin: 1, end: 2 };
        let mut dst_data2 = STCData::empty();
        let mut deleted2 = Vec::new();
        dst.copy_stc(&mut dst_data2, &src, &remaining, bbox, true, &mut deleted2);
        assert!(dst_data2.is_empty());
        assert!(deleted2.is_empty());
    }

    #[test]
    fn builder_set_copy_stc_moves_per_pass_and_compacts_src() {
        let mut src = BuilderSet::new();
        src.pass_mut(FillStcPass::ContourStencil)
            .add_range(vr(0, 3), Some((0.0, 0.0, 1.0, 1.0)));
        src.pass_mut(FillStcPass::ContourStencil)
            .add_range(vr(3, 6), Some((100.0, 100.0, 101.0, 101.0)));
        src.pass_mut(FillStcPass::ContourFuzz)
            .add_range(vr(6, 9), Some((0.0, 0.0, 1.0, 1.0)));

        let mut dst = BuilderSet::new();
        let bbox = (0.0, 0.0, 2.0, 2.0);
        dst.copy_stc(&mut src, bbox, bbox, true);

        assert_eq!(dst.pass(FillStcPass::ContourStencil).backing().len(), 1);
        assert_eq!(dst.pass(FillStcPass::ContourFuzz).backing().len(), 1);
        assert_eq!(src.pass(FillStcPass::ContourStencil).backing().len(), 1, "contained range removed");
        assert_eq!(src.pass(FillStcPass::ContourFuzz).backing().len(), 0, "contained range removed");
    }

    #[test]
    fn add_stc_skips_anti_alias_passes_when_disabled() {
        let mut set = BuilderSet::new();
        let result = set.add_stc(
            FillStcPass::ContourFuzz,
            render_protocol::AntiAlias::None,
            vr(0, 3),
            None,
        );
        assert!(result.is_none());

        let result = set.add_stc(
            FillStcPass::ContourStencil,
            render_protocol::AntiAlias::None,
            vr(0, 3),
            None,
        );
        assert!(result.is_some());
    }
}
