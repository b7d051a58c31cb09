//! Frame statistics, reported "as a packed integer array with parallel
//! label array" -- stored as a named struct (the shape every
//! counter-producing type in the corpus actually uses) and flattened to the
//! packed/labelled form only at the reporting boundary.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub number_virtual_buffer_backing_allocation_failed: u64,
    pub number_sparse_fill_culled_paths: u64,
    pub number_sparse_fill_contours_mapped: u64,
    pub number_sparse_fill_fallback_to_non_sparse: u64,
    pub number_draw_commands_sent: u64,
    pub number_scratch_render_targets_used: u64,
}

impl FrameStats {
    pub fn as_pairs(&self) -> Vec<(&'static str, u64)> {
        vec![
            (
                "number_virtual_buffer_backing_allocation_failed",
                self.number_virtual_buffer_backing_allocation_failed,
            ),
            (
                "number_sparse_fill_culled_paths",
                self.number_sparse_fill_culled_paths,
            ),
            (
                "number_sparse_fill_contours_mapped",
                self.number_sparse_fill_contours_mapped,
            ),
            (
                "number_sparse_fill_fallback_to_non_sparse",
                self.number_sparse_fill_fallback_to_non_sparse,
            ),
            ("number_draw_commands_sent", self.number_draw_commands_sent),
            (
                "number_scratch_render_targets_used",
                self.number_scratch_render_targets_used,
            ),
        ]
    }

    pub fn merge(&mut self, other: &FrameStats) {
        self.number_virtual_buffer_backing_allocation_failed +=
            other.number_virtual_buffer_backing_allocation_failed;
        self.number_sparse_fill_culled_paths += other.number_sparse_fill_culled_paths;
        self.number_sparse_fill_contours_mapped += other.number_sparse_fill_contours_mapped;
        self.number_sparse_fill_fallback_to_non_sparse +=
            other.number_sparse_fill_fallback_to_non_sparse;
        self.number_draw_commands_sent += other.number_draw_commands_sent;
        self.number_scratch_render_targets_used += other.number_scratch_render_targets_used;
    }
}
