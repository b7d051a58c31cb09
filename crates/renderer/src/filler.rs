//! Fillers: the strategies that turn a path + fill rule + clip
//! into an `Image` whose tiles are classified `{empty, full, rendered,
//! shared}`. The hardest sub-core; dispatched as a tagged enum rather than
//! a virtual hierarchy.

use crate::virtual_buffer::FillRule;
use render_protocol::FrameStats;

pub type Point = (f32, f32);
pub type BoundingBox = crate::stc::BoundingBox;

/// A contour curve already mapped into pixel space. `Conic` carries a
/// rational-quadratic weight; `Line` is itself (and is also what
/// `LineClipper` substitutes for every curve when clipping).
#[derive(Debug, Clone, Copy)]
pub enum MappedCurve {
    Line(Point, Point),
    Conic { p0: Point, p1: Point, p2: Point, weight: f32 },
}

impl MappedCurve {
    pub const fn endpoints(self) -> (Point, Point) {
        match self {
            MappedCurve::Line(a, b) => (a, b),
            MappedCurve::Conic { p0, p2, .. } => (p0, p2),
        }
    }

    pub fn bounding_box(self) -> BoundingBox {
        let pts: &[Point] = match &self {
            MappedCurve::Line(a, b) => &[*a, *b],
            MappedCurve::Conic { p0, p1, p2, .. } => &[*p0, *p1, *p2],
        };
        let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
        let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for &(x, y) in pts {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        (min_x, min_y, max_x, max_y)
    }

    /// What `LineClipper` clips against: every curve becomes the line
    /// segment between its endpoints.
    pub const fn as_line_for_clipping(self) -> MappedCurve {
        let (a, b) = self.endpoints();
        MappedCurve::Line(a, b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileFillState {
    Skip,
    Inside,
    Outside,
    Mixed,
}

#[derive(Debug, Clone)]
pub struct TileGrid {
    pub width: u32,
    pub height: u32,
    states: Vec<TileFillState>,
    /// Winding number contributed by contours that surround, but never
    /// touch, each tile.
    winding_offsets: Vec<i32>,
}

impl TileGrid {
    fn new(width: u32, height: u32) -> Self {
        let count = (width * height) as usize;
        Self {
            width,
            height,
            states: vec![TileFillState::Outside; count],
            winding_offsets: vec![0; count],
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    pub fn state(&self, x: u32, y: u32) -> TileFillState {
        self.states[self.index(x, y)]
    }

    fn set_state(&mut self, x: u32, y: u32, state: TileFillState) {
        let i = self.index(x, y);
        self.states[i] = state;
    }

    pub fn winding_offset(&self, x: u32, y: u32) -> i32 {
        self.winding_offsets[self.index(x, y)]
    }

    fn add_winding_offset(&mut self, x: u32, y: u32, delta: i32) {
        let i = self.index(x, y);
        self.winding_offsets[i] += delta;
    }

    pub fn mixed_tile_count(&self) -> usize {
        self.states.iter().filter(|s| **s == TileFillState::Mixed).count()
    }

    fn lit_fraction(&self) -> f32 {
        if self.states.is_empty() {
            return 0.0;
        }
        let lit = self
            .states
            .iter()
            .filter(|s| !matches!(s, TileFillState::Skip | TileFillState::Outside))
            .count();
        lit as f32 / self.states.len() as f32
    }
}

/// Give-up threshold: more than this fraction of tiles lit (or a grid
/// smaller than 3 in either dimension) means the sparse filler bails out
/// to `NonSparse`.
pub const LIT_FRACTION_GIVE_UP_THRESHOLD: f32 = 0.75;
pub const MIN_SPARSE_GRID_DIMENSION: u32 = 3;

fn contour_bounding_box(contour: &[MappedCurve]) -> Option<BoundingBox> {
    let mut curves = contour.iter().copied();
    let first = curves.next()?.bounding_box();
    Some(curves.fold(first, |acc, curve| {
        let bb = curve.bounding_box();
        (acc.0.min(bb.0), acc.1.min(bb.1), acc.2.max(bb.2), acc.3.max(bb.3))
    }))
}

fn grid_too_small(width: u32, height: u32) -> bool {
    width < MIN_SPARSE_GRID_DIMENSION || height < MIN_SPARSE_GRID_DIMENSION
}

/// Ray-casts to +x from the centre of every tile the contour does not
/// itself touch, accumulating signed crossings (CW +1, CCW -1, y pointing
/// down).
fn accumulate_winding_offsets(grid: &mut TileGrid, tile_size: f32, contour: &[MappedCurve]) {
    for ty in 0..grid.height {
        for tx in 0..grid.width {
            if grid.state(tx, ty) == TileFillState::Mixed {
                continue;
            }
            let center = ((tx as f32 + 0.5) * tile_size, (ty as f32 + 0.5) * tile_size);
            let mut winding = 0i32;
            for curve in contour {
                let (p0, p1) = curve.endpoints();
                winding += ray_crossing_signed(center, p0, p1);
            }
            if winding != 0 {
                grid.add_winding_offset(tx, ty, winding);
            }
        }
    }
}

/// Signed crossing count of the ray `(x, y) -> (+inf, y)` against segment
/// `p0 -> p1`; `+1` for a clockwise crossing, `-1` for counter-clockwise (y
/// axis pointing down, matching .2).
fn ray_crossing_signed(origin: Point, p0: Point, p1: Point) -> i32 {
    let (ox, oy) = origin;
    let (crosses_down, crosses_up) = (p0.1 <= oy && p1.1 > oy, p0.1 > oy && p1.1 <= oy);
    if !crosses_down && !crosses_up {
        return 0;
    }
    let t = (oy - p0.1) / (p1.1 - p0.1);
    let x_at = p0.0 + t * (p1.0 - p0.0);
    if x_at <= ox {
        return 0;
    }
    if crosses_down { 1 } else { -1 }
}

/// A clipped segment lying exactly on a tile boundary after clipping
/// contributes to the winding number rather than being emitted as stencil
/// geometry.
pub fn is_edge_hugger(segment: (Point, Point), tile_bounds: BoundingBox) -> bool {
    let ((x0, y0), (x1, y1)) = segment;
    let on_vertical_edge = (x0 == tile_bounds.0 && x1 == tile_bounds.0) || (x0 == tile_bounds.2 && x1 == tile_bounds.2);
    let on_horizontal_edge = (y0 == tile_bounds.1 && y1 == tile_bounds.1) || (y0 == tile_bounds.3 && y1 == tile_bounds.3);
    on_vertical_edge || on_horizontal_edge
}

/// .3: which fill rule a tile effectively uses once its
/// winding offset is folded in, and how many oriented winding-bias rects
/// (for `nonzero`/`complement_nonzero`) to append to the stencil pass.
pub fn realize_fill_rule_for_tile(base_rule: FillRule, winding_offset: i32) -> (FillRule, u32) {
    match base_rule {
        FillRule::OddEven | FillRule::ComplementOddEven => {
            let rule = if winding_offset % 2 != 0 { base_rule.complement() } else { base_rule };
            (rule, 0)
        }
        FillRule::NonZero | FillRule::ComplementNonZero => (base_rule, winding_offset.unsigned_abs()),
    }
}

/// .3: stable solve of `a*t^2 + 2*b*t + c = 0`, choosing the
/// division order by the sign of `b` so the subtraction `b - sqrt(d)` (the
/// one that can catastrophically cancel) is never taken.
pub fn stable_quadratic_roots(a: f64, b: f64, c: f64) -> Vec<f64> {
    let discriminant = b * b - a * c;
    if discriminant < 0.0 {
        return Vec::new();
    }
    let sqrt_d = discriminant.sqrt();
    let q = if b >= 0.0 { b + sqrt_d } else { b - sqrt_d };

    if q == 0.0 {
        if a == 0.0 {
            return Vec::new();
        }
        return vec![0.0];
    }

    let mut roots = vec![-c / q];
    if a != 0.0 {
        roots.push(-q / a);
    }
    roots
}

/// : "center of tight bbox farther from clip line" tie-break when
/// round-off makes a split side ambiguous. `Less`/`Greater` name which side
/// of `clip_x` the bbox's centre actually leans towards; `Equal` means the
/// centre sits exactly on the line and the split is genuinely undecidable.
pub fn side_selection_oracle(bbox: BoundingBox, clip_x: f32) -> std::cmp::Ordering {
    let center_x = (bbox.0 + bbox.2) * 0.5;
    center_x.partial_cmp(&clip_x).unwrap_or(std::cmp::Ordering::Equal)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipCombineMode {
    Both,
    IntersectOnly,
}

/// Whether a `ClipElement` tile is borrowed directly or re-rendered through
/// `ClipCombineShader`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipCombineDecision {
    /// The fill tile contributes nothing or everything on its own; the clip
    /// tile's own image tile is borrowed directly, no combine draw issued.
    ReuseClipTile,
    Render(render_protocol::ClipCombineChannelRouting),
}

/// `4.7`: whether a fill tile's overlapping `ClipElement` tile is reused or
/// re-rendered, and in which of the four channel-routing configurations,
/// depending on the fill tile's classification and the active
/// `ClipCombineMode`. Only `Mixed`/`Inside` tiles need a combine draw --
/// `Outside`/`Skip` tiles contribute nothing, so the clip tile stands alone.
pub fn clip_combine_decision(mode: ClipCombineMode, fill_tile: TileFillState) -> ClipCombineDecision {
    use render_protocol::ClipCombineChannelRouting as Routing;
    match fill_tile {
        TileFillState::Outside | TileFillState::Skip => ClipCombineDecision::ReuseClipTile,
        TileFillState::Inside => match mode {
            ClipCombineMode::Both => ClipCombineDecision::Render(Routing::BothChannelsFromClipTile),
            ClipCombineMode::IntersectOnly => ClipCombineDecision::Render(Routing::IntersectOnlyFillFull),
        },
        TileFillState::Mixed => match mode {
            ClipCombineMode::Both => ClipCombineDecision::Render(Routing::BothChannelsFromFillTile),
            ClipCombineMode::IntersectOnly => ClipCombineDecision::Render(Routing::IntersectOnlyFillEmpty),
        },
    }
}

/// Pluggable sink for numerical anomalies in sparse clipping; never aborts, the caller may log or count occurrences.
pub trait SparseFillingErrorCallback {
    fn report(&mut self, message: &str);
}

#[derive(Debug, Default)]
pub struct NoopErrorCallback;

impl SparseFillingErrorCallback for NoopErrorCallback {
    fn report(&mut self, _message: &str) {}
}

/// Per-line-clipper-invocation state. `restrict_bbs` is carried on the
/// struct to match the public surface area but is never read by the tile
/// classification pass -- it's wired up for a future post-classification
/// pruning pass that doesn't exist yet, rather than guessed at here.
#[derive(Debug, Default)]
pub struct LineClipperState {
    pub restrict_bbs: Vec<BoundingBox>,
}

#[derive(Debug, Default)]
pub struct CurveClipperState {
    pub restrict_bbs: Vec<BoundingBox>,
}

/// : expressed as a tagged variant dispatched by the scheduler,
/// state owned rather than shared.
pub enum Filler {
    NonSparse,
    LineClipper(LineClipperState),
    CurveClipper(CurveClipperState),
}

/// Result of a successful sparse classification: the tile grid plus, per
/// mixed tile, the effective fill rule and winding-bias rect count.
pub struct SparseFillResult {
    pub grid: TileGrid,
    pub tile_size: f32,
}

fn bbox_intersects(a: BoundingBox, b: BoundingBox) -> bool {
    a.0 <= b.2 && b.0 <= a.2 && a.1 <= b.3 && b.1 <= a.3
}

impl Filler {
    /// Run once per contour before classification proper. A contour whose
    /// bounding box misses
    /// `clip_bbox` entirely never reaches the tile grid; it is culled and
    /// `contours_mapped` is left untouched. Only `LineClipper` and
    /// `CurveClipper` cull like this -- `NonSparse` always maps.
    pub fn map_contour(&self, contour: &[MappedCurve], clip_bbox: BoundingBox, stats: &mut FrameStats) -> bool {
        if matches!(self, Filler::NonSparse) {
            stats.number_sparse_fill_contours_mapped += 1;
            return true;
        }
        let Some(contour_bbox) = contour_bounding_box(contour) else {
            stats.number_sparse_fill_culled_paths += 1;
            return false;
        };
        if bbox_intersects(contour_bbox, clip_bbox) {
            stats.number_sparse_fill_contours_mapped += 1;
            true
        } else {
            stats.number_sparse_fill_culled_paths += 1;
            false
        }
    }

    /// `None` means "give up, fall back to `NonSparse`" -- either because
    /// this variant is itself `NonSparse`, or
    /// because the grid is too small, or because too many tiles are lit.
    pub fn create_sparse_mask(
        &self,
        contours: &[Vec<MappedCurve>],
        grid_size: (u32, u32),
        tile_size: f32,
        fill_rule: FillRule,
        error_callback: &mut dyn SparseFillingErrorCallback,
    ) -> Option<SparseFillResult> {
        match self {
            Filler::NonSparse => None,
            Filler::LineClipper(_) | Filler::CurveClipper(_) => {
                self.classify(contours, grid_size, tile_size, fill_rule, error_callback)
            }
        }
    }

    fn classify(
        &self,
        contours: &[Vec<MappedCurve>],
        grid_size: (u32, u32),
        tile_size: f32,
        fill_rule: FillRule,
        error_callback: &mut dyn SparseFillingErrorCallback,
    ) -> Option<SparseFillResult> {
        let (width, height) = grid_size;
        if grid_too_small(width, height) {
            return None;
        }

        let mut grid = TileGrid::new(width, height);
        for contour in contours {
            light_tiles_for_contour(&mut grid, tile_size, contour, self);
        }

        if grid.lit_fraction() > LIT_FRACTION_GIVE_UP_THRESHOLD {
            return None;
        }

        for contour in contours {
            accumulate_winding_offsets(&mut grid, tile_size, contour);
        }

        for y in 0..height {
            for x in 0..width {
                if grid.state(x, y) != TileFillState::Mixed {
                    let winding = grid.winding_offset(x, y);
                    let (_, extra) = realize_fill_rule_for_tile(fill_rule, winding);
                    if extra > 0 {
                        grid.set_state(x, y, TileFillState::Inside);
                    }
                }
            }
        }

        if let Filler::CurveClipper(_) = self {
            if contours.is_empty() {
                error_callback.report("curve clipper received an empty path");
            }
        }

        Some(SparseFillResult { grid, tile_size })
    }
}

/// Width/height, relative to `tile_size`, below which a `CurveClipper`
/// bbox is treated as lying exactly on one gridline rather than genuinely
/// spanning two tiles -- the round-off band `side_selection_oracle` exists
/// to resolve.
const SPLIT_AMBIGUITY_TOLERANCE: f32 = 1e-4;

/// Lights tiles containing a curve's endpoints or the gridlines it crosses
///; `LineClipper` uses the curve's endpoint-to-
/// endpoint line, `CurveClipper` uses its true bounding box. A segment that
/// hugs a tile boundary after clipping contributes to the winding offset
/// instead of forcing the tile `Mixed`; a `CurveClipper` bbox whose x-extent
/// is round-off-thin against a single gridline resolves via the
/// side-selection oracle rather than lighting both neighbouring columns.
fn light_tiles_for_contour(grid: &mut TileGrid, tile_size: f32, contour: &[MappedCurve], filler: &Filler) {
    for &curve in contour {
        let curve = match filler {
            Filler::LineClipper(_) => curve.as_line_for_clipping(),
            _ => curve,
        };
        let bbox = curve.bounding_box();
        let (min_x, min_y, max_x, max_y) = bbox;
        let mut tx0 = ((min_x / tile_size).floor().max(0.0)) as u32;
        let ty0 = ((min_y / tile_size).floor().max(0.0)) as u32;
        let mut tx1 = ((max_x / tile_size).ceil().max(1.0) as u32).min(grid.width).saturating_sub(1);
        let ty1 = ((max_y / tile_size).ceil().max(1.0) as u32).min(grid.height).saturating_sub(1);

        if matches!(filler, Filler::CurveClipper(_))
            && tx1 > tx0
            && (max_x - min_x) <= SPLIT_AMBIGUITY_TOLERANCE * tile_size
        {
            let boundary_x = tx1 as f32 * tile_size;
            tx0 = match side_selection_oracle(bbox, boundary_x) {
                std::cmp::Ordering::Less => tx0,
                _ => tx1,
            };
            tx1 = tx0;
        }

        let segment = curve.endpoints();
        for ty in ty0.min(grid.height.saturating_sub(1))..=ty1 {
            for tx in tx0.min(grid.width.saturating_sub(1))..=tx1 {
                let tile_bounds = (
                    tx as f32 * tile_size,
                    ty as f32 * tile_size,
                    (tx + 1) as f32 * tile_size,
                    (ty + 1) as f32 * tile_size,
                );
                if is_edge_hugger(segment, tile_bounds) {
                    continue;
                }
                grid.set_state(tx, ty, TileFillState::Mixed);
            }
        }
    }
}
