use bitflags::bitflags;
use render_protocol::{RenderBackend, RenderValue, Transformation as TransformationTag};

const TINY: f32 = 1.0e-6;

/// A 2x2 linear map plus translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix2x2 {
    pub m00: f32,
    pub m01: f32,
    pub m10: f32,
    pub m11: f32,
}

impl Matrix2x2 {
    pub const IDENTITY: Self = Self {
        m00: 1.0,
        m01: 0.0,
        m10: 0.0,
        m11: 1.0,
    };

    pub fn determinant(self) -> f32 {
        self.m00 * self.m11 - self.m01 * self.m10
    }

    pub fn concat(self, rhs: Self) -> Self {
        Self {
            m00: self.m00 * rhs.m00 + self.m01 * rhs.m10,
            m01: self.m00 * rhs.m01 + self.m01 * rhs.m11,
            m10: self.m10 * rhs.m00 + self.m11 * rhs.m10,
            m11: self.m10 * rhs.m01 + self.m11 * rhs.m11,
        }
    }

    pub fn inverse(self) -> Self {
        let det = self.determinant();
        let inv_det = if det.abs() < TINY { 0.0 } else { 1.0 / det };
        Self {
            m00: self.m11 * inv_det,
            m01: -self.m01 * inv_det,
            m10: -self.m10 * inv_det,
            m11: self.m00 * inv_det,
        }
    }

    /// Singular values of the 2x2 matrix, largest first, via the closed-form
    /// for 2x2 SVD (no iteration needed at this size).
    pub fn singular_values(self) -> (f32, f32) {
        let e = (self.m00 + self.m11) * 0.5;
        let f = (self.m00 - self.m11) * 0.5;
        let g = (self.m10 + self.m01) * 0.5;
        let h = (self.m10 - self.m01) * 0.5;
        let q = (e * e + h * h).sqrt();
        let r = (f * f + g * g).sqrt();
        let sx = q + r;
        let sy = (q - r).abs();
        (sx.max(sy), sx.min(sy))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transformation {
    pub matrix: Matrix2x2,
    pub translate: (f32, f32),
}

impl Default for Transformation {
    fn default() -> Self {
        Self {
            matrix: Matrix2x2::IDENTITY,
            translate: (0.0, 0.0),
        }
    }
}

impl Transformation {
    pub fn concat(self, rhs: Self) -> Self {
        let matrix = self.matrix.concat(rhs.matrix);
        let (rx, ry) = rhs.translate;
        let (tx, ty) = (
            self.matrix.m00 * rx + self.matrix.m01 * ry + self.translate.0,
            self.matrix.m10 * rx + self.matrix.m11 * ry + self.translate.1,
        );
        Self {
            matrix,
            translate: (tx, ty),
        }
    }

    pub fn inverse(self) -> Self {
        let inv = self.matrix.inverse();
        let (tx, ty) = self.translate;
        let translate = (
            -(inv.m00 * tx + inv.m01 * ty),
            -(inv.m10 * tx + inv.m11 * ty),
        );
        Self {
            matrix: inv,
            translate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixType {
    Identity,
    Translation,
    Scaling,
    General,
}

bitflags! {
    /// Dirty bits for lazily-recomputed derived values. The invalidation
    /// rules in each mutator follow exactly: `translate`
    /// leaves SVD/matrix-type alone, `scale` leaves matrix-type alone,
    /// `rotate` leaves SVD alone, and direct matrix assignment dirties
    /// everything.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Dirty: u8 {
        const INVERSE     = 1 << 0;
        const SVD         = 1 << 1;
        const MATRIX_TYPE = 1 << 2;
        const PIXEL_SIZE  = 1 << 3;
        const RENDER_VALUE = 1 << 4;
    }
}

const ALL_DIRTY: Dirty = Dirty::all();

/// A transformation-stack node with lazily-recomputed derived values
///. Derived values recompute on first access after going
/// dirty and are cached until the next mutation that affects them.
pub struct CachedTransformation {
    current: Transformation,
    dirty: Dirty,
    cached_inverse: Transformation,
    cached_svd: (f32, f32),
    cached_matrix_type: MatrixType,
    cached_pixel_size: f32,
    cached_render_value: Option<RenderValue<TransformationTag>>,
}

impl Default for CachedTransformation {
    fn default() -> Self {
        Self {
            current: Transformation::default(),
            dirty: ALL_DIRTY,
            cached_inverse: Transformation::default(),
            cached_svd: (1.0, 1.0),
            cached_matrix_type: MatrixType::Identity,
            cached_pixel_size: 1.0,
            cached_render_value: None,
        }
    }
}

impl CachedTransformation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transformation(&self) -> Transformation {
        self.current
    }

    /// Assigning a new matrix directly invalidates every derived value.
    pub fn set_transformation(&mut self, value: Transformation) {
        self.current = value;
        self.dirty = ALL_DIRTY;
    }

    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.current.translate.0 += self.current.matrix.m00 * dx + self.current.matrix.m01 * dy;
        self.current.translate.1 += self.current.matrix.m10 * dx + self.current.matrix.m11 * dy;
        self.dirty.insert(Dirty::INVERSE | Dirty::PIXEL_SIZE | Dirty::RENDER_VALUE);
    }

    pub fn scale(&mut self, sx: f32, sy: f32) {
        self.current.matrix = self.current.matrix.concat(Matrix2x2 {
            m00: sx,
            m01: 0.0,
            m10: 0.0,
            m11: sy,
        });
        self.dirty.insert(
            Dirty::INVERSE | Dirty::SVD | Dirty::PIXEL_SIZE | Dirty::RENDER_VALUE,
        );
    }

    pub fn rotate(&mut self, radians: f32) {
        let (sin, cos) = radians.sin_cos();
        self.current.matrix = self.current.matrix.concat(Matrix2x2 {
            m00: cos,
            m01: -sin,
            m10: sin,
            m11: cos,
        });
        self.dirty.insert(
            Dirty::INVERSE | Dirty::MATRIX_TYPE | Dirty::PIXEL_SIZE | Dirty::RENDER_VALUE,
        );
    }

    pub fn concat(&mut self, rhs: Transformation) {
        self.current = self.current.concat(rhs);
        self.dirty = ALL_DIRTY;
    }

    pub fn inverse(&mut self) -> Transformation {
        if self.dirty.contains(Dirty::INVERSE) {
            self.cached_inverse = self.current.inverse();
            self.dirty.remove(Dirty::INVERSE);
        }
        self.cached_inverse
    }

    pub fn singular_values(&mut self) -> (f32, f32) {
        if self.dirty.contains(Dirty::SVD) {
            self.cached_svd = self.current.matrix.singular_values();
            self.dirty.remove(Dirty::SVD);
        }
        self.cached_svd
    }

    pub fn matrix_type(&mut self) -> MatrixType {
        if self.dirty.contains(Dirty::MATRIX_TYPE) {
            let m = self.current.matrix;
            self.cached_matrix_type = if m == Matrix2x2::IDENTITY {
                MatrixType::Identity
            } else if m.m01 == 0.0 && m.m10 == 0.0 {
                if m.m00 == 1.0 && m.m11 == 1.0 {
                    MatrixType::Translation
                } else {
                    MatrixType::Scaling
                }
            } else {
                MatrixType::General
            };
            self.dirty.remove(Dirty::MATRIX_TYPE);
        }
        self.cached_matrix_type
    }

    /// Size, in logical coordinates, of one pixel under this transformation
    /// at the given output scale.
    pub fn surface_pixel_size_in_logical_coordinates(&mut self, scale: f32) -> f32 {
        if self.dirty.contains(Dirty::PIXEL_SIZE) {
            let (largest, _) = self.current.matrix.singular_values();
            self.cached_pixel_size = if largest.abs() < TINY {
                f32::INFINITY
            } else {
                scale / largest
            };
            self.dirty.remove(Dirty::PIXEL_SIZE);
        }
        self.cached_pixel_size
    }

    /// `output_tol / max(svd[0], TINY)`: the curve-flattening tolerance to use
    /// in logical coordinates to hit `output_tol` pixels of error.
    pub fn logical_rendering_accuracy(&mut self, output_tol: f32) -> f32 {
        let (largest, _) = self.singular_values();
        output_tol / largest.max(TINY)
    }

    /// Memoised backend handle for the current transformation. Cache is
    /// invalidated by any mutation; `post_transformation`, when given, is
    /// concatenated in first and bypasses the cache (it varies per call
    /// site, e.g. per-draw clip adjustments).
    pub fn render_value<B: RenderBackend>(
        &mut self,
        backend: &mut B,
        post_transformation: Option<Transformation>,
    ) -> RenderValue<TransformationTag> {
        if let Some(post) = post_transformation {
            return backend.create_value(post.concat(self.current));
        }
        if self.dirty.contains(Dirty::RENDER_VALUE) || self.cached_render_value.is_none() {
            self.cached_render_value = Some(backend.create_value(self.current));
            self.dirty.remove(Dirty::RENDER_VALUE);
        }
        self.cached_render_value.unwrap()
    }
}
