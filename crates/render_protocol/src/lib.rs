//! The contract between the renderer core and the GPU backend. Everything
//! out of scope for this core -- draw-call submission, uber-shader key
//! construction, shader sources -- is named here as a trait boundary or
//! handle type, never implemented.

mod config;
mod shader;
mod stats;

pub use config::{
    AntiAlias, BlendMode, ClipWindowStrategy, DepthBufferMode, Filter, MaskChannel, MaskType,
    Mipmap, TileMode, UberShaderMethod,
};
pub use shader::{
    ClipCombineChannelRouting, FillMethod, FillStcPass, ShaderId, ShaderKind, UberShadingKey,
};
pub use stats::FrameStats;

use slotmap::new_key_type;
use std::marker::PhantomData;

new_key_type! {
    /// Stable identity for an atlas-backed image, independent of any
    /// particular `Vec` the image payload happens to live in.
    pub struct ImageHandle;
}

new_key_type! {
    pub struct ShadowMapHandle;
}

/// A cheap index/handle to a value the backend has uploaded. Equality compares indices only; `valid()` distinguishes
/// the null handle produced by `RenderValue::invalid()`.
#[derive(Debug)]
pub struct RenderValue<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> RenderValue<T> {
    pub const fn new(index: u32) -> Self {
        Self {
            index,
            _marker: PhantomData,
        }
    }

    pub const fn invalid() -> Self {
        Self::new(u32::MAX)
    }

    pub const fn valid(&self) -> bool {
        self.index != u32::MAX
    }

    pub const fn index(&self) -> u32 {
        self.index
    }
}

impl<T> Clone for RenderValue<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for RenderValue<T> {}
impl<T> PartialEq for RenderValue<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}
impl<T> Eq for RenderValue<T> {}
impl<T> Default for RenderValue<T> {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Transform, brush, sampler, clip-window and scale/translate values are all
/// created through the same backend entry point, distinguished only by the
/// type parameter of the returned handle.
pub trait RenderBackend {
    type Error: std::error::Error;

    fn begin(&mut self);
    fn end(&mut self, stats_out: &mut FrameStats);

    fn create_value<T: 'static>(&mut self, value: T) -> RenderValue<T>;

    fn draw_render_data(&mut self, request: DrawRenderDataRequest) -> Result<(), Self::Error>;

    fn begin_render_target(&mut self, clear: ClearParams, target: RenderTargetId);
    fn end_render_target(&mut self);

    fn set_stencil_state(&mut self, state: StencilState);
    fn color_write_mask(&mut self, mask: ColorWriteMask);
    fn depth_buffer_mode(&mut self, mode: DepthBufferMode);
    fn set_fragment_shader_emit(&mut self, colorspace: Colorspace);

    fn begin_accumulate(&mut self, clip_kind: ClipWindowStrategy, method: UberShaderMethod);
    fn accumulate_shader(&mut self, shader: ShaderId);
    fn end_accumulate(&mut self) -> UberShadingKey;
    fn uber_shader_of_all(&self) -> UberShadingKey;

    fn requires_framebuffer_pixels(&self, blend_mode: BlendMode) -> bool;
}

/// The geometry approximation contract the fillers consume but never
/// implement.
pub trait ContourSource {
    type Curve;

    fn fill_approximated_geometry(&self, tolerance: f32) -> Vec<Self::Curve>;
    fn stroke_approximated_geometry(&self, tolerance: f32) -> Vec<Self::Curve>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearParams {
    pub color: Option<[f32; 4]>,
    pub clear_depth: bool,
    pub clear_stencil: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilState {
    pub incr_on_front_face: bool,
    pub decr_on_back_face: bool,
    pub compare_not_equal_zero: bool,
    /// Bits of the stencil value the cover-pass comparison considers: `0xFF`
    /// realises the `nonzero`/`complement_nonzero` fill rules, `0x01` realises `odd_even`/`complement_odd_even`
    /// (`!= 0 & 1`).
    pub compare_mask: u8,
}

impl StencilState {
    pub const COVER_MASK_NONZERO: u8 = 0xFF;
    pub const COVER_MASK_ODD_EVEN: u8 = 0x01;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorWriteMask {
    pub red: bool,
    pub green: bool,
    pub blue: bool,
    pub alpha: bool,
}

impl ColorWriteMask {
    pub const ALL: Self = Self {
        red: true,
        green: true,
        blue: true,
        alpha: true,
    };
    pub const NONE: Self = Self {
        red: false,
        green: false,
        blue: false,
        alpha: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colorspace {
    Linear,
    Srgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexRange {
    pub begin: u32,
    pub end: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleTranslate {
    pub scale: (i32, i32),
    pub translate: (i32, i32),
}

/// One `draw_render_data` call; fields bundle the render-value
/// handles the backend needs to bind, not the geometry itself.
#[derive(Debug, Clone, Copy)]
pub struct DrawRenderDataRequest {
    pub z: i32,
    pub shader: ShaderId,
    pub uber_key: UberShadingKey,
    pub scale_translate: ScaleTranslate,
    pub clip_window: Option<RenderValue<ClipWindow>>,
    pub permute_xy: bool,
    pub vertex_range: VertexRange,
}

/// Marker types used only as `RenderValue<T>` type parameters; the backend
/// owns their actual representation.
pub struct ClipWindow;
pub struct Transformation;
pub struct Brush;
pub struct ImageSampler;
pub struct EmulateFramebufferFetch;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_value_default_is_invalid() {
        let v: RenderValue<Transformation> = RenderValue::default();
        assert!(!v.valid());
    }

    #[test]
    fn render_value_equality_is_index_only() {
        let a: RenderValue<Brush> = RenderValue::new(3);
        let b: RenderValue<Brush> = RenderValue::new(3);
        let c: RenderValue<Brush> = RenderValue::new(4);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.valid());
    }

    #[test]
    fn color_write_mask_all_and_none_are_distinct() {
        assert_ne!(ColorWriteMask::ALL, ColorWriteMask::NONE);
    }
}
