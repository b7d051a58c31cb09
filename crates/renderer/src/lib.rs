//! The deferred-rendering core: commands accumulate against `VirtualBuffer`s
//! behind `Encoder` handles while recording, `scheduler::Renderer::end`
//! walks the dependency graph and turns finished buffers into backend draw
//! calls, scratch-target batches, and `ImageAtlas` blits.

pub mod command_list;
pub mod encoder;
pub mod filler;
pub mod mask_drawer;
pub mod scheduler;
pub mod stc;
pub mod virtual_buffer;

pub use command_list::{DrawCommand, DrawCommandList, Partition};
pub use encoder::{Encoder, EncoderError, EncoderKind, ImageSpec, RenderClipElement};
pub use scheduler::{Renderer, RendererConfig, SchedulerError, StcShaders};
pub use stc::{BoundingBox, BuilderSet, STCData};
pub use virtual_buffer::{
    FillRule, VirtualBuffer, VirtualBufferId, VirtualBufferKind, VirtualBufferState,
    MAX_RENDERABLE,
};
