//! 1-D and 2-D free-space allocators used for atlas tile storage and
//! offscreen scratch render targets.
//!
//! [`IntervalAllocator`] is the 1-D layered allocator; [`LayeredRectAtlas`]
//! is a fixed-slot-grid 2-D allocator addressed through generation-checked
//! [`key::TileKey`]s so a stale handle is detected rather than silently
//! aliasing a reused slot.

pub mod interval;
pub mod key;
pub mod layered_rect_atlas;
pub mod layout;

pub use interval::{IntervalAllocError, IntervalAllocator, Interval, IntervalAllocatorReport, LayerReport};
pub use key::{BackendId, GenerationId, SlotId, TileKey};
pub use layered_rect_atlas::{LayeredRectAtlas, LayeredRectAtlasError};
pub use layout::{AtlasLayout, TileAddress};
