//! Software occlusion culling for the softcull engine.
//!
//! This crate provides:
//! - A 1024x512 bit-per-pixel occlusion buffer in 8x8 Morton tiles
//! - Fixed-point box face transform with near-plane and guard-band clipping
//! - A conservative scanline-event rasterizer with draw and test modes
//! - The per-view [`TerrainOccluder`] API and cross-thread [`VisibilityPass`]
//! - Background PNG dumps of the occlusion raster

pub mod buffer;
pub mod camera;
pub mod clip;
pub mod dump;
mod edge;
pub mod occluder;
pub mod pass;
mod raster;

pub use buffer::{OcclusionBuffer, PIXEL_HEIGHT, PIXEL_WIDTH, TILE_HEIGHT, TILE_WIDTH};
pub use camera::{Camera, Projection};
pub use dump::{raster_rgba, save_raster_png, RasterDumper};
pub use occluder::{
    BoxFace, InvalidationHandle, OcclusionStats, SceneParams, SceneVersions, TerrainOccluder,
};
pub use pass::{OcclusionRegion, PassState, VisibilityPass};
