//! Core types and fixed-point math for the softcull occlusion engine.
//!
//! This crate provides the pieces shared by every occluder instance:
//! - Scaled-integer helpers and the camera-relative offset
//! - The fixed-point 4x4 transform (`FixedMatrix4`)
//! - Packed occluder boxes and their occlusion-range tags
//! - Configuration and the error type

pub mod config;
pub mod error;
pub mod fixed;
pub mod matrix;
pub mod packed_box;

pub use config::OcclusionConfig;
pub use error::{Error, Result};
pub use matrix::FixedMatrix4;
pub use packed_box::{OcclusionRange, PackedBox};

/// Engine-wide constants
pub mod constants {
    /// Size of a render region in blocks per axis
    pub const REGION_SIZE: i32 = 16;
    /// Largest coordinate a packed box component can hold (5 bits)
    pub const PACKED_COORD_MAX: u32 = 31;
    /// Fractional bits of `FixedMatrix4` components
    pub const MATRIX_PRECISION_BITS: u32 = 16;
    /// Fractional bits of camera-relative region offsets
    pub const CAMERA_PRECISION_BITS: u32 = 12;
    /// One block expressed in camera precision units
    pub const CAMERA_PRECISION_UNITY: i64 = 1 << CAMERA_PRECISION_BITS;
    /// Fractional bits of screen coordinates (16 subpixels per pixel)
    pub const SUBPIXEL_BITS: u32 = 4;
}
