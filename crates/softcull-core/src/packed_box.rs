//! Packed region-local boxes.
//!
//! A region's interior occluders arrive from the region build as a list of
//! axis-aligned boxes, each packed into one `u32`:
//!
//! ```text
//! bits  0..5   x0      bits 15..20  x1
//! bits  5..10  y0      bits 20..25  y1
//! bits 10..15  z0      bits 25..30  z1
//! bits 30..32  occlusion range
//! ```
//!
//! Minimum corners are inclusive and maximum corners exclusive, in blocks
//! relative to the region origin.

use bytemuck::{Pod, Zeroable};
use glam::IVec3;
use serde::{Deserialize, Serialize};

use crate::constants::{PACKED_COORD_MAX, REGION_SIZE};
use crate::error::{Error, Result};

const COORD_MASK: u32 = 0x1F;
const X0_SHIFT: u32 = 0;
const Y0_SHIFT: u32 = 5;
const Z0_SHIFT: u32 = 10;
const X1_SHIFT: u32 = 15;
const Y1_SHIFT: u32 = 20;
const Z1_SHIFT: u32 = 25;
const RANGE_SHIFT: u32 = 30;

/// Coarseness tier of an occluder box, and the tier of a region being drawn.
///
/// A region at range `r` draws only boxes tagged `r` or coarser, so small
/// boxes are skipped for distant regions.
#[repr(u8)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum OcclusionRange {
    /// Drawn only for nearby regions.
    #[default]
    Near = 0,
    /// Drawn up to medium distance.
    Mid = 1,
    /// Drawn up to far distance.
    Far = 2,
    /// Always drawn.
    Extreme = 3,
}

impl OcclusionRange {
    /// All ranges, nearest first.
    pub const ALL: [Self; 4] = [Self::Near, Self::Mid, Self::Far, Self::Extreme];

    /// Decode from the low two bits.
    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::Near,
            1 => Self::Mid,
            2 => Self::Far,
            _ => Self::Extreme,
        }
    }

    /// Range for a region at `distance` blocks from the camera.
    ///
    /// `thresholds` are the distances at which `Mid`, `Far` and `Extreme`
    /// begin.
    pub fn for_distance(distance: f64, thresholds: &[f64; 3]) -> Self {
        if distance < thresholds[0] {
            Self::Near
        } else if distance < thresholds[1] {
            Self::Mid
        } else if distance < thresholds[2] {
            Self::Far
        } else {
            Self::Extreme
        }
    }

    /// Default tag for an occluder box of the given volume in blocks.
    pub const fn for_volume(volume: u32) -> Self {
        if volume >= 512 {
            Self::Extreme
        } else if volume >= 64 {
            Self::Far
        } else if volume >= 8 {
            Self::Mid
        } else {
            Self::Near
        }
    }
}

/// Axis-aligned box packed into 32 bits.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct PackedBox(pub u32);

impl PackedBox {
    /// The whole 16-block region.
    pub const FULL_REGION: Self = Self::new(
        0,
        0,
        0,
        REGION_SIZE as u32,
        REGION_SIZE as u32,
        REGION_SIZE as u32,
        OcclusionRange::Extreme,
    );

    /// Pack without validation. Components are masked to five bits.
    #[inline]
    pub const fn new(
        x0: u32,
        y0: u32,
        z0: u32,
        x1: u32,
        y1: u32,
        z1: u32,
        range: OcclusionRange,
    ) -> Self {
        Self(
            ((x0 & COORD_MASK) << X0_SHIFT)
                | ((y0 & COORD_MASK) << Y0_SHIFT)
                | ((z0 & COORD_MASK) << Z0_SHIFT)
                | ((x1 & COORD_MASK) << X1_SHIFT)
                | ((y1 & COORD_MASK) << Y1_SHIFT)
                | ((z1 & COORD_MASK) << Z1_SHIFT)
                | ((range as u32) << RANGE_SHIFT),
        )
    }

    /// Pack from corners, checking bounds and orientation.
    pub fn try_new(min: IVec3, max: IVec3, range: OcclusionRange) -> Result<Self> {
        let limit = PACKED_COORD_MAX as i32;
        if min.min_element() < 0 || max.max_element() > limit {
            return Err(Error::InvalidBox(format!(
                "corners {min} / {max} outside 0..={limit}"
            )));
        }
        if min.cmpgt(max).any() {
            return Err(Error::InvalidBox(format!("min {min} exceeds max {max}")));
        }
        Ok(Self::new(
            min.x as u32,
            min.y as u32,
            min.z as u32,
            max.x as u32,
            max.y as u32,
            max.z as u32,
            range,
        ))
    }

    /// Pack from corners, tagging the range from the box volume.
    pub fn from_bounds(min: IVec3, max: IVec3) -> Result<Self> {
        let size = (max - min).max(IVec3::ZERO);
        let volume = (size.x * size.y * size.z) as u32;
        Self::try_new(min, max, OcclusionRange::for_volume(volume))
    }

    #[inline]
    pub const fn x0(self) -> u32 {
        (self.0 >> X0_SHIFT) & COORD_MASK
    }

    #[inline]
    pub const fn y0(self) -> u32 {
        (self.0 >> Y0_SHIFT) & COORD_MASK
    }

    #[inline]
    pub const fn z0(self) -> u32 {
        (self.0 >> Z0_SHIFT) & COORD_MASK
    }

    #[inline]
    pub const fn x1(self) -> u32 {
        (self.0 >> X1_SHIFT) & COORD_MASK
    }

    #[inline]
    pub const fn y1(self) -> u32 {
        (self.0 >> Y1_SHIFT) & COORD_MASK
    }

    #[inline]
    pub const fn z1(self) -> u32 {
        (self.0 >> Z1_SHIFT) & COORD_MASK
    }

    /// Occlusion range tag.
    #[inline]
    pub const fn range(self) -> OcclusionRange {
        OcclusionRange::from_bits(self.0 >> RANGE_SHIFT)
    }

    /// Same box with a different range tag.
    #[inline]
    #[must_use]
    pub const fn with_range(self, range: OcclusionRange) -> Self {
        Self((self.0 & !(3 << RANGE_SHIFT)) | ((range as u32) << RANGE_SHIFT))
    }

    /// Minimum corner (inclusive).
    #[inline]
    pub const fn min(self) -> IVec3 {
        IVec3::new(self.x0() as i32, self.y0() as i32, self.z0() as i32)
    }

    /// Maximum corner (exclusive).
    #[inline]
    pub const fn max(self) -> IVec3 {
        IVec3::new(self.x1() as i32, self.y1() as i32, self.z1() as i32)
    }

    /// Volume in blocks; zero for flat or inverted boxes.
    pub const fn volume(self) -> u32 {
        let dx = self.x1().saturating_sub(self.x0());
        let dy = self.y1().saturating_sub(self.y0());
        let dz = self.z1().saturating_sub(self.z0());
        dx * dy * dz
    }

    /// True when the box encloses no volume.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.volume() == 0
    }
}

/// Order occluder boxes the way the occluder consumes them:
/// coarsest range first, larger volume first within a range.
pub fn sort_for_occlusion(boxes: &mut [PackedBox]) {
    boxes.sort_by(|a, b| {
        b.range()
            .cmp(&a.range())
            .then_with(|| b.volume().cmp(&a.volume()))
    });
}
