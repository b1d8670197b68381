//! Homogeneous vertices, outcodes and polygon splitting tables.
//!
//! Clipping happens in clip space before the perspective divide, against the
//! near plane (`z = 0`) and four guard-band planes at twice the screen
//! extent. The guard band keeps every rasterized coordinate within a few
//! thousand pixels so edge functions stay far from overflow.

use bitflags::bitflags;
use softcull_core::constants::SUBPIXEL_BITS;
use softcull_core::fixed::saturate_i64;

use crate::buffer::{PIXEL_HEIGHT, PIXEL_WIDTH};

/// Guard band half-extent in NDC units (1 = screen edge).
pub const GUARD_SCALE: i64 = 2;

const HALF_WIDTH_SUBPIXELS: f64 = ((PIXEL_WIDTH as i64) << (SUBPIXEL_BITS - 1)) as f64;
const HALF_HEIGHT_SUBPIXELS: f64 = ((PIXEL_HEIGHT as i64) << (SUBPIXEL_BITS - 1)) as f64;

bitflags! {
    /// Planes a vertex lies outside of.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ClipFlags: u8 {
        const NEAR = 1 << 0;
        const LOW_X = 1 << 1;
        const LOW_Y = 1 << 2;
        const HIGH_X = 1 << 3;
        const HIGH_Y = 1 << 4;
    }
}

/// Clip-space position in matrix precision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClipVertex {
    pub x: i64,
    pub y: i64,
    pub z: i64,
    pub w: i64,
}

impl ClipVertex {
    #[inline]
    pub const fn new(x: i64, y: i64, z: i64, w: i64) -> Self {
        Self { x, y, z, w }
    }

    #[inline]
    pub const fn from_array(v: [i64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

/// Clipping planes in the order they are applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipPlane {
    /// `z >= 0`
    Near,
    /// `x >= -2w`
    LowX,
    /// `y >= -2w`
    LowY,
    /// `x <= 2w`
    HighX,
    /// `y <= 2w`
    HighY,
}

impl ClipPlane {
    /// Application order; guard planes follow the near plane.
    pub const ORDER: [Self; 5] = [
        Self::Near,
        Self::LowX,
        Self::LowY,
        Self::HighX,
        Self::HighY,
    ];

    /// Outcode bit of this plane.
    #[inline]
    pub const fn flag(self) -> ClipFlags {
        match self {
            Self::Near => ClipFlags::NEAR,
            Self::LowX => ClipFlags::LOW_X,
            Self::LowY => ClipFlags::LOW_Y,
            Self::HighX => ClipFlags::HIGH_X,
            Self::HighY => ClipFlags::HIGH_Y,
        }
    }

    /// Signed distance; negative means outside.
    #[inline]
    pub const fn distance(self, v: &ClipVertex) -> i64 {
        match self {
            Self::Near => v.z,
            Self::LowX => v.x + GUARD_SCALE * v.w,
            Self::LowY => v.y + GUARD_SCALE * v.w,
            Self::HighX => GUARD_SCALE * v.w - v.x,
            Self::HighY => GUARD_SCALE * v.w - v.y,
        }
    }
}

/// A clip-space vertex with its outcode and, when in front of the near
/// plane, its screen position in subpixels (y up).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProjectedVertex {
    pub clip: ClipVertex,
    pub px: i32,
    pub py: i32,
    pub flags: ClipFlags,
}

impl ProjectedVertex {
    /// Classify and project a clip-space position.
    pub fn from_clip(clip: ClipVertex) -> Self {
        let mut flags = ClipFlags::empty();
        for plane in ClipPlane::ORDER {
            if plane.distance(&clip) < 0 {
                flags |= plane.flag();
            }
        }

        let (px, py) = if flags.contains(ClipFlags::NEAR) || clip.w <= 0 {
            (0, 0)
        } else {
            let w = clip.w as f64;
            (
                ((clip.x as f64 / w + 1.0) * HALF_WIDTH_SUBPIXELS).round() as i32,
                ((clip.y as f64 / w + 1.0) * HALF_HEIGHT_SUBPIXELS).round() as i32,
            )
        };

        Self {
            clip,
            px,
            py,
            flags,
        }
    }

    /// True when screen coordinates are not valid and the vertex must be
    /// clipped against the near plane first.
    #[inline]
    pub const fn needs_near_clip(&self) -> bool {
        self.flags.contains(ClipFlags::NEAR)
    }
}

/// Point where the segment `inside -> outside` crosses `plane`.
///
/// `t = d_in / (d_in - d_out)` is applied to all four components in integer
/// arithmetic, so the result is deterministic.
pub fn intersect(
    inside: &ProjectedVertex,
    outside: &ProjectedVertex,
    plane: ClipPlane,
) -> ProjectedVertex {
    let d_in = i128::from(plane.distance(&inside.clip));
    let d_out = i128::from(plane.distance(&outside.clip));
    let denom = d_in - d_out;
    debug_assert!(denom > 0);

    let lerp = |a: i64, b: i64| -> i64 {
        saturate_i64(i128::from(a) + (i128::from(b) - i128::from(a)) * d_in / denom)
    };

    let (a, b) = (&inside.clip, &outside.clip);
    ProjectedVertex::from_clip(ClipVertex::new(
        lerp(a.x, b.x),
        lerp(a.y, b.y),
        lerp(a.z, b.z),
        lerp(a.w, b.w),
    ))
}

/// How a quad splits against one plane, keyed by its 4-bit outside mask.
///
/// Rotation arguments name the vertex the split is anchored on, so the
/// split code only handles one orientation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuadSplit {
    /// Nothing outside: two triangles.
    Whole,
    /// One corner outside: pentagon, three triangles.
    OneOut(u8),
    /// Corners `k` and `k + 1` outside: quad, two triangles.
    TwoOut(u8),
    /// Only corner `k` inside: one triangle.
    ThreeOut(u8),
    /// Opposite corners outside; only numeric noise produces this, so each
    /// half is clipped as a triangle.
    Diagonal,
    /// Everything outside.
    Culled,
}

/// How a triangle splits against one plane, keyed by its 3-bit outside mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriSplit {
    /// Nothing outside.
    Whole,
    /// Vertex `k` outside: quad, two triangles.
    OneOut(u8),
    /// Only vertex `k` inside: one triangle.
    TwoOut(u8),
    /// Everything outside.
    Culled,
}

const fn build_quad_splits() -> [QuadSplit; 16] {
    let mut table = [QuadSplit::Culled; 16];
    let mut mask = 0usize;
    while mask < 16 {
        let bits = mask as u32;
        table[mask] = match bits.count_ones() {
            0 => QuadSplit::Whole,
            1 => QuadSplit::OneOut(bits.trailing_zeros() as u8),
            2 => {
                let mut split = QuadSplit::Diagonal;
                let mut k = 0u32;
                while k < 4 {
                    if bits == (1 << k) | (1 << ((k + 1) & 3)) {
                        split = QuadSplit::TwoOut(k as u8);
                    }
                    k += 1;
                }
                split
            }
            3 => QuadSplit::ThreeOut((!bits & 0xF).trailing_zeros() as u8),
            _ => QuadSplit::Culled,
        };
        mask += 1;
    }
    table
}

const fn build_tri_splits() -> [TriSplit; 8] {
    let mut table = [TriSplit::Culled; 8];
    let mut mask = 0usize;
    while mask < 8 {
        let bits = mask as u32;
        table[mask] = match bits.count_ones() {
            0 => TriSplit::Whole,
            1 => TriSplit::OneOut(bits.trailing_zeros() as u8),
            2 => TriSplit::TwoOut((!bits & 0x7).trailing_zeros() as u8),
            _ => TriSplit::Culled,
        };
        mask += 1;
    }
    table
}

/// Quad split cases by outside mask (bit `i` = vertex `i` outside).
pub const QUAD_SPLITS: [QuadSplit; 16] = build_quad_splits();
/// Triangle split cases by outside mask.
pub const TRI_SPLITS: [TriSplit; 8] = build_tri_splits();

/// Outside mask of `vertices` for `flag`.
#[inline]
pub fn outside_mask(vertices: &[ProjectedVertex], flag: ClipFlags) -> usize {
    vertices
        .iter()
        .enumerate()
        .fold(0, |mask, (i, v)| mask | (usize::from(v.flags.intersects(flag)) << i))
}
