//! Scaled-integer helpers.
//!
//! All rounding here is round-half-up on an arithmetic shift, so results do
//! not depend on the FPU rounding mode or platform.

use glam::{DVec3, I64Vec3, IVec3};

use crate::constants::CAMERA_PRECISION_BITS;

/// Shift `value` right by `bits`, rounding half up.
#[inline]
pub const fn round_shift(value: i128, bits: u32) -> i128 {
    if bits == 0 {
        value
    } else {
        (value + (1 << (bits - 1))) >> bits
    }
}

/// Clamp a wide intermediate back into `i64`.
#[inline]
pub const fn saturate_i64(value: i128) -> i64 {
    if value > i64::MAX as i128 {
        i64::MAX
    } else if value < i64::MIN as i128 {
        i64::MIN
    } else {
        value as i64
    }
}

/// Convert a float to fixed point with `bits` fractional bits.
///
/// Out-of-range values saturate.
#[inline]
pub fn to_fixed(value: f64, bits: u32) -> i64 {
    (value * (1u64 << bits) as f64).round() as i64
}

/// Convert a fixed-point value back to a float.
#[inline]
pub fn from_fixed(value: i64, bits: u32) -> f64 {
    value as f64 / (1u64 << bits) as f64
}

/// Floor of `n / d` for positive `d`.
#[inline]
pub const fn floor_div(n: i64, d: i64) -> i64 {
    debug_assert!(d > 0);
    n.div_euclid(d)
}

/// Ceiling of `n / d` for positive `d`.
#[inline]
pub const fn ceil_div(n: i64, d: i64) -> i64 {
    -floor_div(-n, d)
}

/// Offset of a region origin from the camera, in camera precision units.
#[inline]
pub fn camera_offset(origin: IVec3, camera: DVec3) -> I64Vec3 {
    let delta = origin.as_dvec3() - camera;
    I64Vec3::new(
        to_fixed(delta.x, CAMERA_PRECISION_BITS),
        to_fixed(delta.y, CAMERA_PRECISION_BITS),
        to_fixed(delta.z, CAMERA_PRECISION_BITS),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CAMERA_PRECISION_UNITY;

    #[test]
    fn round_shift_rounds_half_up() {
        assert_eq!(round_shift(3, 1), 2);
        assert_eq!(round_shift(2, 1), 1);
        assert_eq!(round_shift(-3, 1), -1);
        assert_eq!(round_shift(-1, 1), 0);
        assert_eq!(round_shift(7, 0), 7);
    }

    #[test]
    fn floor_and_ceil_division() {
        assert_eq!(floor_div(7, 2), 3);
        assert_eq!(floor_div(-7, 2), -4);
        assert_eq!(ceil_div(7, 2), 4);
        assert_eq!(ceil_div(-7, 2), -3);
        assert_eq!(ceil_div(8, 2), 4);
    }

    #[test]
    fn saturation() {
        assert_eq!(saturate_i64(i128::MAX), i64::MAX);
        assert_eq!(saturate_i64(i128::MIN), i64::MIN);
        assert_eq!(saturate_i64(-5), -5);
    }

    #[test]
    fn camera_offset_uses_camera_precision() {
        let offset = camera_offset(IVec3::new(16, 0, -16), DVec3::new(0.5, 1.0, 0.0));
        assert_eq!(offset.x, 15 * CAMERA_PRECISION_UNITY + CAMERA_PRECISION_UNITY / 2);
        assert_eq!(offset.y, -CAMERA_PRECISION_UNITY);
        assert_eq!(offset.z, -16 * CAMERA_PRECISION_UNITY);
    }

    #[test]
    fn fixed_conversion() {
        assert_eq!(to_fixed(1.5, 4), 24);
        assert_eq!(to_fixed(-0.25, 16), -16384);
        approx::assert_relative_eq!(from_fixed(24, 4), 1.5);
    }
}
