//! Fixed-point 4x4 transform.
//!
//! Components carry [`MATRIX_PRECISION_BITS`] fractional bits and are stored
//! row-major, so `m[row][3]` is the translation column. Products accumulate in
//! `i128` and round once per component.

use std::ops::Mul;

use glam::{DMat4, Mat4};

use crate::constants::MATRIX_PRECISION_BITS;
use crate::fixed::{from_fixed, round_shift, saturate_i64, to_fixed};

/// Combined projection x view (x region translation) in fixed point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FixedMatrix4 {
    m: [[i64; 4]; 4],
}

impl Default for FixedMatrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl FixedMatrix4 {
    /// 1.0 in matrix precision
    pub const ONE: i64 = 1 << MATRIX_PRECISION_BITS;

    /// Identity matrix
    pub const IDENTITY: Self = Self {
        m: [
            [Self::ONE, 0, 0, 0],
            [0, Self::ONE, 0, 0],
            [0, 0, Self::ONE, 0],
            [0, 0, 0, Self::ONE],
        ],
    };

    /// Convert a floating-point matrix (glam, column-major).
    pub fn from_mat4(mat: &Mat4) -> Self {
        let cols = mat.to_cols_array_2d();
        let mut m = [[0i64; 4]; 4];
        for (row, out) in m.iter_mut().enumerate() {
            for (col, value) in out.iter_mut().enumerate() {
                *value = to_fixed(f64::from(cols[col][row]), MATRIX_PRECISION_BITS);
            }
        }
        Self { m }
    }

    /// Convert back to a double-precision matrix, mostly for comparisons.
    pub fn to_dmat4(&self) -> DMat4 {
        let mut cols = [[0.0f64; 4]; 4];
        for (row, values) in self.m.iter().enumerate() {
            for (col, value) in values.iter().enumerate() {
                cols[col][row] = from_fixed(*value, MATRIX_PRECISION_BITS);
            }
        }
        DMat4::from_cols_array_2d(&cols)
    }

    /// Raw component at `row`, `col`.
    #[inline]
    pub const fn get(&self, row: usize, col: usize) -> i64 {
        self.m[row][col]
    }

    /// Translation matrix for an offset given with `bits` fractional bits.
    pub fn translation(dx: i64, dy: i64, dz: i64, bits: u32) -> Self {
        let scale = |v: i64| -> i64 {
            if bits <= MATRIX_PRECISION_BITS {
                v << (MATRIX_PRECISION_BITS - bits)
            } else {
                saturate_i64(round_shift(i128::from(v), bits - MATRIX_PRECISION_BITS))
            }
        };
        let mut result = Self::IDENTITY;
        result.m[0][3] = scale(dx);
        result.m[1][3] = scale(dy);
        result.m[2][3] = scale(dz);
        result
    }

    /// Full 4x4 product `self * rhs`.
    #[must_use]
    pub fn multiply(&self, rhs: &Self) -> Self {
        let mut m = [[0i64; 4]; 4];
        for (row, out) in m.iter_mut().enumerate() {
            for (col, value) in out.iter_mut().enumerate() {
                let sum: i128 = (0..4)
                    .map(|k| i128::from(self.m[row][k]) * i128::from(rhs.m[k][col]))
                    .sum();
                *value = saturate_i64(round_shift(sum, MATRIX_PRECISION_BITS));
            }
        }
        Self { m }
    }

    /// Post-multiply by a translation, touching only the last column.
    ///
    /// The offset has `bits` fractional bits (at most the matrix precision).
    /// Equal bit-for-bit to `self.multiply(&FixedMatrix4::translation(..))`.
    pub fn translate(&mut self, dx: i64, dy: i64, dz: i64, bits: u32) {
        debug_assert!(bits <= MATRIX_PRECISION_BITS);
        for row in &mut self.m {
            let sum = i128::from(row[0]) * i128::from(dx)
                + i128::from(row[1]) * i128::from(dy)
                + i128::from(row[2]) * i128::from(dz);
            row[3] = saturate_i64(i128::from(row[3]) + round_shift(sum, bits));
        }
    }

    /// Copy of `self` translated by the given offset.
    #[must_use]
    pub fn translated(&self, dx: i64, dy: i64, dz: i64, bits: u32) -> Self {
        let mut result = *self;
        result.translate(dx, dy, dz, bits);
        result
    }

    /// Transform an integer block position with `w = 1`.
    ///
    /// Returns homogeneous `(x, y, z, w)` in matrix precision.
    #[inline]
    pub fn transform_block(&self, x: i64, y: i64, z: i64) -> [i64; 4] {
        let row = |r: &[i64; 4]| r[0] * x + r[1] * y + r[2] * z + r[3];
        [
            row(&self.m[0]),
            row(&self.m[1]),
            row(&self.m[2]),
            row(&self.m[3]),
        ]
    }

    /// Column `col` of the matrix, i.e. the clip-space step for one block
    /// along that axis.
    #[inline]
    pub const fn column(&self, col: usize) -> [i64; 4] {
        [
            self.m[0][col],
            self.m[1][col],
            self.m[2][col],
            self.m[3][col],
        ]
    }
}

impl Mul for FixedMatrix4 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.multiply(&rhs)
    }
}

impl From<&Mat4> for FixedMatrix4 {
    fn from(mat: &Mat4) -> Self {
        Self::from_mat4(mat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CAMERA_PRECISION_BITS;
    use glam::Vec3;

    fn projection() -> Mat4 {
        Mat4::perspective_rh(70f32.to_radians(), 2.0, 0.05, 512.0)
    }

    fn view() -> Mat4 {
        Mat4::look_to_rh(Vec3::ZERO, Vec3::new(0.3, -0.2, 1.0).normalize(), Vec3::Y)
    }

    /// Exact product of the fixed inputs, computed in f64.
    fn reference_product(a: &FixedMatrix4, b: &FixedMatrix4) -> [[f64; 4]; 4] {
        let mut out = [[0.0; 4]; 4];
        for (row, values) in out.iter_mut().enumerate() {
            for (col, value) in values.iter_mut().enumerate() {
                *value = (0..4)
                    .map(|k| a.get(row, k) as f64 * b.get(k, col) as f64)
                    .sum::<f64>()
                    / FixedMatrix4::ONE as f64;
            }
        }
        out
    }

    #[test]
    fn identity_is_neutral() {
        let a = FixedMatrix4::from_mat4(&projection());
        assert_eq!(a.multiply(&FixedMatrix4::IDENTITY), a);
        assert_eq!(FixedMatrix4::IDENTITY * a, a);
    }

    #[test]
    fn conversion_matches_glam_layout() {
        let mat = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let fixed = FixedMatrix4::from_mat4(&mat);
        assert_eq!(fixed.get(0, 3), FixedMatrix4::ONE);
        assert_eq!(fixed.get(1, 3), 2 * FixedMatrix4::ONE);
        assert_eq!(fixed.get(2, 3), 3 * FixedMatrix4::ONE);
        assert_eq!(fixed.get(3, 3), FixedMatrix4::ONE);
        approx::assert_relative_eq!(fixed.to_dmat4().w_axis.z, 3.0);
    }

    #[test]
    fn product_within_one_unit_of_float_reference() {
        let p = FixedMatrix4::from_mat4(&projection());
        let v = FixedMatrix4::from_mat4(&view());
        let product = p.multiply(&v);
        let reference = reference_product(&p, &v);
        for row in 0..4 {
            for col in 0..4 {
                let diff = (product.get(row, col) as f64 - reference[row][col]).abs();
                assert!(diff <= 1.0, "component {row},{col} off by {diff}");
            }
        }
    }

    #[test]
    fn product_tracks_glam_product() {
        let fixed = FixedMatrix4::from_mat4(&projection()).multiply(&FixedMatrix4::from_mat4(&view()));
        let float = (projection() * view()).as_dmat4();
        let back = fixed.to_dmat4();
        for (a, b) in back.to_cols_array().iter().zip(float.to_cols_array().iter()) {
            approx::assert_abs_diff_eq!(a, b, epsilon = 1e-3);
        }
    }

    #[test]
    fn translate_matches_translation_product_exactly() {
        let base = FixedMatrix4::from_mat4(&projection()).multiply(&FixedMatrix4::from_mat4(&view()));
        for &(dx, dy, dz) in &[
            (0, 0, 0),
            (4096, -8192, 123_456),
            (-1_234_567, 55, -3),
            (2047, 2048, -2049),
        ] {
            let fast = base.translated(dx, dy, dz, CAMERA_PRECISION_BITS);
            let slow = base.multiply(&FixedMatrix4::translation(dx, dy, dz, CAMERA_PRECISION_BITS));
            assert_eq!(fast, slow, "offset ({dx}, {dy}, {dz})");
        }
    }

    #[test]
    fn translate_within_one_unit_of_float_reference() {
        let base = FixedMatrix4::from_mat4(&projection()).multiply(&FixedMatrix4::from_mat4(&view()));
        let (dx, dy, dz) = (37_000i64, -5_000i64, 900_001i64);
        let moved = base.translated(dx, dy, dz, CAMERA_PRECISION_BITS);
        let unit = (1i64 << CAMERA_PRECISION_BITS) as f64;
        for row in 0..4 {
            let expected = base.get(row, 3) as f64
                + (base.get(row, 0) as f64 * dx as f64
                    + base.get(row, 1) as f64 * dy as f64
                    + base.get(row, 2) as f64 * dz as f64)
                    / unit;
            assert!((moved.get(row, 3) as f64 - expected).abs() <= 1.0);
        }
    }

    #[test]
    fn transform_block_applies_translation_column() {
        let fixed = FixedMatrix4::from_mat4(&Mat4::from_translation(Vec3::new(1.0, 0.0, -2.0)));
        let clip = fixed.transform_block(2, 3, 4);
        assert_eq!(clip, [3 << 16, 3 << 16, 2 << 16, 1 << 16]);
        assert_eq!(fixed.column(0), [FixedMatrix4::ONE, 0, 0, 0]);
    }
}
