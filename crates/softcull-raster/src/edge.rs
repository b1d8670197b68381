//! Triangle edge functions in subpixel coordinates.
//!
//! For an edge `from -> to` of a counter-clockwise triangle the function
//! `E(x, y) = a*x + b*y + c` is non-negative inside. Pixel `(px, py)` is
//! sampled at its center `(16*px + 8, 16*py + 8)`, which turns each edge into
//! a per-row bound on `px`.

use softcull_core::constants::SUBPIXEL_BITS;

/// One pixel in subpixels.
pub(crate) const SUBPIXEL_ONE: i64 = 1 << SUBPIXEL_BITS;
/// Offset of a pixel center within its pixel.
pub(crate) const SUBPIXEL_HALF: i64 = SUBPIXEL_ONE / 2;

/// Orientation class of an edge, from the signs of `a` and `b`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EdgeKind {
    /// `a = 0, b < 0`
    Top,
    /// `a = 0, b > 0`
    Bottom,
    /// `a > 0, b = 0`
    Left,
    /// `a < 0, b = 0`
    Right,
    /// `a > 0, b < 0`
    TopLeft,
    /// `a > 0, b > 0`
    BottomLeft,
    /// `a < 0, b < 0`
    TopRight,
    /// `a < 0, b > 0`
    BottomRight,
}

impl EdgeKind {
    pub(crate) const fn classify(a: i64, b: i64) -> Self {
        if a == 0 {
            if b < 0 {
                Self::Top
            } else {
                Self::Bottom
            }
        } else if a > 0 {
            if b == 0 {
                Self::Left
            } else if b < 0 {
                Self::TopLeft
            } else {
                Self::BottomLeft
            }
        } else if b == 0 {
            Self::Right
        } else if b < 0 {
            Self::TopRight
        } else {
            Self::BottomRight
        }
    }

    /// Edges that own samples lying exactly on them.
    #[inline]
    pub(crate) const fn is_top_left(self) -> bool {
        matches!(
            self,
            Self::Top | Self::Left | Self::TopLeft | Self::BottomLeft
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Edge {
    pub a: i64,
    pub b: i64,
    pub c: i64,
    pub kind: EdgeKind,
}

impl Edge {
    /// Edge from `(x0, y0)` to `(x1, y1)` with the top-left bias folded
    /// into `c`.
    pub(crate) fn new(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        let a = y0 - y1;
        let b = x1 - x0;
        let kind = EdgeKind::classify(a, b);
        let mut c = -(a * x0 + b * y0);
        if !kind.is_top_left() {
            c -= 1;
        }
        Self { a, b, c, kind }
    }

    #[inline]
    pub(crate) const fn eval(&self, x: i64, y: i64) -> i64 {
        self.a * x + self.b * y + self.c
    }

    /// `E` at the center of column zero of pixel row `py`.
    #[inline]
    pub(crate) const fn row_numerator(&self, py: i64) -> i64 {
        self.b * (py * SUBPIXEL_ONE + SUBPIXEL_HALF) + self.c + SUBPIXEL_HALF * self.a
    }

    /// Change of [`Self::row_numerator`] per pixel row.
    #[inline]
    pub(crate) const fn row_step(&self) -> i64 {
        self.b * SUBPIXEL_ONE
    }

    /// Denominator of the column bound, `16 * |a|`.
    #[inline]
    pub(crate) const fn column_divisor(&self) -> i64 {
        self.a.abs() * SUBPIXEL_ONE
    }
}

/// Exact `floor((n + k*step) / d)` for successive `k` without division.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct FloorStepper {
    q: i64,
    r: i64,
    dq: i64,
    dr: i64,
    d: i64,
}

impl FloorStepper {
    pub(crate) const fn new(n: i64, step: i64, d: i64) -> Self {
        debug_assert!(d > 0);
        Self {
            q: n.div_euclid(d),
            r: n.rem_euclid(d),
            dq: step.div_euclid(d),
            dr: step.rem_euclid(d),
            d,
        }
    }

    #[inline]
    pub(crate) const fn value(&self) -> i64 {
        self.q
    }

    #[inline]
    pub(crate) fn advance(&mut self) {
        self.q += self.dq;
        self.r += self.dr;
        if self.r >= self.d {
            self.q += 1;
            self.r -= self.d;
        }
    }
}
