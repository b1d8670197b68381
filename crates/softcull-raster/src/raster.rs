//! Scanline-event triangle rasterizer over the tiled buffer.
//!
//! Every triangle is reduced to a `[left, right]` pixel span per row. Rows
//! are grouped by tile row and swept tile by tile in a serpentine order,
//! building each 64-bit tile mask from the spans and applying a [`TileOp`].
//! Drawing ORs the mask in; testing stops at the first tile with an open
//! covered pixel.

use softcull_core::fixed::{ceil_div, floor_div};

use crate::buffer::{tile_index, OcclusionBuffer, FULL_TILE, PIXEL_HEIGHT, PIXEL_WIDTH};
use crate::clip::{
    intersect, outside_mask, ClipFlags, ClipPlane, ProjectedVertex, QuadSplit, TriSplit,
    QUAD_SPLITS, TRI_SPLITS,
};
use crate::edge::{Edge, EdgeKind, FloorStepper, SUBPIXEL_HALF, SUBPIXEL_ONE};

/// What a sweep does with each covered tile.
pub(crate) trait TileOp {
    /// Apply `mask` to `word`; returning true ends the sweep.
    fn apply(word: &mut u64, mask: u64) -> bool;
}

/// Mark covered pixels occluded.
pub(crate) struct Draw;

/// Report whether any covered pixel is still open.
pub(crate) struct Test;

impl TileOp for Draw {
    #[inline]
    fn apply(word: &mut u64, mask: u64) -> bool {
        *word |= mask;
        false
    }
}

impl TileOp for Test {
    #[inline]
    fn apply(word: &mut u64, mask: u64) -> bool {
        !*word & mask != 0
    }
}

const fn build_range_masks() -> [u8; 64] {
    let mut table = [0u8; 64];
    let mut left = 0;
    while left < 8 {
        let mut right = left;
        while right < 8 {
            table[left * 8 + right] = ((0xFFu32 << left) & (0xFFu32 >> (7 - right))) as u8;
            right += 1;
        }
        left += 1;
    }
    table
}

/// Bits `left..=right` of a tile row, indexed by `left * 8 + right`.
const RANGE_MASKS: [u8; 64] = build_range_masks();

#[inline]
fn rotate<const N: usize>(vertices: &[ProjectedVertex; N], first: u8) -> [ProjectedVertex; N] {
    std::array::from_fn(|i| vertices[(i + first as usize) % N])
}

/// Scratch state for rasterizing one triangle at a time.
pub(crate) struct Rasterizer {
    left: Box<[i32]>,
    right: Box<[i32]>,
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Rasterizer {
    pub(crate) fn new() -> Self {
        Self {
            left: vec![0; PIXEL_HEIGHT as usize].into_boxed_slice(),
            right: vec![0; PIXEL_HEIGHT as usize].into_boxed_slice(),
        }
    }

    /// Rasterize the counter-clockwise quad `v`.
    ///
    /// Quads entirely outside one plane are rejected, quads crossing the near
    /// plane are split through [`QUAD_SPLITS`], and the resulting triangles
    /// continue through the guard-band planes.
    pub(crate) fn quad<Op: TileOp>(
        &mut self,
        buffer: &mut OcclusionBuffer,
        v: &[ProjectedVertex; 4],
    ) -> bool {
        let shared = v[0].flags & v[1].flags & v[2].flags & v[3].flags;
        if !shared.is_empty() {
            return false;
        }

        match QUAD_SPLITS[outside_mask(v, ClipFlags::NEAR)] {
            QuadSplit::Whole => {
                self.clip_triangle::<Op>(buffer, [v[0], v[1], v[2]], 1)
                    || self.clip_triangle::<Op>(buffer, [v[0], v[2], v[3]], 1)
            }
            QuadSplit::OneOut(k) => {
                let p = rotate(v, k);
                let a = intersect(&p[3], &p[0], ClipPlane::Near);
                let b = intersect(&p[1], &p[0], ClipPlane::Near);
                self.clip_triangle::<Op>(buffer, [a, b, p[1]], 1)
                    || self.clip_triangle::<Op>(buffer, [a, p[1], p[2]], 1)
                    || self.clip_triangle::<Op>(buffer, [a, p[2], p[3]], 1)
            }
            QuadSplit::TwoOut(k) => {
                let p = rotate(v, k);
                let b = intersect(&p[2], &p[1], ClipPlane::Near);
                let a = intersect(&p[3], &p[0], ClipPlane::Near);
                self.clip_triangle::<Op>(buffer, [b, p[2], p[3]], 1)
                    || self.clip_triangle::<Op>(buffer, [b, p[3], a], 1)
            }
            QuadSplit::ThreeOut(k) => {
                let p = rotate(v, k);
                let b = intersect(&p[0], &p[1], ClipPlane::Near);
                let a = intersect(&p[0], &p[3], ClipPlane::Near);
                self.clip_triangle::<Op>(buffer, [p[0], b, a], 1)
            }
            QuadSplit::Diagonal => {
                self.clip_triangle::<Op>(buffer, [v[0], v[1], v[2]], 0)
                    || self.clip_triangle::<Op>(buffer, [v[0], v[2], v[3]], 0)
            }
            QuadSplit::Culled => false,
        }
    }

    /// Clip `tri` against the planes from `first_plane` on, then rasterize.
    fn clip_triangle<Op: TileOp>(
        &mut self,
        buffer: &mut OcclusionBuffer,
        tri: [ProjectedVertex; 3],
        first_plane: usize,
    ) -> bool {
        for (index, &plane) in ClipPlane::ORDER.iter().enumerate().skip(first_plane) {
            let next = index + 1;
            match TRI_SPLITS[outside_mask(&tri, plane.flag())] {
                TriSplit::Whole => continue,
                TriSplit::OneOut(k) => {
                    let p = rotate(&tri, k);
                    let a = intersect(&p[1], &p[0], plane);
                    let b = intersect(&p[2], &p[0], plane);
                    return self.clip_triangle::<Op>(buffer, [a, p[1], p[2]], next)
                        || self.clip_triangle::<Op>(buffer, [a, p[2], b], next);
                }
                TriSplit::TwoOut(k) => {
                    let p = rotate(&tri, k);
                    let a = intersect(&p[0], &p[1], plane);
                    let b = intersect(&p[0], &p[2], plane);
                    return self.clip_triangle::<Op>(buffer, [p[0], a, b], next);
                }
                TriSplit::Culled => return false,
            }
        }

        if tri.iter().any(|v| v.clip.w <= 0) {
            return false;
        }
        self.triangle::<Op>(
            buffer,
            [(tri[0].px, tri[0].py), (tri[1].px, tri[1].py), (tri[2].px, tri[2].py)],
        )
    }

    /// Rasterize a screen triangle given in subpixels, y up.
    ///
    /// Clockwise and degenerate triangles are rejected, as are triangles whose
    /// bounding box holds no pixel center.
    pub(crate) fn triangle<Op: TileOp>(
        &mut self,
        buffer: &mut OcclusionBuffer,
        points: [(i32, i32); 3],
    ) -> bool {
        let [(x0, y0), (x1, y1), (x2, y2)] = points.map(|(x, y)| (i64::from(x), i64::from(y)));

        let area = (x1 - x0) * (y2 - y0) - (x2 - x0) * (y1 - y0);
        if area <= 0 {
            return false;
        }

        let min_x = x0.min(x1).min(x2);
        let max_x = x0.max(x1).max(x2);
        let min_y = y0.min(y1).min(y2);
        let max_y = y0.max(y1).max(y2);

        let col_lo = ceil_div(min_x - SUBPIXEL_HALF, SUBPIXEL_ONE).max(0);
        let col_hi = floor_div(max_x - SUBPIXEL_HALF, SUBPIXEL_ONE).min(i64::from(PIXEL_WIDTH) - 1);
        let row_lo = ceil_div(min_y - SUBPIXEL_HALF, SUBPIXEL_ONE).max(0);
        let row_hi = floor_div(max_y - SUBPIXEL_HALF, SUBPIXEL_ONE).min(i64::from(PIXEL_HEIGHT) - 1);
        if col_lo > col_hi || row_lo > row_hi {
            return false;
        }

        let (row_lo, row_hi) = (row_lo as usize, row_hi as usize);
        self.left[row_lo..=row_hi].fill(col_lo as i32);
        self.right[row_lo..=row_hi].fill(col_hi as i32);

        for edge in [
            Edge::new(x0, y0, x1, y1),
            Edge::new(x1, y1, x2, y2),
            Edge::new(x2, y2, x0, y0),
        ] {
            self.apply_edge(&edge, row_lo, row_hi);
        }

        self.sweep::<Op>(buffer, row_lo, row_hi)
    }

    /// Narrow the row spans `row_lo..=row_hi` by one edge.
    fn apply_edge(&mut self, edge: &Edge, row_lo: usize, row_hi: usize) {
        let clamp = |bound: i64| bound.clamp(-1, i64::from(PIXEL_WIDTH)) as i32;
        let rows = row_lo..=row_hi;
        let n0 = edge.row_numerator(row_lo as i64);

        match edge.kind {
            EdgeKind::Top | EdgeKind::Bottom => {
                // Whole rows are inside or outside.
                let mut n = n0;
                for py in rows {
                    if n < 0 {
                        self.left[py] = PIXEL_WIDTH;
                        self.right[py] = -1;
                    }
                    n += edge.row_step();
                }
            }
            EdgeKind::Left => {
                let bound = clamp(-floor_div(n0, edge.column_divisor()));
                for left in &mut self.left[rows] {
                    *left = (*left).max(bound);
                }
            }
            EdgeKind::Right => {
                let bound = clamp(floor_div(n0, edge.column_divisor()));
                for right in &mut self.right[rows] {
                    *right = (*right).min(bound);
                }
            }
            EdgeKind::TopLeft | EdgeKind::BottomLeft => {
                let mut stepper = FloorStepper::new(n0, edge.row_step(), edge.column_divisor());
                for left in &mut self.left[rows] {
                    *left = (*left).max(clamp(-stepper.value()));
                    stepper.advance();
                }
            }
            EdgeKind::TopRight | EdgeKind::BottomRight => {
                let mut stepper = FloorStepper::new(n0, edge.row_step(), edge.column_divisor());
                for right in &mut self.right[rows] {
                    *right = (*right).min(clamp(stepper.value()));
                    stepper.advance();
                }
            }
        }
    }

    /// Sweep tile rows bottom to top, alternating direction per row.
    fn sweep<Op: TileOp>(&self, buffer: &mut OcclusionBuffer, row_lo: usize, row_hi: usize) -> bool {
        let ty_lo = row_lo >> 3;
        let ty_hi = row_hi >> 3;

        for ty in ty_lo..=ty_hi {
            let y_lo = (ty << 3).max(row_lo);
            let y_hi = ((ty << 3) + 7).min(row_hi);

            let mut lo = i32::MAX;
            let mut hi = i32::MIN;
            for y in y_lo..=y_hi {
                let (l, r) = (self.left[y], self.right[y]);
                if l <= r {
                    lo = lo.min(l);
                    hi = hi.max(r);
                }
            }
            if lo > hi {
                continue;
            }

            let tx_lo = lo >> 3;
            let tx_hi = hi >> 3;
            let forward = (ty - ty_lo) & 1 == 0;
            for step in 0..=(tx_hi - tx_lo) {
                let tx = if forward { tx_lo + step } else { tx_hi - step };
                let index = tile_index(tx, ty as i32);
                if buffer.word(index) == FULL_TILE {
                    continue;
                }
                let mask = self.tile_mask(tx, y_lo, y_hi);
                if mask != 0 && Op::apply(buffer.word_mut(index), mask) {
                    return true;
                }
            }
        }
        false
    }

    /// Coverage of tile column `tx` over rows `y_lo..=y_hi` of one tile row.
    fn tile_mask(&self, tx: i32, y_lo: usize, y_hi: usize) -> u64 {
        let base = tx << 3;
        let mut mask = 0u64;
        for y in y_lo..=y_hi {
            let l = self.left[y] - base;
            let r = self.right[y] - base;
            if l > r || l > 7 || r < 0 {
                continue;
            }
            let bits = RANGE_MASKS[((l.max(0) as usize) << 3) | r.min(7) as usize];
            mask |= u64::from(bits) << ((y & 7) << 3);
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::ClipVertex;

    const ONE: i64 = 1 << 16;

    fn draw(buffer: &mut OcclusionBuffer, points: [(i32, i32); 3]) {
        let mut raster = Rasterizer::new();
        assert!(!raster.triangle::<Draw>(buffer, points));
    }

    fn test_triangle(buffer: &mut OcclusionBuffer, points: [(i32, i32); 3]) -> bool {
        Rasterizer::new().triangle::<Test>(buffer, points)
    }

    fn vertex(x: f64, y: f64, z: f64, w: f64) -> ProjectedVertex {
        let fixed = |v: f64| (v * ONE as f64) as i64;
        ProjectedVertex::from_clip(ClipVertex::new(fixed(x), fixed(y), fixed(z), fixed(w)))
    }

    #[test]
    fn range_masks() {
        assert_eq!(RANGE_MASKS[0], 0b0000_0001);
        assert_eq!(RANGE_MASKS[7], 0xFF);
        assert_eq!(RANGE_MASKS[2 * 8 + 3], 0b0000_1100);
        assert_eq!(RANGE_MASKS[7 * 8 + 7], 0b1000_0000);
    }

    #[test]
    fn corner_pixels_set_single_bits() {
        let mut buffer = OcclusionBuffer::new();
        // Around the center of pixel (0, 0).
        draw(&mut buffer, [(4, 4), (12, 4), (8, 12)]);
        // Around the center of pixel (7, 7).
        draw(&mut buffer, [(116, 116), (124, 116), (120, 124)]);
        assert_eq!(buffer.tile(0, 0), 1 | (1 << 63));
        assert_eq!(buffer.occluded_pixel_count(), 2);
    }

    #[test]
    fn shared_edge_is_owned_once() {
        let lower = [(0, 0), (64, 0), (64, 64)];
        let upper = [(0, 0), (64, 64), (0, 64)];

        let mut a = OcclusionBuffer::new();
        let mut b = OcclusionBuffer::new();
        draw(&mut a, lower);
        draw(&mut b, upper);

        let a = a.tile(0, 0);
        let b = b.tile(0, 0);
        assert_eq!(a & b, 0);
        assert_eq!(a | b, 0x0F0F_0F0F);
        // Diagonal centers belong to the lower triangle.
        assert_ne!(a & 1, 0);
    }

    #[test]
    fn clockwise_and_tiny_triangles_are_rejected() {
        let mut buffer = OcclusionBuffer::new();
        draw(&mut buffer, [(0, 0), (64, 64), (64, 0)]);
        // Covers no pixel center.
        draw(&mut buffer, [(0, 0), (6, 0), (0, 6)]);
        assert!(buffer.is_clear());
        assert!(!test_triangle(&mut buffer, [(0, 0), (6, 0), (0, 6)]));
    }

    #[test]
    fn test_after_draw_reports_hidden() {
        let mut buffer = OcclusionBuffer::new();
        let big = [(100, 100), (4000, 200), (1500, 3000)];
        assert!(test_triangle(&mut buffer, big));
        draw(&mut buffer, big);
        assert!(!test_triangle(&mut buffer, big));
        assert!(!test_triangle(&mut buffer, [(1000, 600), (1800, 700), (1400, 1200)]));
        assert!(test_triangle(&mut buffer, [(9000, 100), (9400, 100), (9200, 500)]));
    }

    #[test]
    fn spans_are_clamped_to_screen() {
        let mut buffer = OcclusionBuffer::new();
        let w = PIXEL_WIDTH * 16;
        let h = PIXEL_HEIGHT * 16;
        draw(&mut buffer, [(-w, -h), (3 * w, -h), (-w, 3 * h)]);
        assert_eq!(buffer.full_tile_count(), crate::buffer::TILE_COUNT);
    }

    #[test]
    fn quad_in_front_draws() {
        let mut buffer = OcclusionBuffer::new();
        let quad = [
            vertex(-0.5, -0.5, 0.5, 1.0),
            vertex(0.5, -0.5, 0.5, 1.0),
            vertex(0.5, 0.5, 0.5, 1.0),
            vertex(-0.5, 0.5, 0.5, 1.0),
        ];
        let mut raster = Rasterizer::new();
        assert!(raster.quad::<Test>(&mut buffer, &quad));
        assert!(!raster.quad::<Draw>(&mut buffer, &quad));
        assert!(!raster.quad::<Test>(&mut buffer, &quad));
        assert!(buffer.is_pixel_occluded(PIXEL_WIDTH / 2, PIXEL_HEIGHT / 2));
        assert!(!buffer.is_pixel_occluded(10, 10));
    }

    #[test]
    fn quad_outside_one_plane_is_rejected() {
        let mut buffer = OcclusionBuffer::new();
        let quad = [
            vertex(-9.0, -0.5, 0.5, 1.0),
            vertex(-3.0, -0.5, 0.5, 1.0),
            vertex(-3.0, 0.5, 0.5, 1.0),
            vertex(-9.0, 0.5, 0.5, 1.0),
        ];
        let mut raster = Rasterizer::new();
        assert!(!raster.quad::<Test>(&mut buffer, &quad));
        raster.quad::<Draw>(&mut buffer, &quad);
        assert!(buffer.is_clear());
    }

    #[test]
    fn quad_crossing_near_plane_is_clipped() {
        // Two corners behind the near plane, two in front.
        let quad = [
            vertex(-0.5, -0.5, -0.2, 0.1),
            vertex(0.5, -0.5, -0.2, 0.1),
            vertex(0.5, 0.5, 0.5, 1.0),
            vertex(-0.5, 0.5, 0.5, 1.0),
        ];
        let mut buffer = OcclusionBuffer::new();
        let mut raster = Rasterizer::new();
        assert!(raster.quad::<Test>(&mut buffer, &quad));
        raster.quad::<Draw>(&mut buffer, &quad);
        assert!(!buffer.is_clear());
        assert!(!raster.quad::<Test>(&mut buffer, &quad));

        // Every rotation of the same quad covers the same pixels.
        for k in 1..4u8 {
            let mut rotated_buffer = OcclusionBuffer::new();
            raster.quad::<Draw>(&mut rotated_buffer, &rotate(&quad, k));
            assert_eq!(rotated_buffer, buffer, "rotation {k}");
        }
    }

    #[test]
    fn quad_behind_camera_is_culled() {
        let quad = [
            vertex(-0.5, -0.5, -0.5, 0.5),
            vertex(0.5, -0.5, -0.5, 0.5),
            vertex(0.5, 0.5, -0.5, 0.5),
            vertex(-0.5, 0.5, -0.5, 0.5),
        ];
        let mut buffer = OcclusionBuffer::new();
        assert!(!Rasterizer::new().quad::<Test>(&mut buffer, &quad));
    }
}
