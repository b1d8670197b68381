//! Tiled bit-per-pixel occlusion buffer.
//!
//! The screen is split into 8x8-pixel tiles, each stored as one `u64` with
//! bit `(local_y << 3) | local_x` set when that pixel is occluded. Tiles are
//! laid out in Morton (Z-order) so neighbouring tiles share cache lines
//! during the serpentine sweep:
//!
//! ```text
//! index = tx[6] << 12 | ... y1 x1 y0 x0
//! ```
//!
//! `u64::MAX` marks a fully occluded tile and lets both draw and test skip it.

/// Buffer width in pixels
pub const PIXEL_WIDTH: i32 = 1024;
/// Buffer height in pixels
pub const PIXEL_HEIGHT: i32 = 512;
/// log2 of the tile edge length
pub const TILE_AXIS_SHIFT: u32 = 3;
/// Tile edge length in pixels
pub const TILE_AXIS: i32 = 1 << TILE_AXIS_SHIFT;
/// Buffer width in tiles
pub const TILE_WIDTH: i32 = PIXEL_WIDTH >> TILE_AXIS_SHIFT;
/// Buffer height in tiles
pub const TILE_HEIGHT: i32 = PIXEL_HEIGHT >> TILE_AXIS_SHIFT;
/// Number of tile words
pub const TILE_COUNT: usize = (TILE_WIDTH * TILE_HEIGHT) as usize;
/// Word value of a fully occluded tile
pub const FULL_TILE: u64 = u64::MAX;

/// Spread the low 16 bits of `v` onto the even bit positions.
const fn spread_bits(v: u32) -> u32 {
    let mut x = v & 0xFFFF;
    x = (x | (x << 8)) & 0x00FF_00FF;
    x = (x | (x << 4)) & 0x0F0F_0F0F;
    x = (x | (x << 2)) & 0x3333_3333;
    x = (x | (x << 1)) & 0x5555_5555;
    x
}

/// Morton index of tile (`tx`, `ty`).
///
/// The low six bits of each axis are interleaved; the buffer is twice as
/// wide as tall, so the seventh `x` bit selects the upper half.
#[inline]
pub const fn tile_index(tx: i32, ty: i32) -> usize {
    debug_assert!(tx >= 0 && tx < TILE_WIDTH);
    debug_assert!(ty >= 0 && ty < TILE_HEIGHT);
    let low = spread_bits(tx as u32 & 63) | (spread_bits(ty as u32) << 1);
    (((tx as u32 >> 6) << 12) | low) as usize
}

/// Bit of pixel (`x`, `y`) within its tile word.
#[inline]
pub const fn pixel_bit(x: i32, y: i32) -> u64 {
    1u64 << (((y & 7) << 3) | (x & 7))
}

/// The occlusion buffer of one occluder instance.
#[derive(Clone, PartialEq, Eq)]
pub struct OcclusionBuffer {
    tiles: Box<[u64]>,
}

impl Default for OcclusionBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OcclusionBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcclusionBuffer")
            .field("occluded_pixels", &self.occluded_pixel_count())
            .field("full_tiles", &self.full_tile_count())
            .finish()
    }
}

impl OcclusionBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            tiles: vec![0u64; TILE_COUNT].into_boxed_slice(),
        }
    }

    /// Mark every pixel open.
    #[inline]
    pub fn clear(&mut self) {
        self.tiles.fill(0);
    }

    /// True when no pixel is occluded.
    pub fn is_clear(&self) -> bool {
        self.tiles.iter().all(|&word| word == 0)
    }

    /// Tile word at (`tx`, `ty`).
    #[inline]
    pub fn tile(&self, tx: i32, ty: i32) -> u64 {
        self.tiles[tile_index(tx, ty)]
    }

    /// Tile word by Morton index.
    #[inline]
    pub(crate) fn word(&self, index: usize) -> u64 {
        self.tiles[index]
    }

    /// Mutable tile word by Morton index.
    #[inline]
    pub(crate) fn word_mut(&mut self, index: usize) -> &mut u64 {
        &mut self.tiles[index]
    }

    /// Whether pixel (`x`, `y`) is occluded. Off-screen pixels are open.
    pub fn is_pixel_occluded(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x >= PIXEL_WIDTH || y >= PIXEL_HEIGHT {
            return false;
        }
        let word = self.tile(x >> TILE_AXIS_SHIFT, y >> TILE_AXIS_SHIFT);
        word & pixel_bit(x, y) != 0
    }

    /// Number of occluded pixels.
    pub fn occluded_pixel_count(&self) -> u32 {
        self.tiles.iter().map(|word| word.count_ones()).sum()
    }

    /// Number of fully occluded tiles.
    pub fn full_tile_count(&self) -> usize {
        self.tiles.iter().filter(|&&word| word == FULL_TILE).count()
    }

    /// Raw tile words in Morton order.
    pub fn words(&self) -> &[u64] {
        &self.tiles
    }
}
