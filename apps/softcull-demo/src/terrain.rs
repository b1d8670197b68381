//! Synthetic heightmap terrain split into 16-block regions.

use glam::{DVec3, IVec3};
use softcull_core::constants::REGION_SIZE;
use softcull_core::packed_box::sort_for_occlusion;
use softcull_core::{PackedBox, Result};
use softcull_raster::{Camera, OcclusionRegion, Projection};

/// Vertical region layers.
const LAYERS: i32 = 6;

/// One region with its occluder boxes.
#[derive(Debug, Clone)]
pub struct TerrainRegion {
    pub origin: IVec3,
    pub occluders: Vec<PackedBox>,
}

impl OcclusionRegion for TerrainRegion {
    fn origin(&self) -> IVec3 {
        self.origin
    }

    fn occluders(&self) -> &[PackedBox] {
        &self.occluders
    }
}

/// Surface height of column (`x`, `z`).
pub fn height(x: i32, z: i32) -> i32 {
    let (x, z) = (f64::from(x), f64::from(z));
    let rolling = 10.0 * (x * 0.045).sin() + 8.0 * (z * 0.061).cos();
    let ridges = 14.0 * ((x + z) * 0.013).sin().abs();
    (36.0 + rolling + ridges) as i32
}

/// Build all non-empty regions within `radius` regions of the origin.
pub fn build(radius: i32) -> Result<Vec<TerrainRegion>> {
    let mut regions = Vec::new();
    for rz in -radius..radius {
        for rx in -radius..radius {
            for ry in 0..LAYERS {
                let origin = IVec3::new(rx, ry, rz) * REGION_SIZE;
                let occluders = region_boxes(origin)?;
                if !occluders.is_empty() {
                    regions.push(TerrainRegion { origin, occluders });
                }
            }
        }
    }
    Ok(regions)
}

/// Solid columns of one region, merged along x where their tops match.
fn region_boxes(origin: IVec3) -> Result<Vec<PackedBox>> {
    let column_top =
        |x: i32, z: i32| (height(origin.x + x, origin.z + z) - origin.y).clamp(0, REGION_SIZE);

    let mut boxes = Vec::new();
    for z in 0..REGION_SIZE {
        let mut start = 0;
        let mut run_top = column_top(0, z);
        for x in 1..=REGION_SIZE {
            let top = if x < REGION_SIZE { column_top(x, z) } else { -1 };
            if top == run_top {
                continue;
            }
            if run_top > 0 {
                boxes.push(PackedBox::from_bounds(
                    IVec3::new(start, 0, z),
                    IVec3::new(x, run_top, z + 1),
                )?);
            }
            start = x;
            run_top = top;
        }
    }
    sort_for_occlusion(&mut boxes);
    Ok(boxes)
}

/// Order regions front to back for `camera`: by distance for perspective
/// cameras, along the view direction for orthographic ones.
pub fn sort_front_to_back(regions: &mut [TerrainRegion], camera: &Camera) {
    let half = f64::from(REGION_SIZE / 2);
    let direction = camera.direction.as_dvec3();
    let key = |region: &TerrainRegion| {
        let center = region.origin.as_dvec3() + DVec3::splat(half);
        match camera.projection {
            Projection::Perspective { .. } => center.distance_squared(camera.position),
            Projection::Orthographic { .. } => (center - camera.position).dot(direction),
        }
    };
    regions.sort_by(|a, b| key(a).total_cmp(&key(b)));
}
