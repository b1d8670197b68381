//! Terrain occluder: box faces in, visibility answers out.
//!
//! Per frame the host calls [`TerrainOccluder::prepare_scene`], then walks
//! regions front to back. For each region it calls
//! [`TerrainOccluder::prepare_region`], asks [`TerrainOccluder::is_box_visible`]
//! about the region bounds, and if visible draws the region's interior boxes
//! with [`TerrainOccluder::occlude`]. Only the camera-facing faces of a box
//! are rasterized.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::{DVec3, I64Vec3, IVec3, Mat4};
use softcull_core::constants::{CAMERA_PRECISION_BITS, CAMERA_PRECISION_UNITY, REGION_SIZE};
use softcull_core::fixed::camera_offset;
use softcull_core::{FixedMatrix4, OcclusionConfig, OcclusionRange, PackedBox, Result};
use tracing::{debug, trace};

use crate::buffer::OcclusionBuffer;
use crate::clip::{ClipVertex, ProjectedVertex};
use crate::dump::RasterDumper;
use crate::raster::{Draw, Rasterizer, Test, TileOp};

// Corner index = x | y << 1 | z << 2
const V000: usize = 0;
const V100: usize = 1;
const V010: usize = 2;
const V110: usize = 3;
const V001: usize = 4;
const V101: usize = 5;
const V011: usize = 6;
const V111: usize = 7;

/// One face of an axis-aligned box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoxFace {
    /// +y
    Up,
    /// -y
    Down,
    /// +x
    East,
    /// -x
    West,
    /// +z
    South,
    /// -z
    North,
}

impl BoxFace {
    /// Corner indices, counter-clockwise seen from outside the box.
    pub const fn corners(self) -> [usize; 4] {
        match self {
            Self::Up => [V010, V011, V111, V110],
            Self::Down => [V000, V100, V101, V001],
            Self::East => [V100, V110, V111, V101],
            Self::West => [V000, V001, V011, V010],
            Self::South => [V001, V101, V111, V011],
            Self::North => [V000, V010, V110, V100],
        }
    }
}

/// Projection, camera-relative view and world camera position of a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneParams {
    pub projection: Mat4,
    /// View rotation with the camera at the origin.
    pub view: Mat4,
    pub camera: DVec3,
}

/// Monotonic counters hosts compare to decide what to recompute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SceneVersions {
    /// Bumped when the projection, view or camera position changes.
    pub view: u64,
    /// Bumped when the camera moves into another block.
    pub position: u64,
    /// Bumped by [`TerrainOccluder::notify_region_rebuilt`].
    pub region: u64,
    /// Invalidation counter shared with [`InvalidationHandle`]s.
    pub occluder: u64,
}

/// Per-frame counters, reset by [`TerrainOccluder::prepare_scene`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OcclusionStats {
    pub regions: u32,
    pub boxes_tested: u32,
    pub boxes_visible: u32,
    pub boxes_drawn: u32,
}

/// Cloneable handle that forces the next [`TerrainOccluder::prepare_scene`]
/// to clear the buffer, usable from other threads.
#[derive(Clone, Debug)]
pub struct InvalidationHandle(Arc<AtomicU64>);

impl InvalidationHandle {
    pub fn invalidate(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    pub fn version(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Up to three camera-facing faces with their distance from the camera.
#[derive(Clone, Copy)]
struct FrontFaces {
    faces: [(BoxFace, i64); 3],
    count: usize,
}

impl FrontFaces {
    fn as_slice(&self) -> &[(BoxFace, i64)] {
        &self.faces[..self.count]
    }
}

/// Conservative software occluder for one view.
pub struct TerrainOccluder {
    config: OcclusionConfig,
    buffer: OcclusionBuffer,
    raster: Rasterizer,
    projection: FixedMatrix4,
    view: FixedMatrix4,
    view_projection: FixedMatrix4,
    mvp: FixedMatrix4,
    camera: DVec3,
    camera_block: IVec3,
    offset: I64Vec3,
    occlusion_range: OcclusionRange,
    corners: [ProjectedVertex; 8],
    has_scene: bool,
    versions: SceneVersions,
    occluder_version: Arc<AtomicU64>,
    drawn_occluder_version: u64,
    stats: OcclusionStats,
    dumper: Option<RasterDumper>,
}

impl Default for TerrainOccluder {
    fn default() -> Self {
        Self::build(OcclusionConfig::default(), None)
    }
}

impl std::fmt::Debug for TerrainOccluder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainOccluder")
            .field("camera", &self.camera)
            .field("occlusion_range", &self.occlusion_range)
            .field("versions", &self.versions)
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

impl TerrainOccluder {
    /// Create an occluder. Spawns the raster dump thread when
    /// `config.raster_output` is set.
    pub fn new(config: OcclusionConfig) -> Result<Self> {
        let dumper = match &config.raster_output {
            Some(path) => Some(RasterDumper::spawn(path.clone(), config.raster_interval())?),
            None => None,
        };
        Ok(Self::build(config, dumper))
    }

    fn build(config: OcclusionConfig, dumper: Option<RasterDumper>) -> Self {
        Self {
            config,
            buffer: OcclusionBuffer::new(),
            raster: Rasterizer::new(),
            projection: FixedMatrix4::IDENTITY,
            view: FixedMatrix4::IDENTITY,
            view_projection: FixedMatrix4::IDENTITY,
            mvp: FixedMatrix4::IDENTITY,
            camera: DVec3::ZERO,
            camera_block: IVec3::ZERO,
            offset: I64Vec3::ZERO,
            occlusion_range: OcclusionRange::Near,
            corners: [ProjectedVertex::default(); 8],
            has_scene: false,
            versions: SceneVersions::default(),
            occluder_version: Arc::new(AtomicU64::new(0)),
            drawn_occluder_version: 0,
            stats: OcclusionStats::default(),
            dumper,
        }
    }

    pub fn config(&self) -> &OcclusionConfig {
        &self.config
    }

    /// Start a frame.
    ///
    /// `view` must be camera-relative (rotation only); `camera` is the world
    /// position. The buffer is cleared when anything about the view changed
    /// or the occluder was invalidated since the last clear. Returns whether
    /// it was cleared; if not, earlier draws remain valid and may be reused.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn prepare_scene(&mut self, projection: &Mat4, view: &Mat4, camera: DVec3) -> bool {
        let projection = FixedMatrix4::from_mat4(projection);
        let view = FixedMatrix4::from_mat4(view);

        let view_changed = !self.has_scene
            || projection != self.projection
            || view != self.view
            || camera != self.camera;
        if view_changed {
            self.projection = projection;
            self.view = view;
            self.camera = camera;
            self.view_projection = projection.multiply(&view);
            self.has_scene = true;
            self.versions.view += 1;
        }

        let block = camera.floor().as_ivec3();
        if block != self.camera_block {
            self.camera_block = block;
            self.versions.position += 1;
        }

        self.mvp = self.view_projection;
        self.offset = I64Vec3::ZERO;
        self.stats = OcclusionStats::default();

        let occluder_version = self.occluder_version.load(Ordering::Acquire);
        self.versions.occluder = occluder_version;
        if view_changed || occluder_version != self.drawn_occluder_version {
            self.buffer.clear();
            self.drawn_occluder_version = occluder_version;
            debug!(
                view_version = self.versions.view,
                occluder_version, "Occlusion buffer cleared"
            );
            true
        } else {
            false
        }
    }

    /// [`Self::prepare_scene`] taking the matrices as one value.
    pub fn prepare(&mut self, scene: &SceneParams) -> bool {
        self.prepare_scene(&scene.projection, &scene.view, scene.camera)
    }

    /// Mark every pixel open without touching the view state.
    pub fn clear_scene(&mut self) {
        self.buffer.clear();
    }

    /// Force the next [`Self::prepare_scene`] to clear the buffer.
    pub fn invalidate(&self) {
        self.occluder_version.fetch_add(1, Ordering::AcqRel);
    }

    /// Handle for invalidating from another thread.
    pub fn invalidation_handle(&self) -> InvalidationHandle {
        InvalidationHandle(Arc::clone(&self.occluder_version))
    }

    /// Record that a region's occluder boxes changed.
    pub fn notify_region_rebuilt(&mut self) {
        self.versions.region += 1;
        self.invalidate();
    }

    /// Current versions. `occluder` reflects invalidations made since the
    /// last [`Self::prepare_scene`].
    pub fn versions(&self) -> SceneVersions {
        SceneVersions {
            occluder: self.occluder_version.load(Ordering::Acquire),
            ..self.versions
        }
    }

    pub fn view_version(&self) -> u64 {
        self.versions.view
    }

    pub fn position_version(&self) -> u64 {
        self.versions.position
    }

    pub fn region_version(&self) -> u64 {
        self.versions.region
    }

    pub fn occluder_version(&self) -> u64 {
        self.occluder_version.load(Ordering::Acquire)
    }

    /// Set up the region whose origin block is `origin` at the given range.
    pub fn prepare_region(&mut self, origin: IVec3, range: OcclusionRange) {
        self.offset = camera_offset(origin, self.camera);
        self.mvp = self.view_projection.translated(
            self.offset.x,
            self.offset.y,
            self.offset.z,
            CAMERA_PRECISION_BITS,
        );
        self.occlusion_range = range;
        self.stats.regions += 1;
    }

    /// [`Self::prepare_region`] with the range picked from the distance of
    /// the region center to the camera.
    pub fn prepare_region_at_distance(&mut self, origin: IVec3) -> OcclusionRange {
        let center = (origin + IVec3::splat(REGION_SIZE / 2)).as_dvec3();
        let range =
            OcclusionRange::for_distance(center.distance(self.camera), &self.config.range_distances);
        self.prepare_region(origin, range);
        range
    }

    /// Range of the current region.
    pub fn occlusion_range(&self) -> OcclusionRange {
        self.occlusion_range
    }

    /// Whether any part of box `b` of the current region may be visible.
    ///
    /// Never reports a visible box as hidden. Empty boxes are not visible.
    /// Boxes containing the camera, or with a face closer than the
    /// configured near ambiguity, are visible without rasterizing.
    pub fn is_box_visible(&mut self, b: PackedBox) -> bool {
        self.stats.boxes_tested += 1;
        if b.is_empty() {
            return false;
        }

        let mut front = self.front_faces(b);
        if front.count == 0 {
            trace!("Camera inside box {:?}..{:?}", b.min(), b.max());
            self.stats.boxes_visible += 1;
            return true;
        }
        if front
            .as_slice()
            .iter()
            .any(|&(_, distance)| distance <= self.config.near_ambiguity)
        {
            self.stats.boxes_visible += 1;
            return true;
        }

        // Most camera-facing face first; it is the most likely to be visible.
        front.faces[..front.count].sort_unstable_by(|a, b| b.1.cmp(&a.1));

        self.project_corners(b);
        let visible = self.rasterize_faces::<Test>(&front);
        if visible {
            self.stats.boxes_visible += 1;
        }
        visible
    }

    /// Whether the whole current region may be visible.
    pub fn is_chunk_visible(&mut self) -> bool {
        self.is_box_visible(PackedBox::FULL_REGION)
    }

    /// Draw `boxes` of the current region into the buffer.
    ///
    /// Boxes must be sorted coarsest range first; drawing stops at the first
    /// box finer than the current region's range. Returns the number drawn.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn occlude(&mut self, boxes: &[PackedBox]) -> usize {
        let mut drawn = 0;
        for &b in boxes {
            if b.range() < self.occlusion_range {
                break;
            }
            self.draw_box(b);
            drawn += 1;
        }
        self.stats.boxes_drawn += drawn as u32;
        drawn
    }

    fn draw_box(&mut self, b: PackedBox) {
        if b.is_empty() {
            return;
        }
        let front = self.front_faces(b);
        if front.count == 0 {
            return;
        }
        self.project_corners(b);
        self.rasterize_faces::<Draw>(&front);
    }

    fn rasterize_faces<Op: TileOp>(&mut self, front: &FrontFaces) -> bool {
        front.as_slice().iter().any(|&(face, _)| {
            let vertices = face.corners().map(|i| self.corners[i]);
            self.raster.quad::<Op>(&mut self.buffer, &vertices)
        })
    }

    /// Faces of `b` the camera is strictly in front of.
    fn front_faces(&self, b: PackedBox) -> FrontFaces {
        // Camera position in region-local camera units.
        let camera = -self.offset;
        let lo = b.min().as_i64vec3() * CAMERA_PRECISION_UNITY;
        let hi = b.max().as_i64vec3() * CAMERA_PRECISION_UNITY;

        let mut front = FrontFaces {
            faces: [(BoxFace::Up, 0); 3],
            count: 0,
        };
        let axes = [
            (camera.x, lo.x, hi.x, BoxFace::West, BoxFace::East),
            (camera.y, lo.y, hi.y, BoxFace::Down, BoxFace::Up),
            (camera.z, lo.z, hi.z, BoxFace::North, BoxFace::South),
        ];
        for (c, min, max, min_face, max_face) in axes {
            let candidate = if c < min {
                (min_face, min - c)
            } else if c > max {
                (max_face, c - max)
            } else {
                continue;
            };
            front.faces[front.count] = candidate;
            front.count += 1;
        }
        front
    }

    /// Transform the eight corners of `b` through the region matrix.
    fn project_corners(&mut self, b: PackedBox) {
        let base = self.mvp.transform_block(
            i64::from(b.x0()),
            i64::from(b.y0()),
            i64::from(b.z0()),
        );
        let extent = (b.max() - b.min()).as_i64vec3().to_array();
        let steps: [[i64; 4]; 3] =
            std::array::from_fn(|axis| self.mvp.column(axis).map(|c| c * extent[axis]));

        for (i, corner) in self.corners.iter_mut().enumerate() {
            let mut clip = base;
            for (axis, step) in steps.iter().enumerate() {
                if i & (1 << axis) != 0 {
                    for (value, delta) in clip.iter_mut().zip(step) {
                        *value += delta;
                    }
                }
            }
            *corner = ProjectedVertex::from_clip(ClipVertex::from_array(clip));
        }
    }

    /// The occlusion buffer.
    pub fn buffer(&self) -> &OcclusionBuffer {
        &self.buffer
    }

    /// Counters of the current frame.
    pub fn stats(&self) -> OcclusionStats {
        self.stats
    }

    /// Queue a PNG dump of the buffer if dumping is enabled and the rate
    /// limit allows. Returns whether a dump was queued.
    pub fn output_raster(&mut self) -> bool {
        match &mut self.dumper {
            Some(dumper) => dumper.request(&self.buffer),
            None => false,
        }
    }
}
