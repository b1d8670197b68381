//! Visibility pass: one region iteration per frame, run on a worker thread.
//!
//! The render thread calls [`VisibilityPass::prepare`] each frame and reads
//! the last completed visible-region list; a worker calls
//! [`VisibilityPass::run`]. Preparing while a pass is running asks it to stop
//! at the next region boundary.
//!
//! ```text
//! Idle --prepare--> Ready --run--> Running --> Complete --acknowledge--> Idle
//!                                     |
//!                      cancel / panic +--> Idle
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use glam::IVec3;
use parking_lot::Mutex;
use softcull_core::{Error, PackedBox, Result};
use tracing::{debug, error, trace};

use crate::occluder::{SceneParams, TerrainOccluder};

/// A region as seen by the pass.
pub trait OcclusionRegion {
    /// World block position of the region's minimum corner.
    fn origin(&self) -> IVec3;

    /// Bounds tested before drawing; the whole region by default.
    fn bounds(&self) -> PackedBox {
        PackedBox::FULL_REGION
    }

    /// Interior occluder boxes, sorted for occlusion.
    fn occluders(&self) -> &[PackedBox];
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    Idle = 0,
    Ready = 1,
    Running = 2,
    Complete = 3,
}

impl PassState {
    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Ready,
            2 => Self::Running,
            3 => Self::Complete,
            _ => Self::Idle,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Complete => "complete",
        }
    }
}

#[derive(Default)]
struct PassOutput {
    visible: Vec<usize>,
    /// Origins of the region list `visible` indexes into.
    origins: Vec<IVec3>,
    region_version: u64,
    /// Whether `visible` belongs to the occluder's current buffer contents.
    current: bool,
}

impl PassOutput {
    fn matches<R: OcclusionRegion>(&self, regions: &[R], region_version: u64) -> bool {
        self.current
            && self.region_version == region_version
            && self.origins.iter().copied().eq(regions.iter().map(R::origin))
    }
}

/// Visible indices plus the origins they were computed against.
struct PassResult {
    visible: Vec<usize>,
    origins: Vec<IVec3>,
}

/// Cross-thread state of one kind of visibility pass (camera, shadow, ...).
pub struct VisibilityPass {
    name: &'static str,
    state: AtomicU8,
    cancel: AtomicBool,
    output: Mutex<PassOutput>,
}

impl std::fmt::Debug for VisibilityPass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisibilityPass")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl VisibilityPass {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: AtomicU8::new(PassState::Idle as u8),
            cancel: AtomicBool::new(false),
            output: Mutex::new(PassOutput::default()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> PassState {
        PassState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Arm the pass for a new frame.
    ///
    /// If a pass is still running it is asked to cancel and `false` is
    /// returned; call again once it has stopped.
    pub fn prepare(&self) -> bool {
        if self.state() == PassState::Running {
            self.cancel.store(true, Ordering::Release);
            debug!(pass = self.name, "Cancelling running occlusion pass");
            return false;
        }
        self.cancel.store(false, Ordering::Release);
        self.state.store(PassState::Ready as u8, Ordering::Release);
        true
    }

    /// Run the pass over `regions`, which must be ordered front to back.
    ///
    /// Returns the number of visible regions. Errors with
    /// [`Error::NotReady`] unless prepared, [`Error::Cancelled`] when
    /// cancelled, and [`Error::WorkerPanic`] when iteration panicked; in the
    /// last two cases the pass returns to idle with an empty list.
    pub fn run<R: OcclusionRegion>(
        &self,
        occluder: &mut TerrainOccluder,
        scene: &SceneParams,
        regions: &[R],
    ) -> Result<usize> {
        if let Err(state) = self.state.compare_exchange(
            PassState::Ready as u8,
            PassState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Err(Error::NotReady(PassState::from_u8(state).name()));
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.iterate(occluder, scene, regions)
        }));

        match outcome {
            Ok(Ok(result)) => {
                let mut output = self.output.lock();
                if let Some(result) = result {
                    output.visible = result.visible;
                    output.origins = result.origins;
                    output.region_version = occluder.region_version();
                    output.current = true;
                }
                let count = output.visible.len();
                drop(output);
                self.state.store(PassState::Complete as u8, Ordering::Release);
                Ok(count)
            }
            Ok(Err(e)) => {
                debug!(pass = self.name, "{e}");
                self.reset();
                occluder.invalidate();
                Err(e)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(pass = self.name, "Occlusion pass panicked: {message}");
                self.reset();
                occluder.invalidate();
                Err(Error::WorkerPanic(message))
            }
        }
    }

    /// Walk regions; `Ok(None)` means the previous list is still valid.
    ///
    /// The previous list is reused only for an unchanged view over the same
    /// region list.
    fn iterate<R: OcclusionRegion>(
        &self,
        occluder: &mut TerrainOccluder,
        scene: &SceneParams,
        regions: &[R],
    ) -> Result<Option<PassResult>> {
        if !occluder.prepare(scene) {
            if self.output.lock().matches(regions, occluder.region_version()) {
                trace!(pass = self.name, "View unchanged, reusing visible regions");
                return Ok(None);
            }
            occluder.clear_scene();
        }

        let mut visible = Vec::new();
        let mut origins = Vec::with_capacity(regions.len());
        for (index, region) in regions.iter().enumerate() {
            if self.cancel.load(Ordering::Acquire) {
                return Err(Error::Cancelled(index));
            }
            let origin = region.origin();
            origins.push(origin);
            occluder.prepare_region_at_distance(origin);
            if occluder.is_box_visible(region.bounds()) {
                visible.push(index);
                occluder.occlude(region.occluders());
            }
        }

        let stats = occluder.stats();
        debug!(
            pass = self.name,
            regions = regions.len(),
            visible = visible.len(),
            boxes_drawn = stats.boxes_drawn,
            "Occlusion pass complete"
        );
        Ok(Some(PassResult { visible, origins }))
    }

    fn reset(&self) {
        let mut output = self.output.lock();
        output.visible.clear();
        output.origins.clear();
        output.current = false;
        drop(output);
        self.cancel.store(false, Ordering::Release);
        self.state.store(PassState::Idle as u8, Ordering::Release);
    }

    /// Read the visible-region indices of the completed pass.
    ///
    /// Returns `None` unless the pass is complete.
    pub fn with_visible_regions<T>(&self, f: impl FnOnce(&[usize]) -> T) -> Option<T> {
        if self.state() != PassState::Complete {
            return None;
        }
        Some(f(&self.output.lock().visible))
    }

    /// Mark the completed result as consumed.
    pub fn acknowledge(&self) -> bool {
        self.state
            .compare_exchange(
                PassState::Complete as u8,
                PassState::Idle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use glam::{DVec3, Vec3};
    use softcull_core::OcclusionRange;

    struct Region<'a> {
        origin: IVec3,
        occluders: Vec<PackedBox>,
        on_visit: Option<&'a VisibilityPass>,
        explode: bool,
    }

    impl Region<'_> {
        fn new(z: i32, occluders: Vec<PackedBox>) -> Self {
            Self {
                origin: IVec3::new(0, 0, z),
                occluders,
                on_visit: None,
                explode: false,
            }
        }
    }

    impl OcclusionRegion for Region<'_> {
        fn origin(&self) -> IVec3 {
            if let Some(pass) = self.on_visit {
                pass.prepare();
            }
            self.origin
        }

        fn occluders(&self) -> &[PackedBox] {
            assert!(!self.explode, "region data corrupted");
            &self.occluders
        }
    }

    fn scene() -> SceneParams {
        Camera::perspective(DVec3::new(8.5, 8.5, -4.0), Vec3::Z, 1.2, 0.05, 512.0).scene()
    }

    /// A solid wall region followed by regions straight behind it.
    fn regions<'a>() -> Vec<Region<'a>> {
        let wall = PackedBox::FULL_REGION;
        vec![
            Region::new(0, vec![wall]),
            Region::new(16, vec![wall.with_range(OcclusionRange::Near)]),
            Region::new(32, Vec::new()),
        ]
    }

    #[test]
    fn run_requires_prepare() {
        let pass = VisibilityPass::new("camera");
        let mut occluder = TerrainOccluder::default();
        let err = pass.run(&mut occluder, &scene(), &regions()).unwrap_err();
        assert!(matches!(err, Error::NotReady("idle")));
    }

    #[test]
    fn completed_pass_lists_visible_regions() {
        let pass = VisibilityPass::new("camera");
        let mut occluder = TerrainOccluder::default();
        assert!(pass.prepare());
        assert_eq!(pass.run(&mut occluder, &scene(), &regions()).unwrap(), 1);
        assert_eq!(pass.state(), PassState::Complete);
        assert_eq!(pass.with_visible_regions(<[usize]>::to_vec), Some(vec![0]));

        assert!(pass.acknowledge());
        assert_eq!(pass.state(), PassState::Idle);
        assert!(pass.with_visible_regions(<[usize]>::len).is_none());
    }

    #[test]
    fn unchanged_view_reuses_result() {
        let pass = VisibilityPass::new("camera");
        let mut occluder = TerrainOccluder::default();
        pass.prepare();
        pass.run(&mut occluder, &scene(), &regions()).unwrap();
        pass.acknowledge();

        pass.prepare();
        assert_eq!(pass.run(&mut occluder, &scene(), &regions()).unwrap(), 1);
        assert_eq!(occluder.stats().regions, 0);
    }

    #[test]
    fn changed_region_list_is_iterated_again() {
        let pass = VisibilityPass::new("camera");
        let mut occluder = TerrainOccluder::default();
        let wall = PackedBox::FULL_REGION;

        pass.prepare();
        let single = vec![Region::new(0, vec![wall])];
        assert_eq!(pass.run(&mut occluder, &scene(), &single).unwrap(), 1);
        pass.acknowledge();

        // Same view, more regions: nothing in front of the new one.
        pass.prepare();
        let grown = vec![Region::new(32, Vec::new()), Region::new(0, vec![wall])];
        assert_eq!(pass.run(&mut occluder, &scene(), &grown).unwrap(), 2);
        assert_eq!(pass.with_visible_regions(<[usize]>::to_vec), Some(vec![0, 1]));
        pass.acknowledge();

        // Same regions, re-sorted back to front: all of them are visible.
        pass.prepare();
        let mut resorted = regions();
        resorted.reverse();
        assert_eq!(pass.run(&mut occluder, &scene(), &resorted).unwrap(), 3);
        assert_eq!(pass.with_visible_regions(<[usize]>::to_vec), Some(vec![0, 1, 2]));
    }

    #[test]
    fn rebuilt_region_is_iterated_again() {
        let pass = VisibilityPass::new("camera");
        let mut occluder = TerrainOccluder::default();
        pass.prepare();
        pass.run(&mut occluder, &scene(), &regions()).unwrap();
        pass.acknowledge();

        occluder.notify_region_rebuilt();
        pass.prepare();
        assert_eq!(pass.run(&mut occluder, &scene(), &regions()).unwrap(), 1);
        assert_eq!(occluder.stats().regions, 3);
    }

    #[test]
    fn prepare_while_running_cancels() {
        let pass = VisibilityPass::new("camera");
        let mut occluder = TerrainOccluder::default();
        let mut regions = regions();
        regions[1].on_visit = Some(&pass);

        assert!(pass.prepare());
        let err = pass.run(&mut occluder, &scene(), &regions).unwrap_err();
        assert!(matches!(err, Error::Cancelled(2)));
        assert_eq!(pass.state(), PassState::Idle);
        assert!(pass.with_visible_regions(<[usize]>::len).is_none());

        // The next frame starts from a clean buffer.
        regions[1].on_visit = None;
        assert!(pass.prepare());
        assert_eq!(pass.run(&mut occluder, &scene(), &regions).unwrap(), 1);
    }

    #[test]
    fn panic_resets_to_idle() {
        let pass = VisibilityPass::new("shadow");
        let mut occluder = TerrainOccluder::default();
        let mut regions = regions();
        regions[0].explode = true;

        pass.prepare();
        let err = pass.run(&mut occluder, &scene(), &regions).unwrap_err();
        assert!(matches!(err, Error::WorkerPanic(ref m) if m.contains("corrupted")));
        assert_eq!(pass.state(), PassState::Idle);

        regions[0].explode = false;
        pass.prepare();
        assert_eq!(pass.run(&mut occluder, &scene(), &regions).unwrap(), 1);
    }
}
