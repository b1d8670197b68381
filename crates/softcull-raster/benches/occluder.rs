use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::{DVec3, IVec3, Vec3};
use softcull_core::{OcclusionRange, PackedBox};
use softcull_raster::{Camera, OcclusionRegion, TerrainOccluder, VisibilityPass};

struct Region {
    origin: IVec3,
    occluders: Vec<PackedBox>,
}

impl OcclusionRegion for Region {
    fn origin(&self) -> IVec3 {
        self.origin
    }

    fn occluders(&self) -> &[PackedBox] {
        &self.occluders
    }
}

fn camera() -> Camera {
    Camera::perspective(
        DVec3::new(8.5, 20.0, -30.0),
        Vec3::new(0.2, -0.3, 1.0),
        1.2,
        0.05,
        1024.0,
    )
}

/// Flat ground with a stepped hill in every region, front to back.
fn regions() -> Vec<Region> {
    let mut regions = Vec::new();
    for rz in 0..16 {
        for rx in -8..8 {
            let step = ((rx + rz) & 3) as u32;
            regions.push(Region {
                origin: IVec3::new(rx * 16, 0, rz * 16),
                occluders: vec![
                    PackedBox::new(0, 0, 0, 16, 4, 16, OcclusionRange::Extreme),
                    PackedBox::new(2, 4, 2, 14, 6 + step, 14, OcclusionRange::Extreme),
                    PackedBox::new(5, 6 + step, 5, 11, 9 + step, 11, OcclusionRange::Far),
                    PackedBox::new(7, 9 + step, 7, 8, 10 + step, 8, OcclusionRange::Near),
                ],
            });
        }
    }
    let eye = camera().position;
    regions.sort_by(|a, b| {
        let da = (a.origin.as_dvec3() + 8.0).distance_squared(eye);
        let db = (b.origin.as_dvec3() + 8.0).distance_squared(eye);
        da.total_cmp(&db)
    });
    regions
}

fn bench_draw_box(c: &mut Criterion) {
    let scene = camera().scene();
    let mut occluder = TerrainOccluder::default();
    let wall = PackedBox::new(0, 0, 0, 16, 16, 2, OcclusionRange::Extreme);

    c.bench_function("occluder_draw_box", |b| {
        b.iter(|| {
            occluder.clear_scene();
            occluder.prepare(&scene);
            occluder.prepare_region(IVec3::new(0, 0, 16), OcclusionRange::Near);
            occluder.occlude(black_box(&[wall]))
        });
    });
}

fn bench_test_region(c: &mut Criterion) {
    let scene = camera().scene();
    let mut occluder = TerrainOccluder::default();
    occluder.prepare(&scene);
    occluder.prepare_region(IVec3::ZERO, OcclusionRange::Near);
    occluder.occlude(&[PackedBox::FULL_REGION]);
    occluder.prepare_region(IVec3::new(0, 0, 48), OcclusionRange::Near);

    c.bench_function("occluder_test_region", |b| {
        b.iter(|| occluder.is_box_visible(black_box(PackedBox::FULL_REGION)));
    });
}

fn bench_full_pass(c: &mut Criterion) {
    let scene = camera().scene();
    let regions = regions();
    let pass = VisibilityPass::new("bench");
    let mut occluder = TerrainOccluder::default();

    c.bench_function("visibility_pass_256_regions", |b| {
        b.iter(|| {
            occluder.invalidate();
            pass.prepare();
            pass.run(&mut occluder, &scene, black_box(&regions))
        });
    });
}

criterion_group!(
    benches,
    bench_draw_box,
    bench_test_region,
    bench_full_pass
);
criterion_main!(benches);
