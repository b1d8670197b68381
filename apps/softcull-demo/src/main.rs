//! Headless culling demo.
//!
//! Builds a synthetic terrain, then runs a camera pass and a shadow pass per
//! frame on two threads while the camera walks forward, logging how many
//! regions survive culling.
//!
//! Flags:
//! - `-r` or `--radius <N>`: terrain radius in regions (default 12)
//! - `-n` or `--frames <N>`: number of frames (default 8)
//! - `-o` or `--raster <PATH>`: dump the camera occlusion raster to a PNG

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use glam::{DVec3, Vec3};
use softcull_core::OcclusionConfig;
use softcull_raster::{Camera, TerrainOccluder, VisibilityPass};
use tracing::info;
use tracing_subscriber::EnvFilter;
#[cfg(feature = "profiling-tracy")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod terrain;

#[derive(Debug, Clone)]
struct DemoArgs {
    radius: i32,
    frames: u32,
    raster: Option<PathBuf>,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            radius: 12,
            frames: 8,
            raster: None,
        }
    }
}

impl DemoArgs {
    fn parse_args(args: &[String]) -> anyhow::Result<Self> {
        let mut parsed = Self::default();
        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1);
            match args[i].as_str() {
                "-r" | "--radius" => {
                    parsed.radius = value.context("--radius needs a value")?.parse()?;
                    i += 1;
                }
                "-n" | "--frames" => {
                    parsed.frames = value.context("--frames needs a value")?.parse()?;
                    i += 1;
                }
                "-o" | "--raster" => {
                    parsed.raster = Some(value.context("--raster needs a path")?.into());
                    i += 1;
                }
                other => anyhow::bail!("unknown argument: {other}"),
            }
            i += 1;
        }
        Ok(parsed)
    }
}

fn init_tracing() {
    #[cfg(feature = "profiling-tracy")]
    {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,softcull_raster=trace,softcull_demo=trace")
        });
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .with(tracing_tracy::TracyLayer::default())
            .init();
    }
    #[cfg(not(feature = "profiling-tracy"))]
    {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let args = DemoArgs::parse_args(&args)?;

    let start = Instant::now();
    let regions = terrain::build(args.radius)?;
    info!(
        regions = regions.len(),
        boxes = regions.iter().map(|r| r.occluders.len()).sum::<usize>(),
        "Terrain built in {:.1} ms",
        start.elapsed().as_secs_f64() * 1000.0
    );

    let mut config = OcclusionConfig::default();
    if let Some(path) = &args.raster {
        config = config
            .with_raster_output(path)
            .with_raster_interval(Duration::ZERO);
    }
    let mut camera_occluder = TerrainOccluder::new(config)?;
    let mut shadow_occluder = TerrainOccluder::default();
    let camera_pass = VisibilityPass::new("camera");
    let shadow_pass = VisibilityPass::new("shadow");

    let mut camera = Camera::perspective(
        DVec3::new(0.5, f64::from(terrain::height(0, 0)) + 6.5, 0.5),
        Vec3::new(0.6, -0.2, 1.0),
        1.2,
        0.05,
        1024.0,
    );
    let sun = Camera::orthographic(
        DVec3::new(0.5, 192.0, 0.5),
        Vec3::new(0.3, -1.0, 0.2),
        256.0,
        128.0,
        1.0,
        512.0,
    );

    let mut camera_regions = regions.clone();
    let mut shadow_regions = regions;
    terrain::sort_front_to_back(&mut shadow_regions, &sun);
    let sun_scene = sun.scene();

    for frame in 0..args.frames {
        terrain::sort_front_to_back(&mut camera_regions, &camera);
        let camera_scene = camera.scene();

        camera_pass.prepare();
        shadow_pass.prepare();

        let start = Instant::now();
        let (visible, shadowed) = rayon::join(
            || camera_pass.run(&mut camera_occluder, &camera_scene, &camera_regions),
            || shadow_pass.run(&mut shadow_occluder, &sun_scene, &shadow_regions),
        );
        let (visible, shadowed) = (visible?, shadowed?);

        let stats = camera_occluder.stats();
        info!(
            frame,
            visible,
            shadowed,
            total = camera_regions.len(),
            boxes_drawn = stats.boxes_drawn,
            "Culled in {:.2} ms",
            start.elapsed().as_secs_f64() * 1000.0
        );

        camera_occluder.output_raster();
        camera_pass.acknowledge();
        shadow_pass.acknowledge();

        camera.position += camera.direction.as_dvec3() * 2.0;
    }

    Ok(())
}
