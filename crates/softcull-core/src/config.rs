//! Occluder configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::CAMERA_PRECISION_UNITY;

/// Tuning for one occluder instance.
///
/// Hosts usually deserialize this from their own config file; every field
/// has a default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcclusionConfig {
    /// Faces closer to the camera than this (camera precision units) are
    /// reported visible without rasterizing.
    pub near_ambiguity: i64,
    /// Block distances at which regions switch to `Mid`, `Far` and `Extreme`
    /// occlusion ranges.
    pub range_distances: [f64; 3],
    /// Where raster dumps are written. `None` disables dumping.
    pub raster_output: Option<PathBuf>,
    /// Minimum time between two raster dumps, in milliseconds.
    pub raster_interval_ms: u64,
}

impl Default for OcclusionConfig {
    fn default() -> Self {
        Self {
            near_ambiguity: CAMERA_PRECISION_UNITY,
            range_distances: [64.0, 128.0, 192.0],
            raster_output: None,
            raster_interval_ms: 1000,
        }
    }
}

impl OcclusionConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable raster dumps to the given PNG path.
    #[must_use]
    pub fn with_raster_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.raster_output = Some(path.into());
        self
    }

    /// Set the minimum interval between raster dumps.
    #[must_use]
    pub fn with_raster_interval(mut self, interval: Duration) -> Self {
        self.raster_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the near-ambiguity distance in camera precision units.
    #[must_use]
    pub fn with_near_ambiguity(mut self, units: i64) -> Self {
        self.near_ambiguity = units;
        self
    }

    /// Set the range switch distances.
    #[must_use]
    pub fn with_range_distances(mut self, distances: [f64; 3]) -> Self {
        self.range_distances = distances;
        self
    }

    /// Minimum interval between raster dumps.
    pub const fn raster_interval(&self) -> Duration {
        Duration::from_millis(self.raster_interval_ms)
    }
}
