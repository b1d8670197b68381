//! Occlusion raster dumps for debugging.
//!
//! The buffer is expanded to RGBA on the calling thread (black = occluded,
//! white = open, flipped so up is up) and handed to a background thread that
//! encodes the PNG, so the culling thread never waits on disk I/O.

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use image::{ImageBuffer, Rgba};
use softcull_core::{Error, Result};
use tracing::{debug, info, warn};

use crate::buffer::{OcclusionBuffer, PIXEL_HEIGHT, PIXEL_WIDTH};

const OCCLUDED: [u8; 4] = [0, 0, 0, 255];
const OPEN: [u8; 4] = [255, 255, 255, 255];

/// Expand `buffer` to top-down RGBA rows.
pub fn raster_rgba(buffer: &OcclusionBuffer) -> Vec<u8> {
    let mut data = Vec::with_capacity((PIXEL_WIDTH * PIXEL_HEIGHT * 4) as usize);
    for row in 0..PIXEL_HEIGHT {
        let y = PIXEL_HEIGHT - 1 - row;
        for x in 0..PIXEL_WIDTH {
            let color = if buffer.is_pixel_occluded(x, y) {
                OCCLUDED
            } else {
                OPEN
            };
            data.extend_from_slice(&color);
        }
    }
    data
}

/// Encode an RGBA raster of buffer size to `path`.
pub fn save_raster_png(data: Vec<u8>, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();

    let image = ImageBuffer::<Rgba<u8>, _>::from_raw(PIXEL_WIDTH as u32, PIXEL_HEIGHT as u32, data)
        .ok_or_else(|| Error::Image("raster data does not match buffer size".to_string()))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    image
        .save(path)
        .map_err(|e| Error::Image(e.to_string()))?;

    info!("Occlusion raster saved: {}", path.display());
    Ok(())
}

enum DumpRequest {
    Write { path: PathBuf, data: Vec<u8> },
    Shutdown,
}

/// Rate-limited background PNG writer.
pub struct RasterDumper {
    request_tx: Sender<DumpRequest>,
    thread: Option<JoinHandle<()>>,
    path: PathBuf,
    interval: Duration,
    last_dump: Option<Instant>,
}

impl RasterDumper {
    /// Spawn the writer thread. Dumps go to `path`, at most one per
    /// `interval`.
    pub fn spawn(path: impl Into<PathBuf>, interval: Duration) -> Result<Self> {
        // One dump in flight; further requests are dropped until it is taken.
        let (request_tx, request_rx) = channel::bounded::<DumpRequest>(1);

        let thread = thread::Builder::new()
            .name("raster-dump".to_string())
            .spawn(move || {
                Self::worker_loop(&request_rx);
            })?;

        Ok(Self {
            request_tx,
            thread: Some(thread),
            path: path.into(),
            interval,
            last_dump: None,
        })
    }

    fn worker_loop(request_rx: &Receiver<DumpRequest>) {
        while let Ok(DumpRequest::Write { path, data }) = request_rx.recv() {
            if let Err(e) = save_raster_png(data, &path) {
                warn!("Failed to write occlusion raster {}: {e}", path.display());
            }
        }
        debug!("Raster dump thread exiting");
    }

    /// Output path of the dumps.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue a dump of `buffer` unless one was queued within the interval.
    ///
    /// Returns whether a dump was queued.
    pub fn request(&mut self, buffer: &OcclusionBuffer) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_dump {
            if now.duration_since(last) < self.interval {
                return false;
            }
        }

        let request = DumpRequest::Write {
            path: self.path.clone(),
            data: raster_rgba(buffer),
        };
        match self.request_tx.try_send(request) {
            Ok(()) => {
                self.last_dump = Some(now);
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!("Raster dump still in progress, skipping");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("Raster dump thread is gone");
                false
            }
        }
    }

    fn shutdown(&mut self) {
        // The thread may already be gone.
        let _ = self.request_tx.send(DumpRequest::Shutdown);

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl std::fmt::Debug for RasterDumper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterDumper")
            .field("path", &self.path)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Drop for RasterDumper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
