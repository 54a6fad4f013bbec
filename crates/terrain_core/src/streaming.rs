//! Background tile streaming.
//!
//! A [`StreamingWorker`] owns one thread that polls the map's region of
//! interest and keeps the tile set around it warm:
//!
//! ```text
//!   loop until stopped:
//!       region = map.region()
//!       load  tiles within (radius_x, radius_y)
//!       evict tiles beyond  (radius_x + margin, radius_y + margin)
//!       save_map()
//!       park for poll_interval (stop() unparks)
//!   final save_map()
//! ```
//!
//! The margin keeps a vehicle oscillating on a tile border from loading and
//! evicting the same tiles every pass.

use bevy::log::{info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::sparse_map::SparseTerrainMap;

/// Tuning for the streaming loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamingSettings {
    /// Extra distance beyond the load radii before a tile is evicted.
    pub unload_margin: f64,
    /// Sleep between passes.
    pub poll_interval: Duration,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            unload_margin: 2.0,
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// What one streaming pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub loaded: usize,
    pub evicted: usize,
    pub saved: usize,
}

impl PassSummary {
    pub fn is_idle(&self) -> bool {
        self.loaded == 0 && self.evicted == 0 && self.saved == 0
    }
}

/// Run one load / evict / save pass against the current region of interest.
///
/// With no region published yet only pending writes are flushed.
pub fn run_pass(map: &SparseTerrainMap, settings: &StreamingSettings) -> PassSummary {
    let mut summary = PassSummary::default();
    if let Some(region) = map.region() {
        summary.loaded = map.load_tiles_at_position(region.center, region.radius_x, region.radius_y);
        summary.evicted = map.evict_tiles_outside(
            region.center,
            region.radius_x + settings.unload_margin,
            region.radius_y + settings.unload_margin,
        );
    }
    summary.saved = map.save_map();
    summary
}

/// Handle to the background streaming thread. Dropping it stops the thread.
pub struct StreamingWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StreamingWorker {
    /// Spawn the worker for `map`.
    pub fn start(map: Arc<SparseTerrainMap>, settings: StreamingSettings) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("terrain-streaming".into())
            .spawn(move || Self::worker_loop(map, settings, worker_stop));

        let handle = match handle {
            Ok(handle) => {
                info!(
                    "Terrain streaming started (margin {} m, every {:?})",
                    settings.unload_margin, settings.poll_interval
                );
                Some(handle)
            }
            Err(e) => {
                warn!("Failed to spawn terrain streaming thread: {}", e);
                None
            }
        };

        Self { stop, handle }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Request a stop and wait for the final save to complete. Idempotent.
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        handle.thread().unpark();
        if handle.join().is_err() {
            warn!("Terrain streaming thread panicked");
        }
    }

    fn worker_loop(map: Arc<SparseTerrainMap>, settings: StreamingSettings, stop: Arc<AtomicBool>) {
        while !stop.load(Ordering::Acquire) {
            let summary = run_pass(&map, &settings);
            if summary.loaded > 0 || summary.evicted > 0 {
                info!(
                    "Streaming pass: {} loaded, {} evicted, {} saved, {} live",
                    summary.loaded,
                    summary.evicted,
                    summary.saved,
                    map.live_count()
                );
            }
            thread::park_timeout(settings.poll_interval);
        }

        let saved = map.save_map();
        let remaining = map.pending_count();
        if remaining > 0 {
            warn!("Terrain streaming stopped with {} unsaved tiles", remaining);
        }
        info!("Terrain streaming stopped, {} tiles saved on exit", saved);
    }
}

impl Drop for StreamingWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
