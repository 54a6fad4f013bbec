//! Sparse, streaming, tile-indexed particle map.
//!
//! The terrain is an unbounded set of square tiles keyed by [`TileId`]. Only
//! tiles near something interesting are materialized; the rest live on disk
//! or are regenerated from the height map on demand.
//!
//! ## Tile lifecycle
//!
//! ```text
//!                 load / get_tile
//!   not materialized ───────────────▶ live ──┐
//!          ▲                           ▲     │ evict (dirty)
//!          │ save_map                  │     ▼
//!          └──────────────────── pending write
//!                        revive on access
//! ```
//!
//! Clean tiles are dropped on eviction instead of being queued: their jitter
//! is seeded by tile id, so regenerating them yields the same particles.
//!
//! ## Locks
//!
//! - the tile lock guards live tiles, the pending-write set and the height
//!   map. The simulation tick only holds it for lookups and integration.
//! - the region lock guards the single region of interest published by
//!   [`SparseTerrainMap::update`].
//!
//! Never take the region lock while holding the tile lock. Storage I/O in
//! [`SparseTerrainMap::load_tiles_at_position`], [`SparseTerrainMap::save_map`]
//! and [`TerrainGuard::get_tile`] happens with no lock held.

use bevy::log::{debug, info, warn};
use bevy::math::DVec3;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::geometry::OrientedBox;
use crate::heightmap::HeightMap;
use crate::particle::Particle;
use crate::tile::Tile;
use crate::tile_id::{TileCoord, TileId};
use crate::tile_io;

/// Global parameters shared by every tile of a map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapParams {
    /// Particle diameter in meters.
    pub particle_size: f64,
    /// Depth of the particle layer below the surface.
    pub terrain_depth: f64,
    /// Edge length of a tile in meters.
    pub tile_size: f64,
    /// World position of tile (0, 0)'s lower corner.
    pub tile0_position: DVec3,
    /// Directory holding persisted tiles.
    pub save_path: PathBuf,
}

impl Default for MapParams {
    fn default() -> Self {
        Self {
            particle_size: 0.02,
            terrain_depth: 0.4,
            tile_size: 1.0,
            tile0_position: DVec3::ZERO,
            save_path: PathBuf::from("terrain_tiles"),
        }
    }
}

/// Rectangle around a tracked position, published for the streaming worker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionOfInterest {
    pub center: DVec3,
    pub radius_x: f64,
    pub radius_y: f64,
}

/// Stable reference to a particle: owning tile plus in-tile index.
///
/// Only resolvable through a [`TerrainGuard`]; a handle whose tile was
/// evicted in the meantime simply resolves to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticleHandle {
    pub tile: TileId,
    pub index: u32,
}

struct PendingTile {
    tile: Tile,
    /// Bumped on every eviction so a finished write can tell whether the
    /// pending entry it wrote is still the current one.
    generation: u64,
}

/// Everything behind the tile lock.
struct TileSet {
    live: HashMap<TileId, Tile>,
    pending_write: HashMap<TileId, PendingTile>,
    next_generation: u64,
    /// Bumped when a tile's only copy moves to disk or the height map is
    /// replaced. Tiles built off-lock under an older epoch may be stale.
    epoch: u64,
    heightmap: Arc<HeightMap>,
}

impl TileSet {
    fn queue_write(&mut self, id: TileId, tile: Tile) {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.pending_write.insert(id, PendingTile { tile, generation });
    }

    /// Move a pending tile back into the live set. True if one was pending.
    fn revive(&mut self, id: TileId) -> bool {
        match self.pending_write.remove(&id) {
            Some(pending) => {
                self.live.insert(id, pending.tile);
                true
            }
            None => false,
        }
    }

    /// Insert a tile built without the lock, unless someone else
    /// materialized it meanwhile. Theirs may already be mutated, so it wins.
    fn adopt(&mut self, id: TileId, tile: Tile) -> bool {
        if self.live.contains_key(&id) || self.revive(id) {
            return false;
        }
        self.live.insert(id, tile);
        true
    }
}

/// Hash-indexed collection of tiles over an unbounded world.
pub struct SparseTerrainMap {
    params: MapParams,
    tiles: Mutex<TileSet>,
    region: RwLock<Option<RegionOfInterest>>,
}

impl SparseTerrainMap {
    /// Create a map over `heightmap`. No tiles are materialized yet.
    pub fn new(params: MapParams, heightmap: HeightMap) -> Self {
        info!(
            "Terrain map: particle {} m, depth {} m, tile {} m, saving to {}",
            params.particle_size,
            params.terrain_depth,
            params.tile_size,
            params.save_path.display()
        );
        Self {
            params,
            tiles: Mutex::new(TileSet {
                live: HashMap::new(),
                pending_write: HashMap::new(),
                next_generation: 0,
                epoch: 0,
                heightmap: Arc::new(heightmap),
            }),
            region: RwLock::new(None),
        }
    }

    pub fn params(&self) -> &MapParams {
        &self.params
    }

    pub fn tile_size(&self) -> f64 {
        self.params.tile_size
    }

    /// Take the tile lock for a scoped critical section.
    ///
    /// The guard is the only way to resolve [`ParticleHandle`]s. Dropping it
    /// releases the lock.
    pub fn lock(&self) -> TerrainGuard<'_> {
        TerrainGuard {
            map: self,
            set: Some(self.lock_set()),
        }
    }

    fn lock_set(&self) -> MutexGuard<'_, TileSet> {
        // A panic elsewhere must not stop the simulation from ticking.
        self.tiles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Coordinates
    // ------------------------------------------------------------------

    /// Tile coordinates containing `position`.
    pub fn tile_coord(&self, position: DVec3) -> TileCoord {
        TileCoord::from_position(position, self.params.tile0_position, self.params.tile_size)
    }

    /// Packed id of the tile containing `position`.
    pub fn tile_id(&self, position: DVec3) -> TileId {
        self.tile_coord(position).id()
    }

    /// Lower corner of a tile.
    pub fn tile_position(&self, id: TileId) -> DVec3 {
        id.coord()
            .origin(self.params.tile0_position, self.params.tile_size)
    }

    /// Horizontal center of the tile containing `position` (z = 0).
    pub fn tile_center(&self, position: DVec3) -> DVec3 {
        let half = self.params.tile_size * 0.5;
        self.tile_position(self.tile_id(position)) + DVec3::new(half, half, 0.0)
    }

    /// Every tile coordinate whose square intersects the rectangle
    /// `[min, max]` (horizontal components only).
    pub fn coords_in_rect(&self, min: DVec3, max: DVec3) -> impl Iterator<Item = TileCoord> {
        let lo = self.tile_coord(min);
        let hi = self.tile_coord(max);
        (lo.x..=hi.x).flat_map(move |x| (lo.y..=hi.y).map(move |y| TileCoord::new(x, y)))
    }

    /// Number of tile cells intersecting `[min, max]`, as a float so huge or
    /// non-finite rectangles neither overflow nor saturate.
    fn cell_count(&self, min: DVec3, max: DVec3) -> f64 {
        let tile0 = self.params.tile0_position;
        let size = self.params.tile_size;
        let span = |lo: f64, hi: f64, t0: f64| {
            ((hi - t0) / size).floor() - ((lo - t0) / size).floor() + 1.0
        };
        span(min.x, max.x, tile0.x) * span(min.y, max.y, tile0.y)
    }

    fn tile_bounds(&self, coord: TileCoord) -> (DVec3, DVec3) {
        let origin = coord.origin(self.params.tile0_position, self.params.tile_size);
        let end = origin + DVec3::new(self.params.tile_size, self.params.tile_size, 0.0);
        (origin, end)
    }

    /// Whether a tile's square intersects `[min, max]`, with the same edge
    /// convention as [`SparseTerrainMap::coords_in_rect`].
    fn tile_in_rect(&self, coord: TileCoord, min: DVec3, max: DVec3) -> bool {
        let (origin, end) = self.tile_bounds(coord);
        origin.x <= max.x && end.x > min.x && origin.y <= max.y && end.y > min.y
    }

    /// Clamp a particle horizontally into tile `coord`, one radius in from
    /// the edge, zeroing the velocity components it was clamped along.
    fn hold_inside(&self, coord: TileCoord, mut particle: Particle) -> Particle {
        let (origin, end) = self.tile_bounds(coord);
        let inset = (particle.radius as f64).min(self.params.tile_size * 0.25);
        let x = particle.position.x.clamp(origin.x + inset, end.x - inset);
        let y = particle.position.y.clamp(origin.y + inset, end.y - inset);
        if x != particle.position.x {
            particle.velocity.x = 0.0;
        }
        if y != particle.position.y {
            particle.velocity.y = 0.0;
        }
        particle.position.x = x;
        particle.position.y = y;
        particle
    }

    fn in_world(&self, heightmap: &HeightMap, coord: TileCoord) -> bool {
        let (origin, end) = self.tile_bounds(coord);
        heightmap.is_loaded() && heightmap.overlaps(origin, end)
    }

    /// Surface height at `position`.
    pub fn get_height(&self, position: DVec3) -> f64 {
        self.lock_set().heightmap.get_height(position)
    }

    // ------------------------------------------------------------------
    // Materialization
    // ------------------------------------------------------------------

    /// Build a tile from disk if persisted there, otherwise from the height
    /// map. Performs storage I/O; callers decide which lock, if any, is held.
    fn materialize(&self, coord: TileCoord, heightmap: &HeightMap) -> Tile {
        let id = coord.id();
        let (origin, end) = self.tile_bounds(coord);

        match tile_io::load_tile(&self.params.save_path, id) {
            Ok(Some(tile)) if tile.position == origin => {
                debug!("Loaded tile {} ({} particles) from disk", id, tile.len());
                return tile;
            }
            Ok(Some(tile)) => {
                warn!(
                    "Persisted tile {} is anchored at {:?}, expected {:?}; regenerating",
                    id, tile.position, origin
                );
                self.discard_persisted(id);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Discarding unreadable tile {}: {}", id, e);
                self.discard_persisted(id);
            }
        }

        let tile = Tile::generate(
            self.params.particle_size,
            self.params.terrain_depth,
            origin,
            end,
            heightmap,
            id.0,
        );
        debug!("Generated tile {} ({} particles)", id, tile.len());
        tile
    }

    fn discard_persisted(&self, id: TileId) {
        if let Err(e) = tile_io::remove_tile(&self.params.save_path, id) {
            warn!("Failed to remove tile file {}: {}", id, e);
        }
    }

    // ------------------------------------------------------------------
    // Streaming
    // ------------------------------------------------------------------

    /// Ensure every in-world tile intersecting
    /// `[center - (radius_x, radius_y), center + (radius_x, radius_y)]` is live.
    ///
    /// The rectangle is first clipped to the height map, so an oversized
    /// radius costs no more than the world itself. Disk reads and generation
    /// run without the tile lock. Returns the number of tiles that became
    /// live.
    pub fn load_tiles_at_position(&self, center: DVec3, radius_x: f64, radius_y: f64) -> usize {
        let reach = DVec3::new(radius_x, radius_y, 0.0);
        let (min, max) = (center - reach, center + reach);
        if [min.x, min.y, max.x, max.y].iter().any(|v| v.is_nan()) {
            return 0;
        }

        let mut revived = 0;
        loop {
            let (missing, heightmap, epoch) = {
                let mut set = self.lock_set();
                let heightmap = Arc::clone(&set.heightmap);
                if !heightmap.is_loaded() {
                    return revived;
                }
                let min = min.max(heightmap.origin());
                let max = max.min(heightmap.end());
                if min.x > max.x || min.y > max.y {
                    return revived;
                }

                let mut missing = Vec::new();
                for coord in self.coords_in_rect(min, max) {
                    let id = coord.id();
                    if set.live.contains_key(&id) {
                        continue;
                    }
                    if set.revive(id) {
                        revived += 1;
                        continue;
                    }
                    if self.in_world(&heightmap, coord) {
                        missing.push(coord);
                    }
                }
                (missing, heightmap, set.epoch)
            };

            if missing.is_empty() {
                return revived;
            }

            let built: Vec<(TileId, Tile)> = missing
                .into_iter()
                .map(|coord| (coord.id(), self.materialize(coord, &heightmap)))
                .collect();

            let mut set = self.lock_set();
            if set.epoch != epoch {
                // A write landed meanwhile; what was read may be older than disk.
                continue;
            }
            let inserted = built
                .into_iter()
                .fold(0, |n, (id, tile)| n + usize::from(set.adopt(id, tile)));
            return revived + inserted;
        }
    }

    /// Evict live tiles that do not intersect the rectangle around `center`.
    ///
    /// Dirty tiles move to the pending-write set; clean ones are dropped.
    /// Returns the number of tiles evicted.
    pub fn evict_tiles_outside(&self, center: DVec3, radius_x: f64, radius_y: f64) -> usize {
        let min = center - DVec3::new(radius_x, radius_y, 0.0);
        let max = center + DVec3::new(radius_x, radius_y, 0.0);

        let mut set = self.lock_set();
        let outside: Vec<TileId> = set
            .live
            .keys()
            .copied()
            .filter(|id| !self.tile_in_rect(id.coord(), min, max))
            .collect();

        for id in &outside {
            if let Some(tile) = set.live.remove(id) {
                if tile.dirty {
                    set.queue_write(*id, tile);
                }
            }
        }
        outside.len()
    }

    /// Publish the latest position of interest for the streaming worker.
    pub fn update(&self, center: DVec3, radius_x: f64, radius_y: f64) {
        let region = RegionOfInterest {
            center,
            radius_x,
            radius_y,
        };
        *self.region.write().unwrap_or_else(PoisonError::into_inner) = Some(region);
    }

    /// Latest published region of interest.
    pub fn region(&self) -> Option<RegionOfInterest> {
        *self.region.read().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Write every pending tile to storage.
    ///
    /// Pending tiles are copied under the lock, written with no lock held,
    /// then removed from the pending set only if they were not revived or
    /// re-evicted during the write. Failed writes stay pending for the next
    /// pass. Returns the number of tiles written.
    pub fn save_map(&self) -> usize {
        let snapshot = self.pending_snapshot();
        if snapshot.is_empty() {
            return 0;
        }

        let mut written = Vec::with_capacity(snapshot.len());
        for (id, generation, tile) in snapshot {
            match tile_io::save_tile(&self.params.save_path, id, &tile) {
                Ok(()) => {
                    debug!("Saved tile {} ({} particles)", id, tile.len());
                    written.push((id, generation));
                }
                Err(e) => warn!("Failed to save tile {}, will retry: {}", id, e),
            }
        }

        self.retire_written(&written);
        written.len()
    }

    fn pending_snapshot(&self) -> Vec<(TileId, u64, Tile)> {
        let set = self.lock_set();
        set.pending_write
            .iter()
            .map(|(id, p)| (*id, p.generation, p.tile.clone()))
            .collect()
    }

    /// Drop pending entries whose written generation is still current.
    fn retire_written(&self, written: &[(TileId, u64)]) {
        let mut set = self.lock_set();
        for (id, generation) in written {
            if set.pending_write.get(id).map(|p| p.generation) == Some(*generation) {
                set.pending_write.remove(id);
                set.epoch += 1;
            }
        }
    }

    /// Queue every dirty live tile for writing, drop all live tiles and
    /// persist. Returns the number of tiles written.
    pub fn clear(&self) -> usize {
        {
            let mut set = self.lock_set();
            let live: Vec<(TileId, Tile)> = set.live.drain().collect();
            for (id, tile) in live {
                if tile.dirty {
                    set.queue_write(id, tile);
                }
            }
        }
        self.save_map()
    }

    /// Swap in a new height map. Clean live tiles are dropped so they
    /// regenerate from the new heights; dirty ones keep their deformation.
    pub fn update_height_map(&self, heightmap: HeightMap) {
        let mut set = self.lock_set();
        set.heightmap = Arc::new(heightmap);
        set.epoch += 1;
        set.live.retain(|_, tile| tile.dirty);
        info!("Height map updated, {} deformed tiles kept", set.live.len());
    }

    /// Persist and drop every tile, then install `heightmap` for a fresh run.
    pub fn initialize_map(&self, heightmap: HeightMap) {
        let written = self.clear();
        if written > 0 {
            info!("Persisted {} tiles before reinitializing", written);
        }
        let mut set = self.lock_set();
        set.heightmap = Arc::new(heightmap);
        set.epoch += 1;
    }

    // ------------------------------------------------------------------
    // Convenience queries (lock internally)
    // ------------------------------------------------------------------

    /// Copies of live particles within `radius` of `center`.
    pub fn get_particles_in_radius(&self, center: DVec3, radius: f64) -> Vec<Particle> {
        let guard = self.lock();
        guard
            .particles_in_radius(center, radius)
            .into_iter()
            .filter_map(|h| guard.particle(h).copied())
            .collect()
    }

    /// Copies of live particles inside `obb`.
    pub fn get_particles_in_box(&self, obb: &OrientedBox) -> Vec<Particle> {
        let guard = self.lock();
        guard
            .particles_in_box(obb)
            .into_iter()
            .filter_map(|h| guard.particle(h).copied())
            .collect()
    }

    /// Number of live tiles.
    pub fn live_count(&self) -> usize {
        self.lock_set().live.len()
    }

    /// Number of tiles waiting to be written.
    pub fn pending_count(&self) -> usize {
        self.lock_set().pending_write.len()
    }
}

/// Scoped access to the map's tiles while holding the tile lock.
pub struct TerrainGuard<'a> {
    map: &'a SparseTerrainMap,
    /// Always `Some` outside [`TerrainGuard::get_tile`], which releases the
    /// lock around storage reads.
    set: Option<MutexGuard<'a, TileSet>>,
}

impl<'a> TerrainGuard<'a> {
    pub fn map(&self) -> &SparseTerrainMap {
        self.map
    }

    fn set(&self) -> &TileSet {
        match self.set.as_deref() {
            Some(set) => set,
            None => unreachable!("tile lock is re-acquired before get_tile returns"),
        }
    }

    fn set_mut(&mut self) -> &mut TileSet {
        let map = self.map;
        self.set.get_or_insert_with(|| map.lock_set())
    }

    /// Live tile at `coord`, materializing it if needed.
    ///
    /// Pending tiles are revived under the lock. A cold tile is read from
    /// disk or generated with the lock briefly released, so handles taken
    /// earlier from this guard must be queried again. `None` for tiles
    /// outside the height map. The reference is only valid for the lifetime
    /// of this guard.
    pub fn get_tile(&mut self, coord: TileCoord) -> Option<&mut Tile> {
        let id = coord.id();
        let map = self.map;
        loop {
            let set = self.set_mut();
            if set.live.contains_key(&id) || set.revive(id) {
                break;
            }
            let heightmap = Arc::clone(&set.heightmap);
            let epoch = set.epoch;
            if !map.in_world(&heightmap, coord) {
                return None;
            }
            drop(self.set.take());
            let tile = map.materialize(coord, &heightmap);
            let set = self.set_mut();
            if set.epoch == epoch {
                set.adopt(id, tile);
            }
        }
        self.set_mut().live.get_mut(&id)
    }

    /// [`TerrainGuard::get_tile`] by packed id.
    pub fn get_tile_by_id(&mut self, id: TileId) -> Option<&mut Tile> {
        self.get_tile(id.coord())
    }

    /// [`TerrainGuard::get_tile`] for the tile containing `position`.
    pub fn get_tile_at(&mut self, position: DVec3) -> Option<&mut Tile> {
        let coord = self.map.tile_coord(position);
        self.get_tile(coord)
    }

    /// Live tile without materializing.
    pub fn tile(&self, id: TileId) -> Option<&Tile> {
        self.set().live.get(&id)
    }

    /// Ids of all live tiles, sorted.
    pub fn live_tile_ids(&self) -> Vec<TileId> {
        let mut ids: Vec<TileId> = self.set().live.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Ids of all tiles waiting to be written, sorted.
    pub fn pending_tile_ids(&self) -> Vec<TileId> {
        let mut ids: Vec<TileId> = self.set().pending_write.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Iterate over all live tiles.
    pub fn tiles(&self) -> impl Iterator<Item = (&TileId, &Tile)> {
        self.set().live.iter()
    }

    fn collect_handles<F>(&self, min: DVec3, max: DVec3, mut query: F) -> Vec<ParticleHandle>
    where
        F: FnMut(&Tile, &mut Vec<usize>),
    {
        let set = self.set();
        // Walk whichever is smaller: the cells under the rectangle or the
        // live set. NaN counts fall through to the live set, where the
        // rectangle test rejects everything.
        let tiles: Vec<(TileId, &Tile)> = if self.map.cell_count(min, max) <= set.live.len() as f64 {
            self.map
                .coords_in_rect(min, max)
                .filter_map(|coord| set.live.get_key_value(&coord.id()))
                .map(|(id, tile)| (*id, tile))
                .collect()
        } else {
            set.live
                .iter()
                .filter(|(id, _)| self.map.tile_in_rect(id.coord(), min, max))
                .map(|(id, tile)| (*id, tile))
                .collect()
        };

        let mut handles = Vec::new();
        let mut indices = Vec::new();
        for (id, tile) in tiles {
            indices.clear();
            query(tile, &mut indices);
            handles.extend(indices.iter().map(|&i| ParticleHandle {
                tile: id,
                index: i as u32,
            }));
        }
        handles
    }

    /// Handles of live particles within `radius` of `center`, across every
    /// overlapped tile. Never materializes tiles.
    pub fn particles_in_radius(&self, center: DVec3, radius: f64) -> Vec<ParticleHandle> {
        let reach = DVec3::new(radius, radius, 0.0);
        self.collect_handles(center - reach, center + reach, |tile, out| {
            tile.particles_in_radius_into(center, radius, out)
        })
    }

    /// Handles of live particles inside `obb`, across every overlapped tile.
    /// Never materializes tiles.
    pub fn particles_in_box(&self, obb: &OrientedBox) -> Vec<ParticleHandle> {
        let (min, max) = obb.aabb();
        self.collect_handles(min, max, |tile, out| tile.particles_in_box_into(obb, out))
    }

    /// Resolve a handle for reading.
    pub fn particle(&self, handle: ParticleHandle) -> Option<&Particle> {
        self.set()
            .live
            .get(&handle.tile)
            .and_then(|t| t.particles.get(handle.index as usize))
    }

    /// Resolve a handle for writing. Marks the owning tile dirty.
    pub fn particle_mut(&mut self, handle: ParticleHandle) -> Option<&mut Particle> {
        let tile = self.set_mut().live.get_mut(&handle.tile)?;
        let particle = tile.particles.get_mut(handle.index as usize)?;
        tile.dirty = true;
        Some(particle)
    }

    /// Move particles that left the horizontal bounds of the live tiles in
    /// `tiles` into the tiles that now contain them.
    ///
    /// A destination that is live or pending receives the particle (pending
    /// tiles are revived). Anything else, including positions outside the
    /// world, would need storage I/O under the lock, so the particle is held
    /// at its own tile's edge instead and loses its velocity across that
    /// edge. Every touched tile is marked dirty. Handles into touched tiles
    /// are invalidated. Returns the number of particles that changed tile.
    pub fn rehome_particles(&mut self, tiles: &[TileId]) -> usize {
        let map = self.map;
        let set = self.set_mut();
        let mut moved = 0;

        for &id in tiles {
            let coord = id.coord();
            let Some(tile) = set.live.get_mut(&id) else {
                continue;
            };
            let mut leaving = Vec::new();
            let mut i = 0;
            while i < tile.particles.len() {
                if map.tile_coord(tile.particles[i].position) == coord {
                    i += 1;
                } else {
                    leaving.push(tile.particles.swap_remove(i));
                }
            }
            if leaving.is_empty() {
                continue;
            }
            tile.dirty = true;

            let mut held = Vec::new();
            for particle in leaving {
                let dest = map.tile_id(particle.position);
                if !set.live.contains_key(&dest) {
                    set.revive(dest);
                }
                match set.live.get_mut(&dest) {
                    Some(target) => {
                        target.particles.push(particle);
                        target.dirty = true;
                        moved += 1;
                    }
                    None => held.push(map.hold_inside(coord, particle)),
                }
            }
            if let Some(tile) = set.live.get_mut(&id) {
                tile.particles.extend(held);
            }
        }
        moved
    }
}
