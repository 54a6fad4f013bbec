//! The simulation tick and the streaming worker sharing one map.

use bevy::math::{DVec3, Vec3};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use terrain_core::{
    tile_io, ForceModel, ForceModelInput, ForceModelOutput, HeightMap, KinematicVehicle,
    MapParams, SimulationSettings, SparseTerrainMap, StreamingSettings, StreamingWorker,
    TerrainResult, TerrainSimulation, TileId, WheelState,
};

/// Presses every queried particle straight down, so a tile's summed height
/// only ever decreases while it is deformed.
struct Press;

impl ForceModel for Press {
    fn predict(&self, input: &ForceModelInput) -> TerrainResult<ForceModelOutput> {
        Ok(ForceModelOutput {
            particle_forces: vec![Vec3::new(0.0, 0.0, -1.0); input.len()],
            wheel_force: None,
            wheel_torque: None,
        })
    }

    fn name(&self) -> &str {
        "press"
    }
}

fn height_sum(particles: &[terrain_core::Particle]) -> f64 {
    particles.iter().map(|p| p.position.z).sum()
}

#[test]
fn ticking_against_a_running_worker_loses_no_deformation() {
    let dir = TempDir::new().unwrap();
    let save_dir = dir.path().join("tiles");
    let map = Arc::new(SparseTerrainMap::new(
        MapParams {
            particle_size: 0.1,
            terrain_depth: 0.2,
            tile_size: 1.0,
            tile0_position: DVec3::ZERO,
            save_path: save_dir.clone(),
        },
        HeightMap::flat(DVec3::new(-50.0, -50.0, 0.0), DVec3::new(100.0, 100.0, 0.0), 1.0),
    ));

    let settings = SimulationSettings {
        box_forward_distance: 0.6,
        box_lateral_distance: 0.6,
        load_radius_x: 1.5,
        load_radius_y: 1.5,
        ..Default::default()
    };
    let mut sim = TerrainSimulation::new(Arc::clone(&map), Some(Arc::new(Press)), settings);
    let mut worker = StreamingWorker::start(
        Arc::clone(&map),
        StreamingSettings {
            unload_margin: 0.5,
            poll_interval: Duration::from_millis(1),
        },
    );

    let start = DVec3::new(0.5, 0.5, 1.33);
    let mut vehicle = KinematicVehicle::new(
        start + DVec3::new(0.0, 0.0, 0.5),
        500.0,
        vec![WheelState {
            position: start,
            ..Default::default()
        }],
    );

    // Lowest summed height seen for each tile a wheel pressed on.
    let mut observed: HashMap<TileId, f64> = HashMap::new();
    let mut contacts = 0;
    for step in 0..400 {
        // Sweep back and forth so tiles are evicted, written and revived
        // while the worker runs.
        let x = 0.5 + 6.0 * (step as f64 * 0.05).sin();
        let target = DVec3::new(x, 0.5, 1.33);
        vehicle.translate(target - vehicle.wheels[0].position);

        // Explicit prefetch from this thread races the worker's writes.
        map.load_tiles_at_position(target, 0.5, 0.5);
        let report = sim.tick(0.01, &mut [&mut vehicle]);
        if report.vehicles[0].wheels[0].particle_count > 0 {
            contacts += 1;
        }

        let guard = map.lock();
        let live: HashSet<TileId> = guard.live_tile_ids().into_iter().collect();
        for id in guard.pending_tile_ids() {
            assert!(!live.contains(&id), "tile {} is both live and pending", id);
        }
        let id = map.tile_id(target);
        if let Some(tile) = guard.tile(id) {
            if tile.dirty {
                let sum = height_sum(&tile.particles);
                let lowest = observed.entry(id).or_insert(sum);
                assert!(sum <= *lowest + 1e-9, "tile {} lost deformation in memory", id);
                *lowest = sum;
            }
        }
        drop(guard);
        std::thread::sleep(Duration::from_micros(500));
    }
    assert!(contacts > 100);
    assert!(observed.len() > 5);

    worker.stop();
    assert_eq!(map.pending_count(), 0);
    map.clear();
    assert_eq!(map.live_count(), 0);

    let persisted: HashSet<TileId> = tile_io::list_persisted(&save_dir).unwrap().into_iter().collect();
    for (id, lowest) in &observed {
        assert!(persisted.contains(id), "deformed tile {} never reached disk", id);
        let tile = tile_io::load_tile(&save_dir, *id).unwrap().unwrap();
        assert!(
            height_sum(&tile.particles) <= lowest + 1e-9,
            "tile {} on disk is older than its last deformation",
            id
        );
    }
}
