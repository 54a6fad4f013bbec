//! Rapier-backed vehicles driving on the granular terrain.
//!
//! [`VehicleTerrainPlugin`] wires everything into a Bevy app:
//!
//! ```text
//! Startup : start the streaming worker
//! Update  : terrain tick -> commit forces -> physics step -> rebase origin
//! Last    : on AppExit, stop the worker and persist every deformed tile
//! ```

use bevy::prelude::*;
use std::sync::Arc;
use terrain_core::{
    load_force_model, HeightMap, SparseTerrainMap, StreamingWorker, TerrainConfig,
    TerrainSimulation, WheeledVehicle,
};

pub mod physics;
pub mod rapier_vehicle;

pub use physics::{PhysicsState, REBASE_DISTANCE};
pub use rapier_vehicle::{spawn_vehicle, RapierVehicle, TerrainVehicle, VehicleLayout, WheelAnchor};

/// Largest step handed to the simulation, in seconds.
const MAX_STEP: f32 = 1.0 / 30.0;

/// Terrain simulation plus its streaming worker.
#[derive(Resource)]
pub struct TerrainState {
    pub simulation: TerrainSimulation,
    worker: Option<StreamingWorker>,
}

impl TerrainState {
    pub fn map(&self) -> &Arc<SparseTerrainMap> {
        self.simulation.map()
    }

    pub fn is_streaming(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| w.is_running())
    }
}

pub struct VehicleTerrainPlugin {
    pub config: TerrainConfig,
    pub heightmap: HeightMap,
}

impl Plugin for VehicleTerrainPlugin {
    fn build(&self, app: &mut App) {
        let map = Arc::new(SparseTerrainMap::new(
            self.config.map_params(),
            self.heightmap.clone(),
        ));
        let model = load_force_model(
            self.config.neural_model_file.as_deref(),
            self.config.model_hidden_size,
        );
        let simulation = TerrainSimulation::new(map, model, self.config.simulation_settings());

        app.insert_resource(self.config.clone())
            .init_resource::<PhysicsState>()
            .insert_resource(TerrainState {
                simulation,
                worker: None,
            })
            .add_systems(Startup, start_streaming)
            .add_systems(
                Update,
                (apply_terrain_forces, step_physics, rebase_origin).chain(),
            )
            .add_systems(Last, shutdown_terrain);
    }
}

fn start_streaming(mut terrain: ResMut<TerrainState>, config: Res<TerrainConfig>) {
    let map = Arc::clone(terrain.map());
    terrain.worker = Some(StreamingWorker::start(map, config.streaming_settings()));
}

fn apply_terrain_forces(
    time: Res<Time>,
    mut physics: ResMut<PhysicsState>,
    mut terrain: ResMut<TerrainState>,
    vehicles: Query<&TerrainVehicle>,
) {
    let dt = time.delta_secs().min(MAX_STEP);
    let mut captured: Vec<RapierVehicle> = vehicles
        .iter()
        .filter_map(|v| RapierVehicle::capture(&physics, v))
        .collect();
    if captured.is_empty() {
        return;
    }

    {
        let mut refs: Vec<&mut dyn WheeledVehicle> = captured
            .iter_mut()
            .map(|v| v as &mut dyn WheeledVehicle)
            .collect();
        terrain.simulation.tick(dt, &mut refs);
    }

    for vehicle in captured {
        vehicle.commit(&mut physics);
    }
}

fn step_physics(time: Res<Time>, mut physics: ResMut<PhysicsState>) {
    let dt = time.delta_secs().min(MAX_STEP);
    if dt > 0.0 {
        physics.step(dt);
    }
}

/// Recenter the physics world on the first vehicle once it strays too far.
fn rebase_origin(mut physics: ResMut<PhysicsState>, vehicles: Query<&TerrainVehicle>) {
    let Some(vehicle) = vehicles.iter().next() else {
        return;
    };
    let Some(captured) = RapierVehicle::capture(&physics, vehicle) else {
        return;
    };
    let position = captured.position();
    if (position - physics.world_origin).length() > REBASE_DISTANCE {
        physics.rebase(position.floor());
    }
}

fn shutdown_terrain(mut exits: MessageReader<AppExit>, mut terrain: ResMut<TerrainState>) {
    if exits.read().next().is_none() {
        return;
    }
    if let Some(mut worker) = terrain.worker.take() {
        worker.stop();
    }
    let saved = terrain.map().clear();
    info!("Terrain shut down, {} tiles persisted", saved);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::DVec3;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_app(dir: &TempDir) -> App {
        let config = TerrainConfig {
            particle_diameter: 0.1,
            terrain_depth: 0.2,
            save_path: dir.path().join("tiles"),
            load_radius_x: 2.0,
            load_radius_y: 2.0,
            poll_interval_ms: 1,
            ..Default::default()
        };
        let heightmap =
            HeightMap::flat(DVec3::new(-50.0, -50.0, 0.0), DVec3::new(100.0, 100.0, 0.0), 0.0);

        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .add_plugins(VehicleTerrainPlugin { config, heightmap });
        app
    }

    #[test]
    fn test_plugin_streams_around_vehicle() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        let vehicle = {
            let mut physics = app.world_mut().resource_mut::<PhysicsState>();
            spawn_vehicle(
                &mut physics,
                &VehicleLayout {
                    position: DVec3::new(10.0, 10.0, 0.8),
                    ..Default::default()
                },
            )
        };
        app.world_mut().spawn(vehicle);

        for _ in 0..5 {
            app.update();
            std::thread::sleep(Duration::from_millis(5));
        }

        let terrain = app.world().resource::<TerrainState>();
        assert!(terrain.is_streaming());
        let region = terrain.map().region().expect("vehicle should publish a region");
        assert!((region.center.x - 10.0).abs() < 1.0);

        let mut live = 0;
        for _ in 0..200 {
            live = terrain.map().live_count();
            if live >= 25 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(live >= 25, "only {} tiles live", live);
    }

    #[test]
    fn test_exit_stops_worker() {
        let dir = TempDir::new().unwrap();
        let mut app = test_app(&dir);
        app.update();
        assert!(app.world().resource::<TerrainState>().is_streaming());

        app.world_mut().write_message(AppExit::Success);
        app.update();
        let terrain = app.world().resource::<TerrainState>();
        assert!(!terrain.is_streaming());
        assert_eq!(terrain.map().live_count(), 0);
    }
}
