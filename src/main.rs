//! Headless granular terrain demo.
//!
//! Drives one four-wheeled vehicle across a procedural height map for a few
//! seconds, deforming and streaming terrain tiles as it goes, then persists
//! every deformed tile and exits.
//!
//! ```text
//! granular_terrain [config.json] [seconds]
//! ```

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::math::DVec3;
use bevy::prelude::*;
use std::time::Duration;
use terrain_core::{HeightMap, HeightMapParams, TerrainConfig};
use terrain_vehicle::{spawn_vehicle, PhysicsState, TerrainState, VehicleLayout, VehicleTerrainPlugin};

const DEFAULT_DURATION_SECS: f32 = 5.0;
const MAP_RESOLUTION: u32 = 256;
const MAP_SIZE: f64 = 200.0;

#[derive(Resource)]
struct DemoDuration(f32);

fn main() {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => match TerrainConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => TerrainConfig::default(),
    };
    let duration = args
        .next()
        .and_then(|s| s.parse::<f32>().ok())
        .unwrap_or(DEFAULT_DURATION_SECS);

    let heightmap = match rolling_hills() {
        Ok(heightmap) => heightmap,
        Err(e) => {
            eprintln!("Failed to build height map: {}", e);
            std::process::exit(1);
        }
    };

    App::new()
        .add_plugins(
            MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(
                1.0 / 60.0,
            ))),
        )
        .add_plugins(LogPlugin {
            filter: "wgpu=error,terrain_core=info,terrain_vehicle=info".into(),
            level: bevy::log::Level::INFO,
            ..default()
        })
        .add_plugins(VehicleTerrainPlugin { config, heightmap })
        .insert_resource(DemoDuration(duration))
        .add_systems(Startup, setup)
        .add_systems(Update, (report_progress, exit_after_duration))
        .run();
}

/// Smooth procedural hills, 0 to 1.5 m, centered on the origin.
fn rolling_hills() -> terrain_core::TerrainResult<HeightMap> {
    let n = MAP_RESOLUTION;
    let mut pixels = Vec::with_capacity((n * n) as usize);
    for y in 0..n {
        for x in 0..n {
            let u = x as f32 / (n - 1) as f32 * std::f32::consts::TAU * 4.0;
            let v = y as f32 / (n - 1) as f32 * std::f32::consts::TAU * 3.0;
            pixels.push(0.5 + 0.25 * u.sin() + 0.25 * v.cos());
        }
    }
    HeightMap::from_pixels(
        n,
        n,
        pixels,
        HeightMapParams {
            origin: DVec3::new(-MAP_SIZE / 2.0, -MAP_SIZE / 2.0, 0.0),
            size: DVec3::new(MAP_SIZE, MAP_SIZE, 0.0),
            min_height: 0.0,
            max_height: 1.5,
        },
    )
}

fn setup(
    mut commands: Commands,
    mut physics: ResMut<PhysicsState>,
    terrain: Res<TerrainState>,
    config: Res<TerrainConfig>,
) {
    let start = DVec3::new(0.0, 0.0, 0.0);
    let ground = terrain.map().get_height(start);
    let layout = VehicleLayout {
        position: DVec3::new(start.x, start.y, ground + config.tire_radius + 0.4),
        tire_radius: config.tire_radius as f32,
        initial_velocity: Vec3::new(3.0, 0.0, 0.0),
        ..default()
    };

    // Safety floor just below the particle layer.
    physics.add_ground_slab(start, ground - config.terrain_depth, 200.0);
    let vehicle = spawn_vehicle(&mut physics, &layout);
    info!("Spawned vehicle at {:?}", layout.position);
    commands.spawn(vehicle);
}

fn report_progress(time: Res<Time>, terrain: Res<TerrainState>, mut next_report: Local<f32>) {
    if time.elapsed_secs() < *next_report {
        return;
    }
    *next_report = time.elapsed_secs() + 1.0;
    let map = terrain.map();
    info!(
        "t = {:.1}s: {} live tiles, {} pending writes, region {:?}",
        time.elapsed_secs(),
        map.live_count(),
        map.pending_count(),
        map.region().map(|r| r.center)
    );
}

fn exit_after_duration(
    time: Res<Time>,
    duration: Res<DemoDuration>,
    mut exit: MessageWriter<AppExit>,
) {
    if time.elapsed_secs() >= duration.0 {
        exit.write(AppExit::Success);
    }
}
