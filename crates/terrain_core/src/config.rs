//! Terrain configuration, loadable from JSON.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```json
//! { "particle_diameter": 0.03, "force_mode": "mean_acceleration" }
//! ```

use bevy::math::DVec3;
use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{TerrainError, TerrainResult};
use crate::simulation::{SimulationSettings, WheelForceMode};
use crate::sparse_map::MapParams;
use crate::streaming::StreamingSettings;

/// All recognized terrain options.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    // Map
    /// Particle diameter in meters.
    pub particle_diameter: f64,
    /// Depth of the particle layer below the surface.
    pub terrain_depth: f64,
    /// Tile edge length in meters.
    pub tile_size: f64,
    /// World position of tile (0, 0).
    pub tile0_origin: [f64; 3],
    /// Directory for persisted tiles.
    pub save_path: PathBuf,

    // Wheel query box
    pub tire_radius: f64,
    pub tire_width: f64,
    pub box_forward_distance: f64,
    pub box_lateral_distance: f64,
    pub box_depth_distance: f64,

    // Forces
    /// Cap on any single force magnitude, in newtons.
    pub max_force_magnitude: f32,
    /// Scale applied to model forces.
    pub force_multiplier: f32,
    /// Mass used when integrating particles.
    pub particle_mass: f32,
    pub force_mode: WheelForceMode,
    /// Apply forces as impulses (force * dt) instead of continuous forces.
    pub use_impulse: bool,
    pub disable_vehicle_gravity: bool,
    /// Integrate particle motion. When off, forces still reach the vehicle.
    pub update_particles: bool,

    // Model
    /// Safetensors weights for the force model. None disables inference.
    pub neural_model_file: Option<PathBuf>,
    pub model_hidden_size: usize,
    pub model_verbose: bool,

    // Streaming
    pub load_radius_x: f64,
    pub load_radius_y: f64,
    /// Tiles are evicted only beyond load radius + margin.
    pub unload_margin: f64,
    pub poll_interval_ms: u64,

    // Debug
    pub draw_debug_info: bool,
    pub show_forces: bool,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            particle_diameter: 0.02,
            terrain_depth: 0.4,
            tile_size: 1.0,
            tile0_origin: [0.0; 3],
            save_path: PathBuf::from("terrain_tiles"),
            tire_radius: 0.33,
            tire_width: 0.21,
            box_forward_distance: 1.14,
            box_lateral_distance: 0.32,
            box_depth_distance: 0.20,
            max_force_magnitude: 1.0e6,
            force_multiplier: 1.0,
            particle_mass: 1.0,
            force_mode: WheelForceMode::PerWheel,
            use_impulse: false,
            disable_vehicle_gravity: false,
            update_particles: true,
            neural_model_file: None,
            model_hidden_size: 64,
            model_verbose: false,
            load_radius_x: 4.0,
            load_radius_y: 4.0,
            unload_margin: 2.0,
            poll_interval_ms: 50,
            draw_debug_info: false,
            show_forces: false,
        }
    }
}

impl TerrainConfig {
    /// Read and validate a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> TerrainResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| TerrainError::config_at(path, e))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| TerrainError::config_at(path, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Write as pretty-printed JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> TerrainResult<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Reject values the map or simulation cannot work with.
    pub fn validate(&self) -> TerrainResult<()> {
        let positive = [
            ("particle_diameter", self.particle_diameter),
            ("tile_size", self.tile_size),
            ("tire_radius", self.tire_radius),
            ("box_forward_distance", self.box_forward_distance),
            ("box_lateral_distance", self.box_lateral_distance),
            ("box_depth_distance", self.box_depth_distance),
            ("max_force_magnitude", self.max_force_magnitude as f64),
            ("particle_mass", self.particle_mass as f64),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(TerrainError::Config(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if !(self.terrain_depth.is_finite() && self.terrain_depth >= 0.0) {
            return Err(TerrainError::Config(format!(
                "terrain_depth must not be negative, got {}",
                self.terrain_depth
            )));
        }
        if self.particle_diameter > self.tile_size {
            return Err(TerrainError::Config(format!(
                "particle_diameter {} exceeds tile_size {}",
                self.particle_diameter, self.tile_size
            )));
        }
        if self.load_radius_x < 0.0 || self.load_radius_y < 0.0 || self.unload_margin < 0.0 {
            return Err(TerrainError::Config(
                "streaming radii and margin must not be negative".into(),
            ));
        }
        if self.model_hidden_size == 0 {
            return Err(TerrainError::Config("model_hidden_size must be positive".into()));
        }
        Ok(())
    }

    pub fn tile0(&self) -> DVec3 {
        DVec3::from_array(self.tile0_origin)
    }

    pub fn map_params(&self) -> MapParams {
        MapParams {
            particle_size: self.particle_diameter,
            terrain_depth: self.terrain_depth,
            tile_size: self.tile_size,
            tile0_position: self.tile0(),
            save_path: self.save_path.clone(),
        }
    }

    pub fn simulation_settings(&self) -> SimulationSettings {
        SimulationSettings {
            tire_radius: self.tire_radius,
            tire_width: self.tire_width,
            box_forward_distance: self.box_forward_distance,
            box_lateral_distance: self.box_lateral_distance,
            box_depth_distance: self.box_depth_distance,
            max_force_magnitude: self.max_force_magnitude,
            force_multiplier: self.force_multiplier,
            particle_mass: self.particle_mass,
            force_mode: self.force_mode,
            use_impulse: self.use_impulse,
            disable_vehicle_gravity: self.disable_vehicle_gravity,
            update_particles: self.update_particles,
            load_radius_x: self.load_radius_x,
            load_radius_y: self.load_radius_y,
            draw_debug_info: self.draw_debug_info,
            show_forces: self.show_forces,
            model_verbose: self.model_verbose,
        }
    }

    pub fn streaming_settings(&self) -> StreamingSettings {
        StreamingSettings {
            unload_margin: self.unload_margin,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}
