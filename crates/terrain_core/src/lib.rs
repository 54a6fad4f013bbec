//! Core of the granular terrain simulation.
//!
//! This crate provides:
//! - Particles and dense particle tiles generated from a height map
//! - A sparse, tile-indexed particle map over an unbounded world
//! - Text persistence for tiles
//! - A background streaming worker that keeps tiles warm around a vehicle
//! - Force models (Candle MLP or zero) and the per-tick wheel simulation
//! - JSON configuration

pub mod config;
pub mod error;
pub mod geometry;
pub mod heightmap;
pub mod inference;
pub mod particle;
pub mod simulation;
pub mod sparse_map;
pub mod streaming;
pub mod tile;
pub mod tile_id;
pub mod tile_io;
pub mod vehicle;

pub use config::TerrainConfig;
pub use error::{TerrainError, TerrainResult};
pub use geometry::OrientedBox;
pub use heightmap::{HeightMap, HeightMapParams};
pub use inference::{
    load_force_model, CandleForceModel, ForceModel, ForceModelInput, ForceModelOutput,
    ZeroForceModel, FEATURE_COUNT,
};
pub use particle::{Particle, DEFAULT_PARTICLE_RADIUS};
pub use simulation::{
    SimulationSettings, TerrainSimulation, TickReport, VehicleReport, WheelContact,
    WheelForceMode,
};
pub use sparse_map::{
    MapParams, ParticleHandle, RegionOfInterest, SparseTerrainMap, TerrainGuard,
};
pub use streaming::{run_pass, PassSummary, StreamingSettings, StreamingWorker};
pub use tile::Tile;
pub use tile_id::{TileCoord, TileId};
pub use vehicle::{ApplyMode, ForceAtLocation, KinematicVehicle, WheelState, WheeledVehicle};
