//! Particle force prediction.
//!
//! The simulation hands a wheel's particle neighborhood to a [`ForceModel`]
//! and gets one force per particle back. Two implementations ship here:
//! [`ZeroForceModel`] for hosts without a trained model, and
//! [`CandleForceModel`], a small MLP evaluated with Candle on the CPU.
//!
//! Per-particle features fed to the MLP, in order:
//!
//! | offset | size | feature                                   |
//! |--------|------|-------------------------------------------|
//! | 0      | 3    | particle position relative to wheel center |
//! | 3      | 3    | particle velocity                          |
//! | 6      | 4    | wheel orientation quaternion (x, y, z, w)  |
//! | 10     | 3    | wheel linear velocity                      |
//! | 13     | 3    | wheel angular velocity                     |

use bevy::log::{info, warn};
use bevy::math::{Quat, Vec3};
use candle_core::{DType, Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder};
use std::path::Path;
use std::sync::Arc;

use crate::error::{TerrainError, TerrainResult};
use crate::vehicle::WheelState;

/// Number of per-particle input features.
pub const FEATURE_COUNT: usize = 16;

/// Flattened model input for one wheel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForceModelInput {
    /// `[x0, y0, z0, x1, ...]`, relative to the wheel center.
    pub particle_positions: Vec<f32>,
    /// `[vx0, vy0, vz0, vx1, ...]`.
    pub particle_velocities: Vec<f32>,
    pub wheel_orientation: Quat,
    pub wheel_linear_velocity: Vec3,
    pub wheel_angular_velocity: Vec3,
}

impl ForceModelInput {
    /// Empty input carrying the kinematics of `wheel`.
    pub fn for_wheel(wheel: &WheelState) -> Self {
        Self {
            particle_positions: Vec::new(),
            particle_velocities: Vec::new(),
            wheel_orientation: wheel.orientation,
            wheel_linear_velocity: wheel.linear_velocity,
            wheel_angular_velocity: wheel.angular_velocity,
        }
    }

    pub fn push_particle(&mut self, relative_position: Vec3, velocity: Vec3) {
        self.particle_positions.extend_from_slice(&relative_position.to_array());
        self.particle_velocities.extend_from_slice(&velocity.to_array());
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.particle_positions.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.particle_positions.is_empty()
    }

    pub fn relative_position(&self, index: usize) -> Vec3 {
        Vec3::from_slice(&self.particle_positions[index * 3..index * 3 + 3])
    }

    /// Row-major `len() x FEATURE_COUNT` feature matrix.
    pub fn features(&self) -> Vec<f32> {
        let wheel: [f32; 10] = {
            let q = self.wheel_orientation.to_array();
            let v = self.wheel_linear_velocity.to_array();
            let w = self.wheel_angular_velocity.to_array();
            [q[0], q[1], q[2], q[3], v[0], v[1], v[2], w[0], w[1], w[2]]
        };
        let mut out = Vec::with_capacity(self.len() * FEATURE_COUNT);
        for i in 0..self.len() {
            out.extend_from_slice(&self.particle_positions[i * 3..i * 3 + 3]);
            out.extend_from_slice(&self.particle_velocities[i * 3..i * 3 + 3]);
            out.extend_from_slice(&wheel);
        }
        out
    }
}

/// Model output for one wheel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForceModelOutput {
    /// One force per input particle, in input order.
    pub particle_forces: Vec<Vec3>,
    /// Wheel-level force, when the model predicts it directly.
    pub wheel_force: Option<Vec3>,
    /// Wheel-level torque, when the model predicts it directly.
    pub wheel_torque: Option<Vec3>,
}

impl ForceModelOutput {
    pub fn zeros(count: usize) -> Self {
        Self {
            particle_forces: vec![Vec3::ZERO; count],
            wheel_force: None,
            wheel_torque: None,
        }
    }
}

/// Predicts terrain forces for a wheel's particle neighborhood.
pub trait ForceModel: Send + Sync {
    fn predict(&self, input: &ForceModelInput) -> TerrainResult<ForceModelOutput>;

    /// Human readable name for logs.
    fn name(&self) -> &str;
}

/// Always predicts zero force.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroForceModel;

impl ForceModel for ZeroForceModel {
    fn predict(&self, input: &ForceModelInput) -> TerrainResult<ForceModelOutput> {
        Ok(ForceModelOutput::zeros(input.len()))
    }

    fn name(&self) -> &str {
        "zero"
    }
}

/// Three-layer MLP (`16 -> hidden -> hidden -> 3`, ReLU between layers).
///
/// Weights are read from a safetensors file with tensors named
/// `fc1.weight`, `fc1.bias`, `fc2.*` and `fc3.*`.
pub struct CandleForceModel {
    fc1: Linear,
    fc2: Linear,
    fc3: Linear,
    device: Device,
}

impl CandleForceModel {
    /// Build from an existing variable store.
    pub fn new(vb: VarBuilder, hidden_size: usize, device: Device) -> TerrainResult<Self> {
        let build = || -> candle_core::Result<Self> {
            Ok(Self {
                fc1: candle_nn::linear(FEATURE_COUNT, hidden_size, vb.pp("fc1"))?,
                fc2: candle_nn::linear(hidden_size, hidden_size, vb.pp("fc2"))?,
                fc3: candle_nn::linear(hidden_size, 3, vb.pp("fc3"))?,
                device: device.clone(),
            })
        };
        build().map_err(|e| TerrainError::ModelLoad(format!("Failed to build model: {}", e)))
    }

    /// Load weights from a safetensors file on the CPU.
    pub fn load<P: AsRef<Path>>(weights_path: P, hidden_size: usize) -> TerrainResult<Self> {
        let path = weights_path.as_ref();
        if !path.exists() {
            return Err(TerrainError::ModelLoad(format!(
                "weights file not found: {}",
                path.display()
            )));
        }
        let device = Device::Cpu;
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[path], DType::F32, &device).map_err(|e| {
                TerrainError::ModelLoad(format!("Failed to load weights: {}", e))
            })?
        };
        Self::new(vb, hidden_size, device)
    }

    fn forward(&self, features: Tensor) -> candle_core::Result<Tensor> {
        let x = self.fc1.forward(&features)?.relu()?;
        let x = self.fc2.forward(&x)?.relu()?;
        self.fc3.forward(&x)
    }
}

impl ForceModel for CandleForceModel {
    fn predict(&self, input: &ForceModelInput) -> TerrainResult<ForceModelOutput> {
        let count = input.len();
        if count == 0 {
            return Ok(ForceModelOutput::zeros(0));
        }
        let features = Tensor::from_vec(input.features(), (count, FEATURE_COUNT), &self.device)?;
        let rows = self.forward(features)?.to_vec2::<f32>()?;
        if rows.len() != count {
            return Err(TerrainError::Inference(format!(
                "expected {} force rows, got {}",
                count,
                rows.len()
            )));
        }
        let particle_forces = rows
            .iter()
            .map(|row| match row.as_slice() {
                [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
                _ => Err(TerrainError::Inference(format!(
                    "expected 3 force components, got {}",
                    row.len()
                ))),
            })
            .collect::<TerrainResult<Vec<_>>>()?;
        Ok(ForceModelOutput {
            particle_forces,
            wheel_force: None,
            wheel_torque: None,
        })
    }

    fn name(&self) -> &str {
        "candle-mlp"
    }
}

/// Load the configured model, or `None` when no file is configured or it
/// fails to load. The simulation treats `None` as "inference unavailable".
pub fn load_force_model(model_file: Option<&Path>, hidden_size: usize) -> Option<Arc<dyn ForceModel>> {
    let path = model_file?;
    match CandleForceModel::load(path, hidden_size) {
        Ok(model) => {
            info!("Loaded force model from {}", path.display());
            Some(Arc::new(model))
        }
        Err(e) => {
            warn!("Force model unavailable: {}", e);
            None
        }
    }
}
