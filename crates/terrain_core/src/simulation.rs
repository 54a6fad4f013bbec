//! Per-tick wheel/terrain interaction.
//!
//! For every wheel of every vehicle:
//!
//! 1. build an oriented box under the wheel's contact patch,
//! 2. snapshot the live particles inside it (tile lock held),
//! 3. run the force model on the snapshot (no lock held),
//! 4. integrate the queried particles with explicit Euler (tile lock held),
//! 5. reduce the particle forces into a reaction force and torque.
//!
//! The reduced forces are then applied to the vehicle either per wheel or as
//! one mean acceleration, depending on [`WheelForceMode`]. Any failure along
//! the way costs that wheel its force for this tick and nothing else.

use bevy::log::{debug, warn};
use bevy::math::{DVec3, Vec3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::TerrainError;
use crate::geometry::OrientedBox;
use crate::inference::{ForceModel, ForceModelInput, ForceModelOutput};
use crate::sparse_map::{ParticleHandle, SparseTerrainMap};
use crate::tile_id::TileId;
use crate::vehicle::{ApplyMode, ForceAtLocation, WheelState, WheeledVehicle};

/// How reduced wheel forces reach the vehicle body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WheelForceMode {
    /// Each wheel's force at the wheel center plus its torque.
    #[default]
    PerWheel,
    /// The summed force at the center of mass, no torque.
    MeanAcceleration,
}

/// Tunables for [`TerrainSimulation`].
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    pub tire_radius: f64,
    pub tire_width: f64,
    /// Full query box extents along the wheel's forward, lateral and up axes.
    pub box_forward_distance: f64,
    pub box_lateral_distance: f64,
    pub box_depth_distance: f64,
    pub max_force_magnitude: f32,
    pub force_multiplier: f32,
    pub particle_mass: f32,
    pub force_mode: WheelForceMode,
    pub use_impulse: bool,
    pub disable_vehicle_gravity: bool,
    pub update_particles: bool,
    /// Region of interest published around the primary vehicle.
    pub load_radius_x: f64,
    pub load_radius_y: f64,
    pub draw_debug_info: bool,
    pub show_forces: bool,
    pub model_verbose: bool,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
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
            load_radius_x: 4.0,
            load_radius_y: 4.0,
            draw_debug_info: false,
            show_forces: false,
            model_verbose: false,
        }
    }
}

/// Terrain response at one wheel for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelContact {
    /// Wheel center the force is applied at.
    pub position: DVec3,
    /// Particles found in the query box.
    pub particle_count: usize,
    /// Reaction force on the wheel, clamped.
    pub force: Vec3,
    /// Reaction torque about the wheel center, clamped.
    pub torque: Vec3,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleReport {
    pub wheels: Vec<WheelContact>,
    /// Sum of wheel forces.
    pub net_force: Vec3,
    /// `net_force / mass`, zero for massless vehicles.
    pub mean_acceleration: Vec3,
}

/// Everything one tick did, in vehicle order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub vehicles: Vec<VehicleReport>,
}

/// Drives particle deformation and vehicle forces each tick.
pub struct TerrainSimulation {
    map: Arc<SparseTerrainMap>,
    model: Option<Arc<dyn ForceModel>>,
    settings: SimulationSettings,
    pending_forces: Vec<ForceAtLocation>,
    warned_unavailable: bool,
}

impl TerrainSimulation {
    pub fn new(
        map: Arc<SparseTerrainMap>,
        model: Option<Arc<dyn ForceModel>>,
        settings: SimulationSettings,
    ) -> Self {
        Self {
            map,
            model,
            settings,
            pending_forces: Vec::new(),
            warned_unavailable: false,
        }
    }

    pub fn map(&self) -> &Arc<SparseTerrainMap> {
        &self.map
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SimulationSettings {
        &mut self.settings
    }

    /// Swap the force model. `None` disables inference.
    pub fn set_model(&mut self, model: Option<Arc<dyn ForceModel>>) {
        self.model = model;
        self.warned_unavailable = false;
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Queue external forces for the primary vehicle. They are applied on
    /// the next tick, then discarded.
    pub fn add_forces(&mut self, forces: &[ForceAtLocation]) {
        self.pending_forces.extend_from_slice(forces);
    }

    pub fn pending_forces(&self) -> &[ForceAtLocation] {
        &self.pending_forces
    }

    /// Query box around the contact patch of `wheel`.
    pub fn query_box(&self, wheel: &WheelState) -> OrientedBox {
        let rotation = wheel.orientation.as_dquat();
        let s = &self.settings;
        let lateral = s.box_lateral_distance.max(s.tire_width);
        OrientedBox::new(
            wheel.position + rotation * DVec3::new(0.0, 0.0, -s.tire_radius),
            DVec3::new(s.box_forward_distance, lateral, s.box_depth_distance) * 0.5,
            rotation,
        )
    }

    /// Advance the terrain by `dt` seconds and push the reaction forces into
    /// `vehicles`. The first vehicle is the primary one: it receives queued
    /// external forces and anchors the streaming region.
    pub fn tick(&mut self, dt: f32, vehicles: &mut [&mut dyn WheeledVehicle]) -> TickReport {
        let mut report = TickReport::default();
        if !(dt.is_finite() && dt > 0.0) {
            return report;
        }
        let (mode, scale) = if self.settings.use_impulse {
            (ApplyMode::Impulse, dt)
        } else {
            (ApplyMode::Force, 1.0)
        };

        for (vehicle_index, vehicle) in vehicles.iter_mut().enumerate() {
            if self.settings.disable_vehicle_gravity {
                vehicle.set_gravity_enabled(false);
            }

            let mut wheels = Vec::with_capacity(vehicle.wheel_count());
            for wheel_index in 0..vehicle.wheel_count() {
                let Some(wheel) = vehicle.wheel(wheel_index) else {
                    continue;
                };
                let contact = self.step_wheel(&wheel, dt);
                if self.settings.show_forces {
                    debug!(
                        "Vehicle {} wheel {}: {} particles, force {:?}, torque {:?}",
                        vehicle_index, wheel_index, contact.particle_count, contact.force, contact.torque
                    );
                }
                wheels.push(contact);
            }

            report
                .vehicles
                .push(self.apply_wheel_forces(&mut **vehicle, wheels, mode, scale));
        }

        if let Some(primary) = vehicles.first_mut() {
            for external in self.pending_forces.drain(..) {
                primary.apply_force_at(external.force * scale, external.location, mode);
            }
            self.map.update(
                primary.position(),
                self.settings.load_radius_x,
                self.settings.load_radius_y,
            );
        }
        report
    }

    fn step_wheel(&mut self, wheel: &WheelState, dt: f32) -> WheelContact {
        let obb = self.query_box(wheel);
        if self.settings.draw_debug_info {
            debug!(
                "Wheel query box at {:?}, half extents {:?}",
                obb.center, obb.half_extents
            );
        }

        let mut contact = WheelContact {
            position: wheel.position,
            ..Default::default()
        };

        let (handles, input) = {
            let guard = self.map.lock();
            let mut handles: Vec<ParticleHandle> = Vec::new();
            let mut input = ForceModelInput::for_wheel(wheel);
            for handle in guard.particles_in_box(&obb) {
                if let Some(p) = guard.particle(handle) {
                    input.push_particle((p.position - wheel.position).as_vec3(), p.velocity);
                    handles.push(handle);
                }
            }
            (handles, input)
        };
        contact.particle_count = handles.len();
        if input.is_empty() {
            return contact;
        }

        let Some(output) = self.predict(&input) else {
            return contact;
        };
        let forces: Vec<Vec3> = output
            .particle_forces
            .iter()
            .map(|f| self.condition(*f))
            .collect();

        if self.settings.update_particles {
            self.integrate(&handles, &forces, dt);
        }

        let mut force = Vec3::ZERO;
        let mut torque = Vec3::ZERO;
        for (i, f) in forces.iter().enumerate() {
            force -= *f;
            torque += input.relative_position(i).cross(-*f);
        }
        if let Some(f) = output.wheel_force {
            force = self.condition(f);
        }
        if let Some(t) = output.wheel_torque {
            torque = self.condition(t);
        }

        let max = self.settings.max_force_magnitude;
        contact.force = force.clamp_length_max(max);
        contact.torque = torque.clamp_length_max(max);
        contact
    }

    /// Run the model, degrading every failure to `None`.
    fn predict(&mut self, input: &ForceModelInput) -> Option<ForceModelOutput> {
        let Some(model) = &self.model else {
            if !self.warned_unavailable {
                warn!("{}; terrain applies no force", TerrainError::InferenceUnavailable);
                self.warned_unavailable = true;
            }
            return None;
        };
        if self.settings.model_verbose {
            debug!("Running {} on {} particles", model.name(), input.len());
        }
        match model.predict(input) {
            Ok(output) if output.particle_forces.len() == input.len() => Some(output),
            Ok(output) => {
                warn!(
                    "Force model {} returned {} forces for {} particles",
                    model.name(),
                    output.particle_forces.len(),
                    input.len()
                );
                None
            }
            Err(e) => {
                warn!("Force model {} failed: {}", model.name(), e);
                None
            }
        }
    }

    /// Scale and clamp a model force. Non-finite forces become zero.
    fn condition(&self, force: Vec3) -> Vec3 {
        if !force.is_finite() {
            return Vec3::ZERO;
        }
        (force * self.settings.force_multiplier).clamp_length_max(self.settings.max_force_magnitude)
    }

    fn integrate(&self, handles: &[ParticleHandle], forces: &[Vec3], dt: f32) {
        let inv_mass = if self.settings.particle_mass > 0.0 {
            1.0 / self.settings.particle_mass
        } else {
            1.0
        };
        let mut guard = self.map.lock();
        let mut touched: Vec<TileId> = Vec::new();
        for (handle, force) in handles.iter().zip(forces) {
            // Resting particles under zero force stay clean.
            let at_rest = guard
                .particle(*handle)
                .is_some_and(|p| p.velocity == Vec3::ZERO);
            if at_rest && *force == Vec3::ZERO {
                continue;
            }
            // Tile evicted since the snapshot: skip.
            let Some(particle) = guard.particle_mut(*handle) else {
                continue;
            };
            particle.velocity += *force * inv_mass * dt;
            particle.position += (particle.velocity * dt).as_dvec3();
            if touched.last() != Some(&handle.tile) {
                touched.push(handle.tile);
            }
        }

        // Handles are spent; moving particles between tiles may reorder them.
        touched.sort();
        touched.dedup();
        let moved = guard.rehome_particles(&touched);
        if moved > 0 && self.settings.draw_debug_info {
            debug!("{} particles crossed into a neighbouring tile", moved);
        }
    }

    fn apply_wheel_forces(
        &self,
        vehicle: &mut dyn WheeledVehicle,
        wheels: Vec<WheelContact>,
        mode: ApplyMode,
        scale: f32,
    ) -> VehicleReport {
        let net_force: Vec3 = wheels.iter().map(|w| w.force).sum();
        let mass = vehicle.mass();
        let mean_acceleration = if mass > 0.0 {
            net_force / mass
        } else {
            Vec3::ZERO
        };

        match self.settings.force_mode {
            WheelForceMode::PerWheel => {
                for wheel in &wheels {
                    vehicle.apply_force_at(wheel.force * scale, wheel.position, mode);
                    vehicle.apply_torque(wheel.torque * scale, mode);
                }
            }
            WheelForceMode::MeanAcceleration => {
                if !wheels.is_empty() {
                    vehicle.apply_central_force(mean_acceleration * mass * scale, mode);
                }
            }
        }

        VehicleReport {
            wheels,
            net_force,
            mean_acceleration,
        }
    }
}
