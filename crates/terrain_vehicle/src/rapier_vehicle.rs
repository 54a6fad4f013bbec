//! [`WheeledVehicle`] over a rapier chassis body.
//!
//! The terrain tick may touch several vehicles at once, while rapier only
//! lends one body mutably at a time. So a [`RapierVehicle`] is captured from
//! the body set before the tick, records every force the terrain applies,
//! and writes them back in one go with [`RapierVehicle::commit`].

use bevy::log::warn;
use bevy::math::{DVec3, Quat, Vec3};
use bevy::prelude::Component;
use rapier3d::prelude as rapier;
use rapier::nalgebra::{Point3, Vector3};
use terrain_core::{ApplyMode, WheelState, WheeledVehicle};

use crate::physics::{to_quat, to_vec3, to_vector, PhysicsState};

/// A wheel mount on the chassis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelAnchor {
    /// Wheel center in the chassis frame.
    pub local_position: Vec3,
    /// Steering angle about the chassis Z axis.
    pub steer: f32,
    /// Rolling radius used to derive spin from ground speed.
    pub tire_radius: f32,
}

/// Links a Bevy entity to a rapier chassis and its wheels.
#[derive(Component, Debug, Clone)]
pub struct TerrainVehicle {
    pub body: rapier::RigidBodyHandle,
    pub anchors: Vec<WheelAnchor>,
}

#[derive(Debug, Clone, Copy)]
enum BodyCommand {
    ForceAt(Vec3, Vec3),
    ImpulseAt(Vec3, Vec3),
    Torque(Vec3),
    TorqueImpulse(Vec3),
    Force(Vec3),
    Impulse(Vec3),
    Gravity(bool),
}

/// Snapshot of a chassis plus the forces queued against it.
#[derive(Debug, Clone)]
pub struct RapierVehicle {
    handle: rapier::RigidBodyHandle,
    anchors: Vec<WheelAnchor>,
    world_origin: DVec3,
    translation: Vec3,
    rotation: Quat,
    center_of_mass: Vec3,
    linvel: Vec3,
    angvel: Vec3,
    mass: f32,
    commands: Vec<BodyCommand>,
}

impl RapierVehicle {
    /// Capture the current state of `vehicle`'s body, or `None` if the body
    /// no longer exists.
    pub fn capture(physics: &PhysicsState, vehicle: &TerrainVehicle) -> Option<Self> {
        let body = physics.rigid_body_set.get(vehicle.body)?;
        let com = body.center_of_mass();
        Some(Self {
            handle: vehicle.body,
            anchors: vehicle.anchors.clone(),
            world_origin: physics.world_origin,
            translation: to_vec3(body.translation()),
            rotation: to_quat(body.rotation()),
            center_of_mass: Vec3::new(com.x, com.y, com.z),
            linvel: to_vec3(body.linvel()),
            angvel: to_vec3(body.angvel()),
            mass: body.mass(),
            commands: Vec::new(),
        })
    }

    fn to_local(&self, world: DVec3) -> Vec3 {
        (world - self.world_origin).as_vec3()
    }

    fn velocity_at(&self, local_point: Vec3) -> Vec3 {
        self.linvel + self.angvel.cross(local_point - self.center_of_mass)
    }

    /// Number of queued body commands.
    pub fn queued(&self) -> usize {
        self.commands.len()
    }

    /// Replace the body's accumulated user forces with the queued ones.
    pub fn commit(self, physics: &mut PhysicsState) {
        let Some(body) = physics.rigid_body_set.get_mut(self.handle) else {
            warn!("Vehicle body {:?} vanished before terrain forces were applied", self.handle);
            return;
        };
        body.reset_forces(false);
        body.reset_torques(false);
        let point = |p: Vec3| Point3::new(p.x, p.y, p.z);
        for command in self.commands {
            match command {
                BodyCommand::ForceAt(f, p) => body.add_force_at_point(to_vector(f), point(p), true),
                BodyCommand::ImpulseAt(j, p) => {
                    body.apply_impulse_at_point(to_vector(j), point(p), true)
                }
                BodyCommand::Torque(t) => body.add_torque(to_vector(t), true),
                BodyCommand::TorqueImpulse(t) => body.apply_torque_impulse(to_vector(t), true),
                BodyCommand::Force(f) => body.add_force(to_vector(f), true),
                BodyCommand::Impulse(j) => body.apply_impulse(to_vector(j), true),
                BodyCommand::Gravity(enabled) => {
                    body.set_gravity_scale(if enabled { 1.0 } else { 0.0 }, true)
                }
            }
        }
    }
}

impl WheeledVehicle for RapierVehicle {
    fn wheel_count(&self) -> usize {
        self.anchors.len()
    }

    fn wheel(&self, index: usize) -> Option<WheelState> {
        let anchor = self.anchors.get(index)?;
        let local = self.translation + self.rotation * anchor.local_position;
        let orientation = self.rotation * Quat::from_rotation_z(anchor.steer);
        let linear_velocity = self.velocity_at(local);

        // Free rolling: spin about the wheel's Y axis matches ground speed.
        let forward = orientation * Vec3::X;
        let spin = if anchor.tire_radius > 0.0 {
            linear_velocity.dot(forward) / anchor.tire_radius
        } else {
            0.0
        };

        Some(WheelState {
            position: self.world_origin + local.as_dvec3(),
            orientation,
            linear_velocity,
            angular_velocity: self.angvel + orientation * Vec3::new(0.0, spin, 0.0),
        })
    }

    fn position(&self) -> DVec3 {
        self.world_origin + self.center_of_mass.as_dvec3()
    }

    fn mass(&self) -> f32 {
        self.mass
    }

    fn apply_force_at(&mut self, force: Vec3, location: DVec3, mode: ApplyMode) {
        let point = self.to_local(location);
        self.commands.push(match mode {
            ApplyMode::Force => BodyCommand::ForceAt(force, point),
            ApplyMode::Impulse => BodyCommand::ImpulseAt(force, point),
        });
    }

    fn apply_torque(&mut self, torque: Vec3, mode: ApplyMode) {
        self.commands.push(match mode {
            ApplyMode::Force => BodyCommand::Torque(torque),
            ApplyMode::Impulse => BodyCommand::TorqueImpulse(torque),
        });
    }

    fn apply_central_force(&mut self, force: Vec3, mode: ApplyMode) {
        self.commands.push(match mode {
            ApplyMode::Force => BodyCommand::Force(force),
            ApplyMode::Impulse => BodyCommand::Impulse(force),
        });
    }

    fn set_gravity_enabled(&mut self, enabled: bool) {
        self.commands.push(BodyCommand::Gravity(enabled));
    }
}

/// Chassis and wheel layout for [`spawn_vehicle`].
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleLayout {
    /// World position of the chassis center.
    pub position: DVec3,
    pub half_extents: Vec3,
    pub mass: f32,
    /// Wheel offsets from the chassis center along X.
    pub half_wheelbase: f32,
    /// Wheel offsets from the chassis center along Y.
    pub half_track: f32,
    /// How far below the chassis center the wheel centers sit.
    pub wheel_drop: f32,
    pub tire_radius: f32,
    pub initial_velocity: Vec3,
}

impl Default for VehicleLayout {
    fn default() -> Self {
        Self {
            position: DVec3::new(0.0, 0.0, 1.0),
            half_extents: Vec3::new(1.8, 0.8, 0.4),
            mass: 1200.0,
            half_wheelbase: 1.4,
            half_track: 0.8,
            wheel_drop: 0.4,
            tire_radius: 0.33,
            initial_velocity: Vec3::ZERO,
        }
    }
}

/// Insert a four-wheeled chassis into the physics world.
pub fn spawn_vehicle(physics: &mut PhysicsState, layout: &VehicleLayout) -> TerrainVehicle {
    let local = physics.to_local(layout.position);
    let body = rapier::RigidBodyBuilder::dynamic()
        .translation(Vector3::new(local.x, local.y, local.z))
        .linvel(to_vector(layout.initial_velocity))
        .can_sleep(false);
    let handle = physics.rigid_body_set.insert(body);

    let he = layout.half_extents;
    let volume = 8.0 * he.x * he.y * he.z;
    let collider = rapier::ColliderBuilder::cuboid(he.x, he.y, he.z)
        .density(if volume > 0.0 { layout.mass / volume } else { 1.0 });
    physics
        .collider_set
        .insert_with_parent(collider, handle, &mut physics.rigid_body_set);

    let anchors = [(1.0, 1.0), (1.0, -1.0), (-1.0, 1.0), (-1.0, -1.0)]
        .iter()
        .map(|&(fx, fy)| WheelAnchor {
            local_position: Vec3::new(
                fx * layout.half_wheelbase,
                fy * layout.half_track,
                -layout.wheel_drop,
            ),
            steer: 0.0,
            tire_radius: layout.tire_radius,
        })
        .collect();

    TerrainVehicle {
        body: handle,
        anchors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Spawn, then take one gravity-free step so rapier settles the mass
    /// properties without moving the body vertically.
    fn spawn(physics: &mut PhysicsState, velocity: Vec3) -> TerrainVehicle {
        let vehicle = spawn_vehicle(
            physics,
            &VehicleLayout {
                position: physics.world_origin + DVec3::new(0.0, 0.0, 5.0),
                initial_velocity: velocity,
                ..Default::default()
            },
        );
        let gravity = physics.gravity;
        physics.gravity = Vector3::zeros();
        physics.step(1.0 / 60.0);
        physics.gravity = gravity;
        vehicle
    }

    #[test]
    fn test_wheels_are_placed_in_world_space() {
        let mut physics = PhysicsState::with_origin(DVec3::new(5.0e5, -2.0e5, 0.0));
        let vehicle = spawn(&mut physics, Vec3::ZERO);
        let captured = RapierVehicle::capture(&physics, &vehicle).unwrap();

        assert_eq!(captured.wheel_count(), 4);
        assert!((captured.mass() - 1200.0).abs() < 1.0);
        let front_right = captured.wheel(1).unwrap();
        let expected = DVec3::new(5.0e5 + 1.4, -2.0e5 - 0.8, 4.6);
        assert!((front_right.position - expected).length() < 1e-4);
        assert!(captured.wheel(4).is_none());
    }

    #[test]
    fn test_rolling_spin_follows_ground_speed() {
        let mut physics = PhysicsState::new();
        let vehicle = spawn(&mut physics, Vec3::new(3.3, 0.0, 0.0));
        let captured = RapierVehicle::capture(&physics, &vehicle).unwrap();
        let wheel = captured.wheel(0).unwrap();
        assert!((wheel.linear_velocity - Vec3::new(3.3, 0.0, 0.0)).length() < 1e-5);
        assert!((wheel.angular_velocity - Vec3::new(0.0, 10.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn test_committed_force_moves_body() {
        let mut physics = PhysicsState::new();
        let vehicle = spawn(&mut physics, Vec3::ZERO);

        let mut captured = RapierVehicle::capture(&physics, &vehicle).unwrap();
        captured.set_gravity_enabled(false);
        let center = captured.position();
        captured.apply_force_at(Vec3::new(12000.0, 0.0, 0.0), center, ApplyMode::Force);
        assert_eq!(captured.queued(), 2);
        captured.commit(&mut physics);

        for _ in 0..10 {
            physics.step(1.0 / 60.0);
        }
        let body = &physics.rigid_body_set[vehicle.body];
        assert!(body.linvel().x > 0.5);
        assert!(body.linvel().z.abs() < 1e-3, "gravity should be off");
    }

    #[test]
    fn test_impulse_applies_once() {
        let mut physics = PhysicsState::new();
        let vehicle = spawn(&mut physics, Vec3::ZERO);

        let mut captured = RapierVehicle::capture(&physics, &vehicle).unwrap();
        captured.set_gravity_enabled(false);
        captured.apply_central_force(Vec3::new(0.0, 1200.0, 0.0), ApplyMode::Impulse);
        captured.commit(&mut physics);
        physics.step(1.0 / 60.0);
        let after_first = physics.rigid_body_set[vehicle.body].linvel().y;
        physics.step(1.0 / 60.0);
        let after_second = physics.rigid_body_set[vehicle.body].linvel().y;

        assert!((after_first - 1.0).abs() < 0.05);
        assert!((after_second - after_first).abs() < 1e-4);
    }
}
