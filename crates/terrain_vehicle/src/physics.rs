//! Rapier world with a movable origin.
//!
//! Rapier works in f32, the terrain in f64 world coordinates. Every rapier
//! position is relative to `world_origin`; [`PhysicsState::rebase`] moves
//! the origin (and shifts all bodies back) when the action drifts too far
//! from it.

use bevy::log::info;
use bevy::math::{DVec3, Vec3};
use bevy::prelude::Resource;
use rapier3d::prelude as rapier;
use rapier::nalgebra::{Point3, Quaternion, UnitQuaternion, Vector3};

/// Distance from the origin at which the host recenters the physics world.
pub const REBASE_DISTANCE: f64 = 1000.0;

#[derive(Resource)]
pub struct PhysicsState {
    pub gravity: Vector3<f32>,
    pub integration_parameters: rapier::IntegrationParameters,
    pub physics_pipeline: rapier::PhysicsPipeline,
    pub island_manager: rapier::IslandManager,
    pub broad_phase: rapier::DefaultBroadPhase,
    pub narrow_phase: rapier::NarrowPhase,
    pub rigid_body_set: rapier::RigidBodySet,
    pub collider_set: rapier::ColliderSet,
    pub impulse_joint_set: rapier::ImpulseJointSet,
    pub multibody_joint_set: rapier::MultibodyJointSet,
    pub ccd_solver: rapier::CCDSolver,
    /// World position of rapier's (0, 0, 0).
    pub world_origin: DVec3,
}

impl PhysicsState {
    pub fn new() -> Self {
        Self::with_origin(DVec3::ZERO)
    }

    pub fn with_origin(world_origin: DVec3) -> Self {
        Self {
            // Z up.
            gravity: Vector3::new(0.0, 0.0, -9.81),
            integration_parameters: rapier::IntegrationParameters::default(),
            physics_pipeline: rapier::PhysicsPipeline::new(),
            island_manager: rapier::IslandManager::new(),
            broad_phase: rapier::DefaultBroadPhase::new(),
            narrow_phase: rapier::NarrowPhase::new(),
            rigid_body_set: rapier::RigidBodySet::new(),
            collider_set: rapier::ColliderSet::new(),
            impulse_joint_set: rapier::ImpulseJointSet::new(),
            multibody_joint_set: rapier::MultibodyJointSet::new(),
            ccd_solver: rapier::CCDSolver::new(),
            world_origin,
        }
    }

    /// Advance the simulation by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
    }

    /// World position to rapier's local frame.
    pub fn to_local(&self, world: DVec3) -> Point3<f32> {
        let local = (world - self.world_origin).as_vec3();
        Point3::new(local.x, local.y, local.z)
    }

    /// Rapier local point to world position.
    pub fn to_world(&self, local: &Point3<f32>) -> DVec3 {
        self.world_origin + DVec3::new(local.x as f64, local.y as f64, local.z as f64)
    }

    /// A fixed slab whose top face sits at world height `top_z`, centered
    /// under `center`.
    pub fn add_ground_slab(&mut self, center: DVec3, top_z: f64, half_extent: f32) -> rapier::RigidBodyHandle {
        let thickness = 0.5;
        let anchor = self.to_local(DVec3::new(center.x, center.y, top_z - thickness as f64));
        let body = rapier::RigidBodyBuilder::fixed()
            .translation(Vector3::new(anchor.x, anchor.y, anchor.z));
        let handle = self.rigid_body_set.insert(body);
        let collider = rapier::ColliderBuilder::cuboid(half_extent, half_extent, thickness);
        self.collider_set
            .insert_with_parent(collider, handle, &mut self.rigid_body_set);
        handle
    }

    /// Move the world origin to `new_origin`, shifting every body so world
    /// positions are unchanged.
    pub fn rebase(&mut self, new_origin: DVec3) {
        let shift = (new_origin - self.world_origin).as_vec3();
        if shift == Vec3::ZERO {
            return;
        }
        let shift = to_vector(shift);
        for (_, body) in self.rigid_body_set.iter_mut() {
            let translation = *body.translation() - shift;
            body.set_translation(translation, false);
        }
        info!(
            "Physics origin moved from {:?} to {:?}",
            self.world_origin, new_origin
        );
        self.world_origin = new_origin;
    }
}

impl Default for PhysicsState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn to_vec3(v: &Vector3<f32>) -> Vec3 {
    Vec3::new(v.x, v.y, v.z)
}

pub fn to_vector(v: Vec3) -> Vector3<f32> {
    Vector3::new(v.x, v.y, v.z)
}

pub fn to_quat(rot: &UnitQuaternion<f32>) -> bevy::math::Quat {
    bevy::math::Quat::from_xyzw(rot.i, rot.j, rot.k, rot.w)
}

pub fn to_rotation(q: bevy::math::Quat) -> UnitQuaternion<f32> {
    UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_falls_along_negative_z() {
        let mut physics = PhysicsState::new();
        let handle = physics
            .rigid_body_set
            .insert(rapier::RigidBodyBuilder::dynamic().translation(Vector3::new(0.0, 0.0, 10.0)));
        for _ in 0..30 {
            physics.step(1.0 / 60.0);
        }
        let body = &physics.rigid_body_set[handle];
        assert!(body.translation().z < 10.0);
        assert!(body.linvel().z < 0.0);
        assert!(body.translation().x.abs() < 1e-6);
    }

    #[test]
    fn test_ground_slab_stops_fall() {
        let mut physics = PhysicsState::new();
        physics.add_ground_slab(DVec3::ZERO, 2.0, 10.0);
        let handle = physics
            .rigid_body_set
            .insert(rapier::RigidBodyBuilder::dynamic().translation(Vector3::new(0.0, 0.0, 3.0)));
        physics.collider_set.insert_with_parent(
            rapier::ColliderBuilder::ball(0.5),
            handle,
            &mut physics.rigid_body_set,
        );
        for _ in 0..240 {
            physics.step(1.0 / 60.0);
        }
        let z = physics.rigid_body_set[handle].translation().z;
        assert!((z - 2.5).abs() < 0.1, "ball rests at {}", z);
    }

    #[test]
    fn test_rebase_keeps_world_positions() {
        let mut physics = PhysicsState::with_origin(DVec3::new(1.0e6, 0.0, 0.0));
        let handle = physics
            .rigid_body_set
            .insert(rapier::RigidBodyBuilder::dynamic().translation(Vector3::new(900.0, 5.0, 1.0)));
        let before = physics.to_world(&Point3::from(*physics.rigid_body_set[handle].translation()));

        physics.rebase(DVec3::new(1.0e6 + 900.0, 0.0, 0.0));
        let body = &physics.rigid_body_set[handle];
        assert!(body.translation().x.abs() < 1e-3);
        let after = physics.to_world(&Point3::from(*body.translation()));
        assert!((after - before).length() < 1e-3);
        assert_eq!(before, DVec3::new(1.0e6 + 900.0, 5.0, 1.0));
    }

    #[test]
    fn test_quat_conversion() {
        let q = bevy::math::Quat::from_rotation_z(0.7);
        let back = to_quat(&to_rotation(q));
        assert!(back.angle_between(q) < 1e-5);
    }
}
