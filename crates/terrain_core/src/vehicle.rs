//! Contract between the terrain simulation and whatever moves the vehicle.
//!
//! The simulation never owns a vehicle. Each tick it reads wheel kinematics
//! through [`WheeledVehicle`] and writes the reduced terrain forces back.

use bevy::math::{DVec3, Quat, Vec3};

/// Kinematic state of one wheel, in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelState {
    /// Wheel center.
    pub position: DVec3,
    /// Steering frame of the wheel (chassis rotation plus steer angle),
    /// excluding rolling spin. X is the rolling direction, Z is up.
    pub orientation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
}

impl Default for WheelState {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            orientation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
        }
    }
}

/// How a force is handed to the rigid body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApplyMode {
    /// Continuous force, integrated by the physics step.
    #[default]
    Force,
    /// Instantaneous impulse (already multiplied by the tick duration).
    Impulse,
}

/// An external force applied at a world location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceAtLocation {
    pub force: Vec3,
    pub location: DVec3,
}

impl ForceAtLocation {
    pub fn new(force: Vec3, location: DVec3) -> Self {
        Self { force, location }
    }
}

/// A rigid body with wheels that the terrain pushes on.
pub trait WheeledVehicle {
    fn wheel_count(&self) -> usize;

    /// State of wheel `index`, or `None` if out of range.
    fn wheel(&self, index: usize) -> Option<WheelState>;

    /// Center of mass in world space.
    fn position(&self) -> DVec3;

    fn mass(&self) -> f32;

    fn apply_force_at(&mut self, force: Vec3, location: DVec3, mode: ApplyMode);

    fn apply_torque(&mut self, torque: Vec3, mode: ApplyMode);

    fn apply_central_force(&mut self, force: Vec3, mode: ApplyMode);

    fn set_gravity_enabled(&mut self, enabled: bool);
}

/// A vehicle whose wheels follow a scripted pose. Applied forces are only
/// accumulated, never integrated, so it can stand in for a physics body when
/// replaying recorded runs or probing the terrain response.
#[derive(Debug, Clone, Default)]
pub struct KinematicVehicle {
    pub wheels: Vec<WheelState>,
    pub center: DVec3,
    pub mass: f32,
    pub gravity_enabled: bool,
    /// Net force applied since the last [`KinematicVehicle::take_applied`].
    pub applied_force: Vec3,
    /// Net torque about the center applied since the last take.
    pub applied_torque: Vec3,
    /// Net impulse applied since the last take.
    pub applied_impulse: Vec3,
    /// Net angular impulse about the center applied since the last take.
    pub applied_angular_impulse: Vec3,
}

impl KinematicVehicle {
    pub fn new(center: DVec3, mass: f32, wheels: Vec<WheelState>) -> Self {
        Self {
            wheels,
            center,
            mass,
            gravity_enabled: true,
            ..Default::default()
        }
    }

    /// Four wheels at `(±half_length, ±half_track)` around `center`, all
    /// sharing the same orientation, resting `wheel_drop` below the center.
    pub fn four_wheeled(
        center: DVec3,
        orientation: Quat,
        half_length: f64,
        half_track: f64,
        wheel_drop: f64,
        mass: f32,
    ) -> Self {
        let rotation = orientation.as_dquat();
        let wheels = [(1.0, 1.0), (1.0, -1.0), (-1.0, 1.0), (-1.0, -1.0)]
            .iter()
            .map(|&(fx, fy)| WheelState {
                position: center
                    + rotation * DVec3::new(fx * half_length, fy * half_track, -wheel_drop),
                orientation,
                ..Default::default()
            })
            .collect();
        Self::new(center, mass, wheels)
    }

    /// Move the vehicle and its wheels by `offset`.
    pub fn translate(&mut self, offset: DVec3) {
        self.center += offset;
        for wheel in &mut self.wheels {
            wheel.position += offset;
        }
    }

    /// Return and reset the accumulated `(force, torque, impulse)`. The
    /// angular impulse is reset too; read it from the field beforehand.
    pub fn take_applied(&mut self) -> (Vec3, Vec3, Vec3) {
        let applied = (self.applied_force, self.applied_torque, self.applied_impulse);
        self.applied_force = Vec3::ZERO;
        self.applied_torque = Vec3::ZERO;
        self.applied_impulse = Vec3::ZERO;
        self.applied_angular_impulse = Vec3::ZERO;
        applied
    }
}

impl WheeledVehicle for KinematicVehicle {
    fn wheel_count(&self) -> usize {
        self.wheels.len()
    }

    fn wheel(&self, index: usize) -> Option<WheelState> {
        self.wheels.get(index).copied()
    }

    fn position(&self) -> DVec3 {
        self.center
    }

    fn mass(&self) -> f32 {
        self.mass
    }

    fn apply_force_at(&mut self, force: Vec3, location: DVec3, mode: ApplyMode) {
        let arm = (location - self.center).as_vec3();
        match mode {
            ApplyMode::Force => {
                self.applied_force += force;
                self.applied_torque += arm.cross(force);
            }
            ApplyMode::Impulse => {
                self.applied_impulse += force;
                self.applied_angular_impulse += arm.cross(force);
            }
        }
    }

    fn apply_torque(&mut self, torque: Vec3, mode: ApplyMode) {
        match mode {
            ApplyMode::Force => self.applied_torque += torque,
            ApplyMode::Impulse => self.applied_angular_impulse += torque,
        }
    }

    fn apply_central_force(&mut self, force: Vec3, mode: ApplyMode) {
        match mode {
            ApplyMode::Force => self.applied_force += force,
            ApplyMode::Impulse => self.applied_impulse += force,
        }
    }

    fn set_gravity_enabled(&mut self, enabled: bool) {
        self.gravity_enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_wheeled_layout() {
        let vehicle = KinematicVehicle::four_wheeled(
            DVec3::new(10.0, 0.0, 1.0),
            Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            1.5,
            0.8,
            0.4,
            1200.0,
        );
        assert_eq!(vehicle.wheel_count(), 4);
        // Rotated 90 degrees: front-left wheel sits at +Y, -X.
        let front_left = vehicle.wheel(0).unwrap().position;
        assert!((front_left - DVec3::new(9.2, 1.5, 0.6)).length() < 1e-6);
        assert!(vehicle.wheel(4).is_none());
    }

    #[test]
    fn test_off_center_force_produces_torque() {
        let mut vehicle = KinematicVehicle::new(DVec3::ZERO, 10.0, Vec::new());
        vehicle.apply_force_at(Vec3::Z, DVec3::new(1.0, 0.0, 0.0), ApplyMode::Force);
        let (force, torque, impulse) = vehicle.take_applied();
        assert_eq!(force, Vec3::Z);
        assert_eq!(torque, Vec3::new(0.0, -1.0, 0.0));
        assert_eq!(impulse, Vec3::ZERO);
        assert_eq!(vehicle.take_applied().0, Vec3::ZERO);
    }

    #[test]
    fn test_impulse_torque_is_accumulated() {
        let mut vehicle = KinematicVehicle::new(DVec3::ZERO, 10.0, Vec::new());
        vehicle.apply_torque(Vec3::X, ApplyMode::Impulse);
        vehicle.apply_force_at(Vec3::Z, DVec3::new(1.0, 0.0, 0.0), ApplyMode::Impulse);
        assert_eq!(vehicle.applied_angular_impulse, Vec3::new(1.0, -1.0, 0.0));
        assert_eq!(vehicle.applied_torque, Vec3::ZERO);

        vehicle.take_applied();
        assert_eq!(vehicle.applied_angular_impulse, Vec3::ZERO);
    }

    #[test]
    fn test_translate_moves_wheels() {
        let mut vehicle =
            KinematicVehicle::four_wheeled(DVec3::ZERO, Quat::IDENTITY, 1.0, 1.0, 0.5, 100.0);
        vehicle.translate(DVec3::new(2.0, 0.0, 0.0));
        assert_eq!(vehicle.position(), DVec3::new(2.0, 0.0, 0.0));
        assert_eq!(vehicle.wheel(3).unwrap().position, DVec3::new(1.0, -1.0, -0.5));
    }
}
