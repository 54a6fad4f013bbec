//! Oriented query boxes in world space.

use bevy::math::{DQuat, DVec3};

/// An arbitrarily rotated box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientedBox {
    /// World-space center.
    pub center: DVec3,
    /// Half extents along the box's local axes.
    pub half_extents: DVec3,
    /// Rotation from box-local to world.
    pub rotation: DQuat,
}

impl OrientedBox {
    pub fn new(center: DVec3, half_extents: DVec3, rotation: DQuat) -> Self {
        Self {
            center,
            half_extents: half_extents.abs(),
            rotation,
        }
    }

    /// Axis-aligned box (identity rotation).
    pub fn axis_aligned(center: DVec3, half_extents: DVec3) -> Self {
        Self::new(center, half_extents, DQuat::IDENTITY)
    }

    /// Whether `point` lies inside the box (boundary inclusive).
    pub fn contains(&self, point: DVec3) -> bool {
        let local = self.rotation.inverse() * (point - self.center);
        local.x.abs() <= self.half_extents.x
            && local.y.abs() <= self.half_extents.y
            && local.z.abs() <= self.half_extents.z
    }

    /// World-space axis-aligned bounds `(min, max)` enclosing the box.
    pub fn aabb(&self) -> (DVec3, DVec3) {
        let axes = [
            self.rotation * DVec3::X,
            self.rotation * DVec3::Y,
            self.rotation * DVec3::Z,
        ];
        let he = self.half_extents;
        let extent = axes[0].abs() * he.x + axes[1].abs() * he.y + axes[2].abs() * he.z;
        (self.center - extent, self.center + extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_4;

    #[test]
    fn test_axis_aligned_contains() {
        let b = OrientedBox::axis_aligned(DVec3::new(1.0, 1.0, 1.0), DVec3::new(0.5, 0.5, 0.5));
        assert!(b.contains(DVec3::new(1.4, 0.6, 1.5)));
        assert!(!b.contains(DVec3::new(1.6, 1.0, 1.0)));
    }

    #[test]
    fn test_rotation_changes_containment() {
        // Long thin box rotated 45 degrees about Z.
        let b = OrientedBox::new(
            DVec3::ZERO,
            DVec3::new(2.0, 0.1, 0.1),
            DQuat::from_rotation_z(FRAC_PI_4),
        );
        // Along the rotated long axis: inside.
        assert!(b.contains(DVec3::new(1.0, 1.0, 0.0)));
        // Inside the axis-aligned bounds but off the rotated axis: outside.
        assert!(!b.contains(DVec3::new(1.0, -1.0, 0.0)));
        let (min, max) = b.aabb();
        assert!(min.x <= 1.0 && max.x >= 1.0 && min.y <= -1.0);
    }

    #[test]
    fn test_aabb_of_rotated_box() {
        let b = OrientedBox::new(
            DVec3::ZERO,
            DVec3::new(1.0, 1.0, 1.0),
            DQuat::from_rotation_z(FRAC_PI_4),
        );
        let (min, max) = b.aabb();
        let diag = 2.0_f64.sqrt();
        assert!((max.x - diag).abs() < 1e-9);
        assert!((min.y + diag).abs() < 1e-9);
        assert!((max.z - 1.0).abs() < 1e-9);
    }
}
