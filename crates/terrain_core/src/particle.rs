//! Terrain particles and their persisted text record.
//!
//! A particle is a point-mass sample of the granular medium. Positions are
//! double precision because tiles can sit kilometres away from the world
//! origin; velocity stays single precision since it is a local, transient
//! quantity that is never persisted.
//!
//! ## Record format
//!
//! ```text
//! X Y Z Radius\n
//! ```
//!
//! Values are written with Rust's shortest round-trip float formatting, so a
//! parse of a written record reproduces the exact bits of position and radius.

use bevy::math::{DVec3, Vec3};

use crate::error::{TerrainError, TerrainResult};

/// Default particle radius in meters.
pub const DEFAULT_PARTICLE_RADIUS: f32 = 0.02;

/// A single terrain particle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// World position in meters.
    pub position: DVec3,
    /// Velocity in m/s. Not persisted.
    pub velocity: Vec3,
    /// Radius in meters.
    pub radius: f32,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            velocity: Vec3::ZERO,
            radius: DEFAULT_PARTICLE_RADIUS,
        }
    }
}

impl Particle {
    /// Create a resting particle at `position`.
    pub fn new(position: DVec3, radius: f32) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            radius,
        }
    }

    /// Format as `"X Y Z Radius\n"`.
    pub fn to_record(&self) -> String {
        let mut out = String::with_capacity(64);
        self.write_record(&mut out);
        out
    }

    /// Append the record for this particle to `out`.
    pub fn write_record(&self, out: &mut String) {
        use std::fmt::Write;
        // Writing into a String cannot fail.
        let _ = writeln!(
            out,
            "{} {} {} {}",
            self.position.x, self.position.y, self.position.z, self.radius
        );
    }

    /// Parse a record produced by [`Particle::to_record`].
    ///
    /// Velocity is reset to zero. `line` is only used for error reporting.
    pub fn from_record(record: &str, line: usize) -> TerrainResult<Self> {
        let mut fields = record.split_whitespace();
        let x = parse_f64(next_field(&mut fields, "x", line)?, line)?;
        let y = parse_f64(next_field(&mut fields, "y", line)?, line)?;
        let z = parse_f64(next_field(&mut fields, "z", line)?, line)?;
        let radius: f32 = next_field(&mut fields, "radius", line)?
            .parse()
            .map_err(|e| TerrainError::malformed(line, format!("bad radius: {}", e)))?;

        if fields.next().is_some() {
            return Err(TerrainError::malformed(line, "trailing fields"));
        }
        if radius <= 0.0 || !radius.is_finite() {
            return Err(TerrainError::malformed(line, "radius must be positive"));
        }

        Ok(Self::new(DVec3::new(x, y, z), radius))
    }

    /// Overwrite position and radius from a record, clearing velocity.
    pub fn modify_from_record(&mut self, record: &str, line: usize) -> TerrainResult<()> {
        *self = Self::from_record(record, line)?;
        Ok(())
    }
}

fn next_field<'a>(
    fields: &mut impl Iterator<Item = &'a str>,
    name: &str,
    line: usize,
) -> TerrainResult<&'a str> {
    fields
        .next()
        .ok_or_else(|| TerrainError::malformed(line, format!("missing {}", name)))
}

fn parse_f64(field: &str, line: usize) -> TerrainResult<f64> {
    let value: f64 = field
        .parse()
        .map_err(|e| TerrainError::malformed(line, format!("bad coordinate '{}': {}", field, e)))?;
    if !value.is_finite() {
        return Err(TerrainError::malformed(line, "non-finite coordinate"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_format() {
        let p = Particle::new(DVec3::new(1.5, -2.0, 5.0), 0.01);
        assert_eq!(p.to_record(), "1.5 -2 5 0.01\n");
    }

    #[test]
    fn test_record_keeps_large_world_precision() {
        // 2^40 m away still resolves a tenth of a millimeter.
        let p = Particle::new(DVec3::new(1_099_511_627_776.000_1, 3.25e9, -0.123_456_789), 0.02);
        let parsed = Particle::from_record(&p.to_record(), 1).unwrap();
        assert_eq!(parsed.position, p.position);
        assert_eq!(parsed.radius, p.radius);
    }

    #[test]
    fn test_velocity_not_persisted() {
        let mut p = Particle::new(DVec3::new(0.0, 0.0, 1.0), 0.02);
        p.velocity = Vec3::new(3.0, 0.0, -1.0);
        let parsed = Particle::from_record(&p.to_record(), 1).unwrap();
        assert_eq!(parsed.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_modify_from_record_overwrites() {
        let mut p = Particle::default();
        p.velocity = Vec3::ONE;
        p.modify_from_record("4 5 6 0.5\n", 1).unwrap();
        assert_eq!(p.position, DVec3::new(4.0, 5.0, 6.0));
        assert_eq!(p.radius, 0.5);
        assert_eq!(p.velocity, Vec3::ZERO);
    }

    #[test]
    fn test_rejects_malformed_records() {
        assert!(matches!(
            Particle::from_record("1 2 3", 7),
            Err(TerrainError::MalformedTile { line: 7, .. })
        ));
        assert!(Particle::from_record("1 2 x 0.1", 1).is_err());
        assert!(Particle::from_record("1 2 3 0.1 9", 1).is_err());
        assert!(Particle::from_record("1 2 3 -0.1", 1).is_err());
        assert!(Particle::from_record("NaN 2 3 0.1", 1).is_err());
    }
}
