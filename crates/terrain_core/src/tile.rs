//! Dense particle tiles.
//!
//! A tile is a fixed-size square of world space holding every particle whose
//! horizontal position lies inside it. Tiles are the unit of generation,
//! streaming and persistence.
//!
//! ## Generation
//!
//! ```text
//!   surface ── o   o   o   o      one column per lattice point,
//!              o   o   o   o      spaced by the particle diameter,
//!              o   o   o   o      from the sampled surface height
//!   depth ──   o   o   o   o      down to terrain depth
//!            |<- diameter ->|
//! ```
//!
//! Lattice points sit at cell centers and get a small seeded jitter (at most a
//! quarter diameter on each axis), so particles never leave their cell and the
//! same tile always regenerates identically.
//!
//! ## Text format
//!
//! ```text
//! PosX PosY PosZ\n
//! X Y Z Radius\n      (one line per particle)
//! ```

use bevy::math::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{TerrainError, TerrainResult};
use crate::geometry::OrientedBox;
use crate::heightmap::HeightMap;
use crate::particle::Particle;

/// Fraction of the particle diameter used as maximum lattice jitter.
const JITTER_FRACTION: f64 = 0.25;

/// A square region of terrain and its particles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tile {
    /// Lower corner in world space.
    pub position: DVec3,
    /// Particles owned by this tile, in no particular order.
    pub particles: Vec<Particle>,
    /// Set when particles were modified since the tile was materialized.
    /// Not persisted.
    pub dirty: bool,
}

/// Number of whole `step`s that fit in `extent`, tolerant to float noise.
fn lattice_count(extent: f64, step: f64) -> usize {
    if step <= 0.0 || extent <= 0.0 {
        return 0;
    }
    (extent / step + 1e-6).floor() as usize
}

impl Tile {
    /// Generate particles for `[origin, end)` from the height map.
    ///
    /// `seed` drives the lattice jitter; the map uses the tile id so a clean
    /// tile can be dropped and regenerated without changing its particles.
    pub fn generate(
        particle_size: f64,
        depth: f64,
        origin: DVec3,
        end: DVec3,
        heightmap: &HeightMap,
        seed: u64,
    ) -> Self {
        let nx = lattice_count(end.x - origin.x, particle_size);
        let ny = lattice_count(end.y - origin.y, particle_size);
        let nz = lattice_count(depth, particle_size);
        let radius = (particle_size * 0.5) as f32;
        let jitter = particle_size * JITTER_FRACTION;
        let mut rng = StdRng::seed_from_u64(seed);

        let mut particles = Vec::with_capacity(nx * ny * nz);
        for i in 0..nx {
            for j in 0..ny {
                let column = DVec3::new(
                    origin.x + (i as f64 + 0.5) * particle_size,
                    origin.y + (j as f64 + 0.5) * particle_size,
                    0.0,
                );
                let surface = heightmap.get_height(column);
                for k in 0..nz {
                    let offset = DVec3::new(
                        rng.gen_range(-jitter..=jitter),
                        rng.gen_range(-jitter..=jitter),
                        rng.gen_range(-jitter..=jitter),
                    );
                    let position = DVec3::new(
                        column.x,
                        column.y,
                        surface - k as f64 * particle_size,
                    ) + offset;
                    particles.push(Particle::new(position, radius));
                }
            }
        }

        Self {
            position: DVec3::new(origin.x, origin.y, 0.0),
            particles,
            dirty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Indices of particles within `radius` of `center` (inclusive).
    pub fn particles_in_radius(&self, center: DVec3, radius: f64) -> Vec<usize> {
        let mut out = Vec::new();
        self.particles_in_radius_into(center, radius, &mut out);
        out
    }

    /// Append indices of particles within `radius` of `center` to `out`.
    pub fn particles_in_radius_into(&self, center: DVec3, radius: f64, out: &mut Vec<usize>) {
        let r2 = radius * radius;
        out.extend(
            self.particles
                .iter()
                .enumerate()
                .filter(|(_, p)| p.position.distance_squared(center) <= r2)
                .map(|(i, _)| i),
        );
    }

    /// Append indices of particles contained in `obb` to `out`.
    pub fn particles_in_box_into(&self, obb: &OrientedBox, out: &mut Vec<usize>) {
        out.extend(
            self.particles
                .iter()
                .enumerate()
                .filter(|(_, p)| obb.contains(p.position))
                .map(|(i, _)| i),
        );
    }

    /// Indices of particles contained in `obb`.
    pub fn particles_in_box(&self, obb: &OrientedBox) -> Vec<usize> {
        let mut out = Vec::new();
        self.particles_in_box_into(obb, &mut out);
        out
    }

    /// Serialize to the tile text format.
    pub fn to_text(&self) -> String {
        use std::fmt::Write;
        let mut out = String::with_capacity(32 + self.particles.len() * 48);
        let _ = writeln!(
            out,
            "{} {} {}",
            self.position.x, self.position.y, self.position.z
        );
        for particle in &self.particles {
            particle.write_record(&mut out);
        }
        out
    }

    /// Parse the tile text format. The result is clean (`dirty == false`).
    pub fn from_text(text: &str) -> TerrainResult<Self> {
        let mut lines = text.lines().enumerate();
        let (_, header) = lines
            .next()
            .ok_or_else(|| TerrainError::malformed(1, "empty tile data"))?;
        let position = parse_header(header)?;

        let mut particles = Vec::new();
        for (index, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            particles.push(Particle::from_record(line, index + 1)?);
        }

        Ok(Self {
            position,
            particles,
            dirty: false,
        })
    }
}

fn parse_header(header: &str) -> TerrainResult<DVec3> {
    let values: Vec<f64> = header
        .split_whitespace()
        .map(|field| field.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| TerrainError::malformed(1, format!("bad tile position: {}", e)))?;
    match values.as_slice() {
        [x, y, z] if x.is_finite() && y.is_finite() && z.is_finite() => {
            Ok(DVec3::new(*x, *y, *z))
        }
        _ => Err(TerrainError::malformed(
            1,
            format!("expected 3 finite values in header, got '{}'", header),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::math::DQuat;

    fn flat_map() -> HeightMap {
        HeightMap::flat(DVec3::new(-50.0, -50.0, 0.0), DVec3::new(100.0, 100.0, 0.0), 5.0)
    }

    fn small_tile() -> Tile {
        Tile::generate(
            0.1,
            0.3,
            DVec3::new(2.0, -1.0, 0.0),
            DVec3::new(3.0, 0.0, 0.0),
            &flat_map(),
            7,
        )
    }

    #[test]
    fn test_lattice_counts() {
        assert_eq!(lattice_count(0.4, 0.02), 20);
        assert_eq!(lattice_count(1.0, 0.02), 50);
        assert_eq!(lattice_count(1.0, 0.3), 3);
        assert_eq!(lattice_count(0.0, 0.1), 0);
    }

    #[test]
    fn test_generation_fills_columns() {
        let tile = small_tile();
        // 10 x 10 columns, 3 deep
        assert_eq!(tile.len(), 300);
        assert!(!tile.dirty);
        assert!(tile.particles.iter().all(|p| (p.radius - 0.05).abs() < 1e-6));
    }

    #[test]
    fn test_particles_stay_in_tile_bounds() {
        let tile = small_tile();
        for p in &tile.particles {
            assert!(p.position.x >= 2.0 && p.position.x < 3.0, "x out of tile: {:?}", p.position);
            assert!(p.position.y >= -1.0 && p.position.y < 0.0, "y out of tile: {:?}", p.position);
        }
    }

    #[test]
    fn test_column_follows_surface_down_to_depth() {
        let tile = small_tile();
        let top = tile.particles.iter().map(|p| p.position.z).fold(f64::MIN, f64::max);
        let bottom = tile.particles.iter().map(|p| p.position.z).fold(f64::MAX, f64::min);
        assert!(top <= 5.0 + 0.025 + 1e-9 && top >= 5.0 - 0.025);
        assert!(bottom >= 5.0 - 0.2 - 0.025 - 1e-9);
    }

    #[test]
    fn test_generation_is_deterministic_per_seed() {
        assert_eq!(small_tile(), small_tile());
        let other = Tile::generate(
            0.1,
            0.3,
            DVec3::new(2.0, -1.0, 0.0),
            DVec3::new(3.0, 0.0, 0.0),
            &flat_map(),
            8,
        );
        assert_ne!(small_tile().particles, other.particles);
    }

    #[test]
    fn test_radius_query_matches_brute_force() {
        let tile = small_tile();
        let center = DVec3::new(2.5, -0.5, 4.9);
        let found = tile.particles_in_radius(center, 0.22);
        let expected: Vec<usize> = (0..tile.len())
            .filter(|&i| tile.particles[i].position.distance(center) <= 0.22)
            .collect();
        assert!(!expected.is_empty());
        assert_eq!(found, expected);
    }

    #[test]
    fn test_box_query_respects_rotation() {
        let tile = small_tile();
        let obb = OrientedBox::new(
            DVec3::new(2.5, -0.5, 5.0),
            DVec3::new(0.5, 0.05, 1.0),
            DQuat::from_rotation_z(std::f64::consts::FRAC_PI_4),
        );
        let found = tile.particles_in_box(&obb);
        assert!(!found.is_empty());
        for &i in &found {
            assert!(obb.contains(tile.particles[i].position));
        }
        // A corner of the AABB but far from the diagonal strip.
        let corner = tile
            .particles
            .iter()
            .position(|p| p.position.x > 2.85 && p.position.y < -0.85)
            .unwrap();
        assert!(!found.contains(&corner));
    }

    #[test]
    fn test_text_round_trip_is_byte_exact() {
        let tile = small_tile();
        let text = tile.to_text();
        let parsed = Tile::from_text(&text).unwrap();
        assert_eq!(parsed.len(), tile.len());
        assert_eq!(parsed.position, tile.position);
        for (a, b) in parsed.particles.iter().zip(&tile.particles) {
            assert_eq!(a.position, b.position);
            assert_eq!(a.radius, b.radius);
        }
        assert_eq!(parsed.to_text(), text);
    }

    #[test]
    fn test_malformed_text() {
        assert!(Tile::from_text("").is_err());
        assert!(Tile::from_text("1 2\n").is_err());
        assert!(matches!(
            Tile::from_text("0 0 0\n1 2 3 0.1\n1 2 oops 0.1\n"),
            Err(TerrainError::MalformedTile { line: 3, .. })
        ));
    }
}
