//! Tile coordinates and their packed 64-bit ids.
//!
//! Each signed 32-bit tile coordinate is zig-zag encoded into an unsigned
//! 32-bit value (`0, -1, 1, -2, 2, ...` map to `0, 1, 2, 3, 4, ...`), then the
//! two halves are packed as `x << 32 | y`. The encoding is total over all
//! `i32` pairs and [`TileId::coord`] inverts it exactly.

use bevy::math::DVec3;
use std::fmt;

/// Integer tile coordinates in the horizontal plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TileCoord {
    pub x: i32,
    pub y: i32,
}

impl TileCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Tile containing `position`, for tiles of `tile_size` anchored at `tile0`.
    pub fn from_position(position: DVec3, tile0: DVec3, tile_size: f64) -> Self {
        let rel = (position - tile0) / tile_size;
        Self {
            x: rel.x.floor() as i32,
            y: rel.y.floor() as i32,
        }
    }

    /// Lower corner of this tile in world space (z = 0).
    pub fn origin(&self, tile0: DVec3, tile_size: f64) -> DVec3 {
        DVec3::new(
            tile0.x + self.x as f64 * tile_size,
            tile0.y + self.y as f64 * tile_size,
            0.0,
        )
    }

    pub fn id(&self) -> TileId {
        TileId::from_coord(*self)
    }
}

/// Packed tile identifier; also the persisted file key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId(pub u64);

impl TileId {
    pub fn from_coord(coord: TileCoord) -> Self {
        TileId(((zigzag(coord.x) as u64) << 32) | zigzag(coord.y) as u64)
    }

    /// Decode back to tile coordinates.
    pub fn coord(&self) -> TileCoord {
        TileCoord {
            x: unzigzag((self.0 >> 32) as u32),
            y: unzigzag(self.0 as u32),
        }
    }
}

impl From<TileCoord> for TileId {
    fn from(coord: TileCoord) -> Self {
        TileId::from_coord(coord)
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[inline]
fn zigzag(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

#[inline]
fn unzigzag(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_zigzag_order() {
        let encoded: Vec<u32> = [0, -1, 1, -2, 2].iter().map(|&v| zigzag(v)).collect();
        assert_eq!(encoded, vec![0, 1, 2, 3, 4]);
        assert_eq!(unzigzag(zigzag(i32::MIN)), i32::MIN);
        assert_eq!(unzigzag(zigzag(i32::MAX)), i32::MAX);
    }

    #[test]
    fn test_id_round_trips_swept_range() {
        for x in -1000..=1000 {
            for y in -1000..=1000 {
                let coord = TileCoord::new(x, y);
                assert_eq!(coord.id().coord(), coord);
            }
        }
    }

    #[test]
    fn test_no_collisions() {
        let mut seen = HashSet::new();
        for x in -150..=150 {
            for y in -150..=150 {
                assert!(seen.insert(TileCoord::new(x, y).id()), "collision at {},{}", x, y);
            }
        }
    }

    #[test]
    fn test_extreme_coordinates() {
        for &(x, y) in &[(i32::MIN, i32::MAX), (i32::MAX, i32::MIN), (-1, 0), (0, -1)] {
            let coord = TileCoord::new(x, y);
            assert_eq!(coord.id().coord(), coord);
        }
        assert_ne!(TileCoord::new(-1, 0).id(), TileCoord::new(0, -1).id());
    }

    #[test]
    fn test_from_position_floors() {
        let tile0 = DVec3::new(0.5, 0.5, 0.0);
        assert_eq!(TileCoord::from_position(DVec3::new(0.5, 0.5, 0.0), tile0, 1.0), TileCoord::new(0, 0));
        assert_eq!(TileCoord::from_position(DVec3::new(0.49, 1.6, 0.0), tile0, 1.0), TileCoord::new(-1, 1));
        assert_eq!(TileCoord::from_position(DVec3::new(-3.0, -0.6, 0.0), tile0, 2.0), TileCoord::new(-2, -1));
    }

    #[test]
    fn test_large_world_position() {
        let far = DVec3::new(1.0e9 + 0.25, -1.0e9 - 0.75, 0.0);
        let coord = TileCoord::from_position(far, DVec3::ZERO, 0.5);
        let origin = coord.origin(DVec3::ZERO, 0.5);
        assert!(far.x >= origin.x && far.x < origin.x + 0.5);
        assert!(far.y >= origin.y && far.y < origin.y + 0.5);
    }
}
