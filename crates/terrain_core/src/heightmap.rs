//! Height map used to seed particle elevation.
//!
//! The map covers the world rectangle `[origin, origin + size)` in the XY
//! plane with a row-major grid of normalized samples (`0.0..=1.0`). Sampling
//! is bilinear and clamps to the grid border, so positions outside the
//! covered rectangle read the nearest edge height.
//!
//! ## Coordinate mapping
//!
//! ```text
//! grid_x = (world.x - origin.x) / size.x * (width  - 1)
//! grid_y = (world.y - origin.y) / size.y * (height - 1)
//! height = min_height + sample * (max_height - min_height)
//! ```

use bevy::math::DVec3;
use std::path::Path;

use crate::error::{TerrainError, TerrainResult};

/// Placement and denormalization range for a height map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightMapParams {
    /// World-space lower corner of the covered rectangle.
    pub origin: DVec3,
    /// World-space extent (x, y used).
    pub size: DVec3,
    /// Height for a sample of 0.0.
    pub min_height: f32,
    /// Height for a sample of 1.0.
    pub max_height: f32,
}

impl Default for HeightMapParams {
    fn default() -> Self {
        Self {
            origin: DVec3::ZERO,
            size: DVec3::new(100.0, 100.0, 0.0),
            min_height: 0.0,
            max_height: 10.0,
        }
    }
}

/// Immutable-after-init grid of height samples.
#[derive(Debug, Clone)]
pub struct HeightMap {
    width: u32,
    height: u32,
    pixels: Vec<f32>,
    params: HeightMapParams,
}

impl Default for HeightMap {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            pixels: Vec::new(),
            params: HeightMapParams::default(),
        }
    }
}

impl HeightMap {
    /// Build from a row-major buffer of normalized samples.
    pub fn from_pixels(
        width: u32,
        height: u32,
        pixels: Vec<f32>,
        params: HeightMapParams,
    ) -> TerrainResult<Self> {
        if width == 0 || height == 0 {
            return Err(TerrainError::HeightMap(format!(
                "empty grid {}x{}",
                width, height
            )));
        }
        if pixels.len() != (width as usize) * (height as usize) {
            return Err(TerrainError::HeightMap(format!(
                "expected {} samples for {}x{}, got {}",
                width as usize * height as usize,
                width,
                height,
                pixels.len()
            )));
        }
        if params.size.x <= 0.0 || params.size.y <= 0.0 {
            return Err(TerrainError::HeightMap(format!(
                "world size must be positive, got {:?}",
                params.size
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
            params,
        })
    }

    /// A single-sample map that reads `height` everywhere in its extent.
    pub fn flat(origin: DVec3, size: DVec3, height: f32) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: vec![0.0],
            params: HeightMapParams {
                origin,
                size,
                min_height: height,
                max_height: height,
            },
        }
    }

    /// Decode a grayscale image (8 or 16 bit) into a height map.
    pub fn from_image<P: AsRef<Path>>(path: P, params: HeightMapParams) -> TerrainResult<Self> {
        let img = image::open(path)?.to_luma16();
        let (width, height) = img.dimensions();
        let pixels = img
            .pixels()
            .map(|p| p.0[0] as f32 / u16::MAX as f32)
            .collect();
        Self::from_pixels(width, height, pixels, params)
    }

    /// Placement parameters.
    pub fn params(&self) -> &HeightMapParams {
        &self.params
    }

    /// Grid dimensions `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Lower corner of the covered rectangle.
    pub fn origin(&self) -> DVec3 {
        self.params.origin
    }

    /// Upper corner (exclusive) of the covered rectangle.
    pub fn end(&self) -> DVec3 {
        self.params.origin + self.params.size
    }

    /// Whether the map holds samples (false after [`HeightMap::clear`]).
    pub fn is_loaded(&self) -> bool {
        !self.pixels.is_empty()
    }

    /// Whether `position` lies in `[origin, origin + size)` horizontally.
    pub fn contains(&self, position: DVec3) -> bool {
        let lo = self.origin();
        let hi = self.end();
        position.x >= lo.x && position.x < hi.x && position.y >= lo.y && position.y < hi.y
    }

    /// Whether the horizontal rectangle `[min, max)` overlaps the covered area.
    pub fn overlaps(&self, min: DVec3, max: DVec3) -> bool {
        let lo = self.origin();
        let hi = self.end();
        min.x < hi.x && max.x > lo.x && min.y < hi.y && max.y > lo.y
    }

    /// Terrain surface height at a world XY position.
    pub fn get_height(&self, position: DVec3) -> f64 {
        let min = self.params.min_height as f64;
        let max = self.params.max_height as f64;
        if self.pixels.is_empty() {
            return min;
        }
        min + self.sample(position) * (max - min)
    }

    /// Release the sample buffer. Idempotent.
    pub fn clear(&mut self) {
        self.pixels = Vec::new();
        self.width = 0;
        self.height = 0;
    }

    fn pixel(&self, x: u32, y: u32) -> f64 {
        self.pixels[(y as usize) * (self.width as usize) + x as usize] as f64
    }

    /// Bilinear normalized sample, clamped to the grid border.
    fn sample(&self, position: DVec3) -> f64 {
        let max_x = (self.width - 1) as f64;
        let max_y = (self.height - 1) as f64;
        let local = position - self.params.origin;
        let fx = (local.x / self.params.size.x * max_x).clamp(0.0, max_x);
        let fy = (local.y / self.params.size.y * max_y).clamp(0.0, max_y);

        let x0 = fx.floor() as u32;
        let y0 = fy.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let tx = fx - x0 as f64;
        let ty = fy - y0 as f64;

        let a = self.pixel(x0, y0) * (1.0 - tx) + self.pixel(x1, y0) * tx;
        let b = self.pixel(x0, y1) * (1.0 - tx) + self.pixel(x1, y1) * tx;
        a * (1.0 - ty) + b * ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> HeightMap {
        // 3x2 grid, sample rises along x.
        let pixels = vec![0.0, 0.5, 1.0, 0.0, 0.5, 1.0];
        HeightMap::from_pixels(
            3,
            2,
            pixels,
            HeightMapParams {
                origin: DVec3::new(10.0, 20.0, 0.0),
                size: DVec3::new(4.0, 4.0, 0.0),
                min_height: 2.0,
                max_height: 6.0,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_denormalizes_samples() {
        let map = ramp();
        assert!((map.get_height(DVec3::new(10.0, 20.0, 0.0)) - 2.0).abs() < 1e-9);
        assert!((map.get_height(DVec3::new(12.0, 20.0, 0.0)) - 4.0).abs() < 1e-9);
        assert!((map.get_height(DVec3::new(14.0, 24.0, 0.0)) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_bilinear_between_samples() {
        let map = ramp();
        // A quarter of the way between x=10 and x=12 -> sample 0.125
        let h = map.get_height(DVec3::new(10.5, 22.0, 0.0));
        assert!((h - 2.5).abs() < 1e-9, "got {}", h);
    }

    #[test]
    fn test_clamps_outside_extent() {
        let map = ramp();
        assert!((map.get_height(DVec3::new(-100.0, 20.0, 0.0)) - 2.0).abs() < 1e-9);
        assert!((map.get_height(DVec3::new(1000.0, 99.0, 0.0)) - 6.0).abs() < 1e-9);
        assert!(!map.contains(DVec3::new(14.0, 21.0, 0.0)));
        assert!(map.contains(DVec3::new(13.9, 21.0, 0.0)));
    }

    #[test]
    fn test_flat_map() {
        let map = HeightMap::flat(DVec3::ZERO, DVec3::new(8.0, 8.0, 0.0), 5.0);
        assert_eq!(map.get_height(DVec3::new(3.3, 7.1, 0.0)), 5.0);
    }

    #[test]
    fn test_rejects_mismatched_buffer() {
        let result = HeightMap::from_pixels(4, 4, vec![0.0; 3], HeightMapParams::default());
        assert!(matches!(result, Err(TerrainError::HeightMap(_))));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut map = ramp();
        map.clear();
        map.clear();
        assert!(!map.is_loaded());
        assert_eq!(map.get_height(DVec3::new(12.0, 21.0, 0.0)), 2.0);
    }

    #[test]
    fn test_from_image() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("height.png");
        let img = image::GrayImage::from_fn(2, 2, |x, _| image::Luma([if x == 0 { 0 } else { 255 }]));
        img.save(&path).unwrap();

        let map = HeightMap::from_image(&path, ramp().params).unwrap();
        assert_eq!(map.dimensions(), (2, 2));
        assert!((map.get_height(DVec3::new(14.0, 20.0, 0.0)) - 6.0).abs() < 1e-6);
    }
}
