//! Heightfield tiles.

use std::sync::Arc;

use thiserror::Error;

use crate::coord::{Extent, TileKey};

/// Errors produced when building a tile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    /// A heightfield needs at least two posts in each direction.
    #[error("heightfield must be at least 2x2, got {columns}x{rows}")]
    TooSmall { columns: usize, rows: usize },

    /// Sample count does not match the declared grid.
    #[error("expected {expected} height samples, got {actual}")]
    SampleCount { expected: usize, actual: usize },
}

/// A loaded terrain tile: a regular grid of ellipsoidal heights.
///
/// Posts are stored row-major starting at the north-west corner and span the
/// tile's extent edge to edge. Non-finite samples mean "no data".
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    key: TileKey,
    columns: usize,
    rows: usize,
    heights: Vec<f32>,
}

/// Handle to a tile, shared between the graph and listeners.
pub type TileHandle = Arc<Tile>;

impl Tile {
    /// Create a tile from a row-major heightfield.
    pub fn new(
        key: TileKey,
        columns: usize,
        rows: usize,
        heights: Vec<f32>,
    ) -> Result<Self, TileError> {
        if columns < 2 || rows < 2 {
            return Err(TileError::TooSmall { columns, rows });
        }
        let expected = columns
            .checked_mul(rows)
            .ok_or(TileError::SampleCount {
                expected: usize::MAX,
                actual: heights.len(),
            })?;
        if heights.len() != expected {
            return Err(TileError::SampleCount {
                expected,
                actual: heights.len(),
            });
        }
        Ok(Self {
            key,
            columns,
            rows,
            heights,
        })
    }

    /// Create a tile with the same height at every post.
    pub fn flat(key: TileKey, columns: usize, rows: usize, height: f32) -> Result<Self, TileError> {
        let count = columns.checked_mul(rows).ok_or(TileError::SampleCount {
            expected: usize::MAX,
            actual: 0,
        })?;
        Self::new(key, columns, rows, vec![height; count])
    }

    pub fn key(&self) -> &TileKey {
        &self.key
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    /// Height at a grid post.
    pub fn post(&self, column: usize, row: usize) -> Option<f32> {
        if column >= self.columns || row >= self.rows {
            return None;
        }
        Some(self.heights[row * self.columns + column])
    }

    /// Bilinearly interpolated height at a point inside `extent`.
    ///
    /// `extent` is the area this tile covers in the profile. Returns `None`
    /// outside the extent or when a surrounding post has no data.
    pub fn sample(&self, extent: &Extent, x: f64, y: f64) -> Option<f64> {
        if !extent.contains(x, y) {
            return None;
        }
        let max_col = (self.columns - 1) as f64;
        let max_row = (self.rows - 1) as f64;
        let u = ((x - extent.xmin) / extent.width() * max_col).clamp(0.0, max_col);
        let v = ((extent.ymax - y) / extent.height() * max_row).clamp(0.0, max_row);

        let c0 = (u.floor() as usize).min(self.columns - 2);
        let r0 = (v.floor() as usize).min(self.rows - 2);
        let fu = u - c0 as f64;
        let fv = v - r0 as f64;

        let h00 = self.post(c0, r0)? as f64;
        let h10 = self.post(c0 + 1, r0)? as f64;
        let h01 = self.post(c0, r0 + 1)? as f64;
        let h11 = self.post(c0 + 1, r0 + 1)? as f64;
        if ![h00, h10, h01, h11].iter().all(|h| h.is_finite()) {
            return None;
        }

        let north = h00 + (h10 - h00) * fu;
        let south = h01 + (h11 - h01) * fu;
        Some(north + (south - north) * fv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_extent() -> Extent {
        Extent::new(0.0, 0.0, 1.0, 1.0)
    }

    fn ramp() -> Tile {
        // West edge 0m, east edge 100m.
        Tile::new(TileKey::new(0, 0, 0), 2, 2, vec![0.0, 100.0, 0.0, 100.0]).unwrap()
    }

    #[test]
    fn test_too_small_rejected() {
        let result = Tile::new(TileKey::new(0, 0, 0), 1, 4, vec![0.0; 4]);
        assert_eq!(result, Err(TileError::TooSmall { columns: 1, rows: 4 }));
    }

    #[test]
    fn test_grid_size_overflow_rejected() {
        let result = Tile::new(TileKey::new(0, 0, 0), usize::MAX, 2, vec![0.0; 4]);
        assert_eq!(
            result,
            Err(TileError::SampleCount {
                expected: usize::MAX,
                actual: 4
            })
        );
        assert!(matches!(
            Tile::flat(TileKey::new(0, 0, 0), usize::MAX, usize::MAX, 1.0),
            Err(TileError::SampleCount { .. })
        ));
    }

    #[test]
    fn test_sample_count_mismatch_rejected() {
        let result = Tile::new(TileKey::new(0, 0, 0), 3, 3, vec![0.0; 8]);
        assert_eq!(
            result,
            Err(TileError::SampleCount {
                expected: 9,
                actual: 8
            })
        );
    }

    #[test]
    fn test_sample_interpolates() {
        let tile = ramp();
        let h = tile.sample(&unit_extent(), 0.25, 0.5).unwrap();
        assert!((h - 25.0).abs() < 1e-9, "got {}", h);
    }

    #[test]
    fn test_sample_on_corners() {
        let tile = ramp();
        assert!((tile.sample(&unit_extent(), 0.0, 1.0).unwrap() - 0.0).abs() < 1e-9);
        assert!((tile.sample(&unit_extent(), 1.0, 0.0).unwrap() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_north_south_orientation() {
        // North row 10m, south row 20m.
        let tile = Tile::new(TileKey::new(0, 0, 0), 2, 2, vec![10.0, 10.0, 20.0, 20.0]).unwrap();
        assert!((tile.sample(&unit_extent(), 0.5, 1.0).unwrap() - 10.0).abs() < 1e-9);
        assert!((tile.sample(&unit_extent(), 0.5, 0.0).unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_outside_extent() {
        assert_eq!(ramp().sample(&unit_extent(), 1.5, 0.5), None);
    }

    #[test]
    fn test_sample_no_data() {
        let tile =
            Tile::new(TileKey::new(0, 0, 0), 2, 2, vec![0.0, f32::NAN, 0.0, 0.0]).unwrap();
        assert_eq!(tile.sample(&unit_extent(), 0.5, 0.5), None);
    }
}
