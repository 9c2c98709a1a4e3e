//! Tile addressing and coordinate helpers.
//!
//! Terrain tiles are addressed by a [`TileKey`]: a level of detail plus a
//! column/row position in a quadtree laid over a map profile's extent. Row 0
//! is the northern edge, column 0 the western edge.
//!
//! Extent math lives on [`crate::profile::MapProfile`] because a key only has
//! a spatial meaning relative to the profile that tiles it.

use std::fmt;

use thiserror::Error;

/// WGS84 semi-major axis in meters, used as the spherical mercator radius.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Half the width of the spherical mercator square, in meters.
pub const MERCATOR_HALF_EXTENT: f64 = std::f64::consts::PI * EARTH_RADIUS_M;

/// Maximum latitude representable in spherical mercator.
pub const MAX_MERCATOR_LAT: f64 = 85.05112878;

/// Deepest level of detail a key may address.
pub const MAX_LOD: u32 = 30;

/// Errors produced when building tile keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileKeyError {
    /// Level of detail beyond [`MAX_LOD`].
    #[error("level of detail {0} exceeds maximum {max}", max = MAX_LOD)]
    InvalidLod(u32),

    /// Column or row outside the tiling at that level.
    #[error("tile {x},{y} is outside the {width}x{height} tiling at LOD {lod}")]
    OutOfRange {
        lod: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
}

/// Identifier of a terrain tile: spatial position plus level of detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// Level of detail (0 = root tiles).
    pub lod: u32,
    /// Column, counted from the western edge.
    pub x: u32,
    /// Row, counted from the northern edge.
    pub y: u32,
}

impl TileKey {
    /// Create a key without validating it against a profile.
    ///
    /// Use [`crate::profile::MapProfile::tile_key`] for a checked key.
    pub fn new(lod: u32, x: u32, y: u32) -> Self {
        Self { lod, x, y }
    }

    /// The key one level up that covers this tile, or `None` at LOD 0.
    pub fn parent(&self) -> Option<TileKey> {
        if self.lod == 0 {
            return None;
        }
        Some(TileKey {
            lod: self.lod - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// The four keys one level down, in NW, NE, SW, SE order.
    ///
    /// `None` when the children's positions do not fit in a `u32`.
    pub fn children(&self) -> Option<[TileKey; 4]> {
        let lod = self.lod.checked_add(1)?;
        let x = self.x.checked_mul(2)?;
        let y = self.y.checked_mul(2)?;
        Some([
            TileKey::new(lod, x, y),
            TileKey::new(lod, x + 1, y),
            TileKey::new(lod, x, y + 1),
            TileKey::new(lod, x + 1, y + 1),
        ])
    }

    /// Position of this key within its parent (0 = NW, 1 = NE, 2 = SW, 3 = SE).
    pub fn quadrant(&self) -> u8 {
        (((self.y & 1) << 1) | (self.x & 1)) as u8
    }

    /// Whether `other` is this key or lies beneath it in the quadtree.
    pub fn is_ancestor_of(&self, other: &TileKey) -> bool {
        if other.lod < self.lod {
            return false;
        }
        let shift = other.lod - self.lod;
        // Shifting a u32 by 32 or more leaves nothing but the root column.
        let x = other.x.checked_shr(shift).unwrap_or(0);
        let y = other.y.checked_shr(shift).unwrap_or(0);
        x == self.x && y == self.y
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.lod, self.x, self.y)
    }
}

/// Axis-aligned rectangle in a profile's coordinate system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Extent {
    /// Create a new extent.
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Whether the point lies inside or on the edge of this extent.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }

    /// Whether the extent has positive, finite area.
    pub fn is_valid(&self) -> bool {
        [self.xmin, self.ymin, self.xmax, self.ymax]
            .iter()
            .all(|v| v.is_finite())
            && self.xmax > self.xmin
            && self.ymax > self.ymin
    }
}

/// Convert longitude/latitude (degrees) to spherical mercator meters.
///
/// Returns `None` for latitudes mercator cannot represent.
#[inline]
pub fn lon_lat_to_mercator(lon: f64, lat: f64) -> Option<(f64, f64)> {
    if !(-MAX_MERCATOR_LAT..=MAX_MERCATOR_LAT).contains(&lat) || !(-180.0..=180.0).contains(&lon)
    {
        return None;
    }
    let x = lon.to_radians() * EARTH_RADIUS_M;
    let y = lat.to_radians().tan().asinh() * EARTH_RADIUS_M;
    Some((x, y))
}

/// Convert spherical mercator meters to longitude/latitude (degrees).
#[inline]
pub fn mercator_to_lon_lat(x: f64, y: f64) -> Option<(f64, f64)> {
    if x.abs() > MERCATOR_HALF_EXTENT || y.abs() > MERCATOR_HALF_EXTENT {
        return None;
    }
    let lon = (x / EARTH_RADIUS_M).to_degrees();
    let lat = (y / EARTH_RADIUS_M).sinh().atan().to_degrees();
    Some((lon, lat))
}
