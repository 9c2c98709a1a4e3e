//! Map profiles: coordinate system, tiling and vertical datum.
//!
//! A [`MapProfile`] is fixed when a [`crate::terrain::Terrain`] is built and
//! never changes afterward. It answers two questions for the rest of the
//! crate: where a [`TileKey`] sits on the map, and how an ellipsoidal height
//! relates to mean sea level.

use std::fmt;

use thiserror::Error;

use crate::coord::{
    lon_lat_to_mercator, mercator_to_lon_lat, Extent, TileKey, TileKeyError, MAX_LOD,
    MERCATOR_HALF_EXTENT,
};

/// Errors produced when building a profile.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProfileError {
    /// Extent is empty, inverted or not finite.
    #[error("invalid profile extent {0:?}")]
    InvalidExtent(Extent),

    /// LOD 0 needs at least one tile in each direction, and the deepest LOD
    /// must still be addressable with `u32` columns and rows.
    #[error("invalid root tiling {wide}x{high}")]
    InvalidTiling { wide: u32, high: u32 },

    /// Extent does not fit inside the coordinate system's domain.
    #[error("extent {extent:?} lies outside the {srs} domain")]
    OutsideDomain {
        srs: SpatialReference,
        extent: Extent,
    },
}

/// Horizontal coordinate systems a query may be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialReference {
    /// WGS84 longitude/latitude in degrees.
    Geographic,
    /// Spherical (Web) mercator in meters.
    SphericalMercator,
}

impl SpatialReference {
    /// Domain of valid coordinates in this system.
    pub fn domain(&self) -> Extent {
        match self {
            SpatialReference::Geographic => Extent::new(-180.0, -90.0, 180.0, 90.0),
            SpatialReference::SphericalMercator => Extent::new(
                -MERCATOR_HALF_EXTENT,
                -MERCATOR_HALF_EXTENT,
                MERCATOR_HALF_EXTENT,
                MERCATOR_HALF_EXTENT,
            ),
        }
    }

    /// Transform a point from this system into `target`.
    ///
    /// Returns `None` when the point has no representation in `target`.
    pub fn transform_to(&self, target: SpatialReference, x: f64, y: f64) -> Option<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        match (*self, target) {
            (a, b) if a == b => Some((x, y)),
            (SpatialReference::Geographic, SpatialReference::SphericalMercator) => {
                lon_lat_to_mercator(x, y)
            }
            (SpatialReference::SphericalMercator, SpatialReference::Geographic) => {
                mercator_to_lon_lat(x, y)
            }
            _ => None,
        }
    }

    /// Parse a config value (`geographic`, `wgs84`, `mercator`, ...).
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "geographic" | "wgs84" | "epsg:4326" => Some(SpatialReference::Geographic),
            "mercator" | "spherical-mercator" | "epsg:3857" => {
                Some(SpatialReference::SphericalMercator)
            }
            _ => None,
        }
    }
}

impl fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpatialReference::Geographic => write!(f, "EPSG:4326"),
            SpatialReference::SphericalMercator => write!(f, "EPSG:3857"),
        }
    }
}

/// Relationship between ellipsoidal heights and mean sea level.
#[derive(Debug, Clone, PartialEq)]
pub enum VerticalDatum {
    /// Heights are reported against the ellipsoid; MSL equals HAE.
    Ellipsoid,
    /// A single geoid undulation applied everywhere (MSL = HAE - undulation).
    GeoidOffset {
        name: String,
        undulation_m: f64,
    },
}

impl VerticalDatum {
    /// Convert a height above the ellipsoid into a height above MSL.
    pub fn to_msl(&self, height_above_ellipsoid: f64) -> f64 {
        match self {
            VerticalDatum::Ellipsoid => height_above_ellipsoid,
            VerticalDatum::GeoidOffset { undulation_m, .. } => {
                height_above_ellipsoid - undulation_m
            }
        }
    }
}

/// Immutable description of the map a terrain renders.
#[derive(Debug, Clone, PartialEq)]
pub struct MapProfile {
    srs: SpatialReference,
    extent: Extent,
    tiles_wide: u32,
    tiles_high: u32,
    geocentric: bool,
    vertical_datum: VerticalDatum,
}

impl MapProfile {
    /// Create a profile with a validated extent and root tiling.
    pub fn new(
        srs: SpatialReference,
        extent: Extent,
        tiles_wide: u32,
        tiles_high: u32,
    ) -> Result<Self, ProfileError> {
        if !extent.is_valid() {
            return Err(ProfileError::InvalidExtent(extent));
        }
        if tiles_wide == 0
            || tiles_high == 0
            || scaled_count(tiles_wide, MAX_LOD).is_none()
            || scaled_count(tiles_high, MAX_LOD).is_none()
        {
            return Err(ProfileError::InvalidTiling {
                wide: tiles_wide,
                high: tiles_high,
            });
        }
        let domain = srs.domain();
        if !domain.contains(extent.xmin, extent.ymin) || !domain.contains(extent.xmax, extent.ymax)
        {
            return Err(ProfileError::OutsideDomain { srs, extent });
        }
        Ok(Self {
            srs,
            extent,
            tiles_wide,
            tiles_high,
            geocentric: false,
            vertical_datum: VerticalDatum::Ellipsoid,
        })
    }

    /// Whole-earth geographic profile with two root tiles, rendered as a globe.
    pub fn global_geodetic() -> Self {
        Self {
            srs: SpatialReference::Geographic,
            extent: SpatialReference::Geographic.domain(),
            tiles_wide: 2,
            tiles_high: 1,
            geocentric: true,
            vertical_datum: VerticalDatum::Ellipsoid,
        }
    }

    /// Web mercator profile with a single root tile, rendered flat.
    pub fn spherical_mercator() -> Self {
        Self {
            srs: SpatialReference::SphericalMercator,
            extent: SpatialReference::SphericalMercator.domain(),
            tiles_wide: 1,
            tiles_high: 1,
            geocentric: false,
            vertical_datum: VerticalDatum::Ellipsoid,
        }
    }

    /// Set whether the map is rendered as a round earth.
    pub fn with_geocentric(mut self, geocentric: bool) -> Self {
        self.geocentric = geocentric;
        self
    }

    /// Set the vertical datum used to derive MSL heights.
    pub fn with_vertical_datum(mut self, datum: VerticalDatum) -> Self {
        self.vertical_datum = datum;
        self
    }

    pub fn srs(&self) -> SpatialReference {
        self.srs
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn is_geocentric(&self) -> bool {
        self.geocentric
    }

    pub fn vertical_datum(&self) -> &VerticalDatum {
        &self.vertical_datum
    }

    /// Number of columns and rows at the given level of detail.
    ///
    /// Saturates at `u32::MAX` beyond [`MAX_LOD`].
    pub fn tile_count(&self, lod: u32) -> (u32, u32) {
        self.checked_tile_count(lod).unwrap_or((u32::MAX, u32::MAX))
    }

    /// Number of columns and rows, or `None` when `lod` is not addressable.
    pub fn checked_tile_count(&self, lod: u32) -> Option<(u32, u32)> {
        if lod > MAX_LOD {
            return None;
        }
        Some((
            scaled_count(self.tiles_wide, lod)?,
            scaled_count(self.tiles_high, lod)?,
        ))
    }

    /// Build a key, checking it lies inside this profile's tiling.
    pub fn tile_key(&self, lod: u32, x: u32, y: u32) -> Result<TileKey, TileKeyError> {
        if lod > MAX_LOD {
            return Err(TileKeyError::InvalidLod(lod));
        }
        let (width, height) = self.tile_count(lod);
        if x >= width || y >= height {
            return Err(TileKeyError::OutOfRange {
                lod,
                x,
                y,
                width,
                height,
            });
        }
        Ok(TileKey::new(lod, x, y))
    }

    /// The area a key covers, in this profile's coordinate system.
    pub fn tile_extent(&self, key: &TileKey) -> Extent {
        let (cols, rows) = self.tile_count(key.lod);
        let tile_w = self.extent.width() / cols as f64;
        let tile_h = self.extent.height() / rows as f64;
        let xmin = self.extent.xmin + key.x as f64 * tile_w;
        let ymax = self.extent.ymax - key.y as f64 * tile_h;
        Extent::new(xmin, ymax - tile_h, xmin + tile_w, ymax)
    }

    /// The key at `lod` whose extent contains the point, if any.
    ///
    /// Points on a shared edge resolve to the eastern/southern tile, except on
    /// the profile's own east and south edges.
    pub fn tile_key_at(&self, x: f64, y: f64, lod: u32) -> Option<TileKey> {
        if !self.extent.contains(x, y) {
            return None;
        }
        let (cols, rows) = self.checked_tile_count(lod)?;
        let u = (x - self.extent.xmin) / self.extent.width();
        let v = (self.extent.ymax - y) / self.extent.height();
        let col = ((u * cols as f64) as u32).min(cols - 1);
        let row = ((v * rows as f64) as u32).min(rows - 1);
        Some(TileKey::new(lod, col, row))
    }
}

/// `root * 2^lod`, or `None` if it does not fit in a `u32`.
fn scaled_count(root: u32, lod: u32) -> Option<u32> {
    let scale = 1u64.checked_shl(lod)?;
    let count = u64::from(root).checked_mul(scale)?;
    u32::try_from(count).ok()
}
