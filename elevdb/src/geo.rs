//! Geographic value types shared by cells, the cache, and databases.

/// Meters per degree of latitude (WGS84 equatorial radius × π / 180).
pub const METERS_PER_DEGREE: f64 = 111_319.490_793_273_6;

/// A geographic point in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lon: f64,
    /// Optional height in meters. Ignored by lookups.
    pub height: Option<f64>,
}

impl GeoPoint {
    /// Create a point without height.
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            height: None,
        }
    }

    /// Create a point carrying a height.
    pub fn with_height(lat: f64, lon: f64, height: f64) -> Self {
        Self {
            lat,
            lon,
            height: Some(height),
        }
    }

    /// `true` if the coordinates are finite and within ±90° / ±180°.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

/// Cache key identifying exactly one on-disk cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CellId {
    /// A 1°×1° tile keyed by its southwest corner.
    Tile { lat: i32, lon: i32 },
    /// An image cell keyed by its position in the database's image index.
    Image(u32),
}

impl CellId {
    /// The 1° tile containing `point`: `(floor(lat), floor(lon))`.
    pub fn tile_for(point: &GeoPoint) -> Self {
        CellId::Tile {
            lat: point.lat.floor() as i32,
            lon: point.lon.floor() as i32,
        }
    }
}

/// A geographic coverage rectangle. Edges are inclusive.
///
/// Coordinates are in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBounds {
    /// Minimum latitude (southern boundary).
    pub min_lat: f64,
    /// Minimum longitude (western boundary).
    pub min_lon: f64,
    /// Maximum latitude (northern boundary).
    pub max_lat: f64,
    /// Maximum longitude (eastern boundary).
    pub max_lon: f64,
}

impl CellBounds {
    /// Create a new rectangle.
    ///
    /// # Arguments
    ///
    /// * `min_lat` - Southern boundary latitude
    /// * `min_lon` - Western boundary longitude
    /// * `max_lat` - Northern boundary latitude
    /// * `max_lon` - Eastern boundary longitude
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// The full 1°×1° square whose southwest corner is `(lat, lon)`.
    pub fn for_tile(lat: i32, lon: i32) -> Self {
        Self::new(lat as f64, lon as f64, (lat + 1) as f64, (lon + 1) as f64)
    }

    /// Check whether `point` lies inside or on the edge of this rectangle.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lat >= self.min_lat
            && point.lat <= self.max_lat
            && point.lon >= self.min_lon
            && point.lon <= self.max_lon
    }

    /// Check if this rectangle overlaps another with non-zero area.
    pub fn overlaps(&self, other: &CellBounds) -> bool {
        self.min_lat < other.max_lat
            && self.max_lat > other.min_lat
            && self.min_lon < other.max_lon
            && self.max_lon > other.min_lon
    }

    /// Latitude of the rectangle's center.
    pub fn center_lat(&self) -> f64 {
        (self.min_lat + self.max_lat) / 2.0
    }
}

/// Mean post spacing in meters for a grid with the given angular spacing.
///
/// Longitude spacing is scaled by `cos(center_lat)` before averaging.
pub fn mean_spacing_meters(lat_spacing_deg: f64, lon_spacing_deg: f64, center_lat: f64) -> f64 {
    let lat_m = lat_spacing_deg * METERS_PER_DEGREE;
    let lon_m = lon_spacing_deg * METERS_PER_DEGREE * center_lat.to_radians().cos();
    (lat_m + lon_m) / 2.0
}
