//! Geoid models for MSL ⇄ ellipsoid conversion.
//!
//! A [`GeoidModel`] returns the geoid undulation N at a point, so that
//! `height_above_ellipsoid = height_above_msl + N`. Databases receive the model
//! at construction as an `Arc<dyn GeoidModel>`.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::{ElevationError, Result};
use crate::geo::GeoPoint;

/// Geoid undulation lookup.
pub trait GeoidModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Height of the geoid above the ellipsoid at `point`, in meters.
    fn offset_from_ellipsoid(&self, point: &GeoPoint) -> f64;
}

/// Zero offset everywhere: MSL and ellipsoid heights coincide.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityGeoid;

impl GeoidModel for IdentityGeoid {
    fn name(&self) -> &str {
        "identity"
    }

    fn offset_from_ellipsoid(&self, _point: &GeoPoint) -> f64 {
        0.0
    }
}

/// A regular lat/lon undulation grid with bilinear interpolation.
///
/// Rows run north to south, columns west to east. Longitudes wrap, so a
/// global grid answers for any longitude.
#[derive(Debug, Clone)]
pub struct GridGeoid {
    name: String,
    south: f64,
    north: f64,
    west: f64,
    east: f64,
    dlat: f64,
    dlon: f64,
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl GridGeoid {
    /// Build a grid from its extent, spacing and row-major values
    /// (north row first).
    pub fn new(
        name: impl Into<String>,
        (south, north, west, east): (f64, f64, f64, f64),
        (dlat, dlon): (f64, f64),
        values: Vec<f64>,
    ) -> Result<Self> {
        if !(dlat > 0.0 && dlon > 0.0) || north <= south || east <= west {
            return Err(ElevationError::InvalidGeoidGrid(format!(
                "bad extent {south} {north} {west} {east} / spacing {dlat} {dlon}"
            )));
        }

        let rows = ((north - south) / dlat).round() as usize + 1;
        let cols = ((east - west) / dlon).round() as usize + 1;
        if values.len() != rows * cols {
            return Err(ElevationError::InvalidGeoidGrid(format!(
                "expected {rows}x{cols} = {} values, found {}",
                rows * cols,
                values.len()
            )));
        }

        Ok(Self {
            name: name.into(),
            south,
            north,
            west,
            east,
            dlat,
            dlon,
            rows,
            cols,
            values,
        })
    }

    /// Parse the EGM96 `.grd` ASCII format.
    ///
    /// The first six numbers are `south north west east dlat dlon`; the rest
    /// are undulations in meters, north row first.
    pub fn parse_grd(name: impl Into<String>, text: &str) -> Result<Self> {
        let mut numbers = text.split_whitespace().map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| ElevationError::InvalidGeoidGrid(format!("not a number: {token:?}")))
        });

        let mut header = [0.0; 6];
        for slot in header.iter_mut() {
            *slot = numbers
                .next()
                .ok_or_else(|| ElevationError::InvalidGeoidGrid("short header".to_string()))??;
        }
        let values = numbers.collect::<Result<Vec<f64>>>()?;

        let [south, north, west, east, dlat, dlon] = header;
        Self::new(name, (south, north, west, east), (dlat, dlon), values)
    }

    /// Load a `.grd` file. The model is named after the file stem.
    pub fn from_grd_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "geoid".to_string());
        let grid = Self::parse_grd(name, &text)?;

        tracing::info!(
            path = %path.display(),
            rows = grid.rows,
            cols = grid.cols,
            "loaded geoid grid"
        );
        Ok(grid)
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn value(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.cols + col]
    }

    /// Whether the columns cover all 360° (with or without a repeated seam).
    fn is_global(&self) -> bool {
        self.east - self.west + self.dlon >= 360.0 - 1e-6
    }
}

impl GeoidModel for GridGeoid {
    fn name(&self) -> &str {
        &self.name
    }

    fn offset_from_ellipsoid(&self, point: &GeoPoint) -> f64 {
        let lat = point.lat.clamp(self.south, self.north);
        let row = ((self.north - lat) / self.dlat).clamp(0.0, (self.rows - 1) as f64);

        let lon = self.west + (point.lon - self.west).rem_euclid(360.0);
        let col = ((lon - self.west) / self.dlon).max(0.0);

        let row0 = (row.floor() as usize).min(self.rows - 1);
        let row1 = (row0 + 1).min(self.rows - 1);
        let fr = row - row0 as f64;

        let mut col0 = col.floor() as usize;
        let mut fc = col - col0 as f64;
        let mut col1 = col0 + 1;
        if col0 >= self.cols - 1 {
            if self.is_global() {
                // Between the last column and the seam.
                col0 = self.cols - 1;
                col1 = if col1 >= self.cols { 0 } else { col1 };
            } else {
                col0 = self.cols - 1;
                col1 = col0;
                fc = 0.0;
            }
        }

        let top = self.value(row0, col0) * (1.0 - fc) + self.value(row0, col1) * fc;
        let bottom = self.value(row1, col0) * (1.0 - fc) + self.value(row1, col1) * fc;
        top * (1.0 - fr) + bottom * fr
    }
}
