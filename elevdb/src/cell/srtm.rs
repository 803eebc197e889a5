//! SRTM `.hgt` cells.
//!
//! An `.hgt` file is a headerless square grid of big-endian two's complement
//! `i16` posts, stored north to south and west to east. The grid size is
//! inferred from the file size: 1201² for SRTM3, 3601² for SRTM1, and any
//! other `n × n × 2` bytes is accepted too.

use std::io;
use std::path::{Path, PathBuf};

use super::source::{PostSource, SourceSlot};
use super::{
    open_source, AccuracyInfo, CellFormat, CellHandler, CellOptions, CellStatus, GridGeometry,
};
use crate::error::{ElevationError, Result};
use crate::filename::srtm_filename_to_lat_lon;
use crate::geo::{CellBounds, GeoPoint};
use crate::post::{interpolate, PostCodec};

/// Posts per side for SRTM1 (1 arc-second).
pub const SRTM1_SAMPLES: usize = 3601;

/// Posts per side for SRTM3 (3 arc-second).
pub const SRTM3_SAMPLES: usize = 1201;

/// Nominal SRTM CE90 in meters.
const SRTM_CE90: f64 = 20.0;

/// Nominal SRTM LE90 in meters.
const SRTM_LE90: f64 = 16.0;

/// Side length of the square grid stored in `size` bytes.
///
/// # Errors
///
/// Returns [`ElevationError::InvalidFileSize`] unless `size == n * n * 2` for
/// some `n >= 2`.
pub fn grid_side(size: u64) -> Result<usize> {
    let posts = size / 2;
    let side = (posts as f64).sqrt().round() as u64;
    if side < 2 || side * side * 2 != size {
        return Err(ElevationError::InvalidFileSize { size });
    }
    Ok(side as usize)
}

/// Product name and accuracy for a given post spacing.
pub fn accuracy_for_spacing(spacing_meters: f64) -> AccuracyInfo {
    let name = if spacing_meters >= 100.0 {
        "SRTM30"
    } else if spacing_meters >= 40.0 {
        "SRTM3"
    } else {
        "SRTM1"
    };
    AccuracyInfo::new(SRTM_CE90, SRTM_LE90, name)
}

/// A 1°×1° SRTM tile.
#[derive(Debug)]
pub struct SrtmCell {
    path: PathBuf,
    options: CellOptions,
    base_lat: i32,
    base_lon: i32,
    file_len: u64,
    geometry: GridGeometry,
    slot: SourceSlot<PostSource>,
}

impl SrtmCell {
    /// Open a tile whose southwest corner is `(base_lat, base_lon)`.
    pub fn open<P: AsRef<Path>>(
        path: P,
        options: CellOptions,
        base_lat: i32,
        base_lon: i32,
    ) -> Result<Self> {
        let path = path.as_ref();
        let source = open_source(path, options.access)?;
        let file_len = source.len()?;
        let samples = grid_side(file_len)?;
        let spacing = 1.0 / (samples - 1) as f64;

        let geometry = GridGeometry {
            north: f64::from(base_lat) + 1.0,
            west: f64::from(base_lon),
            lat_spacing: spacing,
            lon_spacing: spacing,
            rows: samples,
            cols: samples,
        };

        tracing::debug!(path = %path.display(), samples, "opened SRTM cell");

        Ok(Self {
            path: path.to_path_buf(),
            options,
            base_lat,
            base_lon,
            file_len,
            geometry,
            slot: SourceSlot::open(path, source),
        })
    }

    /// Open a tile, taking the southwest corner from its filename.
    pub fn open_path<P: AsRef<Path>>(path: P, options: CellOptions) -> Result<Self> {
        let path = path.as_ref();
        let (lat, lon) = path
            .to_str()
            .and_then(srtm_filename_to_lat_lon)
            .ok_or_else(|| ElevationError::InvalidFilename(path.display().to_string()))?;
        Self::open(path, options, lat, lon)
    }

    /// Posts per side.
    pub fn samples(&self) -> usize {
        self.geometry.rows
    }

    /// Southwest corner.
    pub fn base(&self) -> (i32, i32) {
        (self.base_lat, self.base_lon)
    }

    fn read_post(&self, source: &PostSource, row: usize, col: usize) -> io::Result<Option<f64>> {
        let offset = ((row * self.samples() + col) * 2) as u64;
        let word = source.read_word(offset)?;
        Ok(PostCodec::SRTM.decode(word).map(f64::from))
    }

    fn reload(&self) -> Result<PostSource> {
        let source = open_source(&self.path, self.options.access)?;
        let size = source.len()?;
        if size != self.file_len {
            return Err(ElevationError::InvalidFileSize { size });
        }
        Ok(source)
    }
}

impl CellHandler for SrtmCell {
    fn format(&self) -> CellFormat {
        CellFormat::Srtm
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<()> {
        self.slot.reopen_with(|| self.reload())
    }

    fn close(&self) {
        self.slot.close();
    }

    fn status(&self) -> CellStatus {
        self.slot.status()
    }

    fn bounds(&self) -> CellBounds {
        CellBounds::for_tile(self.base_lat, self.base_lon)
    }

    fn size_of_elev_cell(&self) -> (usize, usize) {
        (self.geometry.rows, self.geometry.cols)
    }

    fn mean_spacing_meters(&self) -> f64 {
        self.geometry.mean_spacing_meters()
    }

    fn post(&self, row: usize, col: usize) -> Result<Option<f64>> {
        let samples = self.samples();
        if row >= samples || col >= samples {
            return Err(ElevationError::OutOfBounds {
                lat: self.geometry.north - row as f64 * self.geometry.lat_spacing,
                lon: self.geometry.west + col as f64 * self.geometry.lon_spacing,
            });
        }

        self.slot.read(|source| self.read_post(source, row, col))
    }

    fn height_above_msl(&self, point: &GeoPoint) -> Result<f64> {
        let position = self.geometry.position(point)?;
        self.slot.read(|source| {
            interpolate(&position, |row, col| self.read_post(source, row, col))
        })
    }

    fn accuracy_info(&self, point: &GeoPoint) -> Option<AccuracyInfo> {
        self.bounds()
            .contains(point)
            .then(|| accuracy_for_spacing(self.mean_spacing_meters()))
    }
}
