//! Elevation cell handlers.
//!
//! A cell is one on-disk elevation file. Every format implements
//! [`CellHandler`], which the cache stores as `Arc<dyn CellHandler>`.
//!
//! Grids are addressed as `(row, col)` with row 0 on the **north** edge and
//! col 0 on the **west** edge, whatever order the file stores posts in.

use std::fmt;
use std::io;
use std::path::Path;
use std::str::FromStr;

use crate::error::{ElevationError, Result};
use crate::geo::{mean_spacing_meters, CellBounds, GeoPoint};
use crate::post::GridPosition;

pub mod dted;
#[cfg(feature = "geotiff")]
pub mod image;
pub mod source;
pub mod srtm;

pub use dted::{DtedCell, DtedHeader};
#[cfg(feature = "geotiff")]
pub use image::{ImageCell, ImageHeader};
pub use source::PostSource;
pub use srtm::SrtmCell;

/// On-disk format of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellFormat {
    Dted,
    Srtm,
    Image,
}

impl fmt::Display for CellFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CellFormat::Dted => "DTED",
            CellFormat::Srtm => "SRTM",
            CellFormat::Image => "GeoTIFF",
        };
        f.write_str(name)
    }
}

/// Handler lifecycle.
///
/// `Closed → Open`, `Closed → Invalid`, `Open → Closed`, `Open → Invalid`.
/// `Invalid` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStatus {
    Closed,
    Open,
    Invalid,
}

/// How post bytes are read from disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Memory-map the whole file.
    #[default]
    Mapped,
    /// Seek and read under a per-handler mutex.
    Streamed,
}

impl FromStr for AccessMode {
    type Err = ElevationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mapped" | "mmap" => Ok(AccessMode::Mapped),
            "streamed" | "stream" => Ok(AccessMode::Streamed),
            other => Err(ElevationError::InvalidConfig(format!(
                "unknown access mode {other:?} (expected \"mapped\" or \"streamed\")"
            ))),
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Mapped => f.write_str("mapped"),
            AccessMode::Streamed => f.write_str("streamed"),
        }
    }
}

/// Options applied when a handler opens its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellOptions {
    pub access: AccessMode,
    /// Verify every DTED data record checksum at open.
    pub verify_checksums: bool,
}

impl Default for CellOptions {
    fn default() -> Self {
        Self {
            access: AccessMode::Mapped,
            verify_checksums: true,
        }
    }
}

/// Horizontal and vertical accuracy at 90% confidence, in meters.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyInfo {
    pub ce90: f64,
    pub le90: f64,
    /// Source product, e.g. `DTED1` or `SRTM3`.
    pub surface_name: String,
}

impl AccuracyInfo {
    pub fn new(ce90: f64, le90: f64, surface_name: impl Into<String>) -> Self {
        Self {
            ce90,
            le90,
            surface_name: surface_name.into(),
        }
    }
}

/// Statistics over every post of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PostSummary {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub valid_count: u64,
    pub null_count: u64,
}

/// One open-able elevation cell.
pub trait CellHandler: Send + Sync + fmt::Debug {
    fn format(&self) -> CellFormat;

    fn path(&self) -> &Path;

    /// Closed → Open. A no-op on an open handler; fails on an invalid one.
    fn open(&self) -> Result<()>;

    /// Release the file. In-flight readers finish against their own reference.
    fn close(&self);

    fn status(&self) -> CellStatus;

    fn is_open(&self) -> bool {
        self.status() == CellStatus::Open
    }

    fn is_valid(&self) -> bool {
        self.status() != CellStatus::Invalid
    }

    /// Coverage rectangle, from the first to the last post.
    fn bounds(&self) -> CellBounds;

    /// Grid dimensions as `(rows, cols)`.
    fn size_of_elev_cell(&self) -> (usize, usize);

    fn mean_spacing_meters(&self) -> f64;

    /// Raw post at `(row, col)`, `None` for NULL.
    fn post(&self, row: usize, col: usize) -> Result<Option<f64>>;

    /// Bilinear height above MSL, `NaN` when every contributing post is NULL.
    fn height_above_msl(&self, point: &GeoPoint) -> Result<f64>;

    fn accuracy_info(&self, point: &GeoPoint) -> Option<AccuracyInfo>;

    /// Walk every post and summarize it.
    fn summarize(&self) -> Result<PostSummary> {
        let (rows, cols) = self.size_of_elev_cell();
        let mut summary = PostSummary::default();
        for row in 0..rows {
            for col in 0..cols {
                match self.post(row, col)? {
                    Some(value) => {
                        summary.valid_count += 1;
                        summary.min = Some(summary.min.map_or(value, |m| m.min(value)));
                        summary.max = Some(summary.max.map_or(value, |m| m.max(value)));
                    }
                    None => summary.null_count += 1,
                }
            }
        }
        Ok(summary)
    }
}

/// Open a cell file, reporting a missing file as [`ElevationError::CellNotFound`].
pub(crate) fn open_source(path: &Path, access: AccessMode) -> Result<PostSource> {
    PostSource::open(path, access).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ElevationError::CellNotFound {
            path: path.to_path_buf(),
        },
        _ => ElevationError::Io(e),
    })
}

/// Placement of a regular post grid on the globe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    /// Latitude of row 0.
    pub north: f64,
    /// Longitude of col 0.
    pub west: f64,
    /// Degrees between rows.
    pub lat_spacing: f64,
    /// Degrees between columns.
    pub lon_spacing: f64,
    pub rows: usize,
    pub cols: usize,
}

impl GridGeometry {
    pub fn bounds(&self) -> CellBounds {
        CellBounds::new(
            self.south(),
            self.west,
            self.north,
            self.west + (self.cols.saturating_sub(1)) as f64 * self.lon_spacing,
        )
    }

    pub fn south(&self) -> f64 {
        self.north - (self.rows.saturating_sub(1)) as f64 * self.lat_spacing
    }

    pub fn mean_spacing_meters(&self) -> f64 {
        mean_spacing_meters(
            self.lat_spacing,
            self.lon_spacing,
            self.bounds().center_lat(),
        )
    }

    /// Fractional grid position of `point`, `None` outside the grid.
    pub fn locate(&self, point: &GeoPoint) -> Option<GridPosition> {
        let row = (self.north - point.lat) / self.lat_spacing;
        let col = (point.lon - self.west) / self.lon_spacing;
        GridPosition::locate(row, col, self.rows, self.cols)
    }

    /// Like [`locate`](Self::locate), but a point off the grid is an error.
    pub(crate) fn position(&self, point: &GeoPoint) -> Result<GridPosition> {
        self.locate(point).ok_or(ElevationError::OutOfBounds {
            lat: point.lat,
            lon: point.lon,
        })
    }
}
