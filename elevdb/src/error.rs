//! Error types for the elevdb library.

use std::path::PathBuf;
use thiserror::Error;

use crate::cell::CellFormat;

/// Errors that can occur when opening databases, cells, or geoid grids.
///
/// Point queries never return these; they surface failures as `NaN`,
/// `false` or `None` and log the cause through `tracing`.
#[derive(Error, Debug)]
pub enum ElevationError {
    /// IO error when reading files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The database root does not exist.
    #[error("Database root not found: {path}")]
    RootNotFound { path: PathBuf },

    /// The database root exists but is not a directory.
    #[error("Database root is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// The layout probe found no usable cell within its file budget.
    #[error("No {format} cells found under {root} (probed {probed} files)")]
    NoCellsFound {
        root: PathBuf,
        format: CellFormat,
        probed: usize,
    },

    /// A configuration value is out of range or unparseable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The cell file for a coordinate does not exist.
    #[error("Cell file not found: {path}")]
    CellNotFound { path: PathBuf },

    /// A header record did not start with its recognition sentinel.
    #[error("{path}: expected {expected} record, found {found:?}")]
    InvalidSentinel {
        path: PathBuf,
        expected: &'static str,
        found: String,
    },

    /// A header field could not be parsed.
    #[error("{path}: invalid {field} field {value:?}")]
    InvalidHeader {
        path: PathBuf,
        field: &'static str,
        value: String,
    },

    /// The file is shorter than its header says it should be.
    #[error("{path}: truncated, expected {expected} bytes but file has {actual}")]
    Truncated {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// A DTED data record failed checksum verification.
    #[error("{path}: checksum mismatch in data record {record} (stored {stored:#010x}, computed {computed:#010x})")]
    ChecksumMismatch {
        path: PathBuf,
        record: usize,
        stored: u32,
        computed: u32,
    },

    /// File size is not a square grid of 16-bit posts.
    #[error("Invalid file size: {size} bytes is not a square grid of 16-bit posts")]
    InvalidFileSize { size: u64 },

    /// A cell filename does not follow its format's naming convention.
    #[error("Invalid cell filename: {0}")]
    InvalidFilename(String),

    /// The handler was closed (evicted) while the caller still held it.
    #[error("Cell {path} is closed")]
    CellClosed { path: PathBuf },

    /// The handler hit a read or format failure and must be discarded.
    #[error("Cell {path} is invalid")]
    CellInvalid { path: PathBuf },

    /// Coordinates are outside the cell's coverage.
    #[error("Coordinates out of bounds: lat={lat}, lon={lon}")]
    OutOfBounds { lat: f64, lon: f64 },

    /// TIFF decoding error.
    #[cfg(feature = "geotiff")]
    #[error("TIFF decode error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// GeoTIFF is missing georeferencing tags or has an unusable layout.
    #[error("Invalid GeoTIFF {path}: {reason}")]
    InvalidGeoTiff { path: PathBuf, reason: String },

    /// Geoid grid file is malformed.
    #[error("Invalid geoid grid: {0}")]
    InvalidGeoidGrid(String),
}

/// Coarse classification of an [`ElevationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Root path missing, not a directory, or bad settings.
    Configuration,
    /// Bad sentinel, checksum, size, or header; the cell is unusable.
    Format,
    /// The point is outside any cell. Never fatal.
    CoverageMiss,
    /// Read failure. Handlers treat it like a format error.
    Io,
}

impl ElevationError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ElevationError::RootNotFound { .. }
            | ElevationError::NotADirectory { .. }
            | ElevationError::NoCellsFound { .. }
            | ElevationError::InvalidConfig(_) => ErrorCategory::Configuration,
            ElevationError::CellNotFound { .. } | ElevationError::OutOfBounds { .. } => {
                ErrorCategory::CoverageMiss
            }
            ElevationError::Io(_) | ElevationError::CellClosed { .. } => ErrorCategory::Io,
            _ => ErrorCategory::Format,
        }
    }
}

/// Result type alias using [`ElevationError`].
pub type Result<T> = std::result::Result<T, ElevationError>;
