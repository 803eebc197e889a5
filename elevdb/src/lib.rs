//! # elevdb - cached elevation-cell database
//!
//! Answers "height at this point" queries from a mosaic of on-disk elevation
//! cells (DTED, SRTM `.hgt`, and single-band GeoTIFF DEMs) too large to hold
//! in memory at once.
//!
//! ## Features
//!
//! - **Bounded**: at most `max_open_cells` files open at any time, LRU evicted
//! - **Lazy**: a cell is opened on the first query that touches it
//! - **Thread-safe**: every query takes `&self`; concurrent misses on one cell
//!   open it once
//! - **Robust**: a corrupt or missing cell yields `NaN` for its own region only
//! - **Geoid aware**: heights above MSL or above the ellipsoid
//!
//! ## Quick Start
//!
//! ```no_run
//! use elevdb::{DatabaseBuilder, ElevationDatabase, GeoPoint};
//!
//! let db = DatabaseBuilder::new("/data/dted").open_dted()?;
//!
//! let point = GeoPoint::new(27.5, -80.5);
//! let height = db.height_above_msl(&point);
//! if height.is_nan() {
//!     println!("no coverage");
//! } else {
//!     println!("{height:.1} m");
//! }
//! # Ok::<(), elevdb::ElevationError>(())
//! ```
//!
//! ## Layouts
//!
//! - **DTED**: `root/{e|w}DDD/{n|s}DD.dt{0,1,2}`
//! - **SRTM**: `root/{N|S}DD{E|W}DDD.hgt`, 1201² or 3601² (any square works)
//! - **GeoTIFF**: `root/**/*.tif` with ModelTiepoint and ModelPixelScale tags
//!
//! Heights between posts are bilinearly interpolated. NULL posts
//! (`-32767` in DTED, `-32768` in SRTM, nodata in GeoTIFF) are left out and
//! the remaining weights renormalized.

pub mod cache;
pub mod cell;
pub mod config;
pub mod database;
pub mod error;
pub mod filename;
pub mod geo;
pub mod geoid;
pub mod manager;
pub mod post;
pub mod walker;

#[cfg(test)]
mod test_support;

// Re-export main types at crate root for convenience
pub use cache::{CacheStats, CellFactory, ElevationCellCache};
pub use cell::{
    AccessMode, AccuracyInfo, CellFormat, CellHandler, CellOptions, CellStatus, DtedCell,
    PostSummary, SrtmCell,
};
#[cfg(feature = "geotiff")]
pub use cell::ImageCell;
pub use config::{DatabaseBuilder, DatabaseConfig};
#[cfg(feature = "geotiff")]
pub use database::ImageDatabase;
pub use database::{DatabaseConnection, DtedDatabase, ElevationDatabase, SrtmDatabase};
pub use error::{ElevationError, ErrorCategory, Result};
pub use geo::{CellBounds, CellId, GeoPoint};
pub use geoid::{GeoidModel, GridGeoid, IdentityGeoid};
pub use manager::ElevationManager;
pub use walker::DirectoryWalker;
