//! Per-format elevation databases.
//!
//! A database is a root directory of cells plus an [`ElevationCellCache`] of
//! open handlers. Every format shares [`CellDatabase`]; a layout type supplies
//! the format-specific parts (which cell covers a point, how to open it, and
//! how to confirm the root holds that format).

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cache::{CacheStats, CellFactory, ElevationCellCache};
use crate::cell::{AccuracyInfo, CellFormat};
use crate::config::DatabaseConfig;
use crate::error::{ElevationError, Result};
use crate::geo::GeoPoint;
use crate::geoid::GeoidModel;

pub mod dted;
#[cfg(feature = "geotiff")]
pub mod image;
pub mod srtm;

pub use dted::{DtedDatabase, DtedLayout};
#[cfg(feature = "geotiff")]
pub use image::{ImageDatabase, ImageLayout};
pub use srtm::{SrtmDatabase, SrtmLayout};

/// Height queries over one root of elevation cells.
///
/// Point queries never fail: a point without coverage, or inside a cell that
/// cannot be read, yields `NaN`, `false` or `None`.
pub trait ElevationDatabase: Send + Sync + fmt::Debug {
    /// Where the database lives and how it was opened.
    fn connection(&self) -> &DatabaseConnection;

    /// Height above mean sea level in meters, `NaN` without coverage.
    fn height_above_msl(&self, point: &GeoPoint) -> f64;

    /// Height above the ellipsoid: MSL height plus the geoid undulation.
    fn height_above_ellipsoid(&self, point: &GeoPoint) -> f64 {
        let msl = self.height_above_msl(point);
        if msl.is_nan() {
            return msl;
        }
        msl + self.connection().geoid.offset_from_ellipsoid(point)
    }

    /// Whether a readable cell covers `point`.
    fn point_has_coverage(&self, point: &GeoPoint) -> bool;

    fn accuracy_info(&self, point: &GeoPoint) -> Option<AccuracyInfo>;

    /// Mean post spacing in meters, as measured when the database opened.
    fn mean_spacing_meters(&self) -> f64 {
        self.connection().mean_spacing_meters
    }

    fn cache_stats(&self) -> CacheStats;

    /// Close every cached cell. Later queries return `NaN`.
    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Settings a database was opened with, plus what the open probe found.
#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    pub root: PathBuf,
    pub format: CellFormat,
    /// Cell file extension, e.g. `dt1` or `hgt`.
    pub extension: Option<String>,
    pub mean_spacing_meters: f64,
    pub geoid: Arc<dyn GeoidModel>,
    pub max_open_cells: u64,
}

/// A database over any cell layout.
#[derive(Debug)]
pub struct CellDatabase<L> {
    connection: DatabaseConnection,
    cache: ElevationCellCache<L>,
    closed: AtomicBool,
}

impl<L: CellFactory> CellDatabase<L> {
    fn new(connection: DatabaseConnection, layout: L, config: &DatabaseConfig) -> Self {
        tracing::info!(
            root = %connection.root.display(),
            format = %connection.format,
            extension = connection.extension.as_deref().unwrap_or(""),
            spacing_m = connection.mean_spacing_meters,
            geoid = connection.geoid.name(),
            max_open_cells = config.max_open_cells,
            "opened elevation database"
        );

        Self {
            cache: ElevationCellCache::new(
                layout,
                config.max_open_cells,
                config.negative_cache_ttl,
            ),
            connection,
            closed: AtomicBool::new(false),
        }
    }

    pub fn layout(&self) -> &L {
        self.cache.factory()
    }

    pub fn cache(&self) -> &ElevationCellCache<L> {
        &self.cache
    }

    fn accepts(&self, point: &GeoPoint) -> bool {
        !self.is_closed_inner() && point.is_valid()
    }

    fn is_closed_inner(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<L: CellFactory + fmt::Debug> ElevationDatabase for CellDatabase<L> {
    fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    fn height_above_msl(&self, point: &GeoPoint) -> f64 {
        if !self.accepts(point) {
            return f64::NAN;
        }
        self.cache
            .query(point, |cell| cell.height_above_msl(point))
            .unwrap_or(f64::NAN)
    }

    fn point_has_coverage(&self, point: &GeoPoint) -> bool {
        self.accepts(point)
            && self
                .cache
                .query(point, |cell| Ok(cell.bounds().contains(point)))
                .unwrap_or(false)
    }

    fn accuracy_info(&self, point: &GeoPoint) -> Option<AccuracyInfo> {
        if !self.accepts(point) {
            return None;
        }
        self.cache
            .query(point, |cell| Ok(cell.accuracy_info(point)))
            .flatten()
    }

    fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.cache.clear();
            tracing::info!(root = %self.connection.root.display(), "closed elevation database");
        }
    }

    fn is_closed(&self) -> bool {
        self.is_closed_inner()
    }
}

/// Fail unless `root` is an existing directory.
pub(crate) fn validate_root(root: &Path) -> Result<()> {
    let metadata = fs::metadata(root).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ElevationError::RootNotFound {
            path: root.to_path_buf(),
        },
        _ => ElevationError::Io(e),
    })?;
    if !metadata.is_dir() {
        return Err(ElevationError::NotADirectory {
            path: root.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseBuilder;
    use crate::geoid::GridGeoid;
    use crate::test_support::write_srtm;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    #[test]
    fn test_validate_root() {
        let dir = TempDir::new().unwrap();
        assert!(validate_root(dir.path()).is_ok());

        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(
            validate_root(&file),
            Err(ElevationError::NotADirectory { .. })
        ));
        assert!(matches!(
            validate_root(&dir.path().join("missing")),
            Err(ElevationError::RootNotFound { .. })
        ));
    }

    #[test]
    fn test_ellipsoid_adds_geoid_offset() {
        let dir = TempDir::new().unwrap();
        write_srtm(dir.path(), "N10E020.hgt", 3, |_, _| 100);

        // Constant 25 m undulation everywhere.
        let geoid = GridGeoid::parse_grd("flat", "-90 90 0 180 180 180 25 25 25 25").unwrap();
        let db = DatabaseBuilder::new(dir.path())
            .geoid(Arc::new(geoid))
            .open_srtm()
            .unwrap();

        let point = GeoPoint::new(10.5, 20.5);
        assert_relative_eq!(db.height_above_msl(&point), 100.0);
        assert_relative_eq!(db.height_above_ellipsoid(&point), 125.0);

        // No coverage stays NaN.
        assert!(db.height_above_ellipsoid(&GeoPoint::new(40.5, 20.5)).is_nan());
    }

    #[test]
    fn test_closed_database_answers_nothing() {
        let dir = TempDir::new().unwrap();
        write_srtm(dir.path(), "N10E020.hgt", 3, |_, _| 100);
        let db = DatabaseBuilder::new(dir.path()).open_srtm().unwrap();

        let point = GeoPoint::new(10.5, 20.5);
        assert!(db.point_has_coverage(&point));
        db.close();
        assert!(db.is_closed());
        assert!(db.height_above_msl(&point).is_nan());
        assert!(!db.point_has_coverage(&point));
        assert!(db.accuracy_info(&point).is_none());
        assert_eq!(db.cache().open_cell_count(), 0);
    }

    #[test]
    fn test_invalid_point() {
        let dir = TempDir::new().unwrap();
        write_srtm(dir.path(), "N10E020.hgt", 3, |_, _| 100);
        let db = DatabaseBuilder::new(dir.path()).open_srtm().unwrap();

        assert!(db.height_above_msl(&GeoPoint::new(f64::NAN, 20.5)).is_nan());
        assert!(!db.point_has_coverage(&GeoPoint::new(95.0, 20.5)));
        assert_eq!(db.cache_stats().miss_count, 0);
    }
}
