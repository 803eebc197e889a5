//! Mosaic over several databases.

use crate::cache::CacheStats;
use crate::cell::AccuracyInfo;
use crate::database::ElevationDatabase;
use crate::geo::GeoPoint;

/// Several databases queried in priority order.
///
/// The first database with a non-`NaN` height answers. Typical use puts the
/// finest source first, e.g. DTED2, then SRTM1, then a global GeoTIFF.
#[derive(Debug, Default)]
pub struct ElevationManager {
    databases: Vec<Box<dyn ElevationDatabase>>,
}

impl ElevationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a database with lower priority than those already added.
    pub fn push(&mut self, database: Box<dyn ElevationDatabase>) {
        self.databases.push(database);
    }

    pub fn with_database<D: ElevationDatabase + 'static>(mut self, database: D) -> Self {
        self.push(Box::new(database));
        self
    }

    pub fn databases(&self) -> &[Box<dyn ElevationDatabase>] {
        &self.databases
    }

    pub fn len(&self) -> usize {
        self.databases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }

    pub fn height_above_msl(&self, point: &GeoPoint) -> f64 {
        self.first_height(|db| db.height_above_msl(point))
    }

    pub fn height_above_ellipsoid(&self, point: &GeoPoint) -> f64 {
        self.first_height(|db| db.height_above_ellipsoid(point))
    }

    pub fn point_has_coverage(&self, point: &GeoPoint) -> bool {
        self.databases.iter().any(|db| db.point_has_coverage(point))
    }

    /// Accuracy of the database that would answer a height query.
    pub fn accuracy_info(&self, point: &GeoPoint) -> Option<AccuracyInfo> {
        self.source_for(point)
            .and_then(|db| db.accuracy_info(point))
    }

    /// The highest-priority database with a height at `point`.
    pub fn source_for(&self, point: &GeoPoint) -> Option<&dyn ElevationDatabase> {
        self.databases
            .iter()
            .find(|db| !db.height_above_msl(point).is_nan())
            .map(|db| db.as_ref())
    }

    /// Per-database cache statistics, in priority order.
    pub fn cache_stats(&self) -> Vec<CacheStats> {
        self.databases.iter().map(|db| db.cache_stats()).collect()
    }

    pub fn close(&self) {
        for db in &self.databases {
            db.close();
        }
    }

    fn first_height(&self, height: impl Fn(&dyn ElevationDatabase) -> f64) -> f64 {
        self.databases
            .iter()
            .map(|db| height(db.as_ref()))
            .find(|h| !h.is_nan())
            .unwrap_or(f64::NAN)
    }
}
