//! Database configuration and the [`DatabaseBuilder`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cell::{AccessMode, CellOptions};
#[cfg(feature = "geotiff")]
use crate::database::ImageDatabase;
use crate::database::{DtedDatabase, ElevationDatabase, SrtmDatabase};
use crate::error::{ElevationError, Result};
use crate::geoid::{GeoidModel, IdentityGeoid};

/// Default bound on simultaneously open cells.
pub const DEFAULT_MAX_OPEN_CELLS: u64 = 32;

/// Default number of files the layout probe may look at.
pub const DEFAULT_PROBE_LIMIT: usize = 1024;

/// Default lifetime of a remembered open failure.
pub const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(30);

/// Settings shared by every database format.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// Directory holding the cells.
    pub root: PathBuf,
    /// Maximum handlers kept open at once.
    pub max_open_cells: u64,
    pub cell_options: CellOptions,
    /// Maximum files visited while confirming the layout at open.
    pub probe_limit: usize,
    /// How long a failed cell open is remembered; `None` disables it.
    pub negative_cache_ttl: Option<Duration>,
}

impl DatabaseConfig {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            max_open_cells: DEFAULT_MAX_OPEN_CELLS,
            cell_options: CellOptions::default(),
            probe_limit: DEFAULT_PROBE_LIMIT,
            negative_cache_ttl: Some(DEFAULT_NEGATIVE_TTL),
        }
    }

    /// Reject settings no database can run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_open_cells == 0 {
            return Err(ElevationError::InvalidConfig(
                "max_open_cells must be at least 1".to_string(),
            ));
        }
        if self.probe_limit == 0 {
            return Err(ElevationError::InvalidConfig(
                "probe_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for elevation databases.
///
/// # Example
///
/// ```no_run
/// use elevdb::{AccessMode, DatabaseBuilder, ElevationDatabase, GeoPoint};
///
/// let db = DatabaseBuilder::new("/data/dted")
///     .max_open_cells(16)
///     .access_mode(AccessMode::Streamed)
///     .open_dted()?;
///
/// let height = db.height_above_msl(&GeoPoint::new(27.5, -80.5));
/// # Ok::<(), elevdb::ElevationError>(())
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseBuilder {
    config: DatabaseConfig,
    geoid: Arc<dyn GeoidModel>,
}

impl DatabaseBuilder {
    /// Create a new builder for the cells under `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            config: DatabaseConfig::new(root),
            geoid: Arc::new(IdentityGeoid),
        }
    }

    /// Create a builder configured from environment variables.
    ///
    /// # Environment Variables
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `ELEVDB_ROOT` | Directory containing the cells | Required |
    /// | `ELEVDB_MAX_OPEN_CELLS` | Maximum open cells | 32 |
    /// | `ELEVDB_ACCESS_MODE` | `mapped` or `streamed` | `mapped` |
    /// | `ELEVDB_NEGATIVE_TTL_SECS` | Seconds to remember a failed open, 0 disables | 30 |
    ///
    /// # Errors
    ///
    /// Returns an error if `ELEVDB_ROOT` is not set or a value does not parse.
    pub fn from_env() -> Result<Self> {
        let root = std::env::var("ELEVDB_ROOT").map_err(|_| {
            ElevationError::InvalidConfig("ELEVDB_ROOT environment variable not set".to_string())
        })?;

        let mut builder = Self::new(root);
        if let Some(max) = env_parse::<u64>("ELEVDB_MAX_OPEN_CELLS")? {
            builder = builder.max_open_cells(max);
        }
        if let Ok(mode) = std::env::var("ELEVDB_ACCESS_MODE") {
            builder = builder.access_mode(mode.parse()?);
        }
        if let Some(secs) = env_parse::<u64>("ELEVDB_NEGATIVE_TTL_SECS")? {
            builder = builder.negative_cache_ttl(Duration::from_secs(secs));
        }
        Ok(builder)
    }

    /// Set the root directory.
    pub fn root<P: AsRef<Path>>(mut self, root: P) -> Self {
        self.config.root = root.as_ref().to_path_buf();
        self
    }

    /// Set the maximum number of cells kept open.
    ///
    /// Default is 32.
    pub fn max_open_cells(mut self, max: u64) -> Self {
        self.config.max_open_cells = max;
        self
    }

    pub fn access_mode(mut self, access: AccessMode) -> Self {
        self.config.cell_options.access = access;
        self
    }

    /// Verify DTED record checksums when a cell opens. On by default.
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.config.cell_options.verify_checksums = verify;
        self
    }

    pub fn probe_limit(mut self, limit: usize) -> Self {
        self.config.probe_limit = limit;
        self
    }

    /// How long failed opens are remembered. A zero duration disables it.
    pub fn negative_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.negative_cache_ttl = (!ttl.is_zero()).then_some(ttl);
        self
    }

    /// Geoid used for ellipsoid heights. Defaults to [`IdentityGeoid`].
    pub fn geoid(mut self, geoid: Arc<dyn GeoidModel>) -> Self {
        self.geoid = geoid;
        self
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Open a DTED database (`root/{e|w}DDD/{n|s}DD.dtN`).
    pub fn open_dted(self) -> Result<DtedDatabase> {
        self.config.validate()?;
        DtedDatabase::open(&self.config, self.geoid)
    }

    /// Open an SRTM database (`root/{N|S}DD{E|W}DDD.hgt`).
    pub fn open_srtm(self) -> Result<SrtmDatabase> {
        self.config.validate()?;
        SrtmDatabase::open(&self.config, self.geoid)
    }

    /// Open a GeoTIFF database (`root/**/*.tif`).
    #[cfg(feature = "geotiff")]
    pub fn open_image(self) -> Result<ImageDatabase> {
        self.config.validate()?;
        ImageDatabase::open(&self.config, self.geoid)
    }

    /// Open whichever format the root holds, trying DTED, SRTM, then GeoTIFF.
    ///
    /// # Errors
    ///
    /// Returns the first error other than "no cells found", or
    /// [`ElevationError::InvalidConfig`] if no format matches.
    pub fn open_auto(self) -> Result<Box<dyn ElevationDatabase>> {
        self.config.validate()?;

        match DtedDatabase::open(&self.config, Arc::clone(&self.geoid)) {
            Ok(db) => return Ok(Box::new(db)),
            Err(ElevationError::NoCellsFound { .. }) => {}
            Err(e) => return Err(e),
        }
        match SrtmDatabase::open(&self.config, Arc::clone(&self.geoid)) {
            Ok(db) => return Ok(Box::new(db)),
            Err(ElevationError::NoCellsFound { .. }) => {}
            Err(e) => return Err(e),
        }
        #[cfg(feature = "geotiff")]
        {
            match ImageDatabase::open(&self.config, Arc::clone(&self.geoid)) {
                Ok(db) => return Ok(Box::new(db)),
                Err(ElevationError::NoCellsFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        Err(ElevationError::InvalidConfig(format!(
            "no recognizable elevation cells under {}",
            self.config.root.display()
        )))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) => value.trim().parse().map(Some).map_err(|_| {
            ElevationError::InvalidConfig(format!("{name}={value:?} is not a valid value"))
        }),
        Err(_) => Ok(None),
    }
}
