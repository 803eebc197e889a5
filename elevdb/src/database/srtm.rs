//! SRTM databases: `root/{N|S}DD{E|W}DDD.hgt`.

use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{validate_root, CellDatabase, DatabaseConnection};
use crate::cache::CellFactory;
use crate::cell::srtm::grid_side;
use crate::cell::{CellFormat, CellHandler, CellOptions, SrtmCell};
use crate::config::DatabaseConfig;
use crate::error::{ElevationError, Result};
use crate::filename::{srtm_filename_for_tile, srtm_filename_to_lat_lon};
use crate::geo::{mean_spacing_meters, CellId, GeoPoint};
use crate::geoid::GeoidModel;
use crate::walker::DirectoryWalker;

/// A database of SRTM `.hgt` tiles.
pub type SrtmDatabase = CellDatabase<SrtmLayout>;

/// A flat directory of `.hgt` tiles.
#[derive(Debug, Clone)]
pub struct SrtmLayout {
    root: PathBuf,
    options: CellOptions,
}

impl SrtmLayout {
    pub fn new<P: AsRef<Path>>(root: P, options: CellOptions) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            options,
        }
    }

    pub fn cell_path(&self, lat: i32, lon: i32) -> PathBuf {
        self.root.join(srtm_filename_for_tile(lat, lon))
    }
}

impl CellFactory for SrtmLayout {
    fn cell_id(&self, point: &GeoPoint) -> Option<CellId> {
        point.is_valid().then(|| CellId::tile_for(point))
    }

    fn create_cell(&self, id: CellId) -> Result<Arc<dyn CellHandler>> {
        match id {
            CellId::Tile { lat, lon } => {
                let cell = SrtmCell::open(self.cell_path(lat, lon), self.options, lat, lon)?;
                Ok(Arc::new(cell))
            }
            CellId::Image(_) => Err(ElevationError::InvalidConfig(format!(
                "SRTM database cannot open {id:?}"
            ))),
        }
    }
}

impl SrtmDatabase {
    /// Open the `.hgt` tiles directly under `config.root`.
    ///
    /// The probe looks for one correctly named tile with a square-grid file
    /// size; its resolution sets the database's mean post spacing.
    pub fn open(config: &DatabaseConfig, geoid: Arc<dyn GeoidModel>) -> Result<Self> {
        validate_root(&config.root)?;

        let mut found = None;
        let summary = DirectoryWalker::new()
            .max_depth(1)
            .max_files(config.probe_limit)
            .for_each_file(&config.root, |path| match probe_tile(path) {
                Some(tile) => {
                    found = Some(tile);
                    ControlFlow::Break(())
                }
                None => ControlFlow::Continue(()),
            });

        let (lat, samples) = found.ok_or_else(|| ElevationError::NoCellsFound {
            root: config.root.clone(),
            format: CellFormat::Srtm,
            probed: summary.visited,
        })?;

        let spacing = 1.0 / (samples - 1) as f64;
        let connection = DatabaseConnection {
            root: config.root.clone(),
            format: CellFormat::Srtm,
            extension: Some("hgt".to_string()),
            mean_spacing_meters: mean_spacing_meters(spacing, spacing, f64::from(lat) + 0.5),
            geoid,
            max_open_cells: config.max_open_cells,
        };
        let layout = SrtmLayout::new(&config.root, config.cell_options);
        Ok(Self::new(connection, layout, config))
    }
}

/// `(base latitude, samples per side)` of a well-formed tile.
fn probe_tile(path: &Path) -> Option<(i32, usize)> {
    let name = path.file_name()?.to_str()?;
    if !name.to_ascii_lowercase().ends_with(".hgt") {
        return None;
    }
    let (lat, _) = srtm_filename_to_lat_lon(name)?;

    let size = fs::metadata(path).ok()?.len();
    match grid_side(size) {
        Ok(samples) => Some((lat, samples)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping malformed SRTM tile");
            None
        }
    }
}
