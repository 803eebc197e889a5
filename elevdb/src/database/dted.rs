//! DTED databases: `root/{e|w}DDD/{n|s}DD.dtN`.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{validate_root, CellDatabase, DatabaseConnection};
use crate::cache::CellFactory;
use crate::cell::{open_source, CellFormat, CellHandler, CellOptions, DtedCell, DtedHeader};
use crate::config::DatabaseConfig;
use crate::error::{ElevationError, Result};
use crate::filename::{dted_path_to_lat_lon, dted_relative_path_for_tile};
use crate::geo::{CellId, GeoPoint};
use crate::geoid::GeoidModel;
use crate::walker::DirectoryWalker;

/// A database of DTED cells.
pub type DtedDatabase = CellDatabase<DtedLayout>;

/// Where DTED cells live under a root, and how to open them.
#[derive(Debug, Clone)]
pub struct DtedLayout {
    root: PathBuf,
    extension: String,
    options: CellOptions,
}

impl DtedLayout {
    pub fn new<P: AsRef<Path>>(
        root: P,
        extension: impl Into<String>,
        options: CellOptions,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            extension: extension.into(),
            options,
        }
    }

    /// Extension shared by every cell, e.g. `dt1`.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Path of the cell whose southwest corner is `(lat, lon)`.
    pub fn cell_path(&self, lat: i32, lon: i32) -> PathBuf {
        self.root
            .join(dted_relative_path_for_tile(lat, lon, &self.extension))
    }
}

impl CellFactory for DtedLayout {
    fn cell_id(&self, point: &GeoPoint) -> Option<CellId> {
        point.is_valid().then(|| CellId::tile_for(point))
    }

    fn create_cell(&self, id: CellId) -> Result<Arc<dyn CellHandler>> {
        match id {
            CellId::Tile { lat, lon } => {
                let cell = DtedCell::open(self.cell_path(lat, lon), self.options)?;
                Ok(Arc::new(cell))
            }
            CellId::Image(_) => Err(ElevationError::InvalidConfig(format!(
                "DTED database cannot open {id:?}"
            ))),
        }
    }
}

/// First readable DTED cell found by the open probe.
struct ProbedCell {
    extension: String,
    header: DtedHeader,
}

impl DtedDatabase {
    /// Open the DTED cells under `config.root`.
    ///
    /// The root is probed (two directory levels, at most
    /// `config.probe_limit` files) for a readable cell, which fixes the
    /// extension and mean post spacing of the whole database.
    pub fn open(config: &DatabaseConfig, geoid: Arc<dyn GeoidModel>) -> Result<Self> {
        validate_root(&config.root)?;

        let mut found = None;
        let summary = DirectoryWalker::new()
            .max_depth(2)
            .max_files(config.probe_limit)
            .for_each_file(&config.root, |path| {
                match probe_cell(path, config.cell_options) {
                    Some(cell) => {
                        found = Some(cell);
                        ControlFlow::Break(())
                    }
                    None => ControlFlow::Continue(()),
                }
            });

        let probed = found.ok_or_else(|| ElevationError::NoCellsFound {
            root: config.root.clone(),
            format: CellFormat::Dted,
            probed: summary.visited,
        })?;

        let connection = DatabaseConnection {
            root: config.root.clone(),
            format: CellFormat::Dted,
            extension: Some(probed.extension.clone()),
            mean_spacing_meters: probed.header.geometry().mean_spacing_meters(),
            geoid,
            max_open_cells: config.max_open_cells,
        };
        let layout = DtedLayout::new(&config.root, probed.extension, config.cell_options);
        Ok(Self::new(connection, layout, config))
    }
}

/// Parse the header of `path` if it is named like a DTED cell.
fn probe_cell(path: &Path, options: CellOptions) -> Option<ProbedCell> {
    dted_path_to_lat_lon(path)?;
    let extension = path.extension()?.to_str()?.to_string();

    let header = open_source(path, options.access)
        .and_then(|source| DtedHeader::parse(&source, path, false));
    match header {
        Ok(header) => Some(ProbedCell { extension, header }),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable DTED cell");
            None
        }
    }
}
