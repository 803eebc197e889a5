//! GeoTIFF databases: any `*.tif`/`*.tiff` under the root.
//!
//! Images may overlap. The index is sorted finest spacing first, so a point
//! covered by several images is answered by the most detailed one.

use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

use super::{validate_root, CellDatabase, DatabaseConnection};
use crate::cache::CellFactory;
use crate::cell::{CellFormat, CellHandler, ImageCell, ImageHeader};
use crate::config::DatabaseConfig;
use crate::error::{ElevationError, Result};
use crate::geo::{CellId, GeoPoint};
use crate::geoid::GeoidModel;
use crate::walker::DirectoryWalker;

/// A database of GeoTIFF DEM images.
pub type ImageDatabase = CellDatabase<ImageLayout>;

/// Headers of every indexed image, finest first.
#[derive(Debug, Clone)]
pub struct ImageLayout {
    images: Vec<ImageHeader>,
}

impl ImageLayout {
    pub fn new(mut images: Vec<ImageHeader>) -> Self {
        images.sort_by(|a, b| a.mean_spacing_meters().total_cmp(&b.mean_spacing_meters()));
        Self { images }
    }

    pub fn images(&self) -> &[ImageHeader] {
        &self.images
    }
}

impl CellFactory for ImageLayout {
    fn cell_id(&self, point: &GeoPoint) -> Option<CellId> {
        self.images
            .iter()
            .position(|image| image.bounds().contains(point))
            .and_then(|index| u32::try_from(index).ok())
            .map(CellId::Image)
    }

    fn create_cell(&self, id: CellId) -> Result<Arc<dyn CellHandler>> {
        let header = match id {
            CellId::Image(index) => self.images.get(index as usize),
            CellId::Tile { .. } => None,
        }
        .ok_or_else(|| {
            ElevationError::InvalidConfig(format!("image database has no cell {id:?}"))
        })?;

        Ok(Arc::new(ImageCell::open(&header.path)?))
    }
}

impl ImageDatabase {
    /// Index the GeoTIFFs under `config.root`.
    ///
    /// Only headers are read here. Files that are not georeferenced
    /// single-band images are skipped with a warning.
    pub fn open(config: &DatabaseConfig, geoid: Arc<dyn GeoidModel>) -> Result<Self> {
        validate_root(&config.root)?;

        let mut images = Vec::new();
        let summary = DirectoryWalker::new()
            .max_files(config.probe_limit)
            .for_each_file(&config.root, |path| {
                if let Some(header) = probe_image(path) {
                    images.push(header);
                }
                ControlFlow::Continue(())
            });

        if images.is_empty() {
            return Err(ElevationError::NoCellsFound {
                root: config.root.clone(),
                format: CellFormat::Image,
                probed: summary.visited,
            });
        }
        if summary.stopped_early {
            tracing::warn!(
                root = %config.root.display(),
                limit = config.probe_limit,
                "image index truncated at probe limit"
            );
        }

        let layout = ImageLayout::new(images);
        let connection = DatabaseConnection {
            root: config.root.clone(),
            format: CellFormat::Image,
            extension: None,
            mean_spacing_meters: layout.images[0].mean_spacing_meters(),
            geoid,
            max_open_cells: config.max_open_cells,
        };
        Ok(Self::new(connection, layout, config))
    }

    /// Close image `index` and drop its decoded pixels.
    pub fn unload(&self, index: usize) {
        if let Ok(index) = u32::try_from(index) {
            self.cache().remove(CellId::Image(index));
        }
    }
}

fn probe_image(path: &Path) -> Option<ImageHeader> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    if extension != "tif" && extension != "tiff" {
        return None;
    }
    match ImageHeader::read(path) {
        Ok(header) => Some(header),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping unusable GeoTIFF");
            None
        }
    }
}
