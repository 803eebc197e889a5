use anyhow::{bail, Context, Result};
use elevdb::filename::dted_extension_level;
use elevdb::{CellHandler, CellOptions, DtedCell, GeoPoint, ImageCell, SrtmCell};
use std::path::Path;

use super::common::{format_size, DatabaseArgs};

pub fn run(db_args: &DatabaseArgs, path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("Cell not found: {}", path.display());
    }

    let options = CellOptions {
        access: db_args.access_mode,
        verify_checksums: !db_args.no_verify,
    };
    let cell = open_cell(path, options)?;

    let file_size = std::fs::metadata(path)?.len();
    let (rows, cols) = cell.size_of_elev_cell();
    let bounds = cell.bounds();

    // Display information
    println!("Cell: {}", path.display());
    println!("Format: {}", cell.format());
    println!();
    println!("Grid: {}x{} posts", rows, cols);
    println!("Spacing: {:.1}m", cell.mean_spacing_meters());
    println!(
        "Bounds: {:.6}..{:.6} lat, {:.6}..{:.6} lon",
        bounds.min_lat, bounds.max_lat, bounds.min_lon, bounds.max_lon
    );
    println!("File size: {}", format_size(file_size));

    let center = GeoPoint::new(bounds.center_lat(), (bounds.min_lon + bounds.max_lon) / 2.0);
    if let Some(accuracy) = cell.accuracy_info(&center) {
        println!(
            "Accuracy: {} (CE90 {:.0}m, LE90 {:.0}m)",
            accuracy.surface_name, accuracy.ce90, accuracy.le90
        );
    }
    println!();

    let summary = cell.summarize().context("Failed to read posts")?;
    if let (Some(min), Some(max)) = (summary.min, summary.max) {
        println!("Min elevation: {}m", min);
        println!("Max elevation: {}m", max);
    }

    let total = summary.valid_count + summary.null_count;
    if summary.null_count > 0 && total > 0 {
        let null_pct = (summary.null_count as f64 / total as f64) * 100.0;
        println!("Null posts: {} ({:.1}%)", summary.null_count, null_pct);
    }

    cell.close();
    Ok(())
}

/// Pick a reader from the file extension.
fn open_cell(path: &Path, options: CellOptions) -> Result<Box<dyn CellHandler>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let cell: Box<dyn CellHandler> = match extension.as_str() {
        "hgt" => Box::new(SrtmCell::open_path(path, options).context("Failed to load SRTM tile")?),
        "tif" | "tiff" => Box::new(ImageCell::open(path).context("Failed to load GeoTIFF")?),
        ext if dted_extension_level(ext).is_some() => {
            Box::new(DtedCell::open(path, options).context("Failed to load DTED cell")?)
        }
        _ => bail!("Unsupported cell type: {}", path.display()),
    };
    Ok(cell)
}
