use anyhow::{bail, Result};
use elevdb::cell::srtm::{grid_side, SRTM1_SAMPLES, SRTM3_SAMPLES};
use elevdb::cell::ImageHeader;
use elevdb::filename::{dted_extension_level, dted_path_to_lat_lon, srtm_filename_to_lat_lon};
use elevdb::DirectoryWalker;
use std::fs;
use std::ops::ControlFlow;
use std::path::Path;

use super::common::{format_size, tile_coverage, DatabaseArgs};

struct Entry {
    name: String,
    kind: String,
    coverage: String,
    size: u64,
}

pub fn run(db_args: &DatabaseArgs) -> Result<()> {
    let builder = db_args.builder()?;
    let dir = builder.config().root.clone();

    if !dir.is_dir() {
        bail!("Root directory does not exist: {}", dir.display());
    }

    let mut entries = Vec::new();
    let mut skipped = 0usize;
    let summary = DirectoryWalker::new().for_each_file(&dir, |path| {
        match classify(&dir, path) {
            Some(entry) => entries.push(entry),
            None => skipped += 1,
        }
        ControlFlow::Continue(())
    });

    if entries.is_empty() {
        println!("No elevation cells found in: {}", dir.display());
        return Ok(());
    }

    println!("{:<28} {:>8} {:>30}", "CELL", "TYPE", "COVERAGE");
    println!("{}", "-".repeat(68));

    let mut total_size: u64 = 0;
    let mut counts: Vec<(String, usize)> = Vec::new();
    for entry in &entries {
        total_size += entry.size;
        match counts.iter_mut().find(|(kind, _)| *kind == entry.kind) {
            Some((_, count)) => *count += 1,
            None => counts.push((entry.kind.clone(), 1)),
        }
        println!("{:<28} {:>8} {:>30}", entry.name, entry.kind, entry.coverage);
    }

    // Summary
    println!();
    println!("Summary:");
    println!("  Total cells: {}", entries.len());
    for (kind, count) in &counts {
        println!("  {}: {}", kind, count);
    }
    if skipped > 0 {
        println!("  Other files: {}", skipped);
    }
    if summary.errors > 0 {
        println!("  Unreadable entries: {}", summary.errors);
    }
    println!("  Total size: {}", format_size(total_size));
    println!("  Root: {}", dir.display());

    Ok(())
}

/// Recognize a cell by name and size, without reading posts.
fn classify(root: &Path, path: &Path) -> Option<Entry> {
    let size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let name = path
        .strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string();
    let file_name = path.file_name()?.to_str()?;
    let extension = path.extension()?.to_str()?.to_lowercase();

    let (kind, coverage) = if let Some(level) = dted_extension_level(&extension) {
        let (lat, lon) = dted_path_to_lat_lon(path)?;
        (format!("DTED{}", level), tile_coverage(lat, lon))
    } else if extension == "hgt" {
        let (lat, lon) = srtm_filename_to_lat_lon(file_name)?;
        let kind = match grid_side(size) {
            Ok(SRTM1_SAMPLES) => "SRTM1".to_string(),
            Ok(SRTM3_SAMPLES) => "SRTM3".to_string(),
            Ok(side) => format!("{}x{}", side, side),
            Err(_) => "???".to_string(),
        };
        (kind, tile_coverage(lat, lon))
    } else if extension == "tif" || extension == "tiff" {
        let coverage = match ImageHeader::read(path) {
            Ok(header) => {
                let b = header.bounds();
                format!(
                    "{:.3}..{:.3}, {:.3}..{:.3}",
                    b.min_lat, b.max_lat, b.min_lon, b.max_lon
                )
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "unreadable GeoTIFF");
                "Unknown".to_string()
            }
        };
        ("GeoTIFF".to_string(), coverage)
    } else {
        return None;
    };

    Some(Entry {
        name,
        kind,
        coverage,
        size,
    })
}
