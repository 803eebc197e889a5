use anyhow::{bail, Context, Result};
use elevdb::{ElevationDatabase, GeoPoint};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::common::DatabaseArgs;

pub fn run(
    db_args: &DatabaseArgs,
    input: PathBuf,
    output: Option<PathBuf>,
    lat_col: &str,
    lon_col: &str,
    ellipsoid: bool,
) -> Result<()> {
    let extension = input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if extension != "csv" {
        bail!("Unsupported file format: {}. Use .csv", extension);
    }

    let db = db_args.open()?;
    let output_path = output.unwrap_or_else(|| default_output(&input));
    let voids = process_csv(db.as_ref(), &input, &output_path, lat_col, lon_col, ellipsoid)?;

    let stats = db.cache_stats();
    db.close();

    println!("Output written to: {}", output_path.display());
    if voids > 0 {
        println!("Points without coverage: {}", voids);
    }
    println!(
        "Cells opened: {} (hit rate {:.1}%)",
        stats.miss_count,
        stats.hit_rate() * 100.0
    );
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "points".to_string());
    input.with_file_name(format!("{}_height.csv", stem))
}

/// Copy `input` to `output` with a `height` column appended. Returns the
/// number of rows without coverage.
fn process_csv(
    db: &dyn ElevationDatabase,
    input: &Path,
    output: &Path,
    lat_col: &str,
    lon_col: &str,
    ellipsoid: bool,
) -> Result<u64> {
    let file = File::open(input).context("Failed to open input file")?;
    let mut reader = csv::Reader::from_reader(BufReader::new(file));

    // Find column indices
    let headers = reader.headers()?.clone();
    let lat_idx = headers
        .iter()
        .position(|h| h == lat_col)
        .with_context(|| format!("Column '{}' not found in CSV", lat_col))?;
    let lon_idx = headers
        .iter()
        .position(|h| h == lon_col)
        .with_context(|| format!("Column '{}' not found in CSV", lon_col))?;

    // Collect records for progress bar
    let records: Vec<_> = reader.records().collect::<Result<_, _>>()?;
    let total = records.len() as u64;

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let output_file = File::create(output).context("Failed to create output file")?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(output_file));

    // Write header
    let mut new_headers: Vec<&str> = headers.iter().collect();
    new_headers.push("height");
    writer.write_record(&new_headers)?;

    let mut voids = 0;
    for (line, record) in records.iter().enumerate() {
        let lat: f64 = record
            .get(lat_idx)
            .context("Missing latitude")?
            .trim()
            .parse()
            .with_context(|| format!("Invalid latitude on row {}", line + 1))?;
        let lon: f64 = record
            .get(lon_idx)
            .context("Missing longitude")?
            .trim()
            .parse()
            .with_context(|| format!("Invalid longitude on row {}", line + 1))?;

        let point = GeoPoint::new(lat, lon);
        let height = if ellipsoid {
            db.height_above_ellipsoid(&point)
        } else {
            db.height_above_msl(&point)
        };
        let height = if height.is_nan() {
            voids += 1;
            "void".to_string()
        } else {
            format!("{:.2}", height)
        };

        let mut new_record: Vec<&str> = record.iter().collect();
        new_record.push(&height);
        writer.write_record(&new_record)?;

        pb.inc(1);
    }

    pb.finish_with_message("done");
    writer.flush()?;
    Ok(voids)
}
