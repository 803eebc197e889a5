//! Query a few points from whatever elevation cells live in a directory.
//!
//! Run with: cargo run --example query -- /path/to/cells [geoid.grd]

use std::env;
use std::sync::Arc;

use elevdb::{DatabaseBuilder, ElevationError, GeoPoint, GridGeoid};

fn main() -> Result<(), ElevationError> {
    let root = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --example query -- /path/to/cells [geoid.grd]");
        std::process::exit(1);
    });

    let mut builder = DatabaseBuilder::new(&root).max_open_cells(8);
    if let Some(grd) = env::args().nth(2) {
        builder = builder.geoid(Arc::new(GridGeoid::from_grd_file(grd)?));
    }
    let db = builder.open_auto()?;

    let connection = db.connection();
    println!(
        "{} database at {} (~{:.0} m posts, geoid {})",
        connection.format,
        connection.root.display(),
        connection.mean_spacing_meters,
        connection.geoid.name()
    );

    // Query some well-known places
    let locations = [
        ("Cape Canaveral, USA", 28.3922, -80.6077),
        ("Mount Fuji, Japan", 35.3606, 138.7274),
        ("Mount Everest, Nepal", 27.9881, 86.9250),
        ("Denali, Alaska", 63.0695, -151.0074),
    ];

    println!("{:-<60}", "");
    for (name, lat, lon) in locations {
        let point = GeoPoint::new(lat, lon);
        let msl = db.height_above_msl(&point);
        if msl.is_nan() {
            println!("{name}: no coverage");
            continue;
        }

        let hae = db.height_above_ellipsoid(&point);
        match db.accuracy_info(&point) {
            Some(acc) => println!(
                "{name}: {msl:.1} m MSL, {hae:.1} m HAE ({}, CE90 {} m, LE90 {} m)",
                acc.surface_name, acc.ce90, acc.le90
            ),
            None => println!("{name}: {msl:.1} m MSL, {hae:.1} m HAE"),
        }
    }

    // Show cache statistics
    let stats = db.cache_stats();
    println!("\nCache statistics:");
    println!("  Open cells: {}", stats.entry_count);
    println!("  Hits: {}", stats.hit_count);
    println!("  Misses: {}", stats.miss_count);
    println!("  Negative hits: {}", stats.negative_hit_count);
    println!("  Hit rate: {:.1}%", stats.hit_rate() * 100.0);

    db.close();
    Ok(())
}
