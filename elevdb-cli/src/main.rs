use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::common::DatabaseArgs;

/// DTED, SRTM and GeoTIFF elevation query tool
#[derive(Parser)]
#[command(name = "elevdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    database: DatabaseArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the height at a single coordinate
    Query {
        /// Latitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Report height above the ellipsoid instead of MSL
        #[arg(short, long)]
        ellipsoid: bool,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add heights to every row of a CSV file
    Batch {
        /// Input CSV file
        input: PathBuf,

        /// Output file (defaults to <input>_height.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Column name for latitude
        #[arg(long, default_value = "lat")]
        lat_col: String,

        /// Column name for longitude
        #[arg(long, default_value = "lon")]
        lon_col: String,

        /// Report height above the ellipsoid instead of MSL
        #[arg(short, long)]
        ellipsoid: bool,
    },

    /// Display information about a single cell file
    Info {
        /// Path to a .dt0/.dt1/.dt2, .hgt or .tif file
        cell: PathBuf,
    },

    /// List the cells found under the root
    List,
}

fn main() -> Result<()> {
    // Diagnostics go to stderr so query output stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("elevdb=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Query {
            lat,
            lon,
            ellipsoid,
            json,
        } => commands::query::run(&cli.database, lat, lon, ellipsoid, json),
        Commands::Batch {
            input,
            output,
            lat_col,
            lon_col,
            ellipsoid,
        } => commands::batch::run(&cli.database, input, output, &lat_col, &lon_col, ellipsoid),
        Commands::Info { cell } => commands::info::run(&cli.database, &cell),
        Commands::List => commands::list::run(&cli.database),
    }
}
