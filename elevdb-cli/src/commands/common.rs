use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use elevdb::{AccessMode, DatabaseBuilder, ElevationDatabase, GridGeoid};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Cell format stored under the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Probe the root for DTED, then SRTM, then GeoTIFF
    Auto,
    Dted,
    Srtm,
    Image,
}

/// Database options shared by every subcommand.
#[derive(Debug, Args)]
pub struct DatabaseArgs {
    /// Directory containing the elevation cells
    #[arg(short, long, env = "ELEVDB_ROOT", global = true)]
    pub root: Option<PathBuf>,

    /// Cell format under the root
    #[arg(short, long, value_enum, default_value_t = Format::Auto, global = true)]
    pub format: Format,

    /// Maximum cells kept open at once
    #[arg(
        short,
        long,
        env = "ELEVDB_MAX_OPEN_CELLS",
        default_value = "32",
        global = true
    )]
    pub max_open_cells: u64,

    /// How cell files are read: mapped or streamed
    #[arg(
        long,
        env = "ELEVDB_ACCESS_MODE",
        default_value = "mapped",
        value_parser = parse_access_mode,
        global = true
    )]
    pub access_mode: AccessMode,

    /// Seconds to remember a cell that failed to open (0 disables)
    #[arg(long, env = "ELEVDB_NEGATIVE_TTL_SECS", default_value = "30", global = true)]
    pub negative_ttl_secs: u64,

    /// Skip DTED record checksum verification
    #[arg(long, global = true)]
    pub no_verify: bool,

    /// Geoid grid (EGM96 .grd format) for ellipsoid heights
    #[arg(long, global = true)]
    pub geoid: Option<PathBuf>,
}

fn parse_access_mode(s: &str) -> Result<AccessMode, String> {
    s.parse().map_err(|e: elevdb::ElevationError| e.to_string())
}

impl DatabaseArgs {
    /// Builder carrying every option given on the command line.
    pub fn builder(&self) -> Result<DatabaseBuilder> {
        let builder = match &self.root {
            Some(root) => DatabaseBuilder::new(root),
            None => DatabaseBuilder::from_env().context(
                "ELEVDB_ROOT environment variable not set. Use --root or set ELEVDB_ROOT",
            )?,
        };

        let mut builder = builder
            .max_open_cells(self.max_open_cells)
            .access_mode(self.access_mode)
            .negative_cache_ttl(Duration::from_secs(self.negative_ttl_secs))
            .verify_checksums(!self.no_verify);

        if let Some(path) = &self.geoid {
            let geoid = GridGeoid::from_grd_file(path)
                .with_context(|| format!("Failed to load geoid grid {}", path.display()))?;
            builder = builder.geoid(Arc::new(geoid));
        }
        Ok(builder)
    }

    pub fn open(&self) -> Result<Box<dyn ElevationDatabase>> {
        let builder = self.builder()?;
        let root = builder.config().root.clone();

        let db: Box<dyn ElevationDatabase> = match self.format {
            Format::Auto => builder.open_auto()?,
            Format::Dted => Box::new(builder.open_dted()?),
            Format::Srtm => Box::new(builder.open_srtm()?),
            Format::Image => Box::new(builder.open_image()?),
        };
        tracing::debug!(root = %root.display(), format = %db.connection().format, "database ready");
        Ok(db)
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// `N27-N28, W081-W080` style coverage of a 1° tile.
pub fn tile_coverage(lat: i32, lon: i32) -> String {
    let ns = |v: i32| if v >= 0 { 'N' } else { 'S' };
    let ew = |v: i32| if v >= 0 { 'E' } else { 'W' };
    format!(
        "{}{:02}-{}{:02}, {}{:03}-{}{:03}",
        ns(lat),
        lat.abs(),
        ns(lat + 1),
        (lat + 1).abs(),
        ew(lon),
        lon.abs(),
        ew(lon + 1),
        (lon + 1).abs()
    )
}
