//! Command-line configuration.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Built-in eight-cell toy island, useful for smoke-testing the pipeline.
    Test,
    /// One NOAA GLOBE tile (gzip of 16-bit little-endian samples).
    Noaa1,
    /// A directory of SRTM3 `.hgt.zip` tiles.
    Srtm3,
}

#[derive(Parser, Debug)]
#[command(
    name = "prominence",
    about = "Compute topographic prominence from a digital elevation model."
)]
pub struct Args {
    /// Input data format.
    #[arg(long = "format", value_enum, default_value = "test")]
    pub format: Format,

    /// Minimum prominence to report, in meters.
    #[arg(long = "min", default_value_t = 100.0)]
    pub min_meters: f64,

    /// Path to the input file or directory (ignored for `--format test`).
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Directory for the external sort's spill file (defaults to the
    /// platform temp directory).
    #[arg(long = "tmpdir")]
    pub tmpdir: Option<PathBuf>,

    /// Number of parallel ingestion workers for the external sort.
    #[arg(long = "workers", default_value_t = default_workers())]
    pub workers: usize,
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}
