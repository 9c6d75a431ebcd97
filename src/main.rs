use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use prominence::cell::Cell;
use prominence::chunker::{ChunkPool, Chunker};
use prominence::config::{Args, Format};
use prominence::emit::format_record;
use prominence::log_format::TargetFirstFormat;
use prominence::sort::external_sort;
use prominence::source::{Noaa1, SimpleDataSet, Source, Srtm3};
use prominence::sweep::Sweep;

fn build_source(args: &Args) -> Result<Box<dyn Source>> {
    Ok(match args.format {
        Format::Test => Box::new(SimpleDataSet::toy_island()),
        Format::Noaa1 => {
            let path = args.path.clone().context("--format noaa1 requires a PATH")?;
            Box::new(Noaa1::new(path))
        }
        Format::Srtm3 => {
            let path = args.path.clone().context("--format srtm3 requires a PATH")?;
            Box::new(Srtm3::new(path))
        }
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .event_format(TargetFirstFormat)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let source = build_source(&args)?;
    let bounds = source.bounds();
    let tmpdir = args.tmpdir.clone().unwrap_or_else(std::env::temp_dir);

    if args.workers == 0 {
        bail!("--workers must be at least 1");
    }

    let pool = ChunkPool::new();
    let (raw_tx, raw_rx) = flume::bounded::<Vec<Cell>>(64);
    let (sorted_tx, sorted_rx) = flume::bounded::<Vec<Cell>>(64);

    let emitted = std::thread::scope(|scope| -> Result<usize> {
        let read_handle = scope.spawn(|| -> Result<()> {
            let mut chunker = Chunker::new(raw_tx, &pool);
            source
                .read(&mut |c| chunker.send(c))
                .context("reading input data set")?;
            chunker.close();
            Ok(())
        });

        let sort_handle = scope.spawn(|| -> Result<()> {
            external_sort(raw_rx, sorted_tx, &pool, &tmpdir, args.workers)
        });

        let mut emitted = 0usize;
        Sweep::run(bounds, sorted_rx.iter().flatten(), |record| {
            if let Some(line) = format_record(source.as_ref(), &record, bounds.minz, args.min_meters) {
                println!("{line}");
                emitted += 1;
            }
        })
        .context("running the prominence sweep")?;

        read_handle.join().expect("input thread panicked")?;
        sort_handle.join().expect("sort thread panicked")?;
        Ok(emitted)
    })?;

    info!(emitted, "sweep complete");
    Ok(())
}
