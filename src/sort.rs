//! External sort: reorders an unbounded stream of cells into strictly
//! non-increasing altitude order using a bucket-by-altitude spill file.
//!
//! A temp file is created and unlinked immediately, relying on POSIX
//! unlink-while-open semantics so the spill never needs explicit cleanup
//! even on a hard error. `P` parallel workers each keep private
//! per-altitude write buffers and only contend a single mutex guarding
//! the shared file's append position and the `height -> ranges` map, the
//! same "one mutex, short critical section" shape as a persistent
//! write-behind queue.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use anyhow::{Context, Result, ensure};
use tracing::{debug, info};

use crate::cell::{Cell, Height, Point};
use crate::chunker::{ChunkPool, Chunker};

/// How many points a per-altitude write buffer holds before it's flushed
/// to the spill file.
const SPILL_BUF_CAPACITY: usize = 1024;

/// One encoded `Point`: two little-endian i32s, an explicit packed format
/// rather than raw memory punning.
const POINT_RECORD_SIZE: usize = 8;

fn encode_point(p: Point, out: &mut Vec<u8>) {
    out.extend_from_slice(&p.x.to_le_bytes());
    out.extend_from_slice(&p.y.to_le_bytes());
}

fn decode_point(bytes: &[u8]) -> Point {
    let x = i32::from_le_bytes(bytes[0..4].try_into().unwrap());
    let y = i32::from_le_bytes(bytes[4..8].try_into().unwrap());
    Point::new(x, y)
}

/// A contiguous run of bytes in the shared spill file holding one flushed
/// write-buffer's worth of points, all at the same altitude.
#[derive(Debug, Clone, Copy)]
struct FileRange {
    offset: u64,
    len: u64,
}

/// Shared append-only spill file plus the index of which byte ranges hold
/// which altitude's points. The file mutex is held only across a single
/// seek-and-append-and-record critical section.
struct SpillFile {
    file: Mutex<File>,
    ranges: Mutex<HashMap<Height, Vec<FileRange>>>,
}

impl SpillFile {
    fn create(tmpdir: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(tmpdir)
            .with_context(|| format!("failed to create spill directory {tmpdir:?}"))?;
        let path = tmpdir.join(format!("prominence-sort-{}.tmp", std::process::id()));
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("failed to create spill file {path:?}"))?;
        // Unlink immediately; the open handle keeps the data alive until
        // we drop it (POSIX unlink-while-open).
        if let Err(e) = std::fs::remove_file(&path) {
            debug!("could not unlink spill file {path:?} early: {e} (will remain until exit)");
        }
        Ok(Self {
            file: Mutex::new(file),
            ranges: Mutex::new(HashMap::new()),
        })
    }

    /// Append `payload` (a run of encoded points, all at altitude `h`) and
    /// record the byte range it landed in.
    fn append(&self, h: Height, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            return Ok(());
        }
        let offset = {
            let mut file = self.file.lock().unwrap();
            let offset = file.seek(SeekFrom::End(0)).context("seek to spill file end")?;
            file.write_all(payload).context("write to spill file")?;
            offset
        };
        self.ranges
            .lock()
            .unwrap()
            .entry(h)
            .or_default()
            .push(FileRange { offset, len: payload.len() as u64 });
        Ok(())
    }

    fn read_range(&self, range: FileRange, buf: &mut Vec<u8>) -> Result<()> {
        ensure!(
            range.len as usize % POINT_RECORD_SIZE == 0,
            "spill block of {} bytes is not a multiple of the {}-byte point record (corrupt spill)",
            range.len,
            POINT_RECORD_SIZE
        );
        buf.resize(range.len as usize, 0);
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(range.offset)).context("seek for spill read-back")?;
        file.read_exact(buf).context("short read from spill file")?;
        Ok(())
    }
}

/// Per-altitude write buffer owned by a single ingestion worker.
struct WriteBuf {
    points: Vec<u8>,
}

impl WriteBuf {
    fn new() -> Self {
        Self { points: Vec::with_capacity(SPILL_BUF_CAPACITY * POINT_RECORD_SIZE) }
    }

    fn len_points(&self) -> usize {
        self.points.len() / POINT_RECORD_SIZE
    }
}

/// Consumes batches from `rx`, partitioning every cell into the spill file
/// by its altitude. Runs as one of `P` parallel workers; only `spill`'s
/// mutexes are shared.
fn ingest_worker(rx: flume::Receiver<Vec<Cell>>, pool: &ChunkPool, spill: &SpillFile) -> Result<()> {
    let mut bufs: HashMap<Height, WriteBuf> = HashMap::new();

    for batch in rx.iter() {
        for c in &batch {
            let buf = bufs.entry(c.z).or_insert_with(WriteBuf::new);
            encode_point(c.p, &mut buf.points);
            if buf.len_points() == SPILL_BUF_CAPACITY {
                spill.append(c.z, &buf.points)?;
                buf.points.clear();
            }
        }
        pool.release(batch);
    }

    // Flush whatever partial buffers remain when the upstream closes.
    for (h, buf) in bufs {
        spill.append(h, &buf.points)?;
    }
    Ok(())
}

/// Consumes `r` and forwards it over `tx` in strictly non-increasing
/// altitude order. Spawns `workers` parallel ingestion threads for the
/// partition phase; the emit phase (re-reading the spill file in
/// descending-altitude order) runs single-threaded.
///
/// `r` is a channel rather than a plain iterator so upstream sources can
/// push cells from their own worker threads with natural backpressure.
pub fn external_sort(
    r: flume::Receiver<Vec<Cell>>,
    tx: flume::Sender<Vec<Cell>>,
    pool: &ChunkPool,
    tmpdir: &std::path::Path,
    workers: usize,
) -> Result<()> {
    let spill = SpillFile::create(tmpdir)?;
    let workers = workers.max(1);

    info!(workers, "external sort: starting partition phase");
    std::thread::scope(|scope| -> Result<()> {
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let rx = r.clone();
            let spill = &spill;
            handles.push(scope.spawn(move || ingest_worker(rx, pool, spill)));
        }
        drop(r);
        for h in handles {
            h.join().map_err(|_| anyhow::anyhow!("sort ingestion worker panicked"))??;
        }
        Ok(())
    })?;

    let ranges = std::mem::take(&mut *spill.ranges.lock().unwrap());
    let mut altitudes: Vec<Height> = ranges.keys().copied().collect();
    altitudes.sort_unstable_by(|a, b| b.cmp(a));
    info!(altitudes = altitudes.len(), "external sort: starting emit phase");

    let mut chunker = Chunker::new(tx, pool);
    let mut read_buf = Vec::new();
    for h in altitudes {
        for range in &ranges[&h] {
            spill.read_range(*range, &mut read_buf)?;
            for record in read_buf.chunks_exact(POINT_RECORD_SIZE) {
                let p = decode_point(record);
                chunker.send(Cell { p, z: h });
            }
        }
    }
    chunker.close();
    Ok(())
}

/// Convenience entry point for sources that have all their cells already
/// in memory (used by tests and the `test`/`simple` format).
pub fn sort_cells(cells: Vec<Cell>, tmpdir: &std::path::Path, workers: usize) -> Result<Vec<Cell>> {
    let pool = ChunkPool::new();
    let (in_tx, in_rx) = flume::unbounded();
    let (out_tx, out_rx) = flume::unbounded();

    if !cells.is_empty() {
        let _ = in_tx.send(cells);
    }
    drop(in_tx);

    external_sort(in_rx, out_tx, &pool, tmpdir, workers)?;

    let mut out = Vec::new();
    for batch in out_rx.iter() {
        out.extend(batch);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn empty_input_emits_empty_stream() {
        let dir = tempfile::tempdir().unwrap();
        let out = sort_cells(vec![], dir.path(), 2).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn single_altitude_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let cells = vec![Cell::new(0, 0, 5), Cell::new(1, 1, 5), Cell::new(2, 2, 5)];
        let out = sort_cells(cells.clone(), dir.path(), 1).unwrap();
        assert_eq!(out.len(), cells.len());
        assert!(out.iter().all(|c| c.z == 5));
    }

    #[test]
    fn sorts_strictly_non_increasing() {
        let dir = tempfile::tempdir().unwrap();
        let cells = vec![
            Cell::new(0, 0, 5),
            Cell::new(1, 1, 3),
            Cell::new(2, 2, 7),
            Cell::new(3, 3, 2),
            Cell::new(4, 4, 8),
        ];
        let out = sort_cells(cells, dir.path(), 3).unwrap();
        for w in out.windows(2) {
            assert!(w[0].z >= w[1].z);
        }
        let mut zs: Vec<_> = out.iter().map(|c| c.z).collect();
        zs.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(zs, vec![8, 7, 5, 3, 2]);
    }

    #[test]
    fn round_trip_multiset_matches_input() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = rand::rng();
        let mut cells = Vec::new();
        for _ in 0..100_000 {
            let x = rng.random_range(0..1000);
            let y = rng.random_range(0..1000);
            let z = rng.random_range(0..100);
            cells.push(Cell::new(x, y, z));
        }

        let mut expected: Vec<Height> = cells.iter().map(|c| c.z).collect();
        expected.sort_unstable_by(|a, b| b.cmp(a));

        let out = sort_cells(cells, dir.path(), 4).unwrap();
        assert_eq!(out.len(), expected.len());

        let mut got: Vec<Height> = out.iter().map(|c| c.z).collect();
        got.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(got, expected);

        for w in out.windows(2) {
            assert!(w[0].z >= w[1].z);
        }
    }

    #[test]
    fn idempotent_on_already_sorted_input() {
        let dir = tempfile::tempdir().unwrap();
        let cells = vec![
            Cell::new(0, 0, 9),
            Cell::new(1, 0, 7),
            Cell::new(2, 0, 5),
            Cell::new(3, 0, 1),
        ];
        let once = sort_cells(cells, dir.path(), 2).unwrap();
        let twice = sort_cells(once.clone(), dir.path(), 2).unwrap();
        let mut a: Vec<_> = once.iter().map(|c| c.z).collect();
        let mut b: Vec<_> = twice.iter().map(|c| c.z).collect();
        a.sort_unstable_by(|x, y| y.cmp(x));
        b.sort_unstable_by(|x, y| y.cmp(x));
        assert_eq!(a, b);
    }

    #[test]
    fn permuting_equal_altitude_cells_preserves_output_multiset() {
        let dir = tempfile::tempdir().unwrap();
        let base = vec![
            Cell::new(0, 0, 4),
            Cell::new(1, 0, 4),
            Cell::new(2, 0, 4),
            Cell::new(3, 0, 9),
        ];
        let mut permuted = base.clone();
        permuted.reverse();

        let out_a = sort_cells(base, dir.path(), 1).unwrap();
        let out_b = sort_cells(permuted, dir.path(), 1).unwrap();

        let mut a: Vec<_> = out_a.iter().map(|c| (c.p, c.z)).collect();
        let mut b: Vec<_> = out_b.iter().map(|c| (c.p, c.z)).collect();
        a.sort_by_key(|(p, z)| (*z, p.x, p.y));
        b.sort_by_key(|(p, z)| (*z, p.x, p.y));
        assert_eq!(a, b);
    }
}
