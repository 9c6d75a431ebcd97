//! Decoder for one NOAA GLOBE tile (http://www.ngdc.noaa.gov/mgg/topo/gltiles.html).
//!
//! The gzip-uncompressed file is a sequence of 16-bit little-endian
//! signed samples, 10800 per row, with -500 marking ocean (dropped,
//! since sea-level samples need not be part of the data set). Equatorial
//! tiles have 6000 rows, polar tiles 4800.

use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use tracing::info;

use super::{GeoPos, Source};
use crate::cell::{Bounds, Cell};

const TILE_WIDTH: i32 = 10800;
const OCEAN: i16 = -500;

/// One NOAA1 tile, identified by its gzip file path. This decoder always
/// describes the "E" tile (roughly western North America); other tiles
/// would need their own `Pos` offsets.
pub struct Noaa1 {
    path: PathBuf,
}

impl Noaa1 {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Source for Noaa1 {
    fn bounds(&self) -> Bounds {
        Bounds { minx: 0, maxx: TILE_WIDTH, miny: 0, maxy: 6000, minz: -499, maxz: 8849 }
    }

    fn pos(&self, c: Cell) -> GeoPos {
        GeoPos {
            lat: 50.0 - (c.p.y as f64) / 120.0,
            lon: (c.p.x as f64) / 120.0 - 180.0,
            meters: c.z as f64,
        }
    }

    fn read(&self, emit: &mut dyn FnMut(Cell)) -> Result<()> {
        decode_file(&self.path, emit)
    }
}

fn decode_file(path: &Path, emit: &mut dyn FnMut(Cell)) -> Result<()> {
    info!(path = %path.display(), "reading noaa1 tile");
    let f = File::open(path).with_context(|| format!("opening noaa1 tile {path:?}"))?;
    let mut buf = Vec::new();
    GzDecoder::new(f)
        .read_to_end(&mut buf)
        .with_context(|| format!("decompressing noaa1 tile {path:?}"))?;

    let equatorial = 2 * 10800 * 6000;
    let polar = 2 * 10800 * 4800;
    if buf.len() != equatorial && buf.len() != polar {
        bail!("bad byte count for noaa1 tile {path:?}: want {equatorial} or {polar}, got {}", buf.len());
    }

    for (i, pair) in buf.chunks_exact(2).enumerate() {
        let alt = i16::from_le_bytes([pair[0], pair[1]]);
        if alt == OCEAN {
            continue;
        }
        let x = (i as i32) % TILE_WIDTH;
        let y = (i as i32) / TILE_WIDTH;
        emit(Cell::new(x, y, alt));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_gz_tile(rows: i32, cols: i32, f: &mut File) {
        let mut enc = flate2::write::GzEncoder::new(f, flate2::Compression::fast());
        for y in 0..rows {
            for x in 0..cols {
                let v: i16 = if (x + y) % 7 == 0 { OCEAN } else { (x + y) as i16 };
                enc.write_all(&v.to_le_bytes()).unwrap();
            }
        }
        enc.finish().unwrap();
    }

    #[test]
    fn decodes_and_drops_ocean_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tileE.hgt.gz");
        {
            let mut f = File::create(&path).unwrap();
            write_gz_tile(4, 10800, &mut f);
        }
        let src = Noaa1::new(&path);
        let mut seen = Vec::new();
        src.read(&mut |c| seen.push(c)).unwrap();
        assert!(!seen.iter().any(|c| c.z == OCEAN));
        assert!(seen.iter().all(|c| c.p.x >= 0 && c.p.x < TILE_WIDTH));
    }

    #[test]
    fn rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.hgt.gz");
        {
            let mut f = File::create(&path).unwrap();
            let mut enc = flate2::write::GzEncoder::new(&mut f, flate2::Compression::fast());
            enc.write_all(&[0u8; 10]).unwrap();
            enc.finish().unwrap();
        }
        let src = Noaa1::new(&path);
        let mut seen = Vec::new();
        assert!(src.read(&mut |c| seen.push(c)).is_err());
    }
}
