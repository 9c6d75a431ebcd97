//! Decoder for SRTM3 tiles (http://dds.cr.usgs.gov/srtm/version2_1/SRTM3),
//! laid out on disk as `<root>/<continent>/<NSEW-name>.hgt.zip`.
//!
//! Each zip holds a single big-endian 16-bit `.hgt` file: 1201 samples
//! per row and 1201 rows, with one row and one column of overlap shared
//! with neighboring tiles. Samples are dropped at 0 (ocean) and -32768
//! (data void).

use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::info;
use zip::ZipArchive;

use super::{GeoPos, Source};
use crate::cell::{Bounds, Cell};

const SAMPLES_PER_DEGREE: i32 = 1200;
const TILE_SAMPLES: usize = 1201;
const DATA_VOID: i16 = -32768;

pub struct Srtm3 {
    root: PathBuf,
}

impl Srtm3 {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn tile_paths(&self) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for continent in std::fs::read_dir(&self.root)
            .with_context(|| format!("reading srtm3 root {:?}", self.root))?
        {
            let continent = continent?;
            if !continent.file_type()?.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(continent.path())? {
                let entry = entry?;
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if name.ends_with(".hgt.zip") {
                    out.push(entry.path());
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

/// Parses a tile name like `N34W118.hgt.zip` into its southwest corner,
/// in whole degrees.
fn parse_tile_name(name: &str) -> Result<(i32, i32)> {
    let bytes = name.as_bytes();
    if bytes.len() < 7 {
        bail!("tile name {name:?} too short");
    }
    let ns = bytes[0] as char;
    let digits_end = name[1..].find(|c: char| !c.is_ascii_digit()).map(|i| i + 1).unwrap_or(name.len());
    let n: i32 = name[1..digits_end].parse().with_context(|| format!("parsing latitude in {name:?}"))?;
    let rest = &name[digits_end..];
    let ew = rest.as_bytes().first().copied().ok_or_else(|| anyhow::anyhow!("missing E/W in {name:?}"))? as char;
    let e_end = rest[1..].find(|c: char| !c.is_ascii_digit()).map(|i| i + 1).unwrap_or(rest.len());
    let e: i32 = rest[1..e_end].parse().with_context(|| format!("parsing longitude in {name:?}"))?;

    let n = if ns == 'S' { -n } else { n };
    let e = if ew == 'W' { -e } else { e };
    Ok((n, e))
}

impl Source for Srtm3 {
    fn bounds(&self) -> Bounds {
        Bounds { minx: 0, maxx: 432_000, miny: 0, maxy: 216_000, minz: -499, maxz: 8849 }
    }

    fn pos(&self, c: Cell) -> GeoPos {
        GeoPos {
            lat: 90.0 - (c.p.y as f64) / 1200.0,
            lon: (c.p.x as f64) / 1200.0 - 180.0,
            meters: c.z as f64,
        }
    }

    fn read(&self, emit: &mut dyn FnMut(Cell)) -> Result<()> {
        for path in self.tile_paths()? {
            decode_tile(&path, emit)?;
        }
        Ok(())
    }
}

fn decode_tile(path: &Path, emit: &mut dyn FnMut(Cell)) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("non-utf8 tile path {path:?}"))?;
    let (n, e) = parse_tile_name(file_name)?;
    info!(tile = file_name, "reading srtm3 tile");

    let f = File::open(path).with_context(|| format!("opening srtm3 tile {path:?}"))?;
    let mut zip = ZipArchive::new(f).with_context(|| format!("opening zip {path:?}"))?;
    if zip.len() != 1 {
        bail!("expected exactly one entry in {path:?}, got {}", zip.len());
    }
    let mut entry = zip.by_index(0)?;
    let mut buf = Vec::new();
    entry.read_to_end(&mut buf).with_context(|| format!("reading zip entry in {path:?}"))?;

    let expected = 2 * TILE_SAMPLES * TILE_SAMPLES;
    if buf.len() != expected {
        bail!("bad byte count in {path:?}: want {expected}, got {}", buf.len());
    }

    // Tiles are named by their lower-left corner, but sample data starts
    // at the upper-left, one row north of the named corner.
    let x0 = SAMPLES_PER_DEGREE * (180 + e);
    let y0 = SAMPLES_PER_DEGREE * (90 - n) - SAMPLES_PER_DEGREE;

    let mut pos = 0usize;
    for i in 0..SAMPLES_PER_DEGREE {
        for j in 0..SAMPLES_PER_DEGREE {
            let z = i16::from_be_bytes([buf[pos], buf[pos + 1]]);
            pos += 2;
            if z != 0 && z != DATA_VOID {
                emit(Cell::new(x0 + j, y0 + i, z));
            }
        }
        pos += 2; // last column of the row overlaps the next tile east.
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tile_names() {
        assert_eq!(parse_tile_name("N34W118.hgt.zip").unwrap(), (34, -118));
        assert_eq!(parse_tile_name("S12E045.hgt.zip").unwrap(), (-12, 45));
    }

    #[test]
    fn rejects_short_name() {
        assert!(parse_tile_name("N3.zip").is_err());
    }
}
