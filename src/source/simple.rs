//! An in-memory data set, for tests and the built-in toy scenario.

use anyhow::{Result, ensure};

use super::{GeoPos, Source};
use crate::cell::{Bounds, Cell};

/// A fixed slice of cells with a trivial identity mapping to real-world
/// coordinates (grid units stand in for degrees and meters directly).
#[derive(Debug, Clone)]
pub struct SimpleDataSet {
    cells: Vec<Cell>,
    bounds: Bounds,
}

impl SimpleDataSet {
    pub fn new(cells: Vec<Cell>) -> Result<Self> {
        ensure!(!cells.is_empty(), "simple data set must have at least one cell");
        let bounds = Bounds::of(&cells).expect("non-empty cells always have bounds");
        Ok(Self { cells, bounds })
    }

    /// The eight-cell toy island used as the default `--format test` input.
    pub fn toy_island() -> Self {
        Self::new(vec![
            Cell::new(0, 0, 5),
            Cell::new(0, 1, 6),
            Cell::new(0, 2, 7),
            Cell::new(0, 3, 6),
            Cell::new(1, 0, 5),
            Cell::new(1, 1, 8),
            Cell::new(1, 2, 3),
            Cell::new(1, 3, 4),
        ])
        .expect("toy island is non-empty")
    }
}

impl Source for SimpleDataSet {
    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn pos(&self, c: Cell) -> GeoPos {
        GeoPos { lat: c.p.x as f64, lon: c.p.y as f64, meters: c.z as f64 }
    }

    fn read(&self, emit: &mut dyn FnMut(Cell)) -> Result<()> {
        for &c in &self.cells {
            emit(c);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_match_cells_with_padding() {
        let ds = SimpleDataSet::toy_island();
        let b = ds.bounds();
        assert_eq!((b.minx, b.maxx), (0, 2));
        assert_eq!((b.miny, b.maxy), (0, 4));
    }

    #[test]
    fn read_visits_every_cell_once() {
        let ds = SimpleDataSet::toy_island();
        let mut seen = Vec::new();
        ds.read(&mut |c| seen.push(c)).unwrap();
        assert_eq!(seen.len(), 8);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(SimpleDataSet::new(Vec::new()).is_err());
    }
}
