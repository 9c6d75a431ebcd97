//! The prominence sweep: consumes cells in descending altitude order,
//! maintains a label grid and union-find over already-activated regions,
//! and emits one `ProminenceRecord` per merge (plus one per surviving
//! "island" region at termination).
//!
//! The union-find is a dense array of integer ids with path compression
//! and union-by-rank.

use anyhow::{Result, ensure};
use tracing::{debug, info};

use crate::cell::{Bounds, Cell, Point};

pub type RegionId = u32;
const EMPTY: RegionId = RegionId::MAX;

/// One emitted prominence event. `col` and `dom` are `None` for island
/// peaks; island-ness is surfaced explicitly rather than by overloading
/// `col`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProminenceRecord {
    pub peak: Cell,
    pub col: Option<Cell>,
    pub dom: Option<Cell>,
    pub is_island: bool,
}

impl ProminenceRecord {
    /// Prominence in meters, measured to `sea_level` for islands.
    pub fn prominence(&self, sea_level: crate::cell::Height) -> i32 {
        let col_z = self.col.map(|c| c.z).unwrap_or(sea_level);
        self.peak.z as i32 - col_z as i32
    }
}

struct Region {
    parent: RegionId,
    rank: u8,
    /// Only meaningful while this id is a root.
    peak: Cell,
    /// Monotonically increasing creation order, used to break peak-height
    /// ties deterministically: the earliest-activated region wins.
    seq: u32,
}

/// Dense flat label grid: `(maxx - minx) * (maxy - miny)` region ids. A
/// block-sparse scheme would use less memory on very sparse occupancy,
/// but isn't needed here.
struct LabelGrid {
    bounds: Bounds,
    labels: Vec<RegionId>,
}

impl LabelGrid {
    fn new(bounds: Bounds) -> Result<Self> {
        let w = bounds.width();
        let h = bounds.height_span();
        ensure!(w > 0 && h > 0, "empty or invalid bounds for label grid");
        let cells = w
            .checked_mul(h)
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| anyhow::anyhow!("label grid dimensions overflow"))?;
        Ok(Self { bounds, labels: vec![EMPTY; cells] })
    }

    fn index(&self, p: Point) -> Option<usize> {
        if !self.bounds.contains(p) {
            return None;
        }
        let x = (p.x - self.bounds.minx) as i64;
        let y = (p.y - self.bounds.miny) as i64;
        Some((y * self.bounds.width() + x) as usize)
    }

    fn get(&self, p: Point) -> Option<RegionId> {
        let idx = self.index(p)?;
        match self.labels[idx] {
            EMPTY => None,
            id => Some(id),
        }
    }

    fn set(&mut self, p: Point, id: RegionId) {
        if let Some(idx) = self.index(p) {
            self.labels[idx] = id;
        }
    }
}

/// Owns all sweep state: the label grid and the union-find over regions.
/// Single-threaded by design — the union-find state is inherently
/// sequential.
pub struct Sweep {
    grid: LabelGrid,
    regions: Vec<Region>,
    live_roots: std::collections::HashSet<RegionId>,
    next_seq: u32,
}

impl Sweep {
    pub fn new(bounds: Bounds) -> Result<Self> {
        Ok(Self {
            grid: LabelGrid::new(bounds)?,
            regions: Vec::new(),
            live_roots: std::collections::HashSet::new(),
            next_seq: 0,
        })
    }

    fn find(&mut self, id: RegionId) -> RegionId {
        let mut root = id;
        while self.regions[root as usize].parent != root {
            root = self.regions[root as usize].parent;
        }
        // Path compression.
        let mut cur = id;
        while self.regions[cur as usize].parent != root {
            let next = self.regions[cur as usize].parent;
            self.regions[cur as usize].parent = root;
            cur = next;
        }
        root
    }

    fn new_region(&mut self, peak: Cell) -> RegionId {
        let id = self.regions.len() as RegionId;
        self.regions.push(Region { parent: id, rank: 0, peak, seq: self.next_seq });
        self.next_seq += 1;
        self.live_roots.insert(id);
        id
    }

    /// Chooses the taller of two region roots' peaks; ties broken by
    /// earliest creation order.
    fn taller(&self, a: RegionId, b: RegionId) -> RegionId {
        let ra = &self.regions[a as usize];
        let rb = &self.regions[b as usize];
        match ra.peak.z.cmp(&rb.peak.z) {
            std::cmp::Ordering::Greater => a,
            std::cmp::Ordering::Less => b,
            std::cmp::Ordering::Equal => {
                if ra.seq <= rb.seq {
                    a
                } else {
                    b
                }
            }
        }
    }

    /// Union `loser` into `survivor`, emitting the prominence record for
    /// the loser's peak.
    fn merge_one(
        &mut self,
        loser: RegionId,
        survivor: RegionId,
        col: Cell,
        emit: &mut dyn FnMut(ProminenceRecord),
    ) {
        let loser = self.find(loser);
        let survivor = self.find(survivor);
        if loser == survivor {
            return;
        }
        emit(ProminenceRecord {
            peak: self.regions[loser as usize].peak,
            col: Some(col),
            dom: Some(self.regions[survivor as usize].peak),
            is_island: false,
        });

        // `survivor` must stay the root: its peak is the one that keeps
        // absorbing territory, so rank only governs when to bump it, not
        // which id wins.
        self.regions[loser as usize].parent = survivor;
        if self.regions[loser as usize].rank == self.regions[survivor as usize].rank {
            self.regions[survivor as usize].rank += 1;
        }
        self.live_roots.remove(&loser);
    }

    /// Activates one cell in descending-altitude order, emitting zero or
    /// more prominence records.
    pub fn activate(&mut self, c: Cell, emit: &mut dyn FnMut(ProminenceRecord)) {
        let mut neighbor_roots: Vec<RegionId> = Vec::with_capacity(4);
        for n in c.p.neighbors() {
            if let Some(id) = self.grid.get(n) {
                let root = self.find(id);
                if !neighbor_roots.contains(&root) {
                    neighbor_roots.push(root);
                }
            }
        }

        match neighbor_roots.len() {
            0 => {
                let id = self.new_region(c);
                self.grid.set(c.p, id);
            }
            1 => {
                let id = neighbor_roots[0];
                self.grid.set(c.p, id);
            }
            _ => {
                let survivor = neighbor_roots
                    .iter()
                    .copied()
                    .reduce(|a, b| self.taller(a, b))
                    .expect("non-empty neighbor_roots");
                for &loser in &neighbor_roots {
                    if loser != survivor {
                        self.merge_one(loser, survivor, c, emit);
                    }
                }
                self.grid.set(c.p, self.find(survivor));
            }
        }
    }

    /// Consumes a fully sorted (descending altitude) stream and drives
    /// the sweep, calling `emit` once per merge and once more per region
    /// still live ("island") when the stream closes.
    pub fn run(
        bounds: Bounds,
        cells: impl IntoIterator<Item = Cell>,
        mut emit: impl FnMut(ProminenceRecord),
    ) -> Result<()> {
        let mut sweep = Sweep::new(bounds)?;
        let mut merges = 0u64;
        let mut n = 0u64;
        for c in cells {
            ensure!(bounds.contains(c.p), "cell {} out of declared bounds", c.p);
            sweep.activate(c, &mut |r| {
                merges += 1;
                emit(r);
            });
            n += 1;
        }
        debug!(cells = n, regions = sweep.regions.len(), "sweep: activation complete");

        let mut roots: Vec<RegionId> = sweep.live_roots.iter().copied().collect();
        roots.sort_unstable();
        for root in &roots {
            emit(ProminenceRecord {
                peak: sweep.regions[*root as usize].peak,
                col: None,
                dom: None,
                is_island: true,
            });
        }
        info!(merges, islands = roots.len(), "sweep: done");
        Ok(())
    }

    /// Convenience wrapper over [`Sweep::run`] that collects every emitted
    /// record into a `Vec`, for callers that want the whole report at once.
    pub fn run_to_vec(bounds: Bounds, cells: impl IntoIterator<Item = Cell>) -> Result<Vec<ProminenceRecord>> {
        let mut out = Vec::new();
        Sweep::run(bounds, cells, |r| out.push(r))?;
        Ok(out)
    }
}
