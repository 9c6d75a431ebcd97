//! Batches individual cells into fixed-capacity slabs for cheap inter-stage
//! handoff, with slab storage reused via a free-list pool.
//!
//! The free-list is a plain mutex-guarded `Vec` rather than a per-thread
//! cache; incorrect recycling is only a throughput bug, not a correctness
//! one, so a single shared list is good enough.

use std::sync::Mutex;

use crate::cell::Cell;

/// Batch capacity. Fixed at build time: trades queue overhead (small C)
/// against per-cell latency (large C).
pub const CHUNK_CAPACITY: usize = 1024;

/// Process-wide free-list of reusable batch buffers.
#[derive(Default)]
pub struct ChunkPool {
    free: Mutex<Vec<Vec<Cell>>>,
}

impl ChunkPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a buffer from the pool, or allocate a fresh one at
    /// `CHUNK_CAPACITY`.
    pub fn acquire(&self) -> Vec<Cell> {
        match self.free.lock() {
            Ok(mut free) => free.pop().unwrap_or_else(|| Vec::with_capacity(CHUNK_CAPACITY)),
            Err(_) => Vec::with_capacity(CHUNK_CAPACITY),
        }
    }

    /// Return a drained buffer to the pool for reuse. Failing to call this
    /// only costs an allocation on the next `acquire`.
    pub fn release(&self, mut buf: Vec<Cell>) {
        buf.clear();
        if let Ok(mut free) = self.free.lock() {
            free.push(buf);
        }
    }
}

/// Gathers individual `send(cell)` calls into batches and forwards full
/// (or, on `close`, partial) batches over a bounded channel.
pub struct Chunker<'a> {
    buf: Vec<Cell>,
    tx: flume::Sender<Vec<Cell>>,
    pool: &'a ChunkPool,
}

impl<'a> Chunker<'a> {
    pub fn new(tx: flume::Sender<Vec<Cell>>, pool: &'a ChunkPool) -> Self {
        Self {
            buf: pool.acquire(),
            tx,
            pool,
        }
    }

    /// Queue a cell, eventually flushing a full batch downstream.
    pub fn send(&mut self, c: Cell) {
        if self.buf.len() == CHUNK_CAPACITY {
            self.flush();
        }
        self.buf.push(c);
    }

    fn flush(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let full = std::mem::replace(&mut self.buf, self.pool.acquire());
        // A closed receiver means downstream has already shut down (e.g.
        // the sweep hit a fatal error); dropping the batch is correct.
        let _ = self.tx.send(full);
    }

    /// Flush any partial batch and drop the sender, closing the channel.
    pub fn close(mut self) {
        self.flush();
    }
}
