//! Symbol Store
//!
//! Owns every instrument's market-data state. Cells live in a slot pool so
//! downstream consumers can hold stable numeric handles; the id index maps
//! symbol keys to handles. Updates happen under a per-symbol mutex (one
//! writer per symbol by contract); readers never touch that lock — each
//! update publishes a full snapshot through `ArcSwap`, so the read path is a
//! pointer load.

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::feed::{apply_feed, FeedBatch};
use super::symbol::{Symbol, SymbolKey, TradingSession};
use crate::pool::SlotPool;

/// A pooled symbol cell: mutable state for the writer, published snapshot
/// for everyone else.
pub struct SymbolCell {
    state: Mutex<Symbol>,
    published: ArcSwap<Symbol>,
}

impl SymbolCell {
    fn new(symbol: Symbol) -> Arc<Self> {
        Arc::new(Self {
            published: ArcSwap::from_pointee(symbol.clone()),
            state: Mutex::new(symbol),
        })
    }

    /// Latest published snapshot; wait-free.
    pub fn snapshot(&self) -> Arc<Symbol> {
        self.published.load_full()
    }

    /// Run `f` on the writer-side state and publish the result.
    pub fn update<R>(&self, f: impl FnOnce(&mut Symbol) -> R) -> R {
        let mut state = self.state.lock();
        let r = f(&mut state);
        self.published.store(Arc::new(state.clone()));
        r
    }
}

#[derive(Default)]
pub struct SymbolStoreStats {
    pub updates: AtomicU64,
    pub stale_rejected: AtomicU64,
}

struct StoreInner {
    pool: SlotPool<Option<Arc<SymbolCell>>>,
    index: HashMap<SymbolKey, usize>,
}

/// Instrument map for one market-data line.
pub struct SymbolStore {
    inner: RwLock<StoreInner>,
    default_price_div: u32,
    stats: SymbolStoreStats,
}

impl SymbolStore {
    pub fn new(default_price_div: u32) -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                pool: SlotPool::new(),
                index: HashMap::new(),
            }),
            default_price_div,
            stats: SymbolStoreStats::default(),
        }
    }

    pub fn stats(&self) -> &SymbolStoreStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.inner.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up an existing symbol cell.
    pub fn get(&self, id: &SymbolKey) -> Option<Arc<SymbolCell>> {
        let inner = self.inner.read();
        let idx = *inner.index.get(id)?;
        inner.pool.get(idx)?.clone()
    }

    /// Resolve a pooled handle; handles stay valid until the symbol is
    /// removed.
    pub fn by_handle(&self, handle: usize) -> Option<Arc<SymbolCell>> {
        self.inner.read().pool.get(handle)?.clone()
    }

    /// Get or create the cell for `id`; returns its stable handle too.
    pub fn fetch(&self, id: &SymbolKey) -> (usize, Arc<SymbolCell>) {
        {
            let inner = self.inner.read();
            if let Some(&idx) = inner.index.get(id) {
                if let Some(Some(cell)) = inner.pool.get(idx) {
                    return (idx, cell.clone());
                }
            }
        }
        let mut inner = self.inner.write();
        if let Some(&idx) = inner.index.get(id) {
            if let Some(Some(cell)) = inner.pool.get(idx) {
                return (idx, cell.clone());
            }
        }
        let cell = SymbolCell::new(Symbol::new(*id, self.default_price_div));
        let idx = inner.pool.add(Some(cell.clone()));
        inner.index.insert(*id, idx);
        debug!(symbol = %id, handle = idx, "symbol created");
        (idx, cell)
    }

    /// Drop `id` and return its slot to the pool.
    pub fn remove(&self, id: &SymbolKey) -> bool {
        let mut inner = self.inner.write();
        match inner.index.remove(id) {
            Some(idx) => inner.pool.release(idx),
            None => false,
        }
    }

    /// Apply a feed batch tagged with `session`. Returns `false` without
    /// touching the book when the freshness rule rejects the session (a
    /// stale day-session update after the night session opened).
    pub fn apply(&self, id: &SymbolKey, session: TradingSession, batch: &FeedBatch<'_>) -> bool {
        let (_, cell) = self.fetch(id);
        let accepted = cell.update(|symbol| {
            if !symbol.check_set_session(session) {
                return false;
            }
            let div = symbol.price_origin_div;
            apply_feed(&mut symbol.book, batch, div);
            true
        });
        if accepted {
            self.stats.updates.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.stale_rejected.fetch_add(1, Ordering::Relaxed);
        }
        accepted
    }

    /// Day rollover across every live symbol.
    pub fn daily_clear(&self, tday: u32) {
        let cells: Vec<Arc<SymbolCell>> = {
            let inner = self.inner.read();
            inner
                .index
                .values()
                .filter_map(|&idx| inner.pool.get(idx)?.clone())
                .collect()
        };
        for cell in &cells {
            cell.update(|symbol| symbol.daily_clear(tday));
        }
        info!(tday, symbols = cells.len(), "daily clear");
    }
}
