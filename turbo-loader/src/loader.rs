//! Batch loader.
//!
//! One [`Loader`] is shared by every model of a batch. It owns the table of
//! [`MemoCell`]s, one per relation key, and hands the whole batch to each
//! relation fetch so a relation is loaded once for all siblings.
//!
//! # Ownership
//!
//! A loader refers to its batch weakly. The handles stored in the batch's own
//! models stay weak, so the batch never keeps itself alive. Every other handle,
//! obtained by cloning a model or a loader while the batch is alive, pins the
//! batch: a model clone outliving its siblings still loads relations.
//!
//! # Locking
//!
//! The cell table sits behind a synchronous lock that is only held while a
//! cell is looked up or inserted. It is always released before the cell's own
//! lock is awaited, so a slow fetch for one key never blocks another key.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

use crate::config::LoaderConfig;
use crate::error::LoadResult;
use crate::key::RelationKey;
use crate::memo::{CellStatus, MemoCell};

/// A batch of models loaded together.
///
/// Returned by [`initialize`](crate::initialize); dereferences to the models.
/// Cloning shares the batch. Use `to_vec()` to take the models out: the
/// clones keep the batch, and so their relations, alive.
pub struct Batch<M>(Arc<Vec<M>>);

impl<M> Batch<M> {
    pub(crate) fn from_shared(models: Arc<Vec<M>>) -> Self {
        Self(models)
    }

    /// The models of this batch.
    #[inline]
    pub fn as_slice(&self) -> &[M] {
        self.0.as_slice()
    }

    /// Check if two handles refer to the same batch.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<M> Clone for Batch<M> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<M> Deref for Batch<M> {
    type Target = [M];

    fn deref(&self) -> &[M] {
        self.as_slice()
    }
}

impl<'a, M> IntoIterator for &'a Batch<M> {
    type Item = &'a M;
    type IntoIter = std::slice::Iter<'a, M>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<M: fmt::Debug> fmt::Debug for Batch<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

/// Counters describing how a loader's cells were used.
#[derive(Debug, Default)]
pub struct LoaderStats {
    cells: AtomicU64,
    fetches: AtomicU64,
    hits: AtomicU64,
    replayed_errors: AtomicU64,
    cancellations: AtomicU64,
}

impl LoaderStats {
    pub(crate) fn record_cell(&self) {
        self.cells.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_replay(&self) {
        self.replayed_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancellation(&self) {
        self.cancellations.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cells: self.cells.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            replayed_errors: self.replayed_errors.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`LoaderStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Memo cells created.
    pub cells: u64,
    /// Fetches started.
    pub fetches: u64,
    /// Lookups served from a resolved cell.
    pub hits: u64,
    /// Cached errors handed out again.
    pub replayed_errors: u64,
    /// Fetches interrupted by cancellation or timeout.
    pub cancellations: u64,
}

impl StatsSnapshot {
    /// Fraction of resolutions served without fetching.
    #[inline]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.fetches;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct LoaderInner<M> {
    batch: Weak<Vec<M>>,
    len: usize,
    cells: Mutex<HashMap<RelationKey, Arc<MemoCell>>>,
    config: LoaderConfig,
    stats: LoaderStats,
}

/// Shared loading context of one batch.
///
/// Every model of the batch holds a clone of the same loader.
pub struct Loader<M> {
    inner: Arc<LoaderInner<M>>,
    /// Strong batch reference held by handles living outside the batch.
    pin: Option<Arc<Vec<M>>>,
}

impl<M> Loader<M> {
    pub(crate) fn new(batch: Weak<Vec<M>>, len: usize, config: LoaderConfig) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                batch,
                len,
                cells: Mutex::new(HashMap::new()),
                config,
                stats: LoaderStats::default(),
            }),
            pin: None,
        }
    }

    /// Number of models in the batch.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len
    }

    /// Check if the batch is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// The batch this loader serves, if it is still alive.
    pub fn batch(&self) -> Option<Batch<M>> {
        match &self.pin {
            Some(models) => Some(Batch::from_shared(Arc::clone(models))),
            None => self.inner.batch.upgrade().map(Batch::from_shared),
        }
    }

    /// Check if this handle keeps its batch alive.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin.is_some()
    }

    /// The configuration this loader was created with.
    #[inline]
    pub fn config(&self) -> &LoaderConfig {
        &self.inner.config
    }

    /// Snapshot of the loader's counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    pub(crate) fn raw_stats(&self) -> &LoaderStats {
        &self.inner.stats
    }

    /// Check if two handles refer to the same loader.
    #[inline]
    pub fn same_loader(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Get the memo cell for `key`, creating it if absent.
    ///
    /// The table lock is released before this returns.
    pub fn cell(&self, key: &RelationKey) -> Arc<MemoCell> {
        let mut cells = self.inner.cells.lock();
        if let Some(cell) = cells.get(key) {
            return Arc::clone(cell);
        }
        trace!(relation = %key, batch = self.inner.len, "Creating memo cell");
        self.inner.stats.record_cell();
        let cell = Arc::new(MemoCell::new(key.clone()));
        cells.insert(key.clone(), Arc::clone(&cell));
        cell
    }

    /// Relation keys that have a cell, sorted.
    pub fn keys(&self) -> Vec<RelationKey> {
        let mut keys: Vec<_> = self.inner.cells.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Check if a cell exists for `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.cells.lock().contains_key(key)
    }

    /// Status of the cell for `key`, if one exists.
    pub fn status(&self, key: &str) -> Option<CellStatus> {
        let cell = self.inner.cells.lock().get(key).cloned();
        cell.map(|cell| cell.status())
    }

    /// Derive a loader configuration for a batch spawned by this one.
    pub(crate) fn child_config(&self) -> LoadResult<LoaderConfig> {
        let config = self.inner.config.clone();
        config.validate()?;
        Ok(config)
    }
}

impl<M> Clone for Loader<M> {
    /// The clone pins the batch if it is still alive.
    ///
    /// While the batch is being built the weak reference cannot upgrade, so
    /// the handles bound into the batch's own models stay unpinned.
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            pin: self.pin.clone().or_else(|| self.inner.batch.upgrade()),
        }
    }
}

impl<M> fmt::Debug for Loader<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("len", &self.inner.len)
            .field("keys", &self.keys())
            .field("config", &self.inner.config)
            .finish()
    }
}
