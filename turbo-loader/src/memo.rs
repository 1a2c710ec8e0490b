//! Single-flight memo cells.
//!
//! A [`MemoCell`] caches the outcome of one relation fetch for one loader.
//! The cell's lock is held across the fetch, so concurrent callers suspend on
//! the lock and then observe the resolved state instead of fetching again.
//!
//! ```text
//!            first caller runs fetch
//!  Pending ─────────────────────────────► Ready(lookup)
//!     │                                   Failed(error)
//!     └── fetch interrupted (CancelPolicy::Retry): stays Pending
//! ```
//!
//! Resolution is terminal. A failed fetch is replayed to every later caller.

use std::any::{Any, type_name};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, error, trace, warn};

use crate::config::LoaderConfig;
use crate::context::LoadContext;
use crate::error::{LoadError, LoadResult};
use crate::key::RelationKey;
use crate::loader::LoaderStats;

/// Per-model lookup produced by a relation fetch.
pub type Lookup<M, R> = Arc<dyn Fn(&M) -> R + Send + Sync>;

/// Lookup with its result type erased, tagged with the erased type's name.
struct ErasedLookup {
    value: Arc<dyn Any + Send + Sync>,
    result_type: &'static str,
}

impl ErasedLookup {
    fn new<M: 'static, R: 'static>(lookup: Lookup<M, R>) -> Self {
        Self {
            value: Arc::new(lookup),
            result_type: type_name::<R>(),
        }
    }

    fn restore<M: 'static, R: 'static>(&self, key: &RelationKey) -> LoadResult<Lookup<M, R>> {
        match self.value.downcast_ref::<Lookup<M, R>>() {
            Some(lookup) => Ok(Arc::clone(lookup)),
            None => {
                let expected = type_name::<R>();
                error!(
                    relation = %key,
                    expected = expected,
                    found = self.result_type,
                    "Relation requested with mismatched result type"
                );
                Err(LoadError::type_mismatch(key.as_str(), expected, self.result_type))
            }
        }
    }
}

enum CellState {
    Pending,
    Ready(ErasedLookup),
    Failed(LoadError),
}

/// Observable state of a memo cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStatus {
    /// No fetch has completed.
    Pending,
    /// A caller currently holds the cell (usually a fetch in flight).
    Busy,
    /// Resolved with a lookup.
    Ready,
    /// Resolved with a cached error.
    Failed,
}

/// Single-flight cache entry for one relation key of one loader.
pub struct MemoCell {
    key: RelationKey,
    state: Mutex<CellState>,
}

impl MemoCell {
    pub(crate) fn new(key: RelationKey) -> Self {
        Self {
            key,
            state: Mutex::new(CellState::Pending),
        }
    }

    /// The relation key this cell memoizes.
    pub fn key(&self) -> &RelationKey {
        &self.key
    }

    /// Best-effort snapshot of the cell state. Never waits.
    pub fn status(&self) -> CellStatus {
        match self.state.try_lock() {
            Ok(state) => match &*state {
                CellState::Pending => CellStatus::Pending,
                CellState::Ready(_) => CellStatus::Ready,
                CellState::Failed(_) => CellStatus::Failed,
            },
            Err(_) => CellStatus::Busy,
        }
    }

    /// Resolve the cell, running `fetch` only if no earlier call resolved it.
    ///
    /// Waiting for the cell lock and running the fetch both observe `ctx`:
    /// a cancelled waiter leaves without touching the cell, while an
    /// interrupted fetch is handled according to the loader's [`CancelPolicy`].
    ///
    /// [`CancelPolicy`]: crate::config::CancelPolicy
    pub(crate) async fn resolve<M, R, F, Fut>(
        &self,
        ctx: &LoadContext,
        config: &LoaderConfig,
        stats: &LoaderStats,
        fetch: F,
    ) -> LoadResult<Lookup<M, R>>
    where
        M: 'static,
        R: 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = LoadResult<Lookup<M, R>>>,
    {
        let mut state = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(LoadError::cancelled(self.key.as_str())),
            guard = self.state.lock() => guard,
        };

        match &*state {
            CellState::Ready(lookup) => {
                stats.record_hit();
                trace!(relation = %self.key, "Relation served from memo");
                return lookup.restore(&self.key);
            }
            CellState::Failed(err) => {
                stats.record_replay();
                trace!(relation = %self.key, code = %err.code, "Replaying cached relation error");
                return Err(err.clone());
            }
            CellState::Pending => {}
        }

        stats.record_fetch();
        let started = Instant::now();
        debug!(relation = %self.key, "Fetching relation");

        match self.run(ctx, config, fetch).await {
            Ok(lookup) => {
                debug!(
                    relation = %self.key,
                    elapsed_us = micros(started.elapsed()),
                    "Relation fetched"
                );
                *state = CellState::Ready(ErasedLookup::new(Arc::clone(&lookup)));
                Ok(lookup)
            }
            Err(err) if err.is_interrupted() => {
                stats.record_cancellation();
                debug!(
                    relation = %self.key,
                    code = %err.code,
                    cached = config.cancel_policy.caches_error(),
                    "Relation fetch interrupted"
                );
                if config.cancel_policy.caches_error() {
                    *state = CellState::Failed(err.clone());
                }
                Err(err)
            }
            Err(mut err) => {
                if err.context.relation.is_none() {
                    err = err.with_relation(self.key.as_str());
                }
                warn!(relation = %self.key, error = %err, "Relation fetch failed");
                *state = CellState::Failed(err.clone());
                Err(err)
            }
        }
    }

    async fn run<M, R, F, Fut>(
        &self,
        ctx: &LoadContext,
        config: &LoaderConfig,
        fetch: F,
    ) -> LoadResult<Lookup<M, R>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LoadResult<Lookup<M, R>>>,
    {
        if ctx.is_cancelled() {
            return Err(LoadError::cancelled(self.key.as_str()));
        }

        let limit = ctx.timeout().or(config.fetch_timeout);
        let fetch = fetch();
        let bounded = async {
            match limit {
                Some(limit) => match tokio::time::timeout(limit, fetch).await {
                    Ok(result) => result,
                    Err(_) => Err(LoadError::timeout(
                        self.key.as_str(),
                        millis(limit),
                    )),
                },
                None => fetch.await,
            }
        };

        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(LoadError::cancelled(self.key.as_str())),
            result = bounded => result,
        }
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl fmt::Debug for MemoCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoCell")
            .field("key", &self.key)
            .field("status", &self.status())
            .finish()
    }
}
