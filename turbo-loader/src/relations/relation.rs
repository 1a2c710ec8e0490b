//! Generic batched relation loading.

use std::future::Future;
use std::sync::Arc;

use tracing::Instrument;

use crate::context::LoadContext;
use crate::error::{LoadError, LoadResult};
use crate::key::RelationKey;
use crate::loader::{Batch, Loader};
use crate::logging::relation_span;
use crate::memo::Lookup;
use crate::model::{HasLoader, short_type_name};

impl<M: HasLoader> Loader<M> {
    /// Load relation `key` for `model`, fetching it for the whole batch at most once.
    ///
    /// `fetch` receives the full batch, not just `model`, and returns a lookup
    /// that answers for any model of the batch. The first caller for `key`
    /// runs it; everyone else, concurrent or later, reuses its lookup or its
    /// error.
    ///
    /// The lookup is kept for as long as the loader lives; it should not
    /// capture the [`Batch`] it was given or clones of its models, which would
    /// keep the batch alive forever.
    pub async fn load_relation<R, F, Fut, L>(
        &self,
        ctx: &LoadContext,
        key: impl Into<RelationKey>,
        model: &M,
        fetch: F,
    ) -> LoadResult<R>
    where
        R: 'static,
        F: FnOnce(LoadContext, Batch<M>) -> Fut,
        Fut: Future<Output = LoadResult<L>>,
        L: Fn(&M) -> R + Send + Sync + 'static,
    {
        let key = key.into();
        match model.loader() {
            None => {
                return Err(LoadError::uninitialized(short_type_name::<M>(), key.as_str()));
            }
            Some(bound) if !bound.same_loader(self) => {
                return Err(LoadError::foreign_model(short_type_name::<M>(), key.as_str()));
            }
            Some(_) => {}
        }

        let cell = self.cell(&key);
        let lookup = cell
            .resolve::<M, R, _, _>(ctx, self.config(), self.raw_stats(), || async {
                let batch = self
                    .batch()
                    .ok_or_else(|| LoadError::batch_dropped(short_type_name::<M>(), key.as_str()))?;
                let lookup = fetch(ctx.clone(), batch).await?;
                Ok::<_, LoadError>(Arc::new(lookup) as Lookup<M, R>)
            })
            .instrument(relation_span(&key, short_type_name::<M>(), self.len()))
            .await?;

        Ok(lookup(model))
    }
}

/// Load relation `key` for `model` through the loader it was initialized with.
///
/// Fails with [`ErrorCode::LoaderUninitialized`] if `model` never went through
/// [`initialize`](crate::initialize); it never falls back to loading `model` alone.
///
/// [`ErrorCode::LoaderUninitialized`]: crate::ErrorCode::LoaderUninitialized
///
/// # Example
///
/// ```rust
/// use std::collections::HashMap;
/// use turbo_loader::{LoadContext, LoaderSlot, impl_has_loader, initialize, load_relation};
///
/// #[derive(Clone)]
/// struct Book {
///     id: i64,
///     author_id: Option<i64>,
///     loader: LoaderSlot<Book>,
/// }
/// impl_has_loader!(Book, loader);
///
/// # tokio_test();
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn tokio_test() {
/// let books = initialize(vec![
///     Book { id: 1, author_id: Some(7), loader: LoaderSlot::default() },
///     Book { id: 2, author_id: None, loader: LoaderSlot::default() },
/// ]);
///
/// let ctx = LoadContext::new();
/// let author = load_relation(&ctx, "author_name", &books[0], |_ctx, batch| async move {
///     let wanted: Vec<i64> = batch.iter().filter_map(|b| b.author_id).collect();
///     let names: HashMap<i64, String> =
///         wanted.into_iter().map(|id| (id, format!("author-{id}"))).collect();
///     Ok(move |b: &Book| b.author_id.and_then(|id| names.get(&id).cloned()))
/// })
/// .await
/// .unwrap();
///
/// assert_eq!(author.as_deref(), Some("author-7"));
/// # }
/// ```
pub async fn load_relation<M, R, F, Fut, L>(
    ctx: &LoadContext,
    key: impl Into<RelationKey>,
    model: &M,
    fetch: F,
) -> LoadResult<R>
where
    M: HasLoader,
    R: 'static,
    F: FnOnce(LoadContext, Batch<M>) -> Fut,
    Fut: Future<Output = LoadResult<L>>,
    L: Fn(&M) -> R + Send + Sync + 'static,
{
    let key = key.into();
    let loader = model
        .loader()
        .ok_or_else(|| LoadError::uninitialized(short_type_name::<M>(), key.as_str()))?;
    loader.load_relation(ctx, key, model, fetch).await
}
