//! Parent → children loading.
//!
//! The most common relation shape: every child row carries the identifier of
//! its parent. [`load_children`] collects the parent ids of the whole batch,
//! fetches all children in one round trip, binds them to a fresh loader of
//! their own and groups them by parent id.
//!
//! ```text
//! authors [1, 2, 3] ──► fetch_children([1, 2, 3]) ──► books [b1(1), b2(1), b3(3)]
//!                                                          │ initialize
//!                                                          ▼
//!                          author 1 → [b1, b2]   author 2 → []   author 3 → [b3]
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;

use indexmap::IndexSet;
use smallvec::SmallVec;
use tracing::debug;

use crate::config::LoaderConfig;
use crate::context::LoadContext;
use crate::error::{LoadError, LoadResult};
use crate::key::RelationKey;
use crate::loader::{Batch, Loader};
use crate::model::{HasLoader, bind, short_type_name};

/// Extractors and fetch function describing a parent → children relation.
pub struct ChildrenArgs<P, F, K> {
    /// Identifier of a parent model.
    pub parent_id: P,
    /// Fetch every child whose parent id is in the given set.
    pub fetch_children: F,
    /// Parent identifier carried by a child row.
    pub child_parent_id: K,
}

impl<P, F, K> ChildrenArgs<P, F, K> {
    /// Bundle the three functions of a children relation.
    pub fn new(parent_id: P, fetch_children: F, child_parent_id: K) -> Self {
        Self {
            parent_id,
            fetch_children,
            child_parent_id,
        }
    }
}

impl<P, F, K> fmt::Debug for ChildrenArgs<P, F, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildrenArgs").finish_non_exhaustive()
    }
}

/// Children of a batch, grouped by parent id.
struct GroupedChildren<C, Id> {
    children: Batch<C>,
    groups: HashMap<Id, SmallVec<[usize; 4]>>,
}

impl<C: Clone, Id: Eq + Hash> GroupedChildren<C, Id> {
    fn get(&self, parent: &Id) -> Vec<C> {
        self.groups
            .get(parent)
            .map(|indexes| indexes.iter().map(|&i| self.children[i].clone()).collect())
            .unwrap_or_default()
    }
}

impl<M: HasLoader> Loader<M> {
    /// Load the children of `model`, fetching children for the whole batch at most once.
    ///
    /// A parent without children gets an empty `Vec`. The returned children are
    /// bound to a loader shared by all children fetched for this batch, so
    /// their own relations batch as well.
    pub async fn load_children<C, Id, P, F, Fut, K>(
        &self,
        ctx: &LoadContext,
        key: impl Into<RelationKey>,
        model: &M,
        args: ChildrenArgs<P, F, K>,
    ) -> LoadResult<Vec<C>>
    where
        C: HasLoader + Clone,
        Id: Eq + Hash + Clone + Send + Sync + 'static,
        P: Fn(&M) -> Id + Send + Sync + 'static,
        F: FnMut(LoadContext, Vec<Id>) -> Fut,
        Fut: Future<Output = LoadResult<Vec<C>>>,
        K: Fn(&C) -> Id,
    {
        let config = self.child_config()?;
        let ChildrenArgs {
            parent_id,
            fetch_children,
            child_parent_id,
        } = args;

        self.load_relation(ctx, key, model, move |ctx, batch| async move {
            let grouped =
                fetch_grouped(&ctx, &batch, &parent_id, fetch_children, child_parent_id, config).await?;
            Ok::<_, LoadError>(move |parent: &M| grouped.get(&parent_id(parent)))
        })
        .await
    }
}

/// Load the children of `model` through the loader it was initialized with.
///
/// See [`Loader::load_children`].
pub async fn load_children<M, C, Id, P, F, Fut, K>(
    ctx: &LoadContext,
    key: impl Into<RelationKey>,
    model: &M,
    args: ChildrenArgs<P, F, K>,
) -> LoadResult<Vec<C>>
where
    M: HasLoader,
    C: HasLoader + Clone,
    Id: Eq + Hash + Clone + Send + Sync + 'static,
    P: Fn(&M) -> Id + Send + Sync + 'static,
    F: FnMut(LoadContext, Vec<Id>) -> Fut,
    Fut: Future<Output = LoadResult<Vec<C>>>,
    K: Fn(&C) -> Id,
{
    let key = key.into();
    let loader = model
        .loader()
        .ok_or_else(|| LoadError::uninitialized(short_type_name::<M>(), key.as_str()))?;
    loader.load_children(ctx, key, model, args).await
}

async fn fetch_grouped<M, C, Id, P, F, Fut, K>(
    ctx: &LoadContext,
    batch: &Batch<M>,
    parent_id: &P,
    fetch_children: F,
    child_parent_id: K,
    config: LoaderConfig,
) -> LoadResult<GroupedChildren<C, Id>>
where
    C: HasLoader,
    Id: Eq + Hash + Clone,
    P: Fn(&M) -> Id,
    F: FnMut(LoadContext, Vec<Id>) -> Fut,
    Fut: Future<Output = LoadResult<Vec<C>>>,
    K: Fn(&C) -> Id,
{
    let ids: IndexSet<Id> = batch.iter().map(parent_id).collect();
    let parents = ids.len();
    let rows = fetch_rows(ctx, ids.into_iter().collect(), config.max_batch_size, fetch_children).await?;

    debug!(
        parent = short_type_name::<M>(),
        child = short_type_name::<C>(),
        batch = batch.len(),
        parents = parents,
        children = rows.len(),
        "Fetched children"
    );

    let children = bind(rows, config);
    let mut groups: HashMap<Id, SmallVec<[usize; 4]>> = HashMap::new();
    for (index, child) in children.iter().enumerate() {
        groups.entry(child_parent_id(child)).or_default().push(index);
    }

    Ok(GroupedChildren { children, groups })
}

/// Issue the children round trips, one per chunk of at most `max_batch_size` ids.
async fn fetch_rows<Id, C, F, Fut>(
    ctx: &LoadContext,
    ids: Vec<Id>,
    max_batch_size: Option<usize>,
    mut fetch_children: F,
) -> LoadResult<Vec<C>>
where
    Id: Clone,
    F: FnMut(LoadContext, Vec<Id>) -> Fut,
    Fut: Future<Output = LoadResult<Vec<C>>>,
{
    match max_batch_size {
        Some(size) if ids.len() > size => {
            let mut rows = Vec::new();
            for chunk in ids.chunks(size) {
                rows.extend(fetch_children(ctx.clone(), chunk.to_vec()).await?);
            }
            Ok(rows)
        }
        _ => fetch_children(ctx.clone(), ids).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LoaderSlot, initialize, initialize_with};
    use crate::relations::load_relation;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[derive(Debug, Clone, Default)]
    struct Parent {
        id: u32,
        loader: LoaderSlot<Parent>,
    }

    #[derive(Debug, Clone, Default)]
    struct Child {
        id: u32,
        parent_id: u32,
        loader: LoaderSlot<Child>,
    }

    crate::impl_has_loader!(Parent, loader);
    crate::impl_has_loader!(Child, loader);

    fn parents(ids: &[u32]) -> Vec<Parent> {
        ids.iter()
            .map(|&id| Parent {
                id,
                ..Default::default()
            })
            .collect()
    }

    fn child(id: u32, parent_id: u32) -> Child {
        Child {
            id,
            parent_id,
            ..Default::default()
        }
    }

    /// Fake store: children (1→1), (2→1), (3→3) plus a log of requested id sets.
    #[derive(Clone, Default)]
    struct Store {
        calls: Arc<Mutex<Vec<Vec<u32>>>>,
    }

    impl Store {
        async fn children_of(&self, ids: Vec<u32>) -> LoadResult<Vec<Child>> {
            self.calls.lock().push(ids.clone());
            Ok([child(1, 1), child(2, 1), child(3, 3)]
                .into_iter()
                .filter(|c| ids.contains(&c.parent_id))
                .collect())
        }

        fn calls(&self) -> Vec<Vec<u32>> {
            self.calls.lock().clone()
        }
    }

    async fn children_of(store: &Store, ctx: &LoadContext, parent: &Parent) -> LoadResult<Vec<Child>> {
        let store = store.clone();
        load_children(
            ctx,
            "children",
            parent,
            ChildrenArgs::new(
                |p: &Parent| p.id,
                move |_ctx, ids| {
                    let store = store.clone();
                    async move { store.children_of(ids).await }
                },
                |c: &Child| c.parent_id,
            ),
        )
        .await
    }

    fn ids(children: &[Child]) -> Vec<u32> {
        children.iter().map(|c| c.id).collect()
    }

    #[tokio::test]
    async fn test_groups_by_parent_with_empty_groups() {
        let store = Store::default();
        let batch = initialize(parents(&[1, 2, 3]));
        let ctx = LoadContext::new();

        let first = children_of(&store, &ctx, &batch[0]).await.unwrap();
        let second = children_of(&store, &ctx, &batch[1]).await.unwrap();
        let third = children_of(&store, &ctx, &batch[2]).await.unwrap();

        assert_eq!(ids(&first), vec![1, 2]);
        assert_eq!(ids(&second), Vec::<u32>::new());
        assert_eq!(ids(&third), vec![3]);
        assert_eq!(store.calls(), vec![vec![1, 2, 3]]);
    }

    #[tokio::test]
    async fn test_children_share_a_fresh_loader() {
        let store = Store::default();
        let batch = initialize(parents(&[1, 3]));
        let ctx = LoadContext::new();

        let first = children_of(&store, &ctx, &batch[0]).await.unwrap();
        let second = children_of(&store, &ctx, &batch[1]).await.unwrap();

        let loader = first[0].loader().unwrap();
        assert_eq!(loader.len(), 3);
        assert!(first.iter().chain(&second).all(|c| c.loader().unwrap().same_loader(loader)));
        assert!(loader.batch().is_some());
    }

    #[tokio::test]
    async fn test_children_outlive_their_parents() {
        let store = Store::default();
        let ctx = LoadContext::new();

        let children = {
            let batch = initialize(parents(&[1, 3]));
            children_of(&store, &ctx, &batch[0]).await.unwrap()
        };

        let siblings = load_relation(&ctx, "siblings", &children[0], |_ctx, all: Batch<Child>| async move {
            let ids: Vec<u32> = all.iter().map(|c| c.id).collect();
            Ok(move |_: &Child| ids.clone())
        })
        .await
        .unwrap();

        assert_eq!(ids(&children), vec![1, 2]);
        assert_eq!(siblings, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_duplicate_parent_ids_are_fetched_once() {
        let store = Store::default();
        let batch = initialize(parents(&[1, 1, 3]));
        let ctx = LoadContext::new();

        let a = children_of(&store, &ctx, &batch[0]).await.unwrap();
        let b = children_of(&store, &ctx, &batch[1]).await.unwrap();

        assert_eq!(store.calls(), vec![vec![1, 3]]);
        assert_eq!(ids(&a), vec![1, 2]);
        assert_eq!(ids(&b), vec![1, 2]);
        assert_eq!(a[0].loader().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_max_batch_size_splits_round_trips() {
        let store = Store::default();
        let config = LoaderConfig::new().with_max_batch_size(2);
        let batch = initialize_with(parents(&[1, 2, 3]), config.clone()).unwrap();
        let ctx = LoadContext::new();

        let third = children_of(&store, &ctx, &batch[2]).await.unwrap();

        assert_eq!(ids(&third), vec![3]);
        assert_eq!(store.calls(), vec![vec![1, 2], vec![3]]);
        assert_eq!(third[0].loader().unwrap().config(), &config);
    }

    #[tokio::test]
    async fn test_fetch_error_is_cached() {
        let batch = initialize(parents(&[1, 2]));
        let ctx = LoadContext::new();
        let attempts = Arc::new(Mutex::new(0));

        for parent in &batch {
            let attempts = Arc::clone(&attempts);
            let err = load_children(
                &ctx,
                "children",
                parent,
                ChildrenArgs::new(
                    |p: &Parent| p.id,
                    move |_ctx, _ids: Vec<u32>| {
                        *attempts.lock() += 1;
                        async { Err::<Vec<Child>, _>(LoadError::fetch_message("store offline")) }
                    },
                    |c: &Child| c.parent_id,
                ),
            )
            .await
            .unwrap_err();
            assert!(err.is_fetch_error());
        }

        assert_eq!(*attempts.lock(), 1);
    }
}
