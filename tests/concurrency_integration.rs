//! Integration tests for concurrent relation loading.
//!
//! These tests verify the single-flight guarantees of the loader:
//! - Concurrent callers for one relation share one fetch
//! - Errors are replayed to concurrent and later callers, never refetched
//! - Relation keys resolve independently
//! - Cancellation and timeouts follow the loader's cancel policy

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use turbo::loader::CellStatus;
use turbo::prelude::*;

#[derive(Debug, Clone, Default)]
struct Node {
    id: u64,
    loader: LoaderSlot<Node>,
}

impl_has_loader!(Node, loader);

fn nodes(n: u64) -> Vec<Node> {
    (0..n)
        .map(|id| Node {
            id,
            ..Default::default()
        })
        .collect()
}

/// Load "sum": the sum of all ids in the batch, counting fetches.
async fn batch_sum(ctx: &LoadContext, node: &Node, fetches: Arc<AtomicUsize>) -> LoadResult<u64> {
    load_relation(ctx, "sum", node, move |_ctx, batch: Batch<Node>| async move {
        fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let sum: u64 = batch.iter().map(|n| n.id).sum();
        Ok(move |_: &Node| sum)
    })
    .await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_fetch() {
    let batch = initialize(nodes(64));
    let fetches = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..batch.len())
        .map(|i| {
            let batch = batch.clone();
            let fetches = Arc::clone(&fetches);
            tokio::spawn(async move {
                let ctx = LoadContext::new();
                batch_sum(&ctx, &batch[i], fetches).await
            })
        })
        .collect();

    for handle in futures::future::join_all(handles).await {
        assert_eq!(handle.unwrap().unwrap(), (0..64).sum::<u64>());
    }

    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    let stats = batch[0].loader().unwrap().stats();
    assert_eq!(stats.fetches, 1);
    assert_eq!(stats.hits, 63);
}

#[tokio::test]
async fn test_error_is_replayed_without_refetching() {
    let batch = initialize(nodes(3));
    let ctx = LoadContext::new();
    let attempts = Arc::new(AtomicUsize::new(0));

    let mut errors = Vec::new();
    for node in &batch {
        let attempts = Arc::clone(&attempts);
        let err = load_relation(&ctx, "broken", node, move |_ctx, _batch| async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<fn(&Node) -> u64, _>(LoadError::fetch_message("backend unavailable"))
        })
        .await
        .unwrap_err();
        errors.push(err);
    }

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(errors.iter().all(|e| e == &errors[0]));
    assert_eq!(errors[0].context.relation.as_deref(), Some("broken"));

    let loader = batch[0].loader().unwrap();
    assert_eq!(loader.status("broken"), Some(CellStatus::Failed));
    assert_eq!(loader.stats().replayed_errors, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_error() {
    const CALLERS: usize = 16;
    let batch = initialize(nodes(CALLERS as u64));
    let attempts = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..CALLERS)
        .map(|i| {
            let batch = batch.clone();
            let attempts = Arc::clone(&attempts);
            tokio::spawn(async move {
                let ctx = LoadContext::new();
                load_relation(&ctx, "broken", &batch[i], move |_ctx, _batch| async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Err::<fn(&Node) -> u64, _>(LoadError::fetch_message("backend unavailable"))
                })
                .await
            })
        })
        .collect();

    let mut errors = Vec::new();
    for handle in futures::future::join_all(handles).await {
        errors.push(handle.unwrap().unwrap_err());
    }

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(errors.len(), CALLERS);
    assert!(errors.iter().all(|e| e == &errors[0]));
    assert!(errors[0].is_fetch_error());

    let stats = batch[0].loader().unwrap().stats();
    assert_eq!(stats.fetches, 1);
    assert_eq!(stats.replayed_errors, (CALLERS - 1) as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_keys_resolve_independently() {
    let batch = initialize(nodes(2));
    let release = Arc::new(Notify::new());

    let slow = {
        let batch = batch.clone();
        let release = Arc::clone(&release);
        tokio::spawn(async move {
            let ctx = LoadContext::new();
            load_relation(&ctx, "books", &batch[0], move |_ctx, _batch| async move {
                release.notified().await;
                Ok(|_: &Node| "books")
            })
            .await
        })
    };

    let loader = batch[0].loader().unwrap();
    while loader.status("books") != Some(CellStatus::Busy) {
        tokio::task::yield_now().await;
    }

    let ctx = LoadContext::new();
    let fast = load_relation(&ctx, "chapters", &batch[1], |_ctx, _batch| async {
        Ok(|n: &Node| n.id)
    })
    .await
    .unwrap();

    assert_eq!(fast, 1);
    assert_eq!(loader.status("chapters"), Some(CellStatus::Ready));
    assert!(!slow.is_finished());

    release.notify_one();
    assert_eq!(slow.await.unwrap().unwrap(), "books");
    assert_eq!(loader.status("books"), Some(CellStatus::Ready));
}

#[tokio::test]
async fn test_cancelled_fetch_is_retried_by_default() {
    let batch = initialize(nodes(2));
    let token = CancellationToken::new();
    let ctx = LoadContext::with_token(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
    });

    let err = load_relation(&ctx, "value", &batch[0], |_ctx, _batch| async {
        std::future::pending::<()>().await;
        Ok(|_: &Node| 0u64)
    })
    .await
    .unwrap_err();
    canceller.await.unwrap();

    assert!(err.is_cancelled());
    let loader = batch[0].loader().unwrap();
    assert_eq!(loader.status("value"), Some(CellStatus::Pending));

    let fresh = LoadContext::new();
    let value = load_relation(&fresh, "value", &batch[1], |_ctx, _batch| async {
        Ok(|n: &Node| n.id + 100)
    })
    .await
    .unwrap();

    assert_eq!(value, 101);
    assert_eq!(loader.stats().fetches, 2);
    assert_eq!(loader.stats().cancellations, 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_cached_with_cache_error_policy() {
    let config = LoaderConfig::new()
        .with_cancel_policy(CancelPolicy::CacheError)
        .with_fetch_timeout(Duration::from_millis(50));
    let batch = initialize_with(nodes(2), config).unwrap();
    let ctx = LoadContext::new();

    let first = load_relation(&ctx, "value", &batch[0], |_ctx, _batch| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(|n: &Node| n.id)
    })
    .await
    .unwrap_err();

    let second = load_relation(&ctx, "value", &batch[1], |_ctx, _batch| async {
        Ok(|n: &Node| n.id)
    })
    .await
    .unwrap_err();

    assert!(first.is_timeout());
    assert_eq!(first, second);
    assert_eq!(batch[0].loader().unwrap().stats().fetches, 1);
}

#[tokio::test]
async fn test_dropped_caller_releases_the_cell() {
    let batch = initialize(nodes(1));
    let ctx = LoadContext::new();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        load_relation(&ctx, "value", &batch[0], |_ctx, _batch| async {
            std::future::pending::<()>().await;
            Ok(|_: &Node| 0u64)
        }),
    )
    .await;
    assert!(abandoned.is_err());

    let loader = batch[0].loader().unwrap();
    assert_eq!(loader.status("value"), Some(CellStatus::Pending));

    let value = load_relation(&ctx, "value", &batch[0], |_ctx, _batch| async {
        Ok(|_: &Node| 7u64)
    })
    .await
    .unwrap();
    assert_eq!(value, 7);
}

#[tokio::test]
async fn test_cancelled_context_never_fetches() {
    let batch = initialize(nodes(1));
    let ctx = LoadContext::new();
    ctx.cancel();

    let fetched = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fetched);
    let err = load_relation(&ctx, "value", &batch[0], move |_ctx, _batch| async move {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(|_: &Node| 0u64)
    })
    .await
    .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(fetched.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_mismatched_result_type_is_reported() {
    let batch = initialize(nodes(2));
    let ctx = LoadContext::new();

    let id = load_relation(&ctx, "value", &batch[0], |_ctx, _batch| async {
        Ok(|n: &Node| n.id)
    })
    .await
    .unwrap();
    assert_eq!(id, 0);

    let err = load_relation(&ctx, "value", &batch[1], |_ctx, _batch| async {
        Ok(|_: &Node| String::new())
    })
    .await
    .unwrap_err();

    assert!(err.is_type_mismatch());
    assert_eq!(err.code, ErrorCode::TypeMismatch);
}

#[tokio::test]
async fn test_uninitialized_model_is_rejected() {
    let orphan = Node::default();
    let ctx = LoadContext::new();

    let err = load_relation(&ctx, "value", &orphan, |_ctx, _batch| async {
        Ok(|n: &Node| n.id)
    })
    .await
    .unwrap_err();

    assert!(err.is_uninitialized());
    assert!(err.to_string().starts_with("[T3001]"));
}

#[derive(Debug, Clone, Default)]
struct Leaf {
    id: u64,
    node_id: u64,
    loader: LoaderSlot<Leaf>,
}

impl_has_loader!(Leaf, loader);

#[tokio::test]
async fn test_duplicate_parent_ids_are_requested_once() {
    let batch = initialize(vec![
        Node { id: 7, ..Default::default() },
        Node { id: 7, ..Default::default() },
        Node { id: 9, ..Default::default() },
    ]);
    let ctx = LoadContext::new();
    let requested = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let mut groups = Vec::new();
    for node in &batch {
        let requested = Arc::clone(&requested);
        let leaves = load_children(
            &ctx,
            "leaves",
            node,
            ChildrenArgs::new(
                |n: &Node| n.id,
                move |_ctx, ids: Vec<u64>| {
                    requested.lock().push(ids.clone());
                    async move {
                        Ok(vec![
                            Leaf { id: 1, node_id: 7, ..Default::default() },
                            Leaf { id: 2, node_id: 9, ..Default::default() },
                        ]
                        .into_iter()
                        .filter(|leaf| ids.contains(&leaf.node_id))
                        .collect())
                    }
                },
                |leaf: &Leaf| leaf.node_id,
            ),
        )
        .await
        .unwrap();
        groups.push(leaves.iter().map(|leaf| leaf.id).collect::<Vec<_>>());
    }

    assert_eq!(*requested.lock(), vec![vec![7, 9]]);
    assert_eq!(groups, vec![vec![1], vec![1], vec![2]]);
}
