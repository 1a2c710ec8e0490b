//! # turbo-loader
//!
//! Batch-scoped relation loading for Turbo.
//!
//! Models loaded together by one query form a *batch*. [`initialize`] binds
//! every model of a batch to one shared [`Loader`]. When any model asks for a
//! relation, the loader fetches that relation for the whole batch in a single
//! round trip and every sibling reuses the result. Traversing `authors → books
//! → chapters` issues one query per level instead of one per row.
//!
//! This crate provides:
//! - [`Loader`], the per-batch table of memoized relations
//! - [`MemoCell`], a single-flight cell that runs its fetch at most once
//! - [`load_relation`] for arbitrary batched lookups
//! - [`load_children`] for parent → children relations grouped by parent id
//! - [`LoadContext`] for cancellation and deadlines
//! - [`LoaderConfig`] with environment-driven defaults
//!
//! ## Binding a Batch
//!
//! ```rust
//! use turbo_loader::{LoaderSlot, impl_has_loader, initialize};
//!
//! #[derive(Clone)]
//! struct Author {
//!     id: i64,
//!     loader: LoaderSlot<Author>,
//! }
//!
//! impl_has_loader!(Author, loader);
//!
//! let authors = initialize(vec![
//!     Author { id: 1, loader: LoaderSlot::default() },
//!     Author { id: 2, loader: LoaderSlot::default() },
//! ]);
//!
//! let loader = authors[0].loader.get().unwrap();
//! assert_eq!(loader.len(), 2);
//! ```
//!
//! ## Loading Children
//!
//! ```rust
//! use turbo_loader::{ChildrenArgs, LoadContext, LoaderSlot, impl_has_loader, initialize, load_children};
//!
//! #[derive(Clone)]
//! struct Author {
//!     id: i64,
//!     loader: LoaderSlot<Author>,
//! }
//!
//! #[derive(Clone)]
//! struct Book {
//!     title: String,
//!     author_id: i64,
//!     loader: LoaderSlot<Book>,
//! }
//!
//! impl_has_loader!(Author, loader);
//! impl_has_loader!(Book, loader);
//!
//! fn book(title: &str, author_id: i64) -> Book {
//!     Book { title: title.into(), author_id, loader: LoaderSlot::default() }
//! }
//!
//! # tokio_test();
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn tokio_test() {
//! let authors = initialize(vec![
//!     Author { id: 1, loader: LoaderSlot::default() },
//!     Author { id: 2, loader: LoaderSlot::default() },
//! ]);
//!
//! let ctx = LoadContext::new();
//! for author in &authors {
//!     let books = load_children(
//!         &ctx,
//!         "books",
//!         author,
//!         ChildrenArgs::new(
//!             |a: &Author| a.id,
//!             |_ctx, ids: Vec<i64>| async move {
//!                 // One query for all authors: WHERE author_id IN (...)
//!                 let rows = vec![book("Dune", 1), book("Emma", 2)];
//!                 Ok(rows.into_iter().filter(|b| ids.contains(&b.author_id)).collect())
//!             },
//!             |b: &Book| b.author_id,
//!         ),
//!     )
//!     .await
//!     .unwrap();
//!     assert_eq!(books.len(), 1);
//! }
//!
//! assert_eq!(authors[0].loader.get().unwrap().stats().fetches, 1);
//! # }
//! ```
//!
//! ## Errors
//!
//! Every failure is a [`LoadError`] carrying an [`ErrorCode`]. A failed fetch
//! is cached: later callers for the same relation get the same error without
//! refetching. Cancellation and timeouts are retried by default, see
//! [`CancelPolicy`].

pub mod config;
pub mod context;
pub mod error;
pub mod key;
pub mod loader;
pub mod logging;
pub mod memo;
pub mod model;
pub mod relations;

pub use config::{CancelPolicy, LoaderConfig};
pub use context::LoadContext;
pub use error::{ErrorCode, ErrorContext, LoadError, LoadResult, Suggestion};
pub use key::RelationKey;
pub use loader::{Batch, Loader, LoaderStats, StatsSnapshot};
pub use memo::{CellStatus, Lookup, MemoCell};
pub use model::{HasLoader, LoaderSlot, initialize, initialize_with};
pub use relations::{ChildrenArgs, load_children, load_relation};

// Re-export logging utilities
pub use logging::{LogFormat, LogSettings, init as init_logging, try_init as try_init_logging};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{CancelPolicy, LoaderConfig};
    pub use crate::context::LoadContext;
    pub use crate::error::{ErrorCode, LoadError, LoadResult};
    pub use crate::key::RelationKey;
    pub use crate::loader::{Batch, Loader};
    pub use crate::model::{HasLoader, LoaderSlot, initialize, initialize_with};
    pub use crate::relations::{ChildrenArgs, load_children, load_relation};
    pub use crate::impl_has_loader;
}
