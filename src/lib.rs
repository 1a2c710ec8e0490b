//! # Turbo
//!
//! Batch-scoped, single-flight relation loading that removes N+1 queries.
//!
//! Turbo provides:
//! - One shared loader per batch of models loaded together
//! - Relations fetched once for the whole batch, memoized per relation
//! - Concurrent callers for the same relation wait on a single fetch
//! - Children bound to a fresh loader so nested relations batch too
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use turbo::prelude::*;
//!
//! #[derive(Clone)]
//! pub struct Author {
//!     pub id: i64,
//!     loader: LoaderSlot<Author>,
//! }
//! impl_has_loader!(Author, loader);
//!
//! impl Author {
//!     pub async fn books(&self, ctx: &LoadContext, db: &Db) -> LoadResult<Vec<Book>> {
//!         let db = db.clone();
//!         load_children(
//!             ctx,
//!             "books",
//!             self,
//!             ChildrenArgs::new(
//!                 |a: &Author| a.id,
//!                 move |_ctx, ids| {
//!                     let db = db.clone();
//!                     async move { db.books_by_author(&ids).await.map_err(LoadError::fetch) }
//!                 },
//!                 |b: &Book| b.author_id,
//!             ),
//!         )
//!         .await
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), turbo::LoadError> {
//!     let authors = initialize(db.all_authors().await?);
//!     let ctx = LoadContext::new();
//!
//!     // One query for every author's books.
//!     for author in &authors {
//!         let books = author.books(&ctx, &db).await?;
//!     }
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Loader internals: memo cells, stats and configuration.
pub mod loader {
    pub use turbo_loader::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use turbo_loader::prelude::*;
}

// Re-export key types at the crate root
pub use turbo_loader::{
    Batch, CancelPolicy, ChildrenArgs, ErrorCode, HasLoader, LoadContext, LoadError, LoadResult,
    Loader, LoaderConfig, LoaderSlot, RelationKey, impl_has_loader, init_logging, initialize,
    initialize_with, load_children, load_relation,
};
