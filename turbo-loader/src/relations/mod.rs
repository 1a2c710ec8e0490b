//! Batched relation loading.
//!
//! This module provides the two accessors model types build their relation
//! methods on:
//! - [`load_relation`] for any relation shape, given a fetch over the whole batch
//! - [`load_children`] for parent → children relations keyed by a parent id
//!
//! ## Example
//!
//! ```rust,ignore
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
//! ```

mod children;
mod relation;

pub use children::{ChildrenArgs, load_children};
pub use relation::load_relation;
