//! Binding models to loaders.
//!
//! Model types opt in by implementing [`HasLoader`], usually by embedding a
//! [`LoaderSlot`] and using [`impl_has_loader!`](crate::impl_has_loader):
//!
//! ```rust
//! use turbo_loader::{LoaderSlot, impl_has_loader, initialize};
//!
//! #[derive(Debug, Clone)]
//! struct Author {
//!     id: i64,
//!     loader: LoaderSlot<Author>,
//! }
//!
//! impl_has_loader!(Author, loader);
//!
//! let rows = vec![
//!     Author { id: 1, loader: LoaderSlot::default() },
//!     Author { id: 2, loader: LoaderSlot::default() },
//! ];
//! let authors = initialize(rows);
//!
//! assert_eq!(authors.len(), 2);
//! assert!(authors.iter().all(|a| a.loader.is_bound()));
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::config::LoaderConfig;
use crate::error::LoadResult;
use crate::loader::{Batch, Loader};

/// Capability of a model type to carry the loader of its batch.
pub trait HasLoader: Sized + Send + Sync + 'static {
    /// The loader this model was bound to, if any.
    fn loader(&self) -> Option<&Loader<Self>>;

    /// Bind this model to a loader.
    fn set_loader(&mut self, loader: Loader<Self>);
}

/// Storage for a model's loader.
///
/// Starts unbound. Serde-skippable: `#[serde(skip)]` falls back to `Default`.
pub struct LoaderSlot<M>(Option<Loader<M>>);

impl<M> LoaderSlot<M> {
    /// Create an unbound slot.
    pub const fn new() -> Self {
        Self(None)
    }

    /// The bound loader.
    #[inline]
    pub fn get(&self) -> Option<&Loader<M>> {
        self.0.as_ref()
    }

    /// Bind the slot, replacing any previous loader.
    #[inline]
    pub fn set(&mut self, loader: Loader<M>) {
        self.0 = Some(loader);
    }

    /// Check if the slot holds a loader.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.0.is_some()
    }
}

impl<M> Default for LoaderSlot<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for LoaderSlot<M> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<M> fmt::Debug for LoaderSlot<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(loader) => f.debug_tuple("LoaderSlot").field(&loader.len()).finish(),
            None => f.write_str("LoaderSlot(unbound)"),
        }
    }
}

/// Implement [`HasLoader`] for a type storing its loader in a [`LoaderSlot`] field.
#[macro_export]
macro_rules! impl_has_loader {
    ($model:ty, $field:ident) => {
        impl $crate::HasLoader for $model {
            fn loader(&self) -> ::core::option::Option<&$crate::Loader<Self>> {
                self.$field.get()
            }

            fn set_loader(&mut self, loader: $crate::Loader<Self>) {
                self.$field.set(loader);
            }
        }
    };
}

/// Bind a freshly loaded batch to one new loader with the default configuration.
///
/// Must run once per batch before any relation is loaded on its models. The
/// models stay usable for as long as any of them, or a clone, is alive.
pub fn initialize<M: HasLoader>(models: Vec<M>) -> Batch<M> {
    bind(models, LoaderConfig::default())
}

/// Bind a freshly loaded batch to one new loader with `config`.
pub fn initialize_with<M: HasLoader>(models: Vec<M>, config: LoaderConfig) -> LoadResult<Batch<M>> {
    config.validate()?;
    Ok(bind(models, config))
}

pub(crate) fn bind<M: HasLoader>(models: Vec<M>, config: LoaderConfig) -> Batch<M> {
    let len = models.len();
    let shared = Arc::new_cyclic(|batch| {
        let loader = Loader::new(batch.clone(), len, config);
        models
            .into_iter()
            .map(|mut model| {
                model.set_loader(loader.clone());
                model
            })
            .collect::<Vec<_>>()
    });
    trace!(model = short_type_name::<M>(), batch = len, "Initialized batch");
    Batch::from_shared(shared)
}

/// Type name without its module path, for messages.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
