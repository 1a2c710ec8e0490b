//! Relation keys.
//!
//! A relation key names one relation of a model type ("books", "chapters").
//! Keys are short and usually `'static`, so they are stored inline.

use std::borrow::Borrow;
use std::fmt;

use smol_str::SmolStr;

/// Identifier of a relation within one loader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationKey(SmolStr);

impl RelationKey {
    /// Create a key from a static string without allocating.
    #[inline]
    pub const fn new_static(key: &'static str) -> Self {
        Self(SmolStr::new_static(key))
    }

    /// Create a key from any string.
    #[inline]
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(SmolStr::new(key.as_ref()))
    }

    /// The key as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for RelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Borrow<str> for RelationKey {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl AsRef<str> for RelationKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for RelationKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RelationKey {
    fn from(s: String) -> Self {
        Self(SmolStr::from(s))
    }
}

impl From<&RelationKey> for RelationKey {
    fn from(k: &RelationKey) -> Self {
        k.clone()
    }
}
