//! Strongly-typed node identifier.
//!
//! A [`UniqueId`] is the vertex label used throughout the dependency graph:
//! an opaque, non-empty string of the form `kind.package.name[.extra]`
//! (e.g. `model.core.stg_orders`, `test.core.not_null_orders_id.abc123`).
//! Ids are stable across runs and never reused for different resources.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Opaque, globally unique node identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UniqueId(String);

impl<'de> Deserialize<'de> for UniqueId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        UniqueId::try_new(s).ok_or_else(|| serde::de::Error::custom("UniqueId must not be empty"))
    }
}

impl UniqueId {
    /// Create a new id, panicking if the string is empty.
    ///
    /// Prefer [`try_new`](Self::try_new) when handling untrusted input.
    pub fn new(id: impl Into<String>) -> Self {
        let s = id.into();
        assert!(!s.is_empty(), "UniqueId must not be empty");
        Self(s)
    }

    /// Try to create a new id, returning `None` if the string is empty.
    pub fn try_new(id: impl Into<String>) -> Option<Self> {
        let s = id.into();
        if s.is_empty() {
            None
        } else {
            Some(Self(s))
        }
    }

    /// Return the underlying id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the wrapper and return the inner `String`.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UniqueId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for UniqueId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UniqueId {
    fn from(s: &str) -> Self {
        UniqueId::new(s)
    }
}

impl PartialEq<str> for UniqueId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for UniqueId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_new_rejects_empty() {
        assert!(UniqueId::try_new("").is_none());
        assert!(UniqueId::try_new("model.pkg.a").is_some());
    }

    #[test]
    fn test_borrow_allows_str_lookup() {
        use std::collections::HashMap;
        let mut map: HashMap<UniqueId, u32> = HashMap::new();
        map.insert(UniqueId::new("model.pkg.a"), 1);
        assert_eq!(map.get("model.pkg.a"), Some(&1));
    }
}
