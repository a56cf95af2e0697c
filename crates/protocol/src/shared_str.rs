use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Reference-counted immutable string.
///
/// Goroutine names and state names repeat across every batch of a trace.
/// The model interns them once and hands out `SharedStr` clones, which cost
/// a refcount bump instead of an allocation.
#[derive(Debug, Clone, Eq)]
pub struct SharedStr(Arc<str>);

impl SharedStr {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether both handles point at the same interned allocation.
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for SharedStr {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}

impl PartialEq<str> for SharedStr {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for SharedStr {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl Ord for SharedStr {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for SharedStr {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// Must hash like `str` so `HashSet<SharedStr>` can be probed with `&str`.
impl Hash for SharedStr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (*self.0).hash(state);
    }
}

impl Deref for SharedStr {
    type Target = str;

    #[inline]
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SharedStr {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for SharedStr {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SharedStr {
    #[inline]
    fn from(s: &str) -> Self {
        SharedStr(Arc::from(s))
    }
}

impl From<String> for SharedStr {
    #[inline]
    fn from(s: String) -> Self {
        SharedStr(Arc::from(s))
    }
}

impl fmt::Display for SharedStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// Hand-rolled so serde's `rc` feature is not needed.
impl Serialize for SharedStr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SharedStr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(SharedStr::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn clones_share_the_allocation() {
        let a = SharedStr::from("net/http.(*conn).serve");
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn equal_content_different_allocation() {
        let a = SharedStr::from("running");
        let b = SharedStr::from(String::from("running"));
        assert!(!a.ptr_eq(&b));
        assert_eq!(a, b);
        assert_eq!(a, "running");
    }

    #[test]
    fn set_lookup_by_str() {
        let mut interned = HashSet::new();
        interned.insert(SharedStr::from("syscall"));
        assert!(interned.contains("syscall"));
        assert!(!interned.contains("waiting"));
    }

    #[test]
    fn serializes_as_plain_string() {
        let s = SharedStr::from("main.main");
        let json = serde_json::to_string(&s).unwrap_or_default();
        assert_eq!(json, "\"main.main\"");
        let back: SharedStr =
            serde_json::from_str("\"main.worker\"").unwrap_or_else(|_| SharedStr::from(""));
        assert_eq!(back, "main.worker");
    }

    #[test]
    fn orders_lexically() {
        assert!(SharedStr::from("main.a") < SharedStr::from("main.b"));
    }
}
