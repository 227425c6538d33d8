use crate::errors::{AppError, AppResult};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Interned tag name. Clones share the registry's allocation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(Arc<str>);

impl Tag {
    pub fn name(&self) -> &str {
        &self.0
    }

    /// True when both values are the same interned instance.
    pub fn ptr_eq(&self, other: &Tag) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:?})", self.name())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

pub fn normalize_tag_name(name: &str) -> &str {
    name.trim()
}

/// Process-lifetime pool of tags. Grows monotonically.
#[derive(Debug, Default)]
pub struct TagRegistry {
    pool: Mutex<HashMap<String, Tag>>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared tag for `name`, creating it on first use.
    pub fn intern(&self, name: &str) -> AppResult<Tag> {
        let normalized = normalize_tag_name(name);
        if normalized.is_empty() {
            return Err(AppError::Validation("Tag name cannot be empty".to_string()));
        }

        // lookup and insert happen under one lock
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        let tag = pool
            .entry(normalized.to_string())
            .or_insert_with(|| Tag(Arc::from(normalized)))
            .clone();
        Ok(tag)
    }

    pub fn get(&self, name: &str) -> Option<Tag> {
        let pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        pool.get(normalize_tag_name(name)).cloned()
    }

    pub fn len(&self) -> usize {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<Tag> {
        let pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        let mut tags = pool.values().cloned().collect::<Vec<_>>();
        tags.sort();
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::TagRegistry;
    use std::sync::Arc;

    #[test]
    fn equal_names_share_one_instance() {
        let registry = TagRegistry::new();
        let first = registry.intern("friend").expect("intern");
        let second = registry.intern("  friend ").expect("intern");
        assert!(first.ptr_eq(&second));
        assert_eq!(first.name(), "friend");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rejects_blank_names() {
        let registry = TagRegistry::new();
        assert!(registry.intern("   ").is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn case_is_preserved_and_significant() {
        let registry = TagRegistry::new();
        let lower = registry.intern("vip").expect("intern");
        let upper = registry.intern("VIP").expect("intern");
        assert_ne!(lower, upper);
        assert_eq!(registry.all().len(), 2);
    }

    #[test]
    fn concurrent_interning_yields_one_instance() {
        let registry = Arc::new(TagRegistry::new());
        let handles = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.intern("work").expect("intern"))
            })
            .collect::<Vec<_>>();
        let tags = handles
            .into_iter()
            .map(|handle| handle.join().expect("join"))
            .collect::<Vec<_>>();
        assert!(tags.windows(2).all(|pair| pair[0].ptr_eq(&pair[1])));
        assert_eq!(registry.len(), 1);
    }
}
