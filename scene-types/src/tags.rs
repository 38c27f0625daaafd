//! Tag-name interning.
//!
//! Components and nodes are classified by small integer tags. The
//! [`TagRegistry`] maps tag names to stable ids: the mapping only grows,
//! and an id handed out once stays valid for the registry's lifetime.
//!
//! There is no hidden global. Callers construct a registry (usually one per
//! process, wrapped in an `Arc`) and pass the handle to whoever needs tag
//! resolution. Registration is rare relative to per-step traversals, so a
//! single coarse mutex around the whole read-modify-write is enough.
//!
//! # Reserved ids
//!
//! - id `0` is the empty tag `""`
//! - id `1` is `"Visual"`
//!
//! # Example
//!
//! ```
//! use scene_types::TagRegistry;
//!
//! let tags = TagRegistry::new();
//! assert_eq!(tags.get_id("").raw(), 0);
//! assert_eq!(tags.get_id("Visual").raw(), 1);
//!
//! let collision = tags.get_id("Collision");
//! assert_eq!(tags.get_id("Collision"), collision);
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// A stable small-integer tag id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(u32);

impl Tag {
    /// The raw id value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Append-only registry of tag names.
#[derive(Debug)]
pub struct TagRegistry {
    inner: Mutex<TagTable>,
}

#[derive(Debug)]
struct TagTable {
    names: Vec<String>,
    by_name: HashMap<String, u32>,
}

impl TagRegistry {
    /// Create a registry pre-seeded with the reserved `""` and `"Visual"`
    /// tags.
    #[must_use]
    pub fn new() -> Self {
        let names = vec![String::new(), "Visual".to_owned()];
        let by_name = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i as u32))
            .collect();
        Self {
            inner: Mutex::new(TagTable { names, by_name }),
        }
    }

    /// Resolve a name to its id, registering it if unseen.
    ///
    /// Repeated calls with the same name return the same id for the
    /// lifetime of the registry.
    #[must_use]
    pub fn get_id(&self, name: &str) -> Tag {
        let mut table = self.lock();
        if let Some(&id) = table.by_name.get(name) {
            return Tag(id);
        }
        let id = table.names.len() as u32;
        table.names.push(name.to_owned());
        table.by_name.insert(name.to_owned(), id);
        Tag(id)
    }

    /// The name registered for a tag, if any.
    #[must_use]
    pub fn name_of(&self, tag: Tag) -> Option<String> {
        self.lock().names.get(tag.0 as usize).cloned()
    }

    /// Number of registered tags (including the two reserved ones).
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().names.len()
    }

    /// Whether the registry holds only the reserved tags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        // The reserved tags are always present.
        false
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TagTable> {
        // A poisoned lock only means another thread panicked mid-insert;
        // the table itself is still append-consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_reserved_ids() {
        let tags = TagRegistry::new();
        assert_eq!(tags.get_id("").raw(), 0);
        assert_eq!(tags.get_id("Visual").raw(), 1);
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_ids_are_stable() {
        let tags = TagRegistry::new();
        let a = tags.get_id("Collision");
        let b = tags.get_id("Haptics");
        assert_ne!(a, b);
        assert_eq!(tags.get_id("Collision"), a);
        assert_eq!(tags.get_id("Haptics"), b);
        assert_eq!(tags.name_of(a).as_deref(), Some("Collision"));
    }

    #[test]
    fn test_registry_only_grows() {
        let tags = TagRegistry::new();
        for i in 0..100 {
            let _ = tags.get_id(&format!("tag{i}"));
        }
        assert_eq!(tags.len(), 102);
        // Re-registering changes nothing.
        let _ = tags.get_id("tag50");
        assert_eq!(tags.len(), 102);
    }

    #[test]
    fn test_concurrent_registration() {
        let tags = Arc::new(TagRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tags = Arc::clone(&tags);
                std::thread::spawn(move || {
                    let mut ids = Vec::new();
                    for i in 0..50 {
                        ids.push(tags.get_id(&format!("shared{i}")).raw());
                        let _ = tags.get_id(&format!("thread{t}"));
                    }
                    ids
                })
            })
            .collect();

        let results: Vec<Vec<u32>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Every thread resolved the shared names to the same ids.
        for ids in &results[1..] {
            assert_eq!(ids, &results[0]);
        }
        // 2 reserved + 50 shared + 8 per-thread
        assert_eq!(tags.len(), 60);
    }
}
