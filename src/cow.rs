//! Copy-on-write string map for read-heavy, write-light data
//!
//! Readers clone an [`Arc`] snapshot of the whole map and never contend with
//! a writer's copy phase. Writers serialize on a mutex, duplicate the current
//! map, apply their change, and swap the new snapshot in; the snapshot lock
//! is held only for the pointer clone or swap.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Immutable view of a [`CowMap`] at one point in time
pub type Snapshot = Arc<HashMap<String, String>>;

/// A copy-on-write map from `String` to `String`
///
/// Reads are cheap, writes are expensive: every mutation duplicates the
/// entire map. Suited to configuration-style data that is read constantly
/// and updated rarely.
///
/// # Example
///
/// ```rust
/// use stopgate::CowMap;
///
/// let map = CowMap::default();
/// map.insert("region", "eu-west-1");
///
/// let before = map.snapshot();
/// map.insert("region", "us-east-2");
///
/// // The old snapshot is untouched by later writes.
/// assert_eq!(before.get("region").map(String::as_str), Some("eu-west-1"));
/// assert_eq!(map.get("region").as_deref(), Some("us-east-2"));
/// ```
#[derive(Debug, Default)]
pub struct CowMap {
    /// Current snapshot; locked only to clone or swap the `Arc`
    snapshot: RwLock<Snapshot>,
    /// Serializes writers so concurrent mutations never lose updates
    writer: Mutex<()>,
}

impl CowMap {
    /// Create a map holding the given initial entries
    #[must_use]
    pub fn new(initial: HashMap<String, String>) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(initial)),
            writer: Mutex::new(()),
        }
    }

    /// Look up a key in the current snapshot
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.snapshot().get(key).cloned()
    }

    /// Clone the current snapshot
    ///
    /// The returned map is frozen: later writes build a new snapshot and
    /// leave this one untouched.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Arc::clone(
            &self
                .snapshot
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Insert one key-value pair
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        self.mutate(|map| {
            map.insert(key, value);
        });
    }

    /// Insert every entry of `entries` in one copy
    pub fn extend(&self, entries: impl IntoIterator<Item = (String, String)>) {
        self.mutate(|map| map.extend(entries));
    }

    /// Remove a key, if present
    pub fn remove(&self, key: &str) {
        self.mutate(|map| {
            map.remove(key);
        });
    }

    /// Replace the whole map with `entries`, without copying the old one
    pub fn reset(&self, entries: HashMap<String, String>) {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(entries);
    }

    /// Number of entries in the current snapshot
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Whether the current snapshot has no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Duplicate the current map, apply one change, swap the result in.
    /// The copy happens outside the snapshot lock, so readers only ever
    /// wait for the final pointer swap.
    fn mutate(&self, apply: impl FnOnce(&mut HashMap<String, String>)) {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = HashMap::clone(&self.snapshot());
        apply(&mut next);
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get() {
        let map = CowMap::default();
        assert!(map.is_empty());
        assert_eq!(map.get("a"), None);

        map.insert("a", "1");
        map.insert("b", "2");
        assert_eq!(map.get("a").as_deref(), Some("1"));
        assert_eq!(map.get("b").as_deref(), Some("2"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn new_copies_initial_entries() {
        let mut initial = HashMap::new();
        initial.insert("k".to_owned(), "v".to_owned());
        let map = CowMap::new(initial);
        assert_eq!(map.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn snapshots_are_isolated_from_later_writes() {
        let map = CowMap::default();
        map.insert("k", "old");

        let snapshot = map.snapshot();
        map.insert("k", "new");
        map.insert("extra", "1");

        assert_eq!(snapshot.get("k").map(String::as_str), Some("old"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(map.get("k").as_deref(), Some("new"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn extend_applies_all_entries_in_one_copy() {
        let map = CowMap::default();
        map.insert("keep", "yes");
        map.extend([
            ("a".to_owned(), "1".to_owned()),
            ("b".to_owned(), "2".to_owned()),
        ]);
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("a").as_deref(), Some("1"));
    }

    #[test]
    fn remove_and_reset() {
        let map = CowMap::default();
        map.insert("a", "1");
        map.insert("b", "2");

        map.remove("a");
        assert_eq!(map.get("a"), None);
        assert_eq!(map.len(), 1);

        map.reset(HashMap::new());
        assert!(map.is_empty());
    }
}
