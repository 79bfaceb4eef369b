//! Collection types for TabSSH.
//!
//! `IndexMap` with FxHash backs anything that needs a stable, insertion-ordered
//! view, such as the tab order of open sessions. `CyclicKeys` adds the
//! wrap-around navigation tabs need.

pub use rustc_hash::FxHashMap;
use rustc_hash::FxBuildHasher;

/// Insertion-ordered hash map with FxHash (faster than default hasher).
pub type IndexMap<K, V> = indexmap::IndexMap<K, V, FxBuildHasher>;

/// Wrap-around navigation over the keys of an ordered map.
pub trait CyclicKeys<K> {
    /// Key following `key`, wrapping to the first. `None` if the map is empty.
    /// An unknown `key` yields the first key.
    fn key_after(&self, key: &K) -> Option<&K>;

    /// Key preceding `key`, wrapping to the last. `None` if the map is empty.
    /// An unknown `key` yields the last key.
    fn key_before(&self, key: &K) -> Option<&K>;
}

impl<K, V> CyclicKeys<K> for IndexMap<K, V>
where
    K: std::hash::Hash + Eq,
{
    fn key_after(&self, key: &K) -> Option<&K> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        let next = match self.get_index_of(key) {
            Some(index) => (index + 1) % len,
            None => 0,
        };
        self.get_index(next).map(|(k, _)| k)
    }

    fn key_before(&self, key: &K) -> Option<&K> {
        let len = self.len();
        if len == 0 {
            return None;
        }
        let prev = match self.get_index_of(key) {
            Some(0) | None => len - 1,
            Some(index) => index - 1,
        };
        self.get_index(prev).map(|(k, _)| k)
    }
}
