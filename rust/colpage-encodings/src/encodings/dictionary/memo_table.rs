use crate::types::DictionaryValue;
use ahash::AHashMap;
use std::collections::hash_map::Entry;

/// Insertion-ordered set of distinct values, each identified by the index
/// it was assigned when first inserted.
///
/// Indices are never reassigned, so indices handed out for earlier pages
/// stay valid while the table keeps growing. A single null entry may be
/// added with [`MemoTable::get_or_insert_null`]; it takes up an index like
/// any other entry and is materialized as the default value.
#[derive(Clone)]
pub struct MemoTable<V: DictionaryValue> {
    indices: AHashMap<V::Key, usize>,
    values: Vec<V>,
    null_index: Option<usize>,
}

impl<V> MemoTable<V>
where
    V: DictionaryValue + Clone + Default,
{
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        MemoTable {
            indices: AHashMap::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            null_index: None,
        }
    }

    /// Index of `value`, if present.
    pub fn get(&self, value: &V) -> Option<usize> {
        self.indices.get(&value.dictionary_key()).copied()
    }

    /// Returns the index of `value`, inserting it at the next index when
    /// absent. The flag is `true` when the value was already present.
    pub fn get_or_insert(&mut self, value: &V) -> (usize, bool) {
        let next = self.values.len();
        match self.indices.entry(value.dictionary_key()) {
            Entry::Occupied(entry) => (*entry.get(), true),
            Entry::Vacant(entry) => {
                entry.insert(next);
                self.values.push(value.clone());
                (next, false)
            }
        }
    }

    pub fn get_null(&self) -> Option<usize> {
        self.null_index
    }

    /// Returns the null index, creating it on first use.
    pub fn get_or_insert_null(&mut self) -> (usize, bool) {
        match self.null_index {
            Some(index) => (index, true),
            None => {
                let index = self.values.len();
                self.values.push(V::default());
                self.null_index = Some(index);
                (index, false)
            }
        }
    }

    /// Number of entries, the null entry included.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All entries in index order.
    pub fn values(&self) -> &[V] {
        &self.values
    }

    /// Appends the entries from index `start` onwards to `out`.
    pub fn copy_values(&self, start: usize, out: &mut Vec<V>) {
        if let Some(tail) = self.values.get(start..) {
            out.extend_from_slice(tail);
        }
    }

    pub fn clear(&mut self) {
        self.indices.clear();
        self.values.clear();
        self.null_index = None;
    }
}

impl<V> Default for MemoTable<V>
where
    V: DictionaryValue + Clone + Default,
{
    fn default() -> Self {
        Self::new()
    }
}
