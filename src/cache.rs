//! Ordered primary-key → row cache (SPEC_FULL.md §4.2).
//!
//! Backed by `indexmap::IndexMap` so `set`/`get`/`delete` stay O(1) while
//! iteration order matches insertion order with in-place update on existing
//! keys — `IndexMap::insert` on an existing key overwrites the value without
//! moving its slot, which is exactly the "in-place update (no reorder on
//! update)" invariant spec.md §3 requires.

use indexmap::IndexMap;

use crate::value::{Key, Row};

/// One Source's row set. Mutated and iterated only from the Source's own
/// task (spec.md §5): no internal locking here.
#[derive(Debug, Default)]
pub struct Cache {
    rows: IndexMap<Key, Row>,
}

impl Cache {
    pub fn new() -> Self {
        Self {
            rows: IndexMap::new(),
        }
    }

    /// Inserts or overwrites a row. Returns the previous row, if any, so the
    /// Source can diff it to compute changed fields.
    pub fn set(&mut self, key: Key, row: Row) -> Option<Row> {
        self.rows.insert(key, row)
    }

    pub fn delete(&mut self, key: &Key) -> Option<Row> {
        // shift_remove preserves the relative order of the remaining
        // entries; swap_remove would not, and a later snapshot would then
        // disagree with the order rows were actually inserted in.
        self.rows.shift_remove(key)
    }

    pub fn get(&self, key: &Key) -> Option<&Row> {
        self.rows.get(key)
    }

    pub fn has(&self, key: &Key) -> bool {
        self.rows.contains_key(key)
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Row)> {
        self.rows.iter()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn row(px: i64) -> Row {
        let mut r = Row::new();
        r.insert("px".to_string(), Value::Int(px));
        r
    }

    #[test]
    fn update_preserves_insertion_position() {
        let mut cache = Cache::new();
        cache.set(Key::Int(1), row(10));
        cache.set(Key::Int(2), row(20));
        cache.set(Key::Int(1), row(11));

        let keys: Vec<_> = cache.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![Key::Int(1), Key::Int(2)]);
        assert_eq!(cache.get(&Key::Int(1)).unwrap()["px"], Value::Int(11));
    }

    #[test]
    fn new_key_appends_at_end() {
        let mut cache = Cache::new();
        cache.set(Key::Int(2), row(20));
        cache.set(Key::Int(1), row(10));
        let keys: Vec<_> = cache.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![Key::Int(2), Key::Int(1)]);
    }

    #[test]
    fn delete_preserves_order_of_remainder() {
        let mut cache = Cache::new();
        cache.set(Key::Int(1), row(1));
        cache.set(Key::Int(2), row(2));
        cache.set(Key::Int(3), row(3));
        cache.delete(&Key::Int(2));
        let keys: Vec<_> = cache.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![Key::Int(1), Key::Int(3)]);
    }

    #[test]
    fn delete_unknown_key_is_noop() {
        let mut cache = Cache::new();
        cache.set(Key::Int(1), row(1));
        assert!(cache.delete(&Key::Int(2)).is_none());
        assert_eq!(cache.size(), 1);
    }
}
