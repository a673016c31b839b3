//! Index definitions and ordered indexes.

use std::collections::{BTreeMap, BTreeSet};
use tuplog_codec::Tuple;

/// Field numbers that make up an index key, in key order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyDef {
    /// Zero-based field numbers.
    pub parts: Vec<u32>,
}

impl KeyDef {
    /// Creates a key definition.
    #[must_use]
    pub fn new(parts: Vec<u32>) -> Self {
        Self { parts }
    }

    /// Extracts the key of `tuple`.
    ///
    /// Returns the number of the first missing field if the tuple is too
    /// short.
    pub fn extract(&self, tuple: &Tuple) -> Result<Tuple, u32> {
        self.parts
            .iter()
            .map(|&part| tuple.field(part as usize).cloned().ok_or(part))
            .collect::<Result<Vec<_>, _>>()
            .map(Tuple::new)
    }
}

/// Definition of one index of a space.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexDef {
    /// Index number within the space; 0 is the primary index.
    pub id: u32,
    /// Index name, used in diagnostics.
    pub name: String,
    /// Key definition.
    pub key_def: KeyDef,
    /// Whether two tuples may share a key.
    pub unique: bool,
}

impl IndexDef {
    /// A unique primary index named `primary` over the given fields.
    #[must_use]
    pub fn primary(parts: Vec<u32>) -> Self {
        Self {
            id: 0,
            name: "primary".to_string(),
            key_def: KeyDef::new(parts),
            unique: true,
        }
    }

    /// A secondary index.
    #[must_use]
    pub fn secondary(id: u32, name: impl Into<String>, parts: Vec<u32>, unique: bool) -> Self {
        Self {
            id,
            name: name.into(),
            key_def: KeyDef::new(parts),
            unique,
        }
    }
}

/// An ordered index from key to the primary keys of matching tuples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    def: IndexDef,
    entries: BTreeMap<Tuple, BTreeSet<Tuple>>,
    len: usize,
}

impl Index {
    /// Creates an empty index.
    #[must_use]
    pub fn new(def: IndexDef) -> Self {
        Self {
            def,
            entries: BTreeMap::new(),
            len: 0,
        }
    }

    /// Returns the index definition.
    #[must_use]
    pub fn def(&self) -> &IndexDef {
        &self.def
    }

    /// Returns true if inserting `key` for the tuple with primary key `pk`
    /// would violate uniqueness.
    #[must_use]
    pub fn conflicts(&self, key: &Tuple, pk: &Tuple) -> bool {
        self.def.unique
            && self
                .entries
                .get(key)
                .is_some_and(|pks| pks.iter().any(|existing| existing != pk))
    }

    /// Adds an entry.
    pub fn insert(&mut self, key: Tuple, pk: Tuple) {
        if self.entries.entry(key).or_default().insert(pk) {
            self.len += 1;
        }
    }

    /// Removes an entry, returning true if it was present.
    pub fn remove(&mut self, key: &Tuple, pk: &Tuple) -> bool {
        let Some(pks) = self.entries.get_mut(key) else {
            return false;
        };
        let removed = pks.remove(pk);
        if pks.is_empty() {
            self.entries.remove(key);
        }
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// Primary keys stored under `key`.
    pub fn get(&self, key: &Tuple) -> impl Iterator<Item = &Tuple> {
        self.entries.get(key).into_iter().flatten()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuplog_codec::tuple;

    #[test]
    fn extract_key() {
        let key_def = KeyDef::new(vec![2, 0]);
        assert_eq!(key_def.extract(&tuple![1, "a", true]).unwrap(), tuple![true, 1]);
        assert_eq!(key_def.extract(&tuple![1, "a"]).unwrap_err(), 2);
    }

    #[test]
    fn unique_index_conflicts_only_with_other_tuples() {
        let mut index = Index::new(IndexDef::secondary(1, "email", vec![1], true));
        index.insert(tuple!["a@x"], tuple![1]);

        assert!(index.conflicts(&tuple!["a@x"], &tuple![2]));
        assert!(!index.conflicts(&tuple!["a@x"], &tuple![1]));
        assert!(!index.conflicts(&tuple!["b@x"], &tuple![2]));
    }

    #[test]
    fn non_unique_index_holds_many() {
        let mut index = Index::new(IndexDef::secondary(1, "city", vec![1], false));
        index.insert(tuple!["Oslo"], tuple![1]);
        index.insert(tuple!["Oslo"], tuple![2]);
        assert!(!index.conflicts(&tuple!["Oslo"], &tuple![3]));
        assert_eq!(index.get(&tuple!["Oslo"]).count(), 2);
        assert_eq!(index.len(), 2);

        assert!(index.remove(&tuple!["Oslo"], &tuple![1]));
        assert!(!index.remove(&tuple!["Oslo"], &tuple![1]));
        assert_eq!(index.len(), 1);
    }
}
