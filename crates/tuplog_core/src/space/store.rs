//! A space: a set of tuples under one or more indexes.

use super::index::{Index, IndexDef};
use super::ApplyError;
use crate::recovery::ConflictKind;
use crate::types::SpaceId;
use std::collections::BTreeMap;
use tuplog_codec::Tuple;

/// A named collection of tuples.
///
/// Index 0 is the primary index. Tuples are stored by primary key; every
/// other index maps its key to primary keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Space {
    id: SpaceId,
    name: String,
    indexes: Vec<Index>,
    tuples: BTreeMap<Tuple, Tuple>,
}

impl Space {
    /// Creates an empty space.
    #[must_use]
    pub fn new(id: SpaceId, name: impl Into<String>, indexes: Vec<IndexDef>) -> Self {
        Self {
            id,
            name: name.into(),
            indexes: indexes.into_iter().map(Index::new).collect(),
            tuples: BTreeMap::new(),
        }
    }

    /// Space ID.
    #[must_use]
    pub fn id(&self) -> SpaceId {
        self.id
    }

    /// Space name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index definitions in index order.
    #[must_use]
    pub fn index_defs(&self) -> Vec<IndexDef> {
        self.indexes.iter().map(|i| i.def().clone()).collect()
    }

    /// Number of tuples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// Returns true if the space holds no tuples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Looks up a tuple by primary key.
    #[must_use]
    pub fn get(&self, key: &Tuple) -> Option<&Tuple> {
        self.tuples.get(key)
    }

    /// Tuples in primary key order.
    pub fn tuples(&self) -> impl Iterator<Item = &Tuple> {
        self.tuples.values()
    }

    /// Looks up tuples through a secondary index.
    pub fn find_by(&self, index_id: u32, key: &Tuple) -> Vec<&Tuple> {
        self.indexes
            .iter()
            .find(|i| i.def().id == index_id)
            .map(|index| index.get(key).filter_map(|pk| self.tuples.get(pk)).collect())
            .unwrap_or_default()
    }

    /// Checks that `tuple` can be inserted.
    pub fn check_insert(&self, tuple: &Tuple) -> Result<(), ApplyError> {
        self.prepare(tuple, false).map(|_| ())
    }

    /// Inserts a new tuple. Fails if any unique index already has its key.
    pub fn insert(&mut self, tuple: Tuple) -> Result<(), ApplyError> {
        let keys = self.prepare(&tuple, false)?;
        self.store(keys, tuple);
        Ok(())
    }

    /// Checks that `tuple` can replace whatever has its primary key.
    pub fn check_replace(&self, tuple: &Tuple) -> Result<(), ApplyError> {
        self.prepare(tuple, true).map(|_| ())
    }

    /// Inserts or replaces a tuple by primary key, returning the old tuple.
    pub fn replace(&mut self, tuple: Tuple) -> Result<Option<Tuple>, ApplyError> {
        let keys = self.prepare(&tuple, true)?;
        let old = self.unstore(&keys[0]);
        self.store(keys, tuple);
        Ok(old)
    }

    /// Checks that a tuple with primary key `key` exists.
    pub fn check_delete(&self, key: &Tuple) -> Result<(), ApplyError> {
        if self.tuples.contains_key(key) {
            Ok(())
        } else {
            Err(ApplyError::new(
                ConflictKind::MissingKey,
                format!("Key {key} not found in space '{}'", self.name),
            )
            .with_space(self.id)
            .with_key(key.clone()))
        }
    }

    /// Deletes a tuple by primary key, returning it.
    pub fn delete(&mut self, key: &Tuple) -> Result<Tuple, ApplyError> {
        self.check_delete(key)?;
        self.unstore(key).ok_or_else(|| {
            ApplyError::new(ConflictKind::MissingKey, format!("Key {key} not found"))
                .with_space(self.id)
        })
    }

    /// Extracts one key per index and checks uniqueness.
    ///
    /// When `replacing`, a tuple sharing the primary key is not a conflict.
    fn prepare(&self, tuple: &Tuple, replacing: bool) -> Result<Vec<Tuple>, ApplyError> {
        if self.indexes.is_empty() {
            return Err(ApplyError::new(
                ConflictKind::InvalidTuple,
                format!("No index #0 is defined in space '{}'", self.name),
            )
            .with_space(self.id));
        }

        let mut keys = Vec::with_capacity(self.indexes.len());
        for index in &self.indexes {
            let key = index.def().key_def.extract(tuple).map_err(|field| {
                ApplyError::new(
                    ConflictKind::InvalidTuple,
                    format!(
                        "Tuple field {} required by index '{}' in space '{}' is missing",
                        field + 1,
                        index.def().name,
                        self.name
                    ),
                )
                .with_space(self.id)
            })?;
            keys.push(key);
        }

        let pk = &keys[0];
        let existing = if replacing {
            None
        } else {
            self.tuples.get(pk)
        };
        if let Some(old) = existing {
            return Err(self.duplicate(&self.indexes[0], pk, old, tuple));
        }

        for (index, key) in self.indexes.iter().zip(&keys).skip(1) {
            if index.conflicts(key, pk) {
                let old = index
                    .get(key)
                    .find(|other| *other != pk)
                    .and_then(|other| self.tuples.get(other));
                return Err(match old {
                    Some(old) => self.duplicate(index, key, old, tuple),
                    None => ApplyError::new(
                        ConflictKind::DuplicateKey,
                        format!(
                            "Duplicate key exists in unique index '{}' in space '{}'",
                            index.def().name,
                            self.name
                        ),
                    )
                    .with_space(self.id)
                    .with_key(key.clone()),
                });
            }
        }

        Ok(keys)
    }

    fn duplicate(&self, index: &Index, key: &Tuple, old: &Tuple, new: &Tuple) -> ApplyError {
        ApplyError::new(
            ConflictKind::DuplicateKey,
            format!(
                "Duplicate key exists in unique index '{}' in space '{}' with old tuple - {old} and new tuple - {new}",
                index.def().name,
                self.name
            ),
        )
        .with_space(self.id)
        .with_key(key.clone())
    }

    fn store(&mut self, keys: Vec<Tuple>, tuple: Tuple) {
        let mut keys = keys.into_iter();
        let Some(pk) = keys.next() else {
            return;
        };
        for (index, key) in self.indexes.iter_mut().zip(std::iter::once(pk.clone()).chain(keys)) {
            index.insert(key, pk.clone());
        }
        self.tuples.insert(pk, tuple);
    }

    fn unstore(&mut self, pk: &Tuple) -> Option<Tuple> {
        let old = self.tuples.remove(pk)?;
        for index in &mut self.indexes {
            if let Ok(key) = index.def().key_def.extract(&old) {
                index.remove(&key, pk);
            }
        }
        Some(old)
    }
}
