//! All spaces of an engine.

use super::index::IndexDef;
use super::store::Space;
use super::ApplyError;
use crate::recovery::ConflictKind;
use crate::types::SpaceId;
use crate::wal::Op;
use std::collections::{BTreeMap, HashMap};
use tuplog_codec::Tuple;

/// First ID handed out to a space created without an explicit ID.
pub const FIRST_SPACE_ID: u32 = 512;

/// The in-memory state rebuilt by recovery.
///
/// `EngineState` is a plain value: the snapshot loader builds it, replay
/// mutates it, and the engine takes ownership once recovery succeeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineState {
    spaces: BTreeMap<SpaceId, Space>,
    names: HashMap<String, SpaceId>,
}

impl EngineState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a space by ID.
    #[must_use]
    pub fn space(&self, id: SpaceId) -> Option<&Space> {
        self.spaces.get(&id)
    }

    /// Resolves a space name to its ID.
    #[must_use]
    pub fn space_id(&self, name: &str) -> Option<SpaceId> {
        self.names.get(name).copied()
    }

    /// All spaces in ID order.
    pub fn spaces(&self) -> impl Iterator<Item = &Space> {
        self.spaces.values()
    }

    /// Total number of tuples in all spaces.
    #[must_use]
    pub fn tuple_count(&self) -> usize {
        self.spaces.values().map(Space::len).sum()
    }

    /// The ID the next created space should get.
    #[must_use]
    pub fn next_space_id(&self) -> SpaceId {
        self.spaces
            .keys()
            .next_back()
            .map_or(SpaceId::new(FIRST_SPACE_ID), |id| {
                SpaceId::new(id.as_u32().max(FIRST_SPACE_ID - 1).saturating_add(1))
            })
    }

    /// Checks that `op` would apply cleanly, without changing anything.
    pub fn check(&self, op: &Op) -> Result<(), ApplyError> {
        match op {
            Op::CreateSpace { space_id, name, .. } => self.check_create(*space_id, name),
            Op::Insert { space_id, tuple } => self.get(*space_id)?.check_insert(tuple),
            Op::Replace { space_id, tuple } => self.get(*space_id)?.check_replace(tuple),
            Op::Delete { space_id, key } => self.get(*space_id)?.check_delete(key),
            Op::Nop => Ok(()),
        }
    }

    /// Applies `op`. On error the state is unchanged.
    pub fn apply(&mut self, op: &Op) -> Result<(), ApplyError> {
        match op {
            Op::CreateSpace {
                space_id,
                name,
                indexes,
            } => self.create_space(*space_id, name, indexes.clone()),
            Op::Insert { space_id, tuple } => self.get_mut(*space_id)?.insert(tuple.clone()),
            Op::Replace { space_id, tuple } => {
                self.get_mut(*space_id)?.replace(tuple.clone()).map(|_| ())
            }
            Op::Delete { space_id, key } => self.get_mut(*space_id)?.delete(key).map(|_| ()),
            Op::Nop => Ok(()),
        }
    }

    /// Creates an empty space.
    pub fn create_space(
        &mut self,
        id: SpaceId,
        name: &str,
        indexes: Vec<IndexDef>,
    ) -> Result<(), ApplyError> {
        self.check_create(id, name)?;
        self.names.insert(name.to_string(), id);
        self.spaces.insert(id, Space::new(id, name, indexes));
        Ok(())
    }

    /// Looks up a tuple.
    #[must_use]
    pub fn get_tuple(&self, id: SpaceId, key: &Tuple) -> Option<&Tuple> {
        self.spaces.get(&id).and_then(|s| s.get(key))
    }

    fn check_create(&self, id: SpaceId, name: &str) -> Result<(), ApplyError> {
        if self.spaces.contains_key(&id) || self.names.contains_key(name) {
            return Err(
                ApplyError::new(ConflictKind::SpaceExists, format!("Space '{name}' already exists"))
                    .with_space(id),
            );
        }
        Ok(())
    }

    fn get(&self, id: SpaceId) -> Result<&Space, ApplyError> {
        self.spaces.get(&id).ok_or_else(|| unknown_space(id))
    }

    fn get_mut(&mut self, id: SpaceId) -> Result<&mut Space, ApplyError> {
        self.spaces.get_mut(&id).ok_or_else(|| unknown_space(id))
    }
}

fn unknown_space(id: SpaceId) -> ApplyError {
    ApplyError::new(ConflictKind::UnknownSpace, format!("Space '{id}' does not exist")).with_space(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuplog_codec::tuple;

    fn create_test(state: &mut EngineState) -> SpaceId {
        let id = state.next_space_id();
        state
            .apply(&Op::CreateSpace {
                space_id: id,
                name: "test".into(),
                indexes: vec![IndexDef::primary(vec![0])],
            })
            .unwrap();
        id
    }

    #[test]
    fn space_ids_start_at_first_user_id() {
        let mut state = EngineState::new();
        assert_eq!(create_test(&mut state), SpaceId::new(FIRST_SPACE_ID));
        assert_eq!(state.next_space_id(), SpaceId::new(FIRST_SPACE_ID + 1));
        assert_eq!(state.space_id("test"), Some(SpaceId::new(FIRST_SPACE_ID)));
    }

    #[test]
    fn apply_ops() {
        let mut state = EngineState::new();
        let id = create_test(&mut state);

        state.apply(&Op::Insert { space_id: id, tuple: tuple![1, "a"] }).unwrap();
        state.apply(&Op::Replace { space_id: id, tuple: tuple![1, "b"] }).unwrap();
        state.apply(&Op::Insert { space_id: id, tuple: tuple![2, "c"] }).unwrap();
        state.apply(&Op::Delete { space_id: id, key: tuple![2] }).unwrap();
        state.apply(&Op::Nop).unwrap();

        assert_eq!(state.get_tuple(id, &tuple![1]), Some(&tuple![1, "b"]));
        assert_eq!(state.tuple_count(), 1);
    }

    #[test]
    fn conflicts_are_classified() {
        let mut state = EngineState::new();
        let id = create_test(&mut state);
        let insert = Op::Insert { space_id: id, tuple: tuple![1] };
        state.apply(&insert).unwrap();

        let kind = |state: &EngineState, op: &Op| state.check(op).unwrap_err().kind;
        assert_eq!(kind(&state, &insert), ConflictKind::DuplicateKey);
        assert_eq!(
            kind(&state, &Op::Delete { space_id: id, key: tuple![9] }),
            ConflictKind::MissingKey
        );
        assert_eq!(
            kind(&state, &Op::Insert { space_id: SpaceId::new(1), tuple: tuple![1] }),
            ConflictKind::UnknownSpace
        );
        assert_eq!(
            kind(
                &state,
                &Op::CreateSpace {
                    space_id: SpaceId::new(600),
                    name: "test".into(),
                    indexes: vec![IndexDef::primary(vec![0])],
                }
            ),
            ConflictKind::SpaceExists
        );
        assert_eq!(
            kind(&state, &Op::Insert { space_id: id, tuple: tuple![] }),
            ConflictKind::InvalidTuple
        );
    }

    #[test]
    fn failed_apply_changes_nothing() {
        let mut state = EngineState::new();
        let id = create_test(&mut state);
        state.apply(&Op::Insert { space_id: id, tuple: tuple![1, "first tuple"] }).unwrap();
        let before = state.clone();

        assert!(state
            .apply(&Op::Insert { space_id: id, tuple: tuple![1, "third tuple"] })
            .is_err());
        assert_eq!(state, before);
    }
}
