//! Spaces, indexes and the engine state they make up.

mod index;
mod state;
mod store;

pub use index::{Index, IndexDef, KeyDef};
pub use state::{EngineState, FIRST_SPACE_ID};
pub use store::Space;

use crate::recovery::ConflictKind;
use crate::types::SpaceId;
use thiserror::Error;
use tuplog_codec::Tuple;

/// Why an operation could not be applied to the state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ApplyError {
    /// Classification used by the conflict policy.
    pub kind: ConflictKind,
    /// Space the operation targeted.
    pub space_id: Option<SpaceId>,
    /// Conflicting key, when there is one.
    pub key: Option<Tuple>,
    /// Human-readable description.
    pub message: String,
}

impl ApplyError {
    /// Creates an error of the given kind.
    pub fn new(kind: ConflictKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            space_id: None,
            key: None,
            message: message.into(),
        }
    }

    /// Attaches the target space.
    #[must_use]
    pub fn with_space(mut self, space_id: SpaceId) -> Self {
        self.space_id = Some(space_id);
        self
    }

    /// Attaches the conflicting key.
    #[must_use]
    pub fn with_key(mut self, key: Tuple) -> Self {
        self.key = Some(key);
        self
    }
}

/// Checks that a list of index definitions can form a space.
///
/// There must be at least one index, the first must be a unique index
/// numbered 0, every index needs at least one key part, and index numbers
/// and names must be distinct.
pub fn validate_index_defs(indexes: &[IndexDef]) -> Result<(), String> {
    let Some(primary) = indexes.first() else {
        return Err("space needs a primary index".to_string());
    };
    if primary.id != 0 || !primary.unique {
        return Err("index 0 must be a unique primary index".to_string());
    }
    for (i, def) in indexes.iter().enumerate() {
        if def.key_def.parts.is_empty() {
            return Err(format!("index '{}' has no key parts", def.name));
        }
        if indexes[..i]
            .iter()
            .any(|other| other.id == def.id || other.name == def.name)
        {
            return Err(format!("duplicate index '{}'", def.name));
        }
    }
    Ok(())
}
