//! Property-based test generators using proptest.
//!
//! Keys are drawn from a small range so generated workloads hit duplicate
//! keys, replaces of existing rows and deletes of missing ones often.

use proptest::prelude::*;
use tuplog_codec::{Field, Tuple};
use tuplog_core::{CoreResult, Engine, Lsn, SpaceId};

/// Upper bound (exclusive) of generated primary keys.
pub const KEY_RANGE: i64 = 16;

/// One data operation against a space keyed on field 0.
#[derive(Debug, Clone, PartialEq)]
pub enum SpaceOp {
    /// Insert a tuple.
    Insert(Tuple),
    /// Insert or overwrite a tuple.
    Replace(Tuple),
    /// Delete by primary key.
    Delete(i64),
}

impl SpaceOp {
    /// Runs the operation against `space_id`.
    pub fn apply(&self, engine: &Engine, space_id: SpaceId) -> CoreResult<Lsn> {
        match self {
            Self::Insert(tuple) => engine.insert(space_id, tuple.clone()),
            Self::Replace(tuple) => engine.replace(space_id, tuple.clone()),
            Self::Delete(key) => engine.delete(space_id, Tuple::new(vec![Field::Integer(*key)])),
        }
    }
}

/// Strategy for scalar fields.
pub fn field_strategy() -> impl Strategy<Value = Field> {
    prop_oneof![
        Just(Field::Null),
        any::<bool>().prop_map(Field::Bool),
        any::<i64>().prop_map(Field::Integer),
        "[a-z]{0,12}".prop_map(Field::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Field::Bytes),
    ]
}

/// Strategy for tuples with an integer primary key in `0..KEY_RANGE`.
pub fn tuple_strategy() -> impl Strategy<Value = Tuple> {
    (0..KEY_RANGE, prop::collection::vec(field_strategy(), 0..4)).prop_map(|(key, rest)| {
        let mut fields = Vec::with_capacity(rest.len() + 1);
        fields.push(Field::Integer(key));
        fields.extend(rest);
        Tuple::new(fields)
    })
}

/// Strategy for a single operation.
pub fn op_strategy() -> impl Strategy<Value = SpaceOp> {
    prop_oneof![
        3 => tuple_strategy().prop_map(SpaceOp::Insert),
        2 => tuple_strategy().prop_map(SpaceOp::Replace),
        1 => (0..KEY_RANGE).prop_map(SpaceOp::Delete),
    ]
}

/// Strategy for a workload of up to `max_len` operations.
pub fn ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<SpaceOp>> {
    prop::collection::vec(op_strategy(), 1..max_len.max(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{create_test_space, with_temp_engine};
    use proptest::strategy::ValueTree;
    use proptest::test_runner::TestRunner;

    proptest! {
        #[test]
        fn tuples_are_keyed(tuple in tuple_strategy()) {
            let key = tuple.field(0).and_then(Field::as_integer);
            prop_assert!(matches!(key, Some(k) if (0..KEY_RANGE).contains(&k)));
        }
    }

    #[test]
    fn failed_ops_consume_no_lsn() {
        let mut runner = TestRunner::default();
        let ops = ops_strategy(32).new_tree(&mut runner).unwrap().current();

        with_temp_engine(|engine| {
            let test = create_test_space(engine, "test");
            let mut written = 0;
            for op in &ops {
                if op.apply(engine, test).is_ok() {
                    written += 1;
                }
            }
            assert_eq!(engine.lsn(), Lsn::new(1 + written));
        });
    }
}
