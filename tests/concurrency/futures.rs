//! Future Graph Tests
//!
//! Resolution of deferred expressions the way the store evaluates them at
//! commit, plus the client-side uses: predicates, future-keyed writes and
//! replay of the last committed transaction.

use deferkv::keys::{self, field, Table};
use deferkv::{
    Error, ExprError, FutureGraph, FutureNode, Opcode, Operand, Resolution, WriteOp,
};
use proptest::prelude::*;
use std::collections::HashMap;

use crate::common::*;

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn add_int_over_read() {
    let mut g = FutureGraph::new();
    let k = g.push_read("K");
    let sum = g.push_binary(Opcode::AddInt, k, Operand::literal(3)).unwrap();
    let value = g.resolve(sum, &env(&[("K", "5")]), Resolution::Transient).unwrap();
    assert_eq!(value, Some(b"8".to_vec()));
}

#[test]
fn durable_resolution_is_memoized() {
    let mut g = FutureGraph::new();
    let ytd = g.push_read("w-1-ytd");
    let sum = g.push_binary(Opcode::AddFloat, ytd, Operand::literal("12.5")).unwrap();

    let first = g
        .resolve(sum, &env(&[("w-1-ytd", "300000.0")]), Resolution::Durable)
        .unwrap();
    assert_eq!(first, Some(b"300012.5".to_vec()));
    assert!(g.nodes().iter().all(FutureNode::is_resolved));

    // Nothing left to look up: an empty env still yields the cached value
    let second = g.resolve(sum, &HashMap::new(), Resolution::Durable).unwrap();
    assert_eq!(second, first);
}

#[test]
fn transient_resolution_leaves_graph_untouched() {
    let mut g = FutureGraph::new();
    let a = g.push_read("a");
    let sum = g.push_binary(Opcode::SubInt, a, Operand::literal(1)).unwrap();
    let before = g.clone();

    let value = g.resolve(sum, &env(&[("a", "10")]), Resolution::Transient).unwrap();
    assert_eq!(value, Some(b"9".to_vec()));
    assert_eq!(g, before);
    assert!(matches!(
        g.resolve(sum, &HashMap::new(), Resolution::Transient),
        Err(Error::UnboundRead { .. })
    ));
}

#[test]
fn exists_over_missing_key_is_false() {
    let mut g = FutureGraph::new();
    let r = g.push_read("no-1_1_3001-");
    let e = g.push_unary(Opcode::Exists, r).unwrap();
    let value = g.resolve(e, &HashMap::new(), Resolution::Transient).unwrap();
    assert_eq!(value, Some(b"False".to_vec()));
}

#[test]
fn exists_over_present_key_is_true() {
    let mut g = FutureGraph::new();
    let r = g.push_read("a");
    let e = g.push_unary(Opcode::Exists, r).unwrap();
    let value = g.resolve(e, &env(&[("a", "")]), Resolution::Transient).unwrap();
    assert_eq!(value, Some(b"True".to_vec()));
}

#[test]
fn string_operators() {
    let mut g = FutureGraph::new();
    let name = g.push_read("name");
    let left = g.push_binary(Opcode::ConcatLeft, name, Operand::literal("-x")).unwrap();
    let right = g
        .push_binary(Opcode::ConcatRight, Operand::literal("x-"), left)
        .unwrap();
    let cut = g.push_binary(Opcode::Truncate, right, Operand::literal(4)).unwrap();
    let found = g
        .push_binary(Opcode::SubstringOf, right, Operand::literal("éa"))
        .unwrap();
    let e = env(&[("name", "déathe")]);

    let v = |g: &mut FutureGraph, h| g.resolve(h, &e, Resolution::Transient).unwrap().unwrap();
    assert_eq!(v(&mut g, right), "x-déathe-x".as_bytes());
    assert_eq!(v(&mut g, cut), "x-dé".as_bytes());
    assert_eq!(v(&mut g, found), b"True");
}

#[test]
fn gte_and_float_rendering() {
    let mut g = FutureGraph::new();
    let qty = g.push_read("s-1_1-quantity");
    let enough = g.push_binary(Opcode::GteInt, qty, Operand::literal(10)).unwrap();
    let price = g.push_read("i-1-price");
    let total = g
        .push_binary(Opcode::MulFloat, price, Operand::literal("2"))
        .unwrap();
    let e = env(&[("s-1_1-quantity", "9"), ("i-1-price", "50")]);

    assert_eq!(
        g.resolve(enough, &e, Resolution::Transient).unwrap(),
        Some(b"False".to_vec())
    );
    assert_eq!(
        g.resolve(total, &e, Resolution::Transient).unwrap(),
        Some(b"100.0".to_vec())
    );
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn arithmetic_on_text_is_expression_error() {
    let mut g = FutureGraph::new();
    let a = g.push_read("a");
    let sum = g.push_binary(Opcode::AddInt, a, Operand::literal(1)).unwrap();
    let err = g
        .resolve(sum, &env(&[("a", "abc")]), Resolution::Transient)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Expression(ExprError::NotANumber { expected: "integer", .. })
    ));
}

#[test]
fn integer_overflow_is_reported() {
    let mut g = FutureGraph::new();
    let a = g.push_read("a");
    let sum = g.push_binary(Opcode::AddInt, a, Operand::literal(1)).unwrap();
    let max = i64::MAX.to_string();
    let err = g
        .resolve(sum, &env(&[("a", max.as_str())]), Resolution::Transient)
        .unwrap_err();
    assert!(matches!(err, Error::Expression(ExprError::Overflow { index: 1 })));
}

#[test]
fn non_value_opcodes_are_rejected() {
    let mut g = FutureGraph::new();
    let a = g.push_read("a");
    assert!(matches!(
        g.push_binary(Opcode::Pointer, a, Operand::literal(1)),
        Err(Error::InvalidOpcode { .. })
    ));
    assert!(matches!(
        g.push_unary(Opcode::None, a),
        Err(Error::InvalidOpcode { .. })
    ));
}

#[test]
fn exists_requires_a_read() {
    let mut g = FutureGraph::new();
    let a = g.push_read("a");
    let sum = g.push_binary(Opcode::AddInt, a, Operand::literal(1)).unwrap();
    assert!(matches!(
        g.push_unary(Opcode::Exists, sum),
        Err(Error::Expression(ExprError::NotARead { .. }))
    ));
}

// ============================================================================
// Key Dependencies
// ============================================================================

#[test]
fn keys_of_follows_operands_to_reads() {
    let mut g = FutureGraph::new();
    let a = g.push_read("a");
    let b = g.push_read("b");
    let sum = g.push_binary(Opcode::AddInt, a, b).unwrap();
    let shifted = g.push_binary(Opcode::AddInt, sum, Operand::literal(1)).unwrap();

    let mut keys = g.keys_of(shifted).unwrap();
    keys.sort();
    assert_eq!(keys, vec!["a", "b"]);
    assert_eq!(g.keys_of(a).unwrap(), vec!["a"]);
}

// ============================================================================
// Client: predicates, future-keyed writes, replay
// ============================================================================

#[test]
fn is_true_binds_read_once_and_records_predicate() {
    let (store, mut client) = memory_client();
    seed(&*store, &[("s-1_1-quantity", "25")]);
    client.begin().unwrap();

    let qty = client.get_deferred("s-1_1-quantity").unwrap();
    let enough = client.gte(qty, 10).unwrap();
    assert!(client.is_true(enough).unwrap());

    let low = client.gte(qty, 100).unwrap();
    let reads_before = store.read_stats().tracked;
    assert!(!client.is_true(low).unwrap());
    assert_eq!(store.read_stats().tracked, reads_before);

    let predicates = &client.transaction().predicates;
    assert_eq!(predicates.len(), 2);
    assert_eq!(predicates[0].keys, vec!["s-1_1-quantity"]);
    assert!(predicates[0].expected);
    assert!(!predicates[1].expected);
}

#[test]
fn is_true_over_missing_key() {
    let (_, mut client) = memory_client();
    client.begin().unwrap();

    let order = client.get_deferred("no-1_1_3001-").unwrap();
    let exists = client.exists(order).unwrap();
    assert!(!client.is_true(exists).unwrap());
    assert!(!client.transaction().predicates[0].expected);

    let carrier = client.get_deferred("o-3001_1_1-carrier_id").unwrap();
    let tagged = client.concat(carrier, "x").unwrap();
    assert!(matches!(
        client.is_true(tagged).unwrap_err(),
        Error::Expression(ExprError::AbsentOperand { .. })
    ));
}

#[test]
fn put_at_uses_computed_key() {
    let (_, mut client) = memory_client();
    client.begin().unwrap();

    let (prefix, suffix) = keys::encode_parts(Table::NewOrder, &[1u64, 1], field::RECORD);
    let next = client.get_deferred(&keys::district(1, 1, field::NEXT_O_ID)).unwrap();
    let with_prefix = client.concat_onto(&prefix, next).unwrap();
    let order_key = client.concat(with_prefix, &suffix).unwrap();
    client.put_at(order_key, "").unwrap();

    let txn = client.transaction();
    assert_eq!(txn.future_writes.len(), 1);
    let fw = &txn.future_writes[0];
    assert_eq!(fw.keys, vec![keys::district(1, 1, field::NEXT_O_ID)]);
    assert_eq!(fw.write.op, WriteOp::Set);

    let mut g = txn.fset.clone();
    let e = env(&[(keys::district(1, 1, field::NEXT_O_ID).as_str(), "3001")]);
    let key = g.resolve(order_key, &e, Resolution::Transient).unwrap().unwrap();
    assert_eq!(
        String::from_utf8(key).unwrap(),
        keys::new_order(3001, 1, 1, field::RECORD)
    );
}

#[test]
fn committed_value_replays_durably() {
    let (_, mut client) = memory_client();
    client.begin().unwrap();
    let ytd = client.get_deferred("w-1-ytd").unwrap();
    assert!(client.committed_value(ytd, &HashMap::new()).unwrap_err().is_precondition());
    let next = client.add(ytd, 12.5).unwrap();
    client.put_deferred("w-1-ytd", next).unwrap();
    client.commit().unwrap();

    let e = env(&[("w-1-ytd", "300000.0")]);
    let first = client.committed_value(next, &e).unwrap();
    assert_eq!(first, Some(b"300012.5".to_vec()));
    let again = client.committed_value(next, &HashMap::new()).unwrap();
    assert_eq!(again, first);
}

// ============================================================================
// Property: ADD_INT matches integer addition
// ============================================================================

proptest! {
    #[test]
    fn add_int_matches_checked_add(a in any::<i64>(), b in any::<i64>()) {
        let mut g = FutureGraph::new();
        let k = g.push_read("K");
        let sum = g.push_binary(Opcode::AddInt, k, Operand::literal(b)).unwrap();
        let result = g.resolve(sum, &env(&[("K", a.to_string().as_str())]), Resolution::Transient);
        match a.checked_add(b) {
            Some(expected) => prop_assert_eq!(result.unwrap(), Some(expected.to_string().into_bytes())),
            None => prop_assert!(result.is_err()),
        }
    }
}
