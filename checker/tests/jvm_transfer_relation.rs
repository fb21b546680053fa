// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use common::{signature, Taint, TaintInterpreter, TaintState, SOURCE};
use cpa_checker::abstract_state::{AbstractState, LatticeAbstractState, MemoryLocationValues};
use cpa_checker::cfa::Cfa;
use cpa_checker::errors::ErrorId;
use cpa_checker::instruction::{Instruction, InvocationKind};
use cpa_checker::jvm_state::{JvmAbstractState, JvmFrame};
use cpa_checker::jvm_transfer_relation::JvmTransferRelation;
use cpa_checker::memory_location::MemoryLocation;

use std::rc::Rc;

fn t(label: &'static str) -> Taint {
    Taint::singleton(label)
}

/// A state at the entry of a fresh method whose stack holds the given values, bottom first.
fn state_with_stack(locals: Vec<Taint>, stack: &[&'static str]) -> TaintState {
    let mut cfa = Cfa::new();
    let entry = cfa.add_method(&signature("Foo", "bar", "()V", true));
    let mut frame = JvmFrame::new(locals);
    for label in stack {
        frame.push(t(label));
    }
    JvmAbstractState::new(entry, frame)
}

/// The stack of the state, top first.
fn stack_of(state: &TaintState) -> Vec<Taint> {
    (0..state.frame().stack_size())
        .map(|i| state.frame().peek(i).unwrap().clone())
        .collect()
}

fn relation() -> JvmTransferRelation<TaintInterpreter> {
    JvmTransferRelation::new(TaintInterpreter)
}

#[test]
fn dup_x1_copies_the_top_below_the_second_value() {
    let state = state_with_stack(vec![], &["c", "b", "a"]);
    let result = relation().execute(&state, &Instruction::dup_x1()).unwrap();
    assert_eq!(stack_of(&result), vec![t("a"), t("b"), t("a"), t("c")]);
}

#[test]
fn dup2_x2_copies_two_slots_below_four() {
    let state = state_with_stack(vec![], &["d", "c", "b", "a"]);
    let result = relation().execute(&state, &Instruction::dup2_x2()).unwrap();
    assert_eq!(
        stack_of(&result),
        vec![t("a"), t("b"), t("c"), t("d"), t("a"), t("b")]
    );
}

#[test]
fn swap_exchanges_the_top_two_values() {
    let state = state_with_stack(vec![], &["c", "b", "a"]);
    let result = relation().execute(&state, &Instruction::swap()).unwrap();
    assert_eq!(stack_of(&result), vec![t("b"), t("a"), t("c")]);
}

#[test]
fn category2_store_and_load_keep_the_slot_order() {
    let state = state_with_stack(vec![], &["high", "low"]);
    let stored = relation()
        .execute(&state, &Instruction::store(1, true))
        .unwrap();
    assert_eq!(stored.frame().stack_size(), 0);
    assert_eq!(stored.frame().locals(), &[Taint::bottom(), t("low"), t("high")]);

    let loaded = relation()
        .execute(&stored, &Instruction::load(1, true))
        .unwrap();
    assert_eq!(stack_of(&loaded), vec![t("low"), t("high")]);
    assert_eq!(
        loaded.value_at(&MemoryLocation::Stack(1)),
        loaded.value_at(&MemoryLocation::LocalVariable(2))
    );
}

#[test]
fn binary_operations_join_their_operands() {
    let state = state_with_stack(vec![], &["x", "b", "a"]);
    let result = relation()
        .execute(&state, &Instruction::simple(2, 1))
        .unwrap();
    assert_eq!(stack_of(&result), vec![t("a").join(&t("b")), t("x")]);
}

#[test]
fn static_fields_flow_through_put_and_get() {
    let state = state_with_stack(vec![], &["a"]);
    let stored = relation()
        .execute(&state, &Instruction::put_static("Foo.f", false))
        .unwrap();
    assert_eq!(stored.static_field("Foo.f"), Some(&t("a")));
    assert_eq!(
        stored.value_at(&MemoryLocation::StaticField(Rc::from("Foo.f"))),
        Some(t("a"))
    );
    let loaded = relation()
        .execute(&stored, &Instruction::get_static("Foo.f", false))
        .unwrap();
    assert_eq!(stack_of(&loaded), vec![t("a")]);
    let unset = relation()
        .execute(&stored, &Instruction::get_static("Foo.g", true))
        .unwrap();
    assert_eq!(stack_of(&unset), vec![Taint::bottom(), Taint::bottom()]);
}

#[test]
fn invocations_consult_the_interpreter() {
    let source = signature("Foo", SOURCE, "()J", true);
    let state = state_with_stack(vec![], &["a"]);
    let result = relation()
        .execute(&state, &Instruction::invoke(InvocationKind::Static, source))
        .unwrap();
    assert_eq!(stack_of(&result), vec![t(SOURCE), t(SOURCE), t("a")]);
}

#[test]
fn catching_replaces_the_stack_with_the_exception() {
    let state = state_with_stack(vec![t("l")], &["b", "a"]);
    let result = relation().catch_exception(&state);
    assert_eq!(stack_of(&result), vec![Taint::bottom()]);
    assert_eq!(result.frame().locals(), &[t("l")]);
}

#[test]
fn popping_too_much_is_a_malformed_state() {
    let state = state_with_stack(vec![], &["a"]);
    let error = relation()
        .execute(&state, &Instruction::simple(2, 1))
        .unwrap_err();
    assert_eq!(error.id(), ErrorId::MalformedAbstractState);
    let error = relation()
        .execute(&state, &Instruction::load(3, false))
        .unwrap_err();
    assert_eq!(error.id(), ErrorId::MalformedAbstractState);
}

#[test]
fn states_are_ordered_by_their_slots() {
    let smaller = state_with_stack(vec![t("a")], &["b"]);
    let larger = state_with_stack(vec![t("a").join(&t("c"))], &["b"]);
    assert!(smaller.is_less_or_equal(&larger));
    assert!(!larger.is_less_or_equal(&smaller));
    assert_eq!(smaller.join(&larger), larger);
    assert_eq!(
        smaller.value_at(&MemoryLocation::HeapField {
            field: Rc::from("Foo.h")
        }),
        None
    );
}
