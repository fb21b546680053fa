// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use common::{init_logging, signature, MethodBuilder, Taint, TaintInterpreter, TaintState};
use cpa_checker::abstract_state::{ProgramLocationDependent, SimplePrecision};
use cpa_checker::cfa::{Cfa, MethodSignature, NodeId};
use cpa_checker::cpa_algorithm::{
    Cpa, CpaAlgorithm, ProgramLocationDependentForwardTransferRelation, TransferRelation,
};
use cpa_checker::instruction::Instruction;
use cpa_checker::jvm_state::{JvmAbstractState, JvmFrame};
use cpa_checker::jvm_transfer_relation::JvmTransferRelation;
use cpa_checker::operators::{CpaOperators, NEVER_ABORT};
use cpa_checker::reached_set::{DefaultReachedSet, ReachedSet};
use cpa_checker::waitlist::{StackWaitlist, Waitlist};

use std::collections::BTreeMap;
use std::rc::Rc;

type Relation = ProgramLocationDependentForwardTransferRelation<JvmTransferRelation<TaintInterpreter>>;

/// ```text
/// static int loop(int x) {
///     int y;
///     do {
///         y = x;      // 0: iload_0, 1: istore_1
///     } while (?);    // 2: goto 0
///     return y;       // 2: iload_1, 3: ireturn
/// }
/// ```
fn loop_program() -> (Rc<Cfa>, Rc<MethodSignature>) {
    let method = signature("Foo", "loop", "(I)I", true);
    let mut cfa = Cfa::new();
    MethodBuilder::new(&mut cfa, &method)
        .instruction(0, 1, Instruction::load(0, false))
        .instruction(1, 2, Instruction::store(1, false))
        .instruction(2, 0, Instruction::simple(0, 0))
        .instruction(2, 3, Instruction::load(1, false))
        .ret(3, 1);
    (Rc::new(cfa), method)
}

fn entry(cfa: &Cfa, method: &Rc<MethodSignature>) -> TaintState {
    JvmAbstractState::new(
        cfa.function_entry_node(method).unwrap(),
        JvmFrame::new(vec![Taint::singleton("x")]),
    )
}

fn relation(cfa: &Rc<Cfa>) -> Relation {
    ProgramLocationDependentForwardTransferRelation::new(
        cfa.clone(),
        JvmTransferRelation::new(TaintInterpreter),
    )
}

#[test]
fn successors_are_placed_at_the_edge_targets() {
    let (cfa, method) = loop_program();
    let node = |offset| cfa.find_node(&method, offset).unwrap();
    let mut relation = relation(&cfa);

    let successors = relation
        .generate_abstract_successors(&entry(&cfa, &method), &SimplePrecision)
        .unwrap();
    assert_eq!(successors.len(), 1);
    assert_eq!(successors[0].program_location(), node(1));
    assert_eq!(successors[0].frame().peek(0), Some(&Taint::singleton("x")));

    let stored = relation
        .generate_abstract_successors(&successors[0], &SimplePrecision)
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].program_location(), node(2));
    let locations: Vec<NodeId> = relation
        .generate_abstract_successors(&stored[0], &SimplePrecision)
        .unwrap()
        .iter()
        .map(|s| s.program_location())
        .collect();
    assert_eq!(locations, vec![node(0), node(3)]);
}

#[test]
fn join_merge_keeps_one_state_per_location() {
    init_logging();
    let (cfa, method) = loop_program();
    let cpa = Cpa::new(relation(&cfa), CpaOperators::join());
    let mut algorithm = CpaAlgorithm::new(cpa, SimplePrecision, Rc::new(NEVER_ABORT));
    let mut reached = DefaultReachedSet::new();
    let mut waitlist = StackWaitlist::new();
    let initial = entry(&cfa, &method);
    reached.add(initial.clone());
    waitlist.add(initial);
    algorithm.run(&mut reached, &mut waitlist).unwrap();

    // Every reached state is compared with every other one, so states at other locations must
    // neither absorb nor replace each other.
    let mut per_location = BTreeMap::new();
    for state in reached.states() {
        *per_location.entry(state.program_location()).or_insert(0) += 1;
    }
    let mut expected: BTreeMap<NodeId, i32> = (0..4)
        .map(|offset| (cfa.find_node(&method, offset).unwrap(), 1))
        .collect();
    expected.insert(cfa.function_return_exit_node(&method).unwrap(), 1);
    assert_eq!(per_location, expected);

    let exit = cfa.function_return_exit_node(&method).unwrap();
    let returned = reached
        .states()
        .find(|s| s.program_location() == exit)
        .unwrap();
    assert_eq!(returned.frame().peek(0), Some(&Taint::singleton("x")));
}
