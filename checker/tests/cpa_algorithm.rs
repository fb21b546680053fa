// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use common::{init_logging, BoundedIncrement, Counter};
use cpa_checker::abstract_state::{AbstractState, SimplePrecision};
use cpa_checker::cpa_algorithm::{Cpa, CpaAlgorithm, TransferRelation};
use cpa_checker::errors::AnalysisError;
use cpa_checker::operators::{
    AbortOperator, ControllableAbortOperator, CpaOperators, MergeJoinOperator, MergeSepOperator,
    NeverAbortOperator, StopAlwaysOperator, StopContainedOperator, StopSepOperator,
};
use cpa_checker::reached_set::{DefaultReachedSet, ReachedSet};
use cpa_checker::waitlist::{StackWaitlist, Waitlist};

use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

fn run_counter(
    operators: CpaOperators<Counter, SimplePrecision>,
    abort: Rc<dyn AbortOperator>,
    reached_seed: &[i64],
    waitlist_seed: &[i64],
) -> Vec<i64> {
    init_logging();
    let cpa = Cpa::new(BoundedIncrement::default(), operators);
    let mut algorithm = CpaAlgorithm::new(cpa, SimplePrecision, abort);
    let mut reached = DefaultReachedSet::new();
    let mut waitlist = StackWaitlist::new();
    for value in reached_seed {
        reached.add(Counter(*value));
    }
    for value in waitlist_seed {
        waitlist.add(Counter(*value));
    }
    algorithm.run(&mut reached, &mut waitlist).unwrap();
    reached.states().map(|c| c.0).collect()
}

fn never() -> Rc<dyn AbortOperator> {
    Rc::new(NeverAbortOperator)
}

#[test]
fn join_merge_with_always_stop_converges_to_the_ceiling() {
    let result = run_counter(
        CpaOperators::new(MergeJoinOperator, StopAlwaysOperator),
        never(),
        &[0],
        &[0],
    );
    assert_eq!(result, vec![10]);
}

#[test]
fn sep_stop_is_suppressed_by_a_dominating_reached_state() {
    let result = run_counter(
        CpaOperators::new(MergeSepOperator, StopSepOperator),
        never(),
        &[20],
        &[0],
    );
    assert_eq!(result, vec![20]);
}

#[test]
fn contained_stop_only_suppresses_equal_states() {
    let result = run_counter(
        CpaOperators::new(MergeSepOperator, StopContainedOperator),
        never(),
        &[20],
        &[0],
    );
    let result: BTreeSet<i64> = result.into_iter().collect();
    assert_eq!(result, [2, 4, 6, 8, 10, 20].into_iter().collect());
}

#[test]
fn sep_merge_with_always_stop_drops_new_states() {
    let result = run_counter(
        CpaOperators::new(MergeSepOperator, StopAlwaysOperator),
        never(),
        &[0],
        &[0],
    );
    assert_eq!(result, vec![0]);
}

#[test]
fn abort_before_the_first_iteration_leaves_the_reached_set_empty() {
    let abort = Rc::new(ControllableAbortOperator::new());
    abort.set_abort(true);
    let result = run_counter(CpaOperators::join(), abort, &[], &[0]);
    assert!(result.is_empty());
}

#[test]
fn abort_can_be_withdrawn() {
    let abort = Rc::new(ControllableAbortOperator::new());
    abort.set_abort(true);
    abort.set_abort(false);
    assert!(!abort.abort());
    let result = run_counter(CpaOperators::join(), abort, &[0], &[0]);
    assert_eq!(result, vec![10]);
}

#[test]
fn runs_are_deterministic() {
    let run = || {
        run_counter(
            CpaOperators::new(MergeSepOperator, StopContainedOperator),
            never(),
            &[20, 5],
            &[0, 1],
        )
    };
    let first = run();
    assert_eq!(first, run());
    assert_eq!(first, run());
}

/// States of a flat domain: every state is only below itself.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
struct Residue(u32);

impl AbstractState for Residue {
    fn is_less_or_equal(&self, other: &Self) -> bool {
        self == other
    }
}

/// n -> 2n mod 11 and n -> n + 3 mod 11.
struct Residues;

impl Residues {
    fn successors(n: u32) -> Vec<Residue> {
        vec![Residue((2 * n) % 11), Residue((n + 3) % 11)]
    }
}

impl TransferRelation<Residue, SimplePrecision> for Residues {
    fn generate_abstract_successors(
        &mut self,
        state: &Residue,
        _precision: &SimplePrecision,
    ) -> Result<Vec<Residue>, AnalysisError> {
        Ok(Residues::successors(state.0))
    }
}

#[test]
fn sep_merge_and_sep_stop_compute_the_closure() {
    init_logging();
    let cpa = Cpa::new(Residues, CpaOperators::sep());
    let mut algorithm = CpaAlgorithm::new(cpa, SimplePrecision, never());
    let mut reached = DefaultReachedSet::new();
    let mut waitlist = StackWaitlist::new();
    reached.add(Residue(1));
    waitlist.add(Residue(1));
    algorithm.run(&mut reached, &mut waitlist).unwrap();

    let mut closure = BTreeSet::new();
    let mut pending = VecDeque::from(vec![Residue(1)]);
    while let Some(state) = pending.pop_front() {
        if closure.insert(state) {
            pending.extend(Residues::successors(state.0));
        }
    }
    let result: BTreeSet<Residue> = reached.states().copied().collect();
    assert_eq!(result, closure);
    assert_eq!(reached.len(), closure.len());
    for a in reached.states() {
        for b in reached.states() {
            assert!(a == b || !a.is_less_or_equal(b));
        }
    }
    assert!(waitlist.is_empty());
}

#[test]
fn reached_set_can_be_cleared_and_reused() {
    init_logging();
    let cpa = Cpa::new(BoundedIncrement::default(), CpaOperators::join());
    let mut algorithm = CpaAlgorithm::new(cpa, SimplePrecision, never());
    let mut reached = DefaultReachedSet::new();
    let mut waitlist = StackWaitlist::new();
    reached.add(Counter(0));
    waitlist.add(Counter(0));
    algorithm.run(&mut reached, &mut waitlist).unwrap();
    assert_eq!(reached.states().copied().collect::<Vec<_>>(), vec![Counter(10)]);

    reached.clear();
    assert!(reached.is_empty());
    reached.add(Counter(7));
    waitlist.add(Counter(7));
    algorithm.run(&mut reached, &mut waitlist).unwrap();
    assert_eq!(reached.states().copied().collect::<Vec<_>>(), vec![Counter(10)]);
}
