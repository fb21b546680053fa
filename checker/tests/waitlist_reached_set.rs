// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

mod common;

use common::{signature, Counter, Taint, TaintState};
use cpa_checker::abstract_state::ProgramLocationDependent;
use cpa_checker::cfa::Cfa;
use cpa_checker::jvm_state::{JvmAbstractState, JvmFrame};
use cpa_checker::reached_set::{DefaultReachedSet, ProgramLocationDependentReachedSet, ReachedSet};
use cpa_checker::waitlist::{QueueWaitlist, StackWaitlist, Waitlist, WaitlistPolicy};

fn drain(waitlist: &mut dyn Waitlist<Counter>) -> Vec<i64> {
    let mut result = Vec::new();
    while let Some(state) = waitlist.pop() {
        result.push(state.0);
    }
    result
}

fn fill(waitlist: &mut dyn Waitlist<Counter>) {
    for value in [1, 2, 3, 4] {
        waitlist.add(Counter(value));
    }
}

#[test]
fn stack_waitlist_pops_the_newest_state() {
    let mut waitlist = StackWaitlist::new();
    fill(&mut waitlist);
    waitlist.add(Counter(2));
    assert_eq!(waitlist.len(), 4);
    assert!(waitlist.contains(&Counter(3)));
    assert!(waitlist.remove(&Counter(3)));
    assert!(!waitlist.remove(&Counter(3)));
    assert_eq!(drain(&mut waitlist), vec![4, 2, 1]);
    assert!(waitlist.is_empty());
}

#[test]
fn queue_waitlist_pops_the_oldest_state() {
    let mut waitlist = QueueWaitlist::new();
    fill(&mut waitlist);
    waitlist.remove_all(&[Counter(1), Counter(4)]);
    assert_eq!(drain(&mut waitlist), vec![2, 3]);
}

#[test]
fn policies_make_the_matching_waitlist() {
    let mut waitlist = WaitlistPolicy::BreadthFirst.make_waitlist();
    fill(waitlist.as_mut());
    assert_eq!(drain(waitlist.as_mut()), vec![1, 2, 3, 4]);

    let mut waitlist = WaitlistPolicy::default().make_waitlist();
    waitlist.add_all(vec![Counter(1), Counter(2)]);
    waitlist.clear();
    assert!(waitlist.is_empty());
    fill(waitlist.as_mut());
    assert_eq!(drain(waitlist.as_mut()), vec![4, 3, 2, 1]);
}

#[test]
fn default_reached_set_compares_with_everything() {
    let mut reached = DefaultReachedSet::new();
    assert!(reached.add(Counter(1)));
    assert!(reached.add(Counter(5)));
    assert!(!reached.add(Counter(1)));
    assert_eq!(reached.get_reached(&Counter(100)).len(), 2);
    assert!(reached.remove(&Counter(1)));
    assert!(!reached.contains(&Counter(1)));
    assert_eq!(reached.states().map(|c| c.0).collect::<Vec<_>>(), vec![5]);
}

#[test]
fn location_dependent_reached_set_buckets_by_node() {
    let mut cfa = Cfa::new();
    let method = signature("Foo", "bar", "()V", true);
    let entry = cfa.add_method(&method);
    let next = cfa.add_node(&method, 1);

    let state = |location, label: &'static str| -> TaintState {
        JvmAbstractState::new(location, JvmFrame::new(vec![Taint::singleton(label)]))
    };
    let mut reached = ProgramLocationDependentReachedSet::new();
    reached.add(state(entry, "a"));
    reached.add(state(next, "b"));
    reached.add(state(entry, "c"));

    let at_entry = reached.get_reached(&state(entry, "z"));
    assert_eq!(at_entry.len(), 2);
    assert!(at_entry.iter().all(|s| s.program_location() == entry));
    assert_eq!(reached.first_reached_at(entry), Some(&state(entry, "a")));
    assert_eq!(reached.get_reached_at(next), vec![&state(next, "b")]);
    assert_eq!(reached.locations().collect::<Vec<_>>(), vec![entry, next]);

    assert!(reached.remove(&state(entry, "a")));
    assert_eq!(reached.first_reached_at(entry), Some(&state(entry, "c")));
    assert!(reached.remove(&state(next, "b")));
    assert_eq!(reached.locations().collect::<Vec<_>>(), vec![entry]);
    assert_eq!(reached.len(), 1);

    reached.clear();
    assert!(reached.is_empty());
    assert_eq!(reached.first_reached_at(entry), None);
}
