// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use cpa_checker::abstract_state::{AbstractState, LatticeAbstractState};
use cpa_checker::cfa::NodeId;
use cpa_checker::jvm_state::{JvmAbstractState, JvmFrame};
use cpa_checker::set_domain::SetAbstractState;

use proptest::collection::vec;
use proptest::prelude::*;
use std::rc::Rc;

type Labels = SetAbstractState<u8>;

fn labels() -> impl Strategy<Value = Labels> {
    vec(0u8..8, 0..5).prop_map(|elements| elements.into_iter().collect())
}

fn jvm_state() -> impl Strategy<Value = JvmAbstractState<Labels>> {
    (
        1usize..3,
        vec(labels(), 0..4),
        vec(labels(), 0..4),
        proptest::option::of(labels()),
    )
        .prop_map(|(location, locals, stack, field)| {
            let mut frame = JvmFrame::new(locals);
            for value in stack {
                frame.push(value);
            }
            let mut state = JvmAbstractState::new(NodeId::new(location), frame);
            if let Some(value) = field {
                state.set_static_field(Rc::from("Foo.f"), value);
            }
            state
        })
}

proptest! {
    #[test]
    fn set_join_is_the_least_upper_bound(a in labels(), b in labels(), c in labels()) {
        let joined = a.join(&b);
        prop_assert_eq!(&joined, &b.join(&a));
        prop_assert_eq!(a.join(&a), a.clone());
        prop_assert_eq!(joined.join(&c), a.join(&b.join(&c)));
        prop_assert!(a.is_less_or_equal(&joined));
        prop_assert!(b.is_less_or_equal(&joined));
        prop_assert_eq!(a.is_less_or_equal(&b), joined == b);
        prop_assert!(Labels::bottom().is_less_or_equal(&a));
    }

    #[test]
    fn jvm_join_is_an_upper_bound(a in jvm_state(), b in jvm_state()) {
        prop_assert_eq!(a.is_joinable(&b), b.is_joinable(&a));
        if !a.is_joinable(&b) {
            prop_assert!(!a.is_less_or_equal(&b));
            prop_assert!(!b.is_less_or_equal(&a));
            return Ok(());
        }
        let joined = a.join(&b);
        prop_assert_eq!(&joined, &b.join(&a));
        prop_assert_eq!(a.join(&a), a.clone());
        prop_assert!(a.is_less_or_equal(&joined));
        prop_assert!(b.is_less_or_equal(&joined));
        prop_assert_eq!(
            joined.frame().locals().len(),
            a.frame().locals().len().max(b.frame().locals().len())
        );
    }
}

#[test]
fn set_operations() {
    let set = Labels::singleton(3).add(5);
    assert!(set.contains(&3));
    assert!(set.contains(&5));
    assert_eq!(set.len(), 2);
    assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![3, 5]);
    assert!(Labels::bottom().is_empty());
    assert_eq!(Labels::default(), Labels::bottom());
}

#[test]
fn states_at_different_locations_are_incomparable() {
    let a = JvmAbstractState::<Labels>::new(NodeId::new(1), JvmFrame::new(vec![]));
    let b = JvmAbstractState::<Labels>::new(NodeId::new(2), JvmFrame::new(vec![]));
    assert!(!a.is_less_or_equal(&b));
    assert!(!b.is_less_or_equal(&a));
}
