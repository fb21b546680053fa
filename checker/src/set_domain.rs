// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{AbstractState, LatticeAbstractState};

use log_derive::logfn_inputs;
use rpds::RedBlackTreeSet;
use std::fmt::{Debug, Formatter, Result};
use std::hash::Hash;

/// An element of the powerset lattice over T. The empty set is bottom, join is set union and the
/// partial order is set inclusion. Taint analyses use sets of taint sources as the content of
/// their frames, so that a backward trace can be cut off as soon as a value becomes bottom.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct SetAbstractState<T: Ord> {
    elements: RedBlackTreeSet<T>,
}

impl<T: Ord + Debug> Debug for SetAbstractState<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_set().entries(self.elements.iter()).finish()
    }
}

impl<T: Ord> Default for SetAbstractState<T> {
    fn default() -> Self {
        SetAbstractState {
            elements: RedBlackTreeSet::new(),
        }
    }
}

impl<T: Ord> FromIterator<T> for SetAbstractState<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        SetAbstractState {
            elements: iter.into_iter().collect(),
        }
    }
}

/// Constructors
impl<T: Ord> SetAbstractState<T> {
    /// The empty set.
    pub fn bottom() -> Self {
        Self::default()
    }

    pub fn singleton(element: T) -> Self {
        SetAbstractState {
            elements: RedBlackTreeSet::new().insert(element),
        }
    }
}

/// Queries
impl<T: Ord> SetAbstractState<T> {
    pub fn contains(&self, element: &T) -> bool {
        self.elements.contains(element)
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.size()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements.iter()
    }
}

/// Transfer functions
impl<T: Clone + Ord> SetAbstractState<T> {
    #[must_use]
    pub fn add(&self, element: T) -> Self {
        SetAbstractState {
            elements: self.elements.insert(element),
        }
    }
}

impl<T: Clone + Debug + Hash + Ord> AbstractState for SetAbstractState<T> {
    #[logfn_inputs(TRACE)]
    fn is_less_or_equal(&self, other: &Self) -> bool {
        self.elements.size() <= other.elements.size()
            && self.elements.iter().all(|e| other.elements.contains(e))
    }
}

impl<T: Clone + Debug + Hash + Ord> LatticeAbstractState for SetAbstractState<T> {
    #[logfn_inputs(TRACE)]
    fn join(&self, other: &Self) -> Self {
        // Insert the elements of the smaller set into the larger one.
        let (larger, smaller) = if self.elements.size() >= other.elements.size() {
            (self, other)
        } else {
            (other, self)
        };
        let mut elements = larger.elements.clone();
        for e in smaller.elements.iter() {
            elements.insert_mut(e.clone());
        }
        SetAbstractState { elements }
    }
}
