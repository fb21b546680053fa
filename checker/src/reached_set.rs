// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{AbstractState, ProgramLocationDependent};
use crate::cfa::NodeId;

use indexmap::{IndexMap, IndexSet};
use std::fmt::{Debug, Formatter, Result};

/// The abstract states that the fixpoint algorithm has admitted.
/// Iteration follows insertion order, so that the results of an analysis are reproducible.
pub trait ReachedSet<S: AbstractState> {
    /// Adds a state, returning false if an equal state was already reached.
    fn add(&mut self, state: S) -> bool;

    fn add_all(&mut self, states: Vec<S>) {
        for state in states {
            self.add(state);
        }
    }

    /// Removes a state, returning true if it was reached.
    fn remove(&mut self, state: &S) -> bool;

    fn remove_all(&mut self, states: &[S]) {
        for state in states {
            self.remove(state);
        }
    }

    fn contains(&self, state: &S) -> bool;

    fn clear(&mut self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn len(&self) -> usize;

    /// All reached states, in insertion order.
    fn states(&self) -> Box<dyn Iterator<Item = &S> + '_>;

    /// The reached states that merge and stop operators should compare the given state with.
    fn get_reached(&self, state: &S) -> Vec<&S>;
}

/// A reached set that compares every state with every other state.
#[derive(Clone)]
pub struct DefaultReachedSet<S: AbstractState> {
    states: IndexSet<S>,
}

impl<S: AbstractState> Debug for DefaultReachedSet<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_set().entries(self.states.iter()).finish()
    }
}

impl<S: AbstractState> Default for DefaultReachedSet<S> {
    fn default() -> Self {
        DefaultReachedSet {
            states: IndexSet::new(),
        }
    }
}

impl<S: AbstractState> DefaultReachedSet<S> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: AbstractState> ReachedSet<S> for DefaultReachedSet<S> {
    fn add(&mut self, state: S) -> bool {
        self.states.insert(state)
    }

    fn remove(&mut self, state: &S) -> bool {
        self.states.shift_remove(state)
    }

    fn contains(&self, state: &S) -> bool {
        self.states.contains(state)
    }

    fn clear(&mut self) {
        self.states.clear();
    }

    fn len(&self) -> usize {
        self.states.len()
    }

    fn states(&self) -> Box<dyn Iterator<Item = &S> + '_> {
        Box::new(self.states.iter())
    }

    fn get_reached(&self, _state: &S) -> Vec<&S> {
        self.states.iter().collect()
    }
}

/// A reached set that buckets states by their program location, so that merge and stop only ever
/// compare states at the same control flow automaton node. The block abstraction cache stores
/// these, and the backward memory location analysis queries them per node.
#[derive(Clone)]
pub struct ProgramLocationDependentReachedSet<S: AbstractState + ProgramLocationDependent> {
    /// Every reached state, in insertion order.
    states: IndexSet<S>,
    by_location: IndexMap<NodeId, IndexSet<S>>,
}

impl<S: AbstractState + ProgramLocationDependent> Debug for ProgramLocationDependentReachedSet<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_map()
            .entries(self.by_location.iter().map(|(n, s)| (n.index(), s)))
            .finish()
    }
}

impl<S: AbstractState + ProgramLocationDependent> Default for ProgramLocationDependentReachedSet<S> {
    fn default() -> Self {
        ProgramLocationDependentReachedSet {
            states: IndexSet::new(),
            by_location: IndexMap::new(),
        }
    }
}

impl<S: AbstractState + ProgramLocationDependent> ProgramLocationDependentReachedSet<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// The states reached at the given node, in insertion order.
    pub fn get_reached_at(&self, location: NodeId) -> Vec<&S> {
        self.by_location
            .get(&location)
            .map(|states| states.iter().collect())
            .unwrap_or_default()
    }

    /// The first state reached at the given node, if any.
    pub fn first_reached_at(&self, location: NodeId) -> Option<&S> {
        self.by_location
            .get(&location)
            .and_then(|states| states.first())
    }

    /// The nodes that have at least one reached state.
    pub fn locations(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.by_location
            .iter()
            .filter(|(_, states)| !states.is_empty())
            .map(|(n, _)| *n)
    }
}

impl<S: AbstractState + ProgramLocationDependent> ReachedSet<S>
    for ProgramLocationDependentReachedSet<S>
{
    fn add(&mut self, state: S) -> bool {
        if !self.states.insert(state.clone()) {
            return false;
        }
        self.by_location
            .entry(state.program_location())
            .or_default()
            .insert(state);
        true
    }

    fn remove(&mut self, state: &S) -> bool {
        if !self.states.shift_remove(state) {
            return false;
        }
        if let Some(bucket) = self.by_location.get_mut(&state.program_location()) {
            bucket.shift_remove(state);
        }
        true
    }

    fn contains(&self, state: &S) -> bool {
        self.states.contains(state)
    }

    fn clear(&mut self) {
        self.states.clear();
        self.by_location.clear();
    }

    fn len(&self) -> usize {
        self.states.len()
    }

    fn states(&self) -> Box<dyn Iterator<Item = &S> + '_> {
        Box::new(self.states.iter())
    }

    fn get_reached(&self, state: &S) -> Vec<&S> {
        self.get_reached_at(state.program_location())
    }
}
