// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::AbstractState;

use indexmap::IndexSet;
use std::fmt::{Debug, Formatter, Result};

/// The abstract states the fixpoint algorithm still has to process.
/// Implementations differ only in the order in which `pop` hands the states out, and that order
/// must be a deterministic function of the sequence of insertions and removals.
pub trait Waitlist<S: AbstractState> {
    /// Adds an abstract state. Adding a state that is already pending has no effect.
    fn add(&mut self, state: S);

    fn add_all(&mut self, states: Vec<S>) {
        for state in states {
            self.add(state);
        }
    }

    fn clear(&mut self);

    fn contains(&self, state: &S) -> bool;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes the next abstract state and returns it.
    fn pop(&mut self) -> Option<S>;

    /// Removes an abstract state, returning true if it was pending.
    fn remove(&mut self, state: &S) -> bool;

    fn remove_all(&mut self, states: &[S]) {
        for state in states {
            self.remove(state);
        }
    }

    fn len(&self) -> usize;
}

/// Selects the waitlist implementation that analyses create for themselves.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum WaitlistPolicy {
    /// Most recently added state first.
    #[default]
    DepthFirst,
    /// Least recently added state first.
    BreadthFirst,
}

impl WaitlistPolicy {
    pub fn make_waitlist<S: AbstractState + 'static>(self) -> Box<dyn Waitlist<S>> {
        match self {
            WaitlistPolicy::DepthFirst => Box::new(StackWaitlist::new()),
            WaitlistPolicy::BreadthFirst => Box::new(QueueWaitlist::new()),
        }
    }
}

/// A waitlist with stack discipline, which makes the exploration depth first.
#[derive(Clone)]
pub struct StackWaitlist<S: AbstractState> {
    states: IndexSet<S>,
}

impl<S: AbstractState> Debug for StackWaitlist<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_list().entries(self.states.iter().rev()).finish()
    }
}

impl<S: AbstractState> Default for StackWaitlist<S> {
    fn default() -> Self {
        StackWaitlist {
            states: IndexSet::new(),
        }
    }
}

impl<S: AbstractState> StackWaitlist<S> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: AbstractState> Waitlist<S> for StackWaitlist<S> {
    fn add(&mut self, state: S) {
        self.states.insert(state);
    }

    fn clear(&mut self) {
        self.states.clear();
    }

    fn contains(&self, state: &S) -> bool {
        self.states.contains(state)
    }

    fn pop(&mut self) -> Option<S> {
        self.states.pop()
    }

    fn remove(&mut self, state: &S) -> bool {
        // Keep the relative order of the remaining states.
        self.states.shift_remove(state)
    }

    fn len(&self) -> usize {
        self.states.len()
    }
}

/// A waitlist with queue discipline, which makes the exploration breadth first.
#[derive(Clone)]
pub struct QueueWaitlist<S: AbstractState> {
    states: IndexSet<S>,
}

impl<S: AbstractState> Debug for QueueWaitlist<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_list().entries(self.states.iter()).finish()
    }
}

impl<S: AbstractState> Default for QueueWaitlist<S> {
    fn default() -> Self {
        QueueWaitlist {
            states: IndexSet::new(),
        }
    }
}

impl<S: AbstractState> QueueWaitlist<S> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: AbstractState> Waitlist<S> for QueueWaitlist<S> {
    fn add(&mut self, state: S) {
        self.states.insert(state);
    }

    fn clear(&mut self) {
        self.states.clear();
    }

    fn contains(&self, state: &S) -> bool {
        self.states.contains(state)
    }

    fn pop(&mut self) -> Option<S> {
        self.states.shift_remove_index(0)
    }

    fn remove(&mut self, state: &S) -> bool {
        self.states.shift_remove(state)
    }

    fn len(&self) -> usize {
        self.states.len()
    }
}
