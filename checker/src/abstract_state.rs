// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::cfa::NodeId;
use crate::memory_location::MemoryLocation;

use std::fmt::Debug;
use std::hash::Hash;

/// An element of an abstract domain: an approximation of a set of concrete program states.
///
/// The partial order is domain specific and need not coincide with any derived ordering of the
/// underlying Rust type. Identity is the derived equality, which is what reached sets, waitlists
/// and the block abstraction cache use to deduplicate states.
pub trait AbstractState: Clone + Debug + Eq + Hash {
    /// Returns true if every concrete state described by self is also described by other.
    fn is_less_or_equal(&self, other: &Self) -> bool;

    /// Returns a copy of self that shares no mutable state with it.
    /// States are values, so the default clone suffices for every domain in this crate.
    #[must_use]
    fn copy(&self) -> Self {
        self.clone()
    }
}

/// An abstract state whose domain has a least upper bound for every pair of joinable elements.
///
/// For joinable `a` and `b`, implementations must guarantee that `a.is_less_or_equal(&a.join(&b))`,
/// `b.is_less_or_equal(&a.join(&b))` and `a.join(&a) == a`.
pub trait LatticeAbstractState: AbstractState {
    #[must_use]
    fn join(&self, other: &Self) -> Self;

    /// Returns true if the join of self and other is an upper bound of both.
    /// Domains made of several disjoint lattices, such as states pinned to a program location,
    /// return false for elements of different components. Joinability is symmetric.
    fn is_joinable(&self, _other: &Self) -> bool {
        true
    }
}

/// Configuration that accompanies abstract states and governs how coarse they are.
/// Precisions are part of the block abstraction cache key, hence the equality requirements.
pub trait Precision: Clone + Debug + Eq + Hash {}

/// The precision of analyses that do not refine their abstraction.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct SimplePrecision;

impl Precision for SimplePrecision {}

/// An abstract state that knows the control flow automaton node it describes.
pub trait ProgramLocationDependent {
    fn program_location(&self) -> NodeId;

    fn set_program_location(&mut self, location: NodeId);
}

/// An abstract state that can be queried for the abstract value stored at a memory location.
pub trait MemoryLocationValues<V> {
    /// Returns the value stored at the location, or None if the state does not track it.
    fn value_at(&self, location: &MemoryLocation) -> Option<V>;
}
