// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{AbstractState, MemoryLocationValues, ProgramLocationDependent};
use crate::cfa::{MethodSignature, NodeId};
use crate::reached_set::ProgramLocationDependentReachedSet;

use rpds::List;
use std::fmt::{Debug, Formatter, Result};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// A slot inside a JVM abstract state.
#[derive(Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum MemoryLocation {
    LocalVariable(usize),
    /// Counted from the top of the operand stack.
    Stack(usize),
    /// Identified by the fully qualified field name.
    StaticField(Rc<str>),
    /// A field of a heap object. JVM states do not track the heap, so backward tracing
    /// rejects these.
    HeapField { field: Rc<str> },
}

impl Debug for MemoryLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            MemoryLocation::LocalVariable(index) => write!(f, "local {}", index),
            MemoryLocation::Stack(index) => write!(f, "stack {}", index),
            MemoryLocation::StaticField(field) => write!(f, "static {}", field),
            MemoryLocation::HeapField { field } => write!(f, "heap {}", field),
        }
    }
}

impl MemoryLocation {
    /// The value the state holds at this location, or default if the state does not have one.
    pub fn extract_value_or_default<V: Clone, S: MemoryLocationValues<V>>(
        &self,
        state: &S,
        default: &V,
    ) -> V {
        state.value_at(self).unwrap_or_else(|| default.clone())
    }
}

/// A memory location at a program location.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct LocationDependentMemoryLocation {
    pub memory_location: MemoryLocation,
    pub program_location: NodeId,
}

impl Debug for LocationDependentMemoryLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "{:?} at node {}",
            self.memory_location,
            self.program_location.index()
        )
    }
}

impl LocationDependentMemoryLocation {
    pub fn new(
        memory_location: MemoryLocation,
        program_location: NodeId,
    ) -> LocationDependentMemoryLocation {
        LocationDependentMemoryLocation {
            memory_location,
            program_location,
        }
    }
}

/// A call that the backward traversal has stepped into from its return site: the callee, and
/// the reached set and abstract state of the caller at the call site, which is where the
/// traversal continues once it reaches the callee's entry.
pub struct StackEntry<S: AbstractState + ProgramLocationDependent> {
    pub signature: Rc<MethodSignature>,
    pub reached_set: Rc<ProgramLocationDependentReachedSet<S>>,
    pub caller_state: S,
}

impl<S: AbstractState + ProgramLocationDependent> Clone for StackEntry<S> {
    fn clone(&self) -> Self {
        StackEntry {
            signature: self.signature.clone(),
            reached_set: self.reached_set.clone(),
            caller_state: self.caller_state.clone(),
        }
    }
}

impl<S: AbstractState + ProgramLocationDependent> Debug for StackEntry<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        self.signature.fmt(f)
    }
}

/// Reached sets are compared by identity: each one is the result of one analysis run.
impl<S: AbstractState + ProgramLocationDependent> PartialEq for StackEntry<S> {
    fn eq(&self, other: &Self) -> bool {
        self.signature == other.signature
            && Rc::ptr_eq(&self.reached_set, &other.reached_set)
            && self.caller_state == other.caller_state
    }
}

impl<S: AbstractState + ProgramLocationDependent> Eq for StackEntry<S> {}

impl<S: AbstractState + ProgramLocationDependent> Hash for StackEntry<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.signature.hash(state);
        Rc::as_ptr(&self.reached_set).hash(state);
        self.caller_state.hash(state);
    }
}

/// The innermost call first.
pub type CallStack<S> = List<StackEntry<S>>;

/// The abstract state of the backward memory location analysis: a memory location at a program
/// location, the reached set of the traced analysis in which that program location is looked up,
/// and the calls the traversal has stepped into.
pub struct MemoryLocationState<S: AbstractState + ProgramLocationDependent> {
    location: LocationDependentMemoryLocation,
    source_reached_set: Rc<ProgramLocationDependentReachedSet<S>>,
    call_stack: CallStack<S>,
}

impl<S: AbstractState + ProgramLocationDependent> Clone for MemoryLocationState<S> {
    fn clone(&self) -> Self {
        MemoryLocationState {
            location: self.location.clone(),
            source_reached_set: self.source_reached_set.clone(),
            call_stack: self.call_stack.clone(),
        }
    }
}

impl<S: AbstractState + ProgramLocationDependent> Debug for MemoryLocationState<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_struct("MemoryLocationState")
            .field("location", &self.location)
            .field("call_stack", &self.call_stack.iter().collect::<Vec<_>>())
            .finish()
    }
}

impl<S: AbstractState + ProgramLocationDependent> PartialEq for MemoryLocationState<S> {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
            && Rc::ptr_eq(&self.source_reached_set, &other.source_reached_set)
            && self.call_stack.len() == other.call_stack.len()
            && self
                .call_stack
                .iter()
                .zip(other.call_stack.iter())
                .all(|(l, r)| l == r)
    }
}

impl<S: AbstractState + ProgramLocationDependent> Eq for MemoryLocationState<S> {}

impl<S: AbstractState + ProgramLocationDependent> Hash for MemoryLocationState<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.location.hash(state);
        Rc::as_ptr(&self.source_reached_set).hash(state);
        for entry in self.call_stack.iter() {
            entry.hash(state);
        }
    }
}

impl<S: AbstractState + ProgramLocationDependent> MemoryLocationState<S> {
    pub fn new(
        memory_location: MemoryLocation,
        program_location: NodeId,
        source_reached_set: Rc<ProgramLocationDependentReachedSet<S>>,
        call_stack: CallStack<S>,
    ) -> MemoryLocationState<S> {
        MemoryLocationState {
            location: LocationDependentMemoryLocation::new(memory_location, program_location),
            source_reached_set,
            call_stack,
        }
    }

    pub fn location(&self) -> &LocationDependentMemoryLocation {
        &self.location
    }

    pub fn memory_location(&self) -> &MemoryLocation {
        &self.location.memory_location
    }

    pub fn source_reached_set(&self) -> &Rc<ProgramLocationDependentReachedSet<S>> {
        &self.source_reached_set
    }

    pub fn call_stack(&self) -> &CallStack<S> {
        &self.call_stack
    }

    pub fn peek_call_stack(&self) -> Option<&StackEntry<S>> {
        self.call_stack.first()
    }

    pub fn call_stack_contains(&self, signature: &MethodSignature) -> bool {
        self.call_stack
            .iter()
            .any(|entry| *entry.signature == *signature)
    }
}

impl<S: AbstractState + ProgramLocationDependent> ProgramLocationDependent
    for MemoryLocationState<S>
{
    fn program_location(&self) -> NodeId {
        self.location.program_location
    }

    fn set_program_location(&mut self, location: NodeId) {
        self.location.program_location = location;
    }
}

/// Memory location states form a flat lattice: each is only below itself.
impl<S: AbstractState + ProgramLocationDependent> AbstractState for MemoryLocationState<S> {
    fn is_less_or_equal(&self, other: &Self) -> bool {
        self == other
    }
}
