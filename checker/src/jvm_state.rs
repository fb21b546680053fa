// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{
    AbstractState, LatticeAbstractState, MemoryLocationValues, ProgramLocationDependent,
};
use crate::cfa::NodeId;
use crate::errors::AnalysisError;
use crate::memory_location::MemoryLocation;

use itertools::{EitherOrBoth, Itertools};
use log_derive::*;
use rpds::RedBlackTreeMap;
use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;

/// The local variables and the operand stack of a method activation.
/// Stack slots are addressed from the top: slot 0 is the value that the next pop returns.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct JvmFrame<V> {
    locals: Vec<V>,
    /// Bottom first.
    stack: Vec<V>,
}

impl<V: Debug> Debug for JvmFrame<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_struct("JvmFrame")
            .field("locals", &self.locals)
            .field("stack", &self.stack.iter().rev().collect::<Vec<_>>())
            .finish()
    }
}

impl<V> Default for JvmFrame<V> {
    fn default() -> Self {
        JvmFrame {
            locals: Vec::new(),
            stack: Vec::new(),
        }
    }
}

impl<V: Clone + Default> JvmFrame<V> {
    pub fn new(locals: Vec<V>) -> JvmFrame<V> {
        JvmFrame {
            locals,
            stack: Vec::new(),
        }
    }

    pub fn local(&self, index: usize) -> Option<&V> {
        self.locals.get(index)
    }

    /// Sets a local variable, giving any skipped slots the default value.
    pub fn set_local(&mut self, index: usize, value: V) {
        if index >= self.locals.len() {
            self.locals.resize(index + 1, V::default());
        }
        self.locals[index] = value;
    }

    pub fn locals(&self) -> &[V] {
        &self.locals
    }

    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    pub fn peek(&self, index: usize) -> Option<&V> {
        if index < self.stack.len() {
            self.stack.get(self.stack.len() - 1 - index)
        } else {
            None
        }
    }

    pub fn push(&mut self, value: V) {
        self.stack.push(value);
    }

    pub fn push_n(&mut self, value: V, count: usize) {
        for _ in 0..count {
            self.stack.push(value.clone());
        }
    }

    pub fn pop(&mut self) -> std::result::Result<V, AnalysisError> {
        self.stack
            .pop()
            .ok_or_else(|| AnalysisError::malformed_state("pop from an empty operand stack"))
    }

    /// Pops count slots and returns them top first.
    pub fn pop_n(&mut self, count: usize) -> std::result::Result<Vec<V>, AnalysisError> {
        if count > self.stack.len() {
            return Err(AnalysisError::malformed_state(format!(
                "cannot pop {} slots from an operand stack of {}",
                count,
                self.stack.len()
            )));
        }
        let mut popped = self.stack.split_off(self.stack.len() - count);
        popped.reverse();
        Ok(popped)
    }

    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }
}

impl<V: LatticeAbstractState + Default> JvmFrame<V> {
    /// Joins slot by slot. Slots that only one side has are kept as they are, and stacks are
    /// aligned at the bottom.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        JvmFrame {
            locals: join_slots(&self.locals, &other.locals),
            stack: join_slots(&self.stack, &other.stack),
        }
    }
}

fn join_slots<V: LatticeAbstractState>(left: &[V], right: &[V]) -> Vec<V> {
    left.iter()
        .zip_longest(right.iter())
        .map(|pair| match pair {
            EitherOrBoth::Both(l, r) => l.join(r),
            EitherOrBoth::Left(v) | EitherOrBoth::Right(v) => v.clone(),
        })
        .collect()
}

/// The abstract state of a JVM analysis at a program location: a frame plus the values of
/// static fields, each slot holding an element of the value lattice V.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct JvmAbstractState<V> {
    location: NodeId,
    frame: JvmFrame<V>,
    static_fields: RedBlackTreeMap<Rc<str>, V>,
}

impl<V: Debug> Debug for JvmAbstractState<V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_struct("JvmAbstractState")
            .field("location", &self.location.index())
            .field("frame", &self.frame)
            .field("static_fields", &self.static_fields)
            .finish()
    }
}

impl<V: Clone + Default> JvmAbstractState<V> {
    pub fn new(location: NodeId, frame: JvmFrame<V>) -> JvmAbstractState<V> {
        JvmAbstractState {
            location,
            frame,
            static_fields: RedBlackTreeMap::new(),
        }
    }

    pub fn frame(&self) -> &JvmFrame<V> {
        &self.frame
    }

    pub fn frame_mut(&mut self) -> &mut JvmFrame<V> {
        &mut self.frame
    }

    pub fn static_field(&self, field: &str) -> Option<&V> {
        self.static_fields.get(field)
    }

    pub fn set_static_field(&mut self, field: Rc<str>, value: V) {
        self.static_fields.insert_mut(field, value);
    }

    pub fn static_fields(&self) -> &RedBlackTreeMap<Rc<str>, V> {
        &self.static_fields
    }

    pub fn set_static_fields(&mut self, static_fields: RedBlackTreeMap<Rc<str>, V>) {
        self.static_fields = static_fields;
    }
}

impl<V> ProgramLocationDependent for JvmAbstractState<V> {
    fn program_location(&self) -> NodeId {
        self.location
    }

    fn set_program_location(&mut self, location: NodeId) {
        self.location = location;
    }
}

impl<V: LatticeAbstractState + Default> AbstractState for JvmAbstractState<V> {
    #[logfn_inputs(TRACE)]
    fn is_less_or_equal(&self, other: &Self) -> bool {
        self.location == other.location && self.join(other) == *other
    }
}

impl<V: LatticeAbstractState + Default> LatticeAbstractState for JvmAbstractState<V> {
    /// Joins the frames and static fields. The result takes the location of self, so it is an
    /// upper bound of other only if both are at the same location.
    #[logfn_inputs(TRACE)]
    fn join(&self, other: &Self) -> Self {
        let mut static_fields = self.static_fields.clone();
        for (field, value) in other.static_fields.iter() {
            let joined = match static_fields.get(field) {
                Some(existing) => existing.join(value),
                None => value.clone(),
            };
            static_fields.insert_mut(field.clone(), joined);
        }
        JvmAbstractState {
            location: self.location,
            frame: self.frame.join(&other.frame),
            static_fields,
        }
    }

    fn is_joinable(&self, other: &Self) -> bool {
        self.location == other.location
    }
}

impl<V: Clone + Default> MemoryLocationValues<V> for JvmAbstractState<V> {
    fn value_at(&self, location: &MemoryLocation) -> Option<V> {
        match location {
            MemoryLocation::LocalVariable(index) => self.frame.local(*index).cloned(),
            MemoryLocation::Stack(index) => self.frame.peek(*index).cloned(),
            MemoryLocation::StaticField(field) => self.static_fields.get(field.as_ref()).cloned(),
            MemoryLocation::HeapField { .. } => None,
        }
    }
}
