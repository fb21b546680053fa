// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

// The backward transfer relation over memory locations. Given a memory location at a program
// location, it finds the memory locations at the predecessor program locations that may have
// contributed to its value, using the reached sets in a BAM cache as the forward facts.
//
// Within a procedure the predecessors follow from the stack effect of the instruction on the
// entering edge. At a call's return site the traversal steps into every callee whose cached exit
// state, once expanded, yields the state at the return site, remembering the caller on a call
// stack. At a procedure entry it returns to the remembered caller or, if there is none, to every
// caller in the cache whose reduced state is the entry state.
//
// Only locations whose value is not below the threshold are predecessors, which is what makes
// traces end.

use crate::abstract_state::{AbstractState, MemoryLocationValues, Precision, ProgramLocationDependent};
use crate::bam::BamCpa;
use crate::bam_cache::BamCache;
use crate::bam_operators::{ExpandOperator, ReduceOperator};
use crate::cfa::{Call, Cfa, CfaEdge, NodeId};
use crate::cpa_algorithm::{ForwardEdgeTransferRelation, TransferRelation};
use crate::errors::AnalysisError;
use crate::instruction::{Instruction, InstructionKind};
use crate::memory_location::{
    CallStack, LocationDependentMemoryLocation, MemoryLocation, MemoryLocationState, StackEntry,
};
use crate::reached_set::ProgramLocationDependentReachedSet;
use crate::trace::WitnessGraph;

use itertools::Itertools;
use log_derive::*;
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter, Result};
use std::marker::PhantomData;
use std::rc::Rc;

/// The outcome of one backward step.
#[derive(Debug)]
pub struct Backtrace<S: AbstractState + ProgramLocationDependent> {
    /// The backward successor states.
    pub successors: Vec<MemoryLocationState<S>>,
    /// The memory locations the value at the traced location may have come from, in the order
    /// they were found. These are the locations of the successors.
    pub sources: Vec<LocationDependentMemoryLocation>,
}

/// Memory locations that a call taints as a side effect, for example the copies of a new
/// instance's reference that its constructor initializes.
pub type ExtraPropagationLocations = HashMap<Call, HashSet<MemoryLocation>>;

pub struct MemoryLocationTransferRelation<'cache, S, P, V>
where
    S: AbstractState + ProgramLocationDependent,
    P: Precision,
{
    threshold: V,
    cfa: Rc<Cfa>,
    cache: &'cache BamCache<S, P>,
    reduce_operator: Rc<dyn ReduceOperator<S>>,
    expand_operator: Rc<dyn ExpandOperator<S>>,
    extra_propagation_locations: ExtraPropagationLocations,
    witness: WitnessGraph,
    phantom: PhantomData<P>,
}

impl<'cache, S, P, V> Debug for MemoryLocationTransferRelation<'cache, S, P, V>
where
    S: AbstractState + ProgramLocationDependent,
    P: Precision,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        "MemoryLocationTransferRelation".fmt(f)
    }
}

impl<'cache, S, P, V> MemoryLocationTransferRelation<'cache, S, P, V>
where
    S: AbstractState + ProgramLocationDependent + MemoryLocationValues<V> + 'static,
    P: Precision,
    V: AbstractState,
{
    /// A relation that traces values above the threshold through the results that bam_cpa
    /// has computed.
    pub fn new<R: ForwardEdgeTransferRelation<S, P>>(
        threshold: V,
        bam_cpa: &'cache BamCpa<S, P, R>,
        extra_propagation_locations: ExtraPropagationLocations,
    ) -> Self {
        MemoryLocationTransferRelation {
            threshold,
            cfa: bam_cpa.cfa().clone(),
            cache: bam_cpa.cache(),
            reduce_operator: bam_cpa.reduce_operator().clone(),
            expand_operator: bam_cpa.expand_operator().clone(),
            extra_propagation_locations,
            witness: WitnessGraph::new(),
            phantom: PhantomData,
        }
    }

    pub fn threshold(&self) -> &V {
        &self.threshold
    }

    pub fn cfa(&self) -> &Rc<Cfa> {
        &self.cfa
    }

    pub fn cache(&self) -> &'cache BamCache<S, P> {
        self.cache
    }

    /// The sources recorded by the backward steps taken through the `TransferRelation`
    /// interface.
    pub fn witness(&self) -> &WitnessGraph {
        &self.witness
    }

    pub fn take_witness(&mut self) -> WitnessGraph {
        std::mem::take(&mut self.witness)
    }

    /// Computes the backward successors of a memory location state.
    #[logfn_inputs(TRACE)]
    pub fn backtrace(
        &self,
        state: &MemoryLocationState<S>,
        precision: &P,
    ) -> std::result::Result<Backtrace<S>, AnalysisError> {
        let memory_location = state.memory_location();
        if let MemoryLocation::HeapField { .. } = memory_location {
            return Err(unsupported(memory_location));
        }
        let location = state.program_location();
        let mut successors = Vec::new();

        for edge in self.cfa.entering_intraprocedural_edges(location) {
            let parent = edge.source();
            let parent_state = match self.analysis_state(state.source_reached_set(), parent) {
                Some(parent_state) => parent_state,
                None => continue,
            };

            // The instruction edge of an invocation is followed unless every possible callee
            // explains the value.
            let mut follow_invoke_edge = self.cfa.calls_unknown_method(parent);
            let mut interprocedural_successor_found = false;
            // Local variables do not survive calls.
            if !matches!(memory_location, MemoryLocation::LocalVariable(..)) {
                if let Some(current_state) = self.analysis_state(state.source_reached_set(), location) {
                    for call_edge in self.cfa.known_method_call_edges(parent) {
                        let call = match call_edge.weight() {
                            CfaEdge::Call(call) => call,
                            _ => continue,
                        };
                        match self.callee_successor(
                            state,
                            parent_state,
                            current_state,
                            call,
                            call_edge.target(),
                            precision,
                        )? {
                            CalleeStep::Successor(successor) => {
                                successors.push(successor);
                                interprocedural_successor_found = true;
                            }
                            CalleeStep::NotInfluenced => {}
                            CalleeStep::Unavailable => follow_invoke_edge = true,
                        }
                    }
                }
            }
            if !interprocedural_successor_found {
                follow_invoke_edge = true;
            }

            let predecessor_locations = match edge.weight() {
                CfaEdge::Instruction(instruction)
                    if !instruction.is_invoke() || follow_invoke_edge =>
                {
                    self.instruction_predecessors(memory_location, instruction, parent)
                }
                CfaEdge::AssumeException => vec![memory_location.clone()],
                _ => vec![],
            };
            successors.extend(self.successors_from_locations(
                predecessor_locations,
                parent_state,
                state.source_reached_set(),
                state.call_stack(),
            ));
        }

        if self.cfa.is_entry_node(location) {
            if let Some(caller_location) = self.caller_location(state)? {
                match state.peek_call_stack() {
                    Some(entry) => {
                        let rest = state.call_stack().drop_first().unwrap_or_default();
                        successors.extend(self.successors_from_locations(
                            vec![caller_location],
                            &entry.caller_state,
                            &entry.reached_set,
                            &rest,
                        ));
                    }
                    None => {
                        successors.extend(self.unknown_caller_successors(
                            state,
                            caller_location,
                        )?);
                    }
                }
            }
        }

        let sources = successors.iter().map(|s| s.location().clone()).collect();
        Ok(Backtrace {
            successors,
            sources,
        })
    }

    /// Tries to explain the value at a call's return site by the callee's return value.
    fn callee_successor(
        &self,
        state: &MemoryLocationState<S>,
        caller_state: &S,
        return_site_state: &S,
        call: &Call,
        callee_entry: NodeId,
        precision: &P,
    ) -> std::result::Result<CalleeStep<S>, AnalysisError> {
        let memory_location = state.memory_location();
        if state.call_stack_contains(&call.target) {
            debug!("not stepping into recursive call {:?}", call);
            return Ok(CalleeStep::Unavailable);
        }
        let reduced = self
            .reduce_operator
            .reduce(caller_state, callee_entry, call)?;
        let block = match self.cache.get(&reduced, precision, &call.target) {
            Some(block) => block,
            None => {
                // BAM treated the call intraprocedurally.
                debug!("no block abstraction for {:?}", call);
                return Ok(CalleeStep::Unavailable);
            }
        };
        if let MemoryLocation::Stack(index) = memory_location {
            if *index >= call.target.descriptor.return_size() {
                return Ok(CalleeStep::NotInfluenced);
            }
        }
        let exit = match self.cfa.function_return_exit_node(&call.target) {
            Some(exit) => exit,
            None => return Ok(CalleeStep::Unavailable),
        };
        let return_state = match self.analysis_state(block.reached_set(), exit) {
            Some(return_state) => return_state,
            None => return Ok(CalleeStep::Unavailable),
        };
        let value = memory_location.extract_value_or_default(return_state, &self.threshold);
        if value.is_less_or_equal(&self.threshold) {
            return Ok(CalleeStep::NotInfluenced);
        }
        let mut expanded =
            self.expand_operator
                .expand(caller_state, return_state, callee_entry, call)?;
        expanded.set_program_location(return_site_state.program_location());
        if !expanded.is_less_or_equal(return_site_state) {
            return Ok(CalleeStep::NotInfluenced);
        }
        let call_stack = state.call_stack().push_front(StackEntry {
            signature: call.target.clone(),
            reached_set: state.source_reached_set().clone(),
            caller_state: caller_state.clone(),
        });
        Ok(CalleeStep::Successor(MemoryLocationState::new(
            memory_location.clone(),
            exit,
            block.reached_set().clone(),
            call_stack,
        )))
    }

    /// Steps from a procedure entry to every cached caller context that reduces to the entry
    /// state the traced location was reached with.
    fn unknown_caller_successors(
        &self,
        state: &MemoryLocationState<S>,
        caller_location: MemoryLocation,
    ) -> std::result::Result<Vec<MemoryLocationState<S>>, AnalysisError> {
        let location = state.program_location();
        let called_state = match self.analysis_state(state.source_reached_set(), location) {
            Some(called_state) => called_state,
            None => return Ok(vec![]),
        };
        let mut successors = Vec::new();
        for call_edge in self.cfa.entering_call_edges(location) {
            let call = match call_edge.weight() {
                CfaEdge::Call(call) => call,
                _ => continue,
            };
            let call_site = call_edge.source();
            for block in self.cache.get_by_signature(&call.caller) {
                let caller_state = match block.reached_set().first_reached_at(call_site) {
                    Some(caller_state) => caller_state,
                    None => continue,
                };
                let reduced = self.reduce_operator.reduce(caller_state, location, call)?;
                if reduced != *called_state {
                    continue;
                }
                // One witness per caller context.
                if let Some(successor) = self
                    .successors_from_locations(
                        vec![caller_location.clone()],
                        caller_state,
                        block.reached_set(),
                        &CallStack::new(),
                    )
                    .into_iter()
                    .next()
                {
                    successors.push(successor);
                }
            }
        }
        Ok(successors)
    }

    /// The location in the caller, just before the call, that the traced location at a
    /// procedure entry was initialized from.
    fn caller_location(
        &self,
        state: &MemoryLocationState<S>,
    ) -> std::result::Result<Option<MemoryLocation>, AnalysisError> {
        match state.memory_location() {
            MemoryLocation::LocalVariable(index) => Ok(self
                .cfa
                .node(state.program_location())
                .signature()
                .and_then(|signature| signature.caller_stack_index(*index))
                .map(MemoryLocation::Stack)),
            MemoryLocation::StaticField(..) => Ok(Some(state.memory_location().clone())),
            // The operand stack of a method starts out empty.
            MemoryLocation::Stack(..) => Ok(None),
            heap @ MemoryLocation::HeapField { .. } => Err(unsupported(heap)),
        }
    }

    /// Returns a successor for each location whose value in the parent state is above the
    /// threshold.
    fn successors_from_locations(
        &self,
        locations: Vec<MemoryLocation>,
        parent_state: &S,
        reached_set: &Rc<ProgramLocationDependentReachedSet<S>>,
        call_stack: &CallStack<S>,
    ) -> Vec<MemoryLocationState<S>> {
        locations
            .into_iter()
            .unique()
            .filter(|location| {
                !location
                    .extract_value_or_default(parent_state, &self.threshold)
                    .is_less_or_equal(&self.threshold)
            })
            .map(|location| {
                MemoryLocationState::new(
                    location,
                    parent_state.program_location(),
                    reached_set.clone(),
                    call_stack.clone(),
                )
            })
            .collect()
    }

    /// The first state of the traced analysis at the node. A missing state is not an error:
    /// the traced analysis may not have completed.
    fn analysis_state<'a>(
        &self,
        reached_set: &'a ProgramLocationDependentReachedSet<S>,
        node: NodeId,
    ) -> Option<&'a S> {
        let state = reached_set.first_reached_at(node);
        if state.is_none() {
            info!("missing state in the cache for {:?}", self.cfa.node(node));
        }
        state
    }

    /// The locations before the instruction that the traced location after it may depend on.
    fn instruction_predecessors(
        &self,
        memory_location: &MemoryLocation,
        instruction: &Instruction,
        parent: NodeId,
    ) -> Vec<MemoryLocation> {
        let stack_index = match memory_location {
            MemoryLocation::Stack(index) => Some(*index),
            _ => None,
        };
        // A stack slot that the instruction pushed, rather than one it left alone.
        let pushed_index = stack_index.filter(|index| *index < instruction.push_count);
        match &instruction.kind {
            InstructionKind::Return | InstructionKind::Increment { .. } => {
                vec![memory_location.clone()]
            }
            InstructionKind::Dup
            | InstructionKind::DupX1
            | InstructionKind::DupX2
            | InstructionKind::Dup2
            | InstructionKind::Dup2X1
            | InstructionKind::Dup2X2
            | InstructionKind::Swap => match pushed_index {
                None => shift_stack_location(memory_location, instruction),
                Some(index) => vec![MemoryLocation::Stack(stack_manipulation_source(
                    &instruction.kind,
                    index,
                ))],
            },
            // The element depends on both the array and the index.
            InstructionKind::ArrayLoad => match pushed_index {
                None => shift_stack_location(memory_location, instruction),
                Some(..) => popped_locations(2),
            },
            InstructionKind::Load { variable } => {
                let mut result = shift_stack_location(memory_location, instruction);
                if let Some(index) = pushed_index {
                    result.push(MemoryLocation::LocalVariable(variable + index));
                }
                result
            }
            InstructionKind::Store { variable } => match memory_location {
                MemoryLocation::LocalVariable(index) if index == variable => {
                    popped_locations(instruction.pop_count)
                }
                MemoryLocation::LocalVariable(index)
                    if instruction.pop_count == 2 && *index == variable + 1 =>
                {
                    vec![MemoryLocation::Stack(1)]
                }
                MemoryLocation::Stack(index) => {
                    vec![MemoryLocation::Stack(index + instruction.pop_count)]
                }
                _ => vec![memory_location.clone()],
            },
            InstructionKind::GetStatic { field } => {
                let mut result = shift_stack_location(memory_location, instruction);
                if pushed_index.is_some() {
                    result.push(MemoryLocation::StaticField(field.clone()));
                }
                result
            }
            InstructionKind::PutStatic { field } => match memory_location {
                MemoryLocation::Stack(index) => {
                    vec![MemoryLocation::Stack(index + instruction.pop_count)]
                }
                MemoryLocation::StaticField(name) if name == field => {
                    popped_locations(instruction.pop_count)
                }
                _ => vec![memory_location.clone()],
            },
            InstructionKind::PutField { .. } => match memory_location {
                MemoryLocation::Stack(index) => {
                    vec![MemoryLocation::Stack(index + instruction.pop_count)]
                }
                _ => vec![memory_location.clone()],
            },
            InstructionKind::Invoke { .. } => {
                let mut result = shift_stack_location(memory_location, instruction);
                if self.propagates_extra_taint(parent, memory_location) {
                    result.extend(popped_locations(instruction.pop_count));
                }
                result
            }
            InstructionKind::ArrayStore
            | InstructionKind::Simple
            | InstructionKind::GetField { .. }
            | InstructionKind::New
            | InstructionKind::Branch
            | InstructionKind::Switch => shift_stack_location(memory_location, instruction),
        }
    }

    /// True if a call leaving the node taints the memory location as a side effect.
    fn propagates_extra_taint(&self, node: NodeId, memory_location: &MemoryLocation) -> bool {
        self.cfa.leaving_edges(node).iter().any(|edge| match edge.weight() {
            CfaEdge::Call(call) => self
                .extra_propagation_locations
                .get(call)
                .map_or(false, |locations| locations.contains(memory_location)),
            _ => false,
        })
    }
}

enum CalleeStep<S: AbstractState + ProgramLocationDependent> {
    /// The value was returned by the callee.
    Successor(MemoryLocationState<S>),
    /// The callee did not produce the value.
    NotInfluenced,
    /// The callee's results are not in the cache.
    Unavailable,
}

fn unsupported(memory_location: &MemoryLocation) -> AnalysisError {
    AnalysisError::UnsupportedMemoryLocation {
        location: format!("{:?}", memory_location),
    }
}

fn popped_locations(pop_count: usize) -> Vec<MemoryLocation> {
    (0..pop_count).map(MemoryLocation::Stack).collect()
}

/// Maps a location to its location before the instruction, assuming the instruction combines
/// all the values it pops into every value it pushes.
fn shift_stack_location(
    memory_location: &MemoryLocation,
    instruction: &Instruction,
) -> Vec<MemoryLocation> {
    match memory_location {
        MemoryLocation::Stack(index) if *index >= instruction.push_count => vec![
            MemoryLocation::Stack(index - instruction.push_count + instruction.pop_count),
        ],
        MemoryLocation::Stack(..) => popped_locations(instruction.pop_count),
        _ => vec![memory_location.clone()],
    }
}

/// The stack slot before a stack manipulation instruction that the pushed slot at index
/// holds a copy of.
fn stack_manipulation_source(kind: &InstructionKind, index: usize) -> usize {
    match kind {
        InstructionKind::Dup => 0,
        InstructionKind::DupX1 if index == 2 => 0,
        InstructionKind::DupX2 if index == 3 => 0,
        InstructionKind::Dup2 if index > 1 => index - 2,
        InstructionKind::Dup2X1 if index > 2 => index - 3,
        InstructionKind::Dup2X2 if index > 3 => index - 4,
        InstructionKind::Swap => 1 - index,
        _ => index,
    }
}

impl<'cache, S, P, V> TransferRelation<MemoryLocationState<S>, P>
    for MemoryLocationTransferRelation<'cache, S, P, V>
where
    S: AbstractState + ProgramLocationDependent + MemoryLocationValues<V> + 'static,
    P: Precision,
    V: AbstractState,
{
    /// Takes a backward step and records the sources it found in the witness graph.
    fn generate_abstract_successors(
        &mut self,
        state: &MemoryLocationState<S>,
        precision: &P,
    ) -> std::result::Result<Vec<MemoryLocationState<S>>, AnalysisError> {
        let backtrace = self.backtrace(state, precision)?;
        self.witness.add_sources(state.location(), &backtrace.sources);
        Ok(backtrace.successors)
    }
}
