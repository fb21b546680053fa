// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{LatticeAbstractState, Precision};
use crate::cfa::{CfaEdge, MethodSignature};
use crate::cpa_algorithm::ForwardEdgeTransferRelation;
use crate::errors::AnalysisError;
use crate::instruction::{Instruction, InstructionKind};
use crate::jvm_state::{JvmAbstractState, JvmFrame};

use log_derive::*;
use petgraph::graph::EdgeReference;
use petgraph::visit::EdgeRef;
use std::fmt::{Debug, Formatter, Result};

/// Supplies the value semantics of a JVM analysis. The transfer relation moves values between
/// slots; everything that creates a new value is delegated to the interpreter.
pub trait JvmValueInterpreter<V> {
    /// The value pushed by an instruction that combines its operands into a new value.
    /// Operands are given top of stack first.
    fn compute_result(&self, instruction: &Instruction, operands: &[V]) -> V;

    /// The value returned by a call whose target is not analyzed interprocedurally.
    /// Arguments are given top of stack first, so the receiver of an instance call comes last.
    fn invoke(&self, target: &MethodSignature, arguments: &[V]) -> V;

    /// The value on the operand stack on entry to an exception handler.
    fn exception_value(&self) -> V;
}

/// The forward transfer relation of JVM analyses over frames of V values.
pub struct JvmTransferRelation<I> {
    interpreter: I,
}

impl<I> Debug for JvmTransferRelation<I> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        "JvmTransferRelation".fmt(f)
    }
}

impl<I> JvmTransferRelation<I> {
    pub fn new(interpreter: I) -> JvmTransferRelation<I> {
        JvmTransferRelation { interpreter }
    }

    pub fn interpreter(&self) -> &I {
        &self.interpreter
    }
}

impl<I> JvmTransferRelation<I> {
    /// Applies the effect of the instruction to a copy of the state.
    #[logfn_inputs(TRACE)]
    pub fn execute<V>(
        &self,
        state: &JvmAbstractState<V>,
        instruction: &Instruction,
    ) -> std::result::Result<JvmAbstractState<V>, AnalysisError>
    where
        V: LatticeAbstractState + Default,
        I: JvmValueInterpreter<V>,
    {
        let mut result = state.clone();
        let frame = result.frame_mut();
        match &instruction.kind {
            InstructionKind::Dup => {
                let v1 = frame.pop()?;
                push_all(frame, &[&v1, &v1]);
            }
            InstructionKind::DupX1 => {
                let (v1, v2) = (frame.pop()?, frame.pop()?);
                push_all(frame, &[&v1, &v2, &v1]);
            }
            InstructionKind::DupX2 => {
                let (v1, v2, v3) = (frame.pop()?, frame.pop()?, frame.pop()?);
                push_all(frame, &[&v1, &v3, &v2, &v1]);
            }
            InstructionKind::Dup2 => {
                let (v1, v2) = (frame.pop()?, frame.pop()?);
                push_all(frame, &[&v2, &v1, &v2, &v1]);
            }
            InstructionKind::Dup2X1 => {
                let (v1, v2, v3) = (frame.pop()?, frame.pop()?, frame.pop()?);
                push_all(frame, &[&v2, &v1, &v3, &v2, &v1]);
            }
            InstructionKind::Dup2X2 => {
                let (v1, v2) = (frame.pop()?, frame.pop()?);
                let (v3, v4) = (frame.pop()?, frame.pop()?);
                push_all(frame, &[&v2, &v1, &v4, &v3, &v2, &v1]);
            }
            InstructionKind::Swap => {
                let (v1, v2) = (frame.pop()?, frame.pop()?);
                push_all(frame, &[&v1, &v2]);
            }
            // The returned value stays on the stack, where expand operators pick it up.
            InstructionKind::Return => {}
            InstructionKind::Load { variable } => {
                for slot in (0..instruction.push_count).rev() {
                    let value = frame.local(variable + slot).cloned().ok_or_else(|| {
                        AnalysisError::malformed_state(format!(
                            "load from unset local variable {}",
                            variable + slot
                        ))
                    })?;
                    frame.push(value);
                }
            }
            InstructionKind::Store { variable } => {
                let values = frame.pop_n(instruction.pop_count)?;
                for (slot, value) in values.into_iter().enumerate() {
                    frame.set_local(variable + slot, value);
                }
            }
            InstructionKind::Increment { variable } => {
                let value = frame.local(*variable).cloned().ok_or_else(|| {
                    AnalysisError::malformed_state(format!(
                        "increment of unset local variable {}",
                        variable
                    ))
                })?;
                let incremented = self.interpreter.compute_result(instruction, &[value]);
                frame.set_local(*variable, incremented);
            }
            InstructionKind::GetStatic { field } => {
                let value = state.static_field(field).cloned().unwrap_or_default();
                frame.push_n(value, instruction.push_count);
            }
            InstructionKind::PutStatic { field } => {
                let values = frame.pop_n(instruction.pop_count)?;
                if let Some(value) = values.into_iter().next() {
                    result.set_static_field(field.clone(), value);
                }
            }
            InstructionKind::Invoke { target, .. } => {
                let arguments = frame.pop_n(instruction.pop_count)?;
                let value = self.interpreter.invoke(target, &arguments);
                frame.push_n(value, instruction.push_count);
            }
            InstructionKind::ArrayLoad
            | InstructionKind::ArrayStore
            | InstructionKind::Simple
            | InstructionKind::GetField { .. }
            | InstructionKind::PutField { .. }
            | InstructionKind::New
            | InstructionKind::Branch
            | InstructionKind::Switch => {
                let operands = frame.pop_n(instruction.pop_count)?;
                if instruction.push_count > 0 {
                    let value = self.interpreter.compute_result(instruction, &operands);
                    frame.push_n(value, instruction.push_count);
                }
            }
        }
        Ok(result)
    }

    /// The state on entry to an exception handler: the stack holds only the exception.
    #[logfn_inputs(TRACE)]
    pub fn catch_exception<V>(&self, state: &JvmAbstractState<V>) -> JvmAbstractState<V>
    where
        V: LatticeAbstractState + Default,
        I: JvmValueInterpreter<V>,
    {
        let mut result = state.clone();
        let frame = result.frame_mut();
        frame.clear_stack();
        frame.push(self.interpreter.exception_value());
        result
    }
}

fn push_all<V: Clone + Default>(frame: &mut JvmFrame<V>, values: &[&V]) {
    for value in values {
        frame.push((*value).clone());
    }
}

impl<V, P, I> ForwardEdgeTransferRelation<JvmAbstractState<V>, P> for JvmTransferRelation<I>
where
    V: LatticeAbstractState + Default,
    P: Precision,
    I: JvmValueInterpreter<V>,
{
    fn generate_edge_successors(
        &mut self,
        state: &JvmAbstractState<V>,
        edge: EdgeReference<'_, CfaEdge>,
        _precision: &P,
    ) -> std::result::Result<Vec<JvmAbstractState<V>>, AnalysisError> {
        match edge.weight() {
            CfaEdge::Instruction(instruction) => Ok(vec![self.execute(state, instruction)?]),
            CfaEdge::AssumeException => Ok(vec![self.catch_exception(state)]),
            CfaEdge::Call(..) => {
                debug!("ignoring interprocedural edge {:?}", edge.id());
                Ok(vec![])
            }
        }
    }
}
