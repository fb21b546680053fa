// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{AbstractState, LatticeAbstractState};
use crate::cfa::{Call, NodeId};
use crate::errors::AnalysisError;
use crate::jvm_state::{JvmAbstractState, JvmFrame};

use log_derive::*;
use mirai_annotations::*;

/// Turns the state of a caller at a call site into the entry state of the callee, dropping
/// whatever the callee cannot observe. The result is the key under which the callee's
/// analysis is cached, so the less it retains, the more often summaries are reused.
pub trait ReduceOperator<S: AbstractState> {
    /// Reduces the caller state and then applies `on_method_entry`.
    fn reduce(
        &self,
        state: &S,
        block_entry: NodeId,
        call: &Call,
    ) -> Result<S, AnalysisError> {
        let reduced = self.reduce_impl(state, block_entry, call)?;
        Ok(self.on_method_entry(reduced, call.target.is_static))
    }

    fn reduce_impl(&self, state: &S, block_entry: NodeId, call: &Call)
        -> Result<S, AnalysisError>;

    /// Adjusts the entry state of a method, for example to mark its parameters.
    fn on_method_entry(&self, state: S, _is_static: bool) -> S {
        state
    }
}

/// Reconstructs the state of a caller after a call from its state before the call and the
/// state of the callee at its exit.
pub trait ExpandOperator<S: AbstractState> {
    fn expand(
        &self,
        caller_state: &S,
        exit_state: &S,
        block_entry: NodeId,
        call: &Call,
    ) -> Result<S, AnalysisError>;
}

/// Passes the arguments on the caller's operand stack to the callee as its leading local
/// variables, with the receiver of instance methods in local 0. Static fields are passed on
/// unchanged and the callee starts with an empty operand stack.
#[derive(Clone, Copy, Debug, Default)]
pub struct JvmDefaultReduceOperator;

impl<V: LatticeAbstractState + Default> ReduceOperator<JvmAbstractState<V>>
    for JvmDefaultReduceOperator
{
    #[logfn_inputs(TRACE)]
    fn reduce_impl(
        &self,
        state: &JvmAbstractState<V>,
        block_entry: NodeId,
        call: &Call,
    ) -> Result<JvmAbstractState<V>, AnalysisError> {
        let target = &call.target;
        let parameter_size = target.parameter_size();
        if state.frame().stack_size() < parameter_size {
            return Err(AnalysisError::malformed_state(format!(
                "call to {:?} needs {} argument slots, the operand stack has {}",
                target,
                parameter_size,
                state.frame().stack_size()
            )));
        }
        let mut locals = Vec::with_capacity(parameter_size);
        for local in 0..parameter_size {
            let value = target
                .caller_stack_index(local)
                .and_then(|index| state.frame().peek(index))
                .cloned();
            checked_assume!(value.is_some());
            locals.push(value.unwrap_or_default());
        }
        let mut reduced = JvmAbstractState::new(block_entry, JvmFrame::new(locals));
        reduced.set_static_fields(state.static_fields().clone());
        Ok(reduced)
    }
}

/// Pops the arguments from the caller's operand stack, pushes the value returned by the callee
/// and takes over the static fields of the callee's exit state.
#[derive(Clone, Copy, Debug, Default)]
pub struct JvmDefaultExpandOperator;

impl<V: LatticeAbstractState + Default> ExpandOperator<JvmAbstractState<V>>
    for JvmDefaultExpandOperator
{
    #[logfn_inputs(TRACE)]
    fn expand(
        &self,
        caller_state: &JvmAbstractState<V>,
        exit_state: &JvmAbstractState<V>,
        _block_entry: NodeId,
        call: &Call,
    ) -> Result<JvmAbstractState<V>, AnalysisError> {
        let mut expanded = caller_state.clone();
        let return_size = call.target.descriptor.return_size();
        let returned = exit_state.frame().clone().pop_n(return_size)?;
        let frame = expanded.frame_mut();
        frame.pop_n(call.target.parameter_size())?;
        for value in returned.into_iter().rev() {
            frame.push(value);
        }
        expanded.set_static_fields(exit_state.static_fields().clone());
        Ok(expanded)
    }
}
