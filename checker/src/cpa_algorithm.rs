// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{AbstractState, Precision, ProgramLocationDependent};
use crate::cfa::{Cfa, CfaEdge};
use crate::errors::AnalysisError;
use crate::operators::{AbortOperator, CpaOperators};
use crate::reached_set::ReachedSet;
use crate::waitlist::Waitlist;

use log_derive::*;
use petgraph::graph::EdgeReference;
use petgraph::visit::EdgeRef;
use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;

/// Computes the abstract successors of a state.
pub trait TransferRelation<S: AbstractState, P: Precision> {
    fn generate_abstract_successors(
        &mut self,
        state: &S,
        precision: &P,
    ) -> std::result::Result<Vec<S>, AnalysisError>;
}

/// Computes the abstract successors of a state along a single control flow automaton edge.
/// The program location of the successors is set by the caller.
pub trait ForwardEdgeTransferRelation<S: AbstractState, P: Precision> {
    fn generate_edge_successors(
        &mut self,
        state: &S,
        edge: EdgeReference<'_, CfaEdge>,
        precision: &P,
    ) -> std::result::Result<Vec<S>, AnalysisError>;
}

impl<S: AbstractState, P: Precision, R: ForwardEdgeTransferRelation<S, P> + ?Sized>
    ForwardEdgeTransferRelation<S, P> for Box<R>
{
    fn generate_edge_successors(
        &mut self,
        state: &S,
        edge: EdgeReference<'_, CfaEdge>,
        precision: &P,
    ) -> std::result::Result<Vec<S>, AnalysisError> {
        (**self).generate_edge_successors(state, edge, precision)
    }
}

/// Turns an edge transfer relation into a transfer relation by following every intraprocedural
/// edge that leaves the program location of a state.
pub struct ProgramLocationDependentForwardTransferRelation<R> {
    cfa: Rc<Cfa>,
    edge_relation: R,
}

impl<R> Debug for ProgramLocationDependentForwardTransferRelation<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        "ProgramLocationDependentForwardTransferRelation".fmt(f)
    }
}

impl<R> ProgramLocationDependentForwardTransferRelation<R> {
    pub fn new(cfa: Rc<Cfa>, edge_relation: R) -> Self {
        ProgramLocationDependentForwardTransferRelation { cfa, edge_relation }
    }

    pub fn edge_relation(&mut self) -> &mut R {
        &mut self.edge_relation
    }
}

impl<S, P, R> TransferRelation<S, P> for ProgramLocationDependentForwardTransferRelation<R>
where
    S: AbstractState + ProgramLocationDependent,
    P: Precision,
    R: ForwardEdgeTransferRelation<S, P>,
{
    fn generate_abstract_successors(
        &mut self,
        state: &S,
        precision: &P,
    ) -> std::result::Result<Vec<S>, AnalysisError> {
        let mut successors = Vec::new();
        for edge in self
            .cfa
            .leaving_intraprocedural_edges(state.program_location())
        {
            for mut successor in self
                .edge_relation
                .generate_edge_successors(state, edge, precision)?
            {
                successor.set_program_location(edge.target());
                successors.push(successor);
            }
        }
        Ok(successors)
    }
}

/// A configurable program analysis: a transfer relation together with the policies that decide
/// how its results are merged and when exploration stops.
pub struct Cpa<S: AbstractState, P: Precision, T: TransferRelation<S, P>> {
    pub transfer_relation: T,
    pub operators: CpaOperators<S, P>,
}

impl<S: AbstractState, P: Precision, T: TransferRelation<S, P>> Debug for Cpa<S, P, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        "Cpa".fmt(f)
    }
}

impl<S: AbstractState, P: Precision, T: TransferRelation<S, P>> Cpa<S, P, T> {
    pub fn new(transfer_relation: T, operators: CpaOperators<S, P>) -> Cpa<S, P, T> {
        Cpa {
            transfer_relation,
            operators,
        }
    }
}

/// The generic fixpoint algorithm.
pub struct CpaAlgorithm<S: AbstractState, P: Precision, T: TransferRelation<S, P>> {
    cpa: Cpa<S, P, T>,
    precision: P,
    abort_operator: Rc<dyn AbortOperator>,
}

impl<S: AbstractState, P: Precision, T: TransferRelation<S, P>> Debug for CpaAlgorithm<S, P, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        "CpaAlgorithm".fmt(f)
    }
}

impl<S: AbstractState, P: Precision, T: TransferRelation<S, P>> CpaAlgorithm<S, P, T> {
    pub fn new(
        cpa: Cpa<S, P, T>,
        precision: P,
        abort_operator: Rc<dyn AbortOperator>,
    ) -> CpaAlgorithm<S, P, T> {
        CpaAlgorithm {
            cpa,
            precision,
            abort_operator,
        }
    }

    pub fn cpa(&self) -> &Cpa<S, P, T> {
        &self.cpa
    }

    pub fn transfer_relation(&mut self) -> &mut T {
        &mut self.cpa.transfer_relation
    }

    /// Explores the states in the waitlist until it is empty or the abort operator fires.
    /// The reached set is updated in place and may already contain states, which then suppress
    /// the exploration of the states they cover.
    pub fn run(
        &mut self,
        reached: &mut dyn ReachedSet<S>,
        waitlist: &mut dyn Waitlist<S>,
    ) -> std::result::Result<(), AnalysisError> {
        run_fixpoint(
            &mut self.cpa.transfer_relation,
            &self.cpa.operators,
            &self.precision,
            self.abort_operator.as_ref(),
            reached,
            waitlist,
        )?;
        Ok(())
    }
}

/// The fixpoint loop behind `CpaAlgorithm::run`, callable with a transfer relation that is
/// borrowed rather than owned. Returns true if the abort operator stopped the loop.
#[logfn(TRACE)]
pub fn run_fixpoint<S: AbstractState, P: Precision>(
    transfer_relation: &mut dyn TransferRelation<S, P>,
    operators: &CpaOperators<S, P>,
    precision: &P,
    abort_operator: &dyn AbortOperator,
    reached: &mut dyn ReachedSet<S>,
    waitlist: &mut dyn Waitlist<S>,
) -> std::result::Result<bool, AnalysisError> {
    loop {
        if abort_operator.abort() {
            debug!(
                "analysis aborted with {} pending states and {} reached states",
                waitlist.len(),
                reached.len()
            );
            return Ok(true);
        }
        let state = match waitlist.pop() {
            Some(state) => state,
            None => return Ok(false),
        };
        trace!("exploring {:?}", state);

        let (state, precision) = {
            let comparable = reached.get_reached(&state);
            operators
                .precision_adjustment
                .prec(state, precision, &comparable)
        };

        for successor in transfer_relation.generate_abstract_successors(&state, &precision)? {
            let mut replaced = Vec::new();
            let mut merged_states = Vec::new();
            for reached_state in reached.get_reached(&successor) {
                let merged = operators.merge.merge(&successor, reached_state, &precision);
                if merged != *reached_state {
                    replaced.push(reached_state.clone());
                    merged_states.push(merged);
                }
            }
            // Merged states take the place of the states they were merged with, whether or not
            // those were still pending.
            reached.remove_all(&replaced);
            waitlist.remove_all(&replaced);
            for merged in merged_states {
                reached.add(merged.clone());
                waitlist.add(merged);
            }

            let covered = {
                let comparable = reached.get_reached(&successor);
                operators.stop.stop(&successor, &comparable, &precision)
            };
            if !covered {
                trace!("admitting {:?}", successor);
                reached.add(successor.clone());
                waitlist.add(successor);
            }
        }
    }
}
