// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

// Block abstraction memoization: interprocedural analysis by running the fixpoint algorithm once
// per procedure and reduced entry state, and expanding the cached exit states at every call site
// that reduces to the same entry state.

use crate::abstract_state::{AbstractState, Precision, ProgramLocationDependent};
use crate::bam_cache::{BamCache, BlockAbstraction};
use crate::bam_operators::{ExpandOperator, ReduceOperator};
use crate::cfa::{Call, Cfa, MethodSignature, NodeId};
use crate::cpa_algorithm::{run_fixpoint, ForwardEdgeTransferRelation, TransferRelation};
use crate::errors::AnalysisError;
use crate::operators::{AbortOperator, CpaOperators, NeverAbortOperator};
use crate::options::Options;
use crate::reached_set::{ProgramLocationDependentReachedSet, ReachedSet};
use crate::waitlist::WaitlistPolicy;

use log_derive::*;
use mirai_annotations::*;
use petgraph::visit::EdgeRef;
use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;

/// Counters describing how calls were handled.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BamStatistics {
    /// Procedure analyses run because no block abstraction was cached for their entry state.
    pub nested_analyses: usize,
    /// Calls resolved with a cached block abstraction.
    pub cache_hits: usize,
    /// Calls treated intraprocedurally because of recursion, the call stack depth limit,
    /// an unknown target or an aborted nested analysis.
    pub intraprocedural_fallbacks: usize,
}

/// The BAM transfer relation. Instruction and exception edges are handled by the wrapped edge
/// relation; invocations of procedures with code are handled by analyzing the callee.
pub struct BamCpa<S: AbstractState + ProgramLocationDependent, P: Precision, R> {
    cfa: Rc<Cfa>,
    edge_relation: R,
    operators: CpaOperators<S, P>,
    reduce_operator: Rc<dyn ReduceOperator<S>>,
    expand_operator: Rc<dyn ExpandOperator<S>>,
    cache: BamCache<S, P>,
    /// The procedures whose analyses are in progress, outermost first.
    call_stack: Vec<Rc<MethodSignature>>,
    max_call_stack_depth: Option<usize>,
    waitlist_policy: WaitlistPolicy,
    abort_operator: Rc<dyn AbortOperator>,
    statistics: BamStatistics,
    log_statistics: bool,
}

impl<S: AbstractState + ProgramLocationDependent, P: Precision, R> Debug for BamCpa<S, P, R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        "BamCpa".fmt(f)
    }
}

impl<S, P, R> BamCpa<S, P, R>
where
    S: AbstractState + ProgramLocationDependent + 'static,
    P: Precision,
    R: ForwardEdgeTransferRelation<S, P>,
{
    pub fn new(
        cfa: Rc<Cfa>,
        edge_relation: R,
        operators: CpaOperators<S, P>,
        reduce_operator: Rc<dyn ReduceOperator<S>>,
        expand_operator: Rc<dyn ExpandOperator<S>>,
        options: &Options,
    ) -> BamCpa<S, P, R> {
        BamCpa {
            cfa,
            edge_relation,
            operators,
            reduce_operator,
            expand_operator,
            cache: BamCache::new(),
            call_stack: Vec::new(),
            max_call_stack_depth: options.max_call_stack_depth,
            waitlist_policy: options.waitlist_policy,
            abort_operator: Rc::new(NeverAbortOperator),
            statistics: BamStatistics::default(),
            log_statistics: options.statistics,
        }
    }

    #[must_use]
    pub fn with_abort_operator(mut self, abort_operator: Rc<dyn AbortOperator>) -> Self {
        self.abort_operator = abort_operator;
        self
    }

    pub fn cfa(&self) -> &Rc<Cfa> {
        &self.cfa
    }

    pub fn cache(&self) -> &BamCache<S, P> {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut BamCache<S, P> {
        &mut self.cache
    }

    pub fn reduce_operator(&self) -> &Rc<dyn ReduceOperator<S>> {
        &self.reduce_operator
    }

    pub fn expand_operator(&self) -> &Rc<dyn ExpandOperator<S>> {
        &self.expand_operator
    }

    pub fn statistics(&self) -> BamStatistics {
        self.statistics
    }

    /// Analyzes a procedure from the given state, which must be at its entry node, analyzing
    /// callees as they are encountered. The result is cached like that of any callee, unless
    /// the analysis was aborted.
    #[logfn_inputs(DEBUG)]
    pub fn analyze(
        &mut self,
        signature: &Rc<MethodSignature>,
        initial_state: S,
        precision: &P,
    ) -> std::result::Result<Rc<BlockAbstraction<S>>, AnalysisError> {
        let entry = self.cfa.function_entry_node(signature).ok_or_else(|| {
            AnalysisError::MissingProcedure {
                signature: signature.fqn(),
            }
        })?;
        if initial_state.program_location() != entry {
            return Err(AnalysisError::malformed_state(format!(
                "the initial state of {} is at {:?}, not at its entry {:?}",
                signature.fqn(),
                initial_state.program_location(),
                entry
            )));
        }
        let (block, aborted) = self.run_block(signature, initial_state.clone(), precision)?;
        let block = if aborted {
            Rc::new(block)
        } else {
            self.cache
                .put(initial_state, precision.clone(), signature.clone(), block)
        };
        if self.log_statistics {
            info!(
                "{:?}: {} nested analyses, {} cache hits, {} intraprocedural fallbacks, {} cached blocks",
                signature,
                self.statistics.nested_analyses,
                self.statistics.cache_hits,
                self.statistics.intraprocedural_fallbacks,
                self.cache.size()
            );
        }
        Ok(block)
    }

    /// Runs the fixpoint algorithm over the procedure, starting from its entry state.
    /// Returns the resulting block abstraction and whether the run was aborted.
    fn run_block(
        &mut self,
        signature: &Rc<MethodSignature>,
        entry_state: S,
        precision: &P,
    ) -> std::result::Result<(BlockAbstraction<S>, bool), AnalysisError> {
        let mut reached = ProgramLocationDependentReachedSet::new();
        let mut waitlist = self.waitlist_policy.make_waitlist();
        reached.add(entry_state.clone());
        waitlist.add(entry_state);

        let operators = self.operators.clone();
        let abort_operator = self.abort_operator.clone();
        self.call_stack.push(signature.clone());
        let result = run_fixpoint(
            &mut *self,
            &operators,
            precision,
            abort_operator.as_ref(),
            &mut reached,
            waitlist.as_mut(),
        );
        self.call_stack.pop();
        let aborted = result?;

        let exit_states = self
            .cfa
            .function_return_exit_node(signature)
            .map(|exit| reached.get_reached_at(exit).into_iter().cloned().collect())
            .unwrap_or_default();
        Ok((BlockAbstraction::new(reached, exit_states), aborted))
    }

    fn fall_back(&mut self, reason: &str, call: &Call) -> Option<Vec<S>> {
        debug!("analyzing {:?} intraprocedurally: {}", call, reason);
        self.statistics.intraprocedural_fallbacks += 1;
        None
    }

    /// Computes the states after the call from the cached (or freshly computed) block
    /// abstraction of the callee. Returns None if the call has to be treated intraprocedurally.
    #[logfn_inputs(TRACE)]
    fn resolve_call(
        &mut self,
        state: &S,
        call: &Call,
        callee_entry: NodeId,
        precision: &P,
    ) -> std::result::Result<Option<Vec<S>>, AnalysisError> {
        if self.call_stack.contains(&call.target) {
            return Ok(self.fall_back("recursion", call));
        }
        if let Some(max_depth) = self.max_call_stack_depth {
            if self.call_stack.len() >= max_depth {
                return Ok(self.fall_back("maximum call stack depth reached", call));
            }
        }

        let reduced = self.reduce_operator.reduce(state, callee_entry, call)?;
        let block = match self.cache.get(&reduced, precision, &call.target) {
            Some(block) => {
                self.statistics.cache_hits += 1;
                block
            }
            None => {
                let (block, aborted) = self.run_block(&call.target, reduced.clone(), precision)?;
                self.statistics.nested_analyses += 1;
                if aborted {
                    return Ok(self.fall_back("nested analysis aborted", call));
                }
                self.cache
                    .put(reduced, precision.clone(), call.target.clone(), block)
            }
        };

        let mut successors = Vec::with_capacity(block.exit_states().len());
        for exit_state in block.exit_states() {
            successors.push(
                self.expand_operator
                    .expand(state, exit_state, callee_entry, call)?,
            );
        }
        Ok(Some(successors))
    }
}

impl<S, P, R> TransferRelation<S, P> for BamCpa<S, P, R>
where
    S: AbstractState + ProgramLocationDependent + 'static,
    P: Precision,
    R: ForwardEdgeTransferRelation<S, P>,
{
    fn generate_abstract_successors(
        &mut self,
        state: &S,
        precision: &P,
    ) -> std::result::Result<Vec<S>, AnalysisError> {
        let cfa = self.cfa.clone();
        let location = state.program_location();
        let mut successors = Vec::new();
        for edge in cfa.leaving_intraprocedural_edges(location) {
            let mut follow_intraprocedural_edge = true;
            let mut call_successors = Vec::new();
            if edge.weight().instruction().map_or(false, |i| i.is_invoke()) {
                let call_edges = cfa.known_method_call_edges(location);
                follow_intraprocedural_edge =
                    call_edges.is_empty() || cfa.calls_unknown_method(location);
                if follow_intraprocedural_edge {
                    self.statistics.intraprocedural_fallbacks += 1;
                }
                for call_edge in call_edges {
                    let call = match call_edge.weight().call() {
                        Some(call) => call,
                        None => assume_unreachable!("known call edges carry calls"),
                    };
                    match self.resolve_call(state, call, call_edge.target(), precision)? {
                        Some(states) => call_successors.extend(states),
                        None => follow_intraprocedural_edge = true,
                    }
                }
            }
            if follow_intraprocedural_edge {
                call_successors.extend(
                    self.edge_relation
                        .generate_edge_successors(state, edge, precision)?,
                );
            }
            for mut successor in call_successors {
                successor.set_program_location(edge.target());
                successors.push(successor);
            }
        }
        Ok(successors)
    }
}
