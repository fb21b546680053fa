// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{
    AbstractState, MemoryLocationValues, Precision, ProgramLocationDependent,
};
use crate::cfa::NodeId;
use crate::cpa_algorithm::run_fixpoint;
use crate::errors::AnalysisError;
use crate::k_limits;
use crate::memory_location::{
    CallStack, LocationDependentMemoryLocation, MemoryLocation, MemoryLocationState,
};
use crate::memory_location_transfer_relation::MemoryLocationTransferRelation;
use crate::operators::{
    AbortOperator, CpaOperators, MergeSepOperator, NeverAbortOperator, StopContainedOperator,
};
use crate::reached_set::{DefaultReachedSet, ReachedSet};
use crate::waitlist::{StackWaitlist, Waitlist};

use itertools::Itertools;
use log_derive::*;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::{Direction, Graph};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;

/// Records, for each traced location, the locations its value may have come from.
/// Edges point from a location to its sources.
#[derive(Default)]
pub struct WitnessGraph {
    graph: Graph<LocationDependentMemoryLocation, ()>,
    nodes: HashMap<LocationDependentMemoryLocation, NodeIndex>,
}

impl Debug for WitnessGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_map()
            .entries(
                self.graph
                    .node_indices()
                    .map(|n| (&self.graph[n], self.sources_of_node(n))),
            )
            .finish()
    }
}

impl WitnessGraph {
    pub fn new() -> WitnessGraph {
        Self::default()
    }

    fn node(&mut self, location: &LocationDependentMemoryLocation) -> NodeIndex {
        if let Some(node) = self.nodes.get(location) {
            return *node;
        }
        let node = self.graph.add_node(location.clone());
        self.nodes.insert(location.clone(), node);
        node
    }

    /// Records that the value at location may come from each of the sources.
    pub fn add_sources(
        &mut self,
        location: &LocationDependentMemoryLocation,
        sources: &[LocationDependentMemoryLocation],
    ) {
        let node = self.node(location);
        for source in sources {
            let source_node = self.node(source);
            self.graph.update_edge(node, source_node, ());
        }
    }

    pub fn contains(&self, location: &LocationDependentMemoryLocation) -> bool {
        self.nodes.contains_key(location)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    fn sources_of_node(&self, node: NodeIndex) -> Vec<&LocationDependentMemoryLocation> {
        self.graph
            .edges_directed(node, Direction::Outgoing)
            .sorted_by_key(|e| e.id())
            .map(|e| &self.graph[e.target()])
            .collect()
    }

    /// The recorded sources of the location, in the order they were first recorded.
    pub fn sources(
        &self,
        location: &LocationDependentMemoryLocation,
    ) -> Vec<&LocationDependentMemoryLocation> {
        self.nodes
            .get(location)
            .map(|node| self.sources_of_node(*node))
            .unwrap_or_default()
    }

    /// Unfolds the graph into the paths from root to each location without sources.
    /// A path stops early where it would revisit one of its own locations, and is cut off at
    /// `k_limits::MAX_TRACE_LENGTH` locations.
    #[logfn_inputs(TRACE)]
    pub fn extract_linear_traces(
        &self,
        root: &LocationDependentMemoryLocation,
    ) -> Vec<Vec<LocationDependentMemoryLocation>> {
        let root = match self.nodes.get(root) {
            Some(root) => *root,
            None => return vec![],
        };
        let mut traces = Vec::new();
        let mut pending = vec![vec![root]];
        while let Some(path) = pending.pop() {
            let last = match path.last() {
                Some(last) => *last,
                None => continue,
            };
            let next: Vec<NodeIndex> = if path.len() >= k_limits::MAX_TRACE_LENGTH {
                debug!("trace cut off at {} locations", path.len());
                vec![]
            } else {
                self.graph
                    .edges_directed(last, Direction::Outgoing)
                    .sorted_by_key(|e| e.id())
                    .map(|e| e.target())
                    .filter(|n| !path.contains(n))
                    .collect()
            };
            if next.is_empty() {
                traces.push(path.iter().map(|n| self.graph[*n].clone()).collect());
                continue;
            }
            // Reversed, so that traces come out in the order the sources were recorded.
            for n in next.into_iter().rev() {
                let mut extended = path.clone();
                extended.push(n);
                pending.push(extended);
            }
        }
        traces
    }
}

/// The result of a backward trace.
pub struct BackwardTrace<S: AbstractState + ProgramLocationDependent> {
    /// The locations the trace started from.
    pub roots: Vec<LocationDependentMemoryLocation>,
    pub reached: DefaultReachedSet<MemoryLocationState<S>>,
    pub witness: WitnessGraph,
    pub aborted: bool,
}

impl<S: AbstractState + ProgramLocationDependent> Debug for BackwardTrace<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_struct("BackwardTrace")
            .field("roots", &self.roots)
            .field("witness", &self.witness)
            .field("aborted", &self.aborted)
            .finish()
    }
}

impl<S: AbstractState + ProgramLocationDependent> BackwardTrace<S> {
    /// The linear traces from every root, root first.
    pub fn linear_traces(&self) -> Vec<Vec<LocationDependentMemoryLocation>> {
        self.roots
            .iter()
            .flat_map(|root| self.witness.extract_linear_traces(root))
            .collect()
    }
}

/// Runs the backward memory location analysis over the results of a BAM analysis.
/// States are never merged and are only dropped when an equal state has been reached.
pub struct MemoryLocationCpa<'cache, S, P, V>
where
    S: AbstractState + ProgramLocationDependent,
    P: Precision,
{
    transfer_relation: MemoryLocationTransferRelation<'cache, S, P, V>,
    operators: CpaOperators<MemoryLocationState<S>, P>,
    abort_operator: Rc<dyn AbortOperator>,
}

impl<'cache, S, P, V> Debug for MemoryLocationCpa<'cache, S, P, V>
where
    S: AbstractState + ProgramLocationDependent,
    P: Precision,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        "MemoryLocationCpa".fmt(f)
    }
}

impl<'cache, S, P, V> MemoryLocationCpa<'cache, S, P, V>
where
    S: AbstractState + ProgramLocationDependent + MemoryLocationValues<V> + 'static,
    P: Precision + 'static,
    V: AbstractState,
{
    pub fn new(
        transfer_relation: MemoryLocationTransferRelation<'cache, S, P, V>,
    ) -> MemoryLocationCpa<'cache, S, P, V> {
        MemoryLocationCpa {
            transfer_relation,
            operators: CpaOperators::new(MergeSepOperator, StopContainedOperator),
            abort_operator: Rc::new(NeverAbortOperator),
        }
    }

    #[must_use]
    pub fn with_abort_operator(mut self, abort_operator: Rc<dyn AbortOperator>) -> Self {
        self.abort_operator = abort_operator;
        self
    }

    pub fn transfer_relation(&self) -> &MemoryLocationTransferRelation<'cache, S, P, V> {
        &self.transfer_relation
    }

    /// A state for every cached run of the procedure of node in which the value at the memory
    /// location is above the threshold.
    pub fn initial_states(
        &self,
        memory_location: &MemoryLocation,
        node: NodeId,
    ) -> Vec<MemoryLocationState<S>> {
        let cfa = self.transfer_relation.cfa();
        let signature = match cfa.node(node).signature() {
            Some(signature) => signature,
            None => return vec![],
        };
        let threshold = self.transfer_relation.threshold();
        self.transfer_relation
            .cache()
            .get_by_signature(signature)
            .into_iter()
            .filter(|block| {
                block.reached_set().get_reached_at(node).iter().any(|s| {
                    !memory_location
                        .extract_value_or_default(*s, threshold)
                        .is_less_or_equal(threshold)
                })
            })
            .map(|block| {
                MemoryLocationState::new(
                    memory_location.clone(),
                    node,
                    block.reached_set().clone(),
                    CallStack::new(),
                )
            })
            .collect()
    }

    /// Traces the value at the memory location back through every cached run that reaches
    /// node with a value above the threshold.
    #[logfn_inputs(DEBUG)]
    pub fn trace(
        &mut self,
        memory_location: &MemoryLocation,
        node: NodeId,
        precision: &P,
    ) -> std::result::Result<BackwardTrace<S>, AnalysisError> {
        let initial_states = self.initial_states(memory_location, node);
        let mut reached = DefaultReachedSet::new();
        let mut waitlist = StackWaitlist::new();
        for state in initial_states.iter() {
            reached.add(state.clone());
            waitlist.add(state.clone());
        }
        let roots = initial_states
            .iter()
            .map(|s| s.location().clone())
            .unique()
            .collect();
        let aborted = run_fixpoint(
            &mut self.transfer_relation,
            &self.operators,
            precision,
            self.abort_operator.as_ref(),
            &mut reached,
            &mut waitlist,
        )?;
        Ok(BackwardTrace {
            roots,
            reached,
            witness: self.transfer_relation.take_witness(),
            aborted,
        })
    }
}
