// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use crate::abstract_state::{AbstractState, Precision, ProgramLocationDependent};
use crate::cfa::MethodSignature;
use crate::reached_set::ProgramLocationDependentReachedSet;

use indexmap::IndexMap;
use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;

/// The result of analyzing one procedure from one reduced entry state.
pub struct BlockAbstraction<S: AbstractState + ProgramLocationDependent> {
    reached_set: Rc<ProgramLocationDependentReachedSet<S>>,
    exit_states: Vec<S>,
}

impl<S: AbstractState + ProgramLocationDependent> Debug for BlockAbstraction<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_struct("BlockAbstraction")
            .field("exit_states", &self.exit_states)
            .finish()
    }
}

impl<S: AbstractState + ProgramLocationDependent> BlockAbstraction<S> {
    pub fn new(
        reached_set: ProgramLocationDependentReachedSet<S>,
        exit_states: Vec<S>,
    ) -> BlockAbstraction<S> {
        BlockAbstraction {
            reached_set: Rc::new(reached_set),
            exit_states,
        }
    }

    pub fn reached_set(&self) -> &Rc<ProgramLocationDependentReachedSet<S>> {
        &self.reached_set
    }

    /// The reached states at the return exit node of the procedure.
    pub fn exit_states(&self) -> &[S] {
        &self.exit_states
    }
}

/// Per procedure, the block abstractions computed so far, keyed by reduced entry state and
/// precision. Lives for one top-level analysis unless its owner keeps it around on purpose.
pub struct BamCache<S: AbstractState + ProgramLocationDependent, P: Precision> {
    entries: IndexMap<Rc<MethodSignature>, IndexMap<(S, P), Rc<BlockAbstraction<S>>>>,
}

impl<S: AbstractState + ProgramLocationDependent, P: Precision> Debug for BamCache<S, P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_map()
            .entries(self.entries.iter().map(|(s, e)| (s, e.len())))
            .finish()
    }
}

impl<S: AbstractState + ProgramLocationDependent, P: Precision> Default for BamCache<S, P> {
    fn default() -> Self {
        BamCache {
            entries: IndexMap::new(),
        }
    }
}

impl<S: AbstractState + ProgramLocationDependent, P: Precision> BamCache<S, P> {
    pub fn new() -> BamCache<S, P> {
        Self::default()
    }

    pub fn get(
        &self,
        state: &S,
        precision: &P,
        signature: &MethodSignature,
    ) -> Option<Rc<BlockAbstraction<S>>> {
        self.entries
            .get(signature)
            .and_then(|blocks| blocks.get(&(state.clone(), precision.clone())))
            .cloned()
    }

    /// Every block abstraction of the procedure, in the order they were added.
    pub fn get_by_signature(&self, signature: &MethodSignature) -> Vec<Rc<BlockAbstraction<S>>> {
        self.entries
            .get(signature)
            .map(|blocks| blocks.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Adds a block abstraction unless one is already cached for the same key, and returns
    /// the one that is cached afterwards.
    pub fn put(
        &mut self,
        state: S,
        precision: P,
        signature: Rc<MethodSignature>,
        block: BlockAbstraction<S>,
    ) -> Rc<BlockAbstraction<S>> {
        let blocks = self.entries.entry(signature).or_default();
        match blocks.get(&(state.clone(), precision.clone())) {
            Some(existing) => {
                debug!("block abstraction for {:?} is already cached", state);
                existing.clone()
            }
            None => {
                let block = Rc::new(block);
                blocks.insert((state, precision), block.clone());
                block
            }
        }
    }

    /// The number of block abstractions over all procedures.
    pub fn size(&self) -> usize {
        self.entries.values().map(|blocks| blocks.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The procedures that have at least one block abstraction.
    pub fn signatures(&self) -> impl Iterator<Item = &Rc<MethodSignature>> {
        self.entries
            .iter()
            .filter(|(_, blocks)| !blocks.is_empty())
            .map(|(signature, _)| signature)
    }

    /// All cached entries as (procedure, reduced entry state, precision, block abstraction).
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&Rc<MethodSignature>, &S, &P, &Rc<BlockAbstraction<S>>)> {
        self.entries.iter().flat_map(|(signature, blocks)| {
            blocks
                .iter()
                .map(move |((state, precision), block)| (signature, state, precision, block))
        })
    }
}
