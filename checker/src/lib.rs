// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.
//
// A configurable program analysis (CPA) engine for JVM bytecode control flow automata.
// The generic fixpoint algorithm lives in cpa_algorithm and is parameterised by the operator
// policies in operators, waitlist and reached_set. The bam module makes it interprocedural by
// caching one analysis per procedure and reduced entry state, and memory_location_transfer_relation
// walks such a cache backwards to explain where a value came from.

#[macro_use]
extern crate log;

pub mod abstract_state;
pub mod bam;
pub mod bam_cache;
pub mod bam_operators;
pub mod cfa;
pub mod cpa_algorithm;
pub mod errors;
pub mod instruction;
pub mod jvm_state;
pub mod jvm_transfer_relation;
pub mod k_limits;
pub mod memory_location;
pub mod memory_location_transfer_relation;
pub mod operators;
pub mod options;
pub mod reached_set;
pub mod set_domain;
pub mod trace;
pub mod waitlist;
