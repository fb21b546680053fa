// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

// Bounds on how deep procedure analyses nest and how long explanations of a value get.

/// The default bound on the number of nested procedure analyses the BAM layer keeps on its
/// call stack. None means that nesting is only limited by recursion detection.
pub const MAX_CALL_STACK_DEPTH_DEFAULT: Option<usize> = None;

/// Linear traces extracted from a witness graph are cut off at this many locations,
/// since a cyclic witness graph otherwise unrolls forever.
pub const MAX_TRACE_LENGTH: usize = 1_000;
