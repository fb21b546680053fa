// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt::{Display, Formatter, Result};
use thiserror::Error;

/// Stable numeric identifiers for the contract violations the analysis can report.
/// The numbers are part of the public interface: tools match on them, so they never change
/// meaning once assigned.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u32)]
pub enum ErrorId {
    /// A memory location kind that the backward transfer relation cannot map to a predecessor.
    MemoryLocationTransferRelationTypeUnsupported = 9_000,
    /// A method descriptor that does not follow the JVM descriptor grammar.
    MalformedMethodDescriptor = 9_001,
    /// An abstract state whose shape does not fit the operation applied to it, for example an
    /// operand stack that is shallower than the number of values an instruction pops.
    MalformedAbstractState = 9_002,
    /// A procedure that has no nodes in the control flow automaton.
    MissingProcedure = 9_003,
}

impl ErrorId {
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl Display for ErrorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "E{:04}", self.code())
    }
}

/// An unrecoverable contract violation. Expected incompleteness (recursion, unknown callees,
/// missing cache entries) is never reported through this type.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum AnalysisError {
    #[error("[{}] unsupported memory location type {location}", ErrorId::MemoryLocationTransferRelationTypeUnsupported)]
    UnsupportedMemoryLocation { location: String },

    #[error("[{}] malformed method descriptor `{descriptor}`: {reason}", ErrorId::MalformedMethodDescriptor)]
    MalformedDescriptor { descriptor: String, reason: String },

    #[error("[{}] malformed abstract state: {reason}", ErrorId::MalformedAbstractState)]
    MalformedState { reason: String },

    #[error("[{}] no control flow automaton for {signature}", ErrorId::MissingProcedure)]
    MissingProcedure { signature: String },
}

impl AnalysisError {
    /// The stable diagnostic identifier of this error.
    pub fn id(&self) -> ErrorId {
        match self {
            AnalysisError::UnsupportedMemoryLocation { .. } => {
                ErrorId::MemoryLocationTransferRelationTypeUnsupported
            }
            AnalysisError::MalformedDescriptor { .. } => ErrorId::MalformedMethodDescriptor,
            AnalysisError::MalformedState { .. } => ErrorId::MalformedAbstractState,
            AnalysisError::MissingProcedure { .. } => ErrorId::MissingProcedure,
        }
    }

    pub fn malformed_state(reason: impl Into<String>) -> AnalysisError {
        AnalysisError::MalformedState {
            reason: reason.into(),
        }
    }
}
