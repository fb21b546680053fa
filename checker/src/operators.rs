// Copyright (c) Facebook, Inc. and its affiliates.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

// The operator policies that parameterise the fixpoint algorithm.

use crate::abstract_state::{AbstractState, LatticeAbstractState, Precision};

use log_derive::*;
use std::fmt::{Debug, Formatter, Result};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Combines a newly computed successor with a state that is already reached.
/// The result replaces the reached state if it differs from it.
pub trait MergeOperator<S: AbstractState, P: Precision> {
    fn merge(&self, new_state: &S, reached_state: &S, precision: &P) -> S;
}

/// Never merges: the reached state is left as it is.
#[derive(Clone, Copy, Debug, Default)]
pub struct MergeSepOperator;

impl<S: AbstractState, P: Precision> MergeOperator<S, P> for MergeSepOperator {
    fn merge(&self, _new_state: &S, reached_state: &S, _precision: &P) -> S {
        reached_state.clone()
    }
}

/// Replaces the reached state with the least upper bound of both states.
/// States that cannot be joined, for example states at different program locations, are
/// merged like `MergeSepOperator` does.
#[derive(Clone, Copy, Debug, Default)]
pub struct MergeJoinOperator;

impl<S: LatticeAbstractState, P: Precision> MergeOperator<S, P> for MergeJoinOperator {
    #[logfn(TRACE)]
    fn merge(&self, new_state: &S, reached_state: &S, _precision: &P) -> S {
        if new_state.is_joinable(reached_state) {
            new_state.join(reached_state)
        } else {
            reached_state.clone()
        }
    }
}

/// Decides whether a (merged) successor is already covered by the reached states it is compared
/// with, in which case it is not explored further.
pub trait StopOperator<S: AbstractState, P: Precision> {
    fn stop(&self, state: &S, reached: &[&S], precision: &P) -> bool;
}

/// Covered if some reached state is greater or equal.
#[derive(Clone, Copy, Debug, Default)]
pub struct StopSepOperator;

impl<S: AbstractState, P: Precision> StopOperator<S, P> for StopSepOperator {
    fn stop(&self, state: &S, reached: &[&S], _precision: &P) -> bool {
        reached.iter().any(|r| state.is_less_or_equal(r))
    }
}

/// Always covered: new states only make it into the reached set through merging.
#[derive(Clone, Copy, Debug, Default)]
pub struct StopAlwaysOperator;

impl<S: AbstractState, P: Precision> StopOperator<S, P> for StopAlwaysOperator {
    fn stop(&self, _state: &S, _reached: &[&S], _precision: &P) -> bool {
        true
    }
}

/// Covered only if an equal state has been reached.
#[derive(Clone, Copy, Debug, Default)]
pub struct StopContainedOperator;

impl<S: AbstractState, P: Precision> StopOperator<S, P> for StopContainedOperator {
    fn stop(&self, state: &S, reached: &[&S], _precision: &P) -> bool {
        reached.iter().any(|r| *r == state)
    }
}

/// Adjusts a state and its precision before its successors are computed.
pub trait PrecisionAdjustment<S: AbstractState, P: Precision> {
    fn prec(&self, state: S, precision: &P, reached: &[&S]) -> (S, P);
}

/// Keeps the state and the precision as they are.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticPrecisionAdjustment;

impl<S: AbstractState, P: Precision> PrecisionAdjustment<S, P> for StaticPrecisionAdjustment {
    fn prec(&self, state: S, precision: &P, _reached: &[&S]) -> (S, P) {
        (state, precision.clone())
    }
}

/// Polled once per iteration of the fixpoint loop. Once it returns true the loop stops and the
/// reached set is left as it is.
pub trait AbortOperator {
    fn abort(&self) -> bool;
}

/// Never aborts.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverAbortOperator;

/// The shared instance. The operator has no state, so one suffices.
pub const NEVER_ABORT: NeverAbortOperator = NeverAbortOperator;

impl AbortOperator for NeverAbortOperator {
    fn abort(&self) -> bool {
        false
    }
}

/// Aborts once some other party has called `set_abort(true)`.
/// The flag is atomic so that it can be flipped from a watchdog thread.
#[derive(Default)]
pub struct ControllableAbortOperator {
    abort: AtomicBool,
}

impl Debug for ControllableAbortOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_struct("ControllableAbortOperator")
            .field("abort", &self.abort.load(Ordering::Relaxed))
            .finish()
    }
}

impl ControllableAbortOperator {
    pub fn new() -> ControllableAbortOperator {
        Self::default()
    }

    pub fn set_abort(&self, abort: bool) {
        self.abort.store(abort, Ordering::SeqCst);
    }
}

impl AbortOperator for ControllableAbortOperator {
    fn abort(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }
}

/// The merge, stop and precision adjustment policies of one analysis.
/// Nested analyses share the policies of the analysis that started them, hence the reference
/// counting.
pub struct CpaOperators<S: AbstractState, P: Precision> {
    pub merge: Rc<dyn MergeOperator<S, P>>,
    pub stop: Rc<dyn StopOperator<S, P>>,
    pub precision_adjustment: Rc<dyn PrecisionAdjustment<S, P>>,
}

impl<S: AbstractState, P: Precision> Clone for CpaOperators<S, P> {
    fn clone(&self) -> Self {
        CpaOperators {
            merge: self.merge.clone(),
            stop: self.stop.clone(),
            precision_adjustment: self.precision_adjustment.clone(),
        }
    }
}

impl<S: AbstractState, P: Precision> Debug for CpaOperators<S, P> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        "CpaOperators".fmt(f)
    }
}

impl<S: AbstractState + 'static, P: Precision + 'static> CpaOperators<S, P> {
    /// Operators with static precision adjustment.
    pub fn new(
        merge: impl MergeOperator<S, P> + 'static,
        stop: impl StopOperator<S, P> + 'static,
    ) -> CpaOperators<S, P> {
        CpaOperators {
            merge: Rc::new(merge),
            stop: Rc::new(stop),
            precision_adjustment: Rc::new(StaticPrecisionAdjustment),
        }
    }

    #[must_use]
    pub fn with_precision_adjustment(
        mut self,
        precision_adjustment: impl PrecisionAdjustment<S, P> + 'static,
    ) -> CpaOperators<S, P> {
        self.precision_adjustment = Rc::new(precision_adjustment);
        self
    }

    /// The configuration for analyses that neither merge nor tolerate duplicates.
    pub fn sep() -> CpaOperators<S, P> {
        Self::new(MergeSepOperator, StopSepOperator)
    }
}

impl<S: LatticeAbstractState + 'static, P: Precision + 'static> CpaOperators<S, P> {
    /// The configuration for analyses that join all states at a location.
    pub fn join() -> CpaOperators<S, P> {
        Self::new(MergeJoinOperator, StopSepOperator)
    }
}
