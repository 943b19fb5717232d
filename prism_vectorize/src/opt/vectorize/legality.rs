//! Reasons a loop is left scalar.
//!
//! Declining to vectorize is never an error: the loop keeps its scalar form.
//! Every decline carries a stable, machine-checkable tag rendered as
//! `rejected: <tag>`.

use std::fmt;

/// Why a loop was not vectorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The pass is switched off.
    Disabled,
    /// Dependence between accesses that no plan or guard can honor.
    UnsafeDependence,
    /// An element or induction type the target or the pass can't handle.
    UnsupportedType,
    /// An array index that isn't affine in the loop's inductions.
    NonAffineAccess,
    /// Lane-varying access whose index doesn't advance by exactly one.
    NonUnitStride,
    /// An operation without a vector form.
    UnsupportedOp,
    /// Not a single-block counted loop with a dedicated preheader.
    ComplexControlFlow,
    /// A loop-carried value that is neither an induction nor a reduction.
    UnsupportedPhi,
    /// Floating point reduction; reassociation would change the result.
    FpReduction,
    /// Statically known trip count too small for one vector iteration.
    TripCountTooSmall,
    /// Loop produced by an earlier vectorization.
    AlreadyVectorized,
    /// Scalar remainder loop of an earlier vectorization.
    CleanupLoop,
    /// Allocation or other effect that can't be replicated per lane.
    SideEffect,
    /// Nothing lane-varying in the loop.
    NothingToVectorize,
    /// An analysis result turned out inconsistent while rewriting.
    InternalInvariant,
}

impl RejectReason {
    /// Stable diagnostic tag.
    pub const fn tag(self) -> &'static str {
        match self {
            RejectReason::Disabled => "disabled",
            RejectReason::UnsafeDependence => "unsafe-dependence",
            RejectReason::UnsupportedType => "unsupported-type",
            RejectReason::NonAffineAccess => "non-affine-access",
            RejectReason::NonUnitStride => "non-unit-stride",
            RejectReason::UnsupportedOp => "unsupported-op",
            RejectReason::ComplexControlFlow => "complex-control-flow",
            RejectReason::UnsupportedPhi => "unsupported-phi",
            RejectReason::FpReduction => "fp-reduction",
            RejectReason::TripCountTooSmall => "trip-count-too-small",
            RejectReason::AlreadyVectorized => "already-vectorized",
            RejectReason::CleanupLoop => "cleanup-loop",
            RejectReason::SideEffect => "side-effect",
            RejectReason::NothingToVectorize => "nothing-to-vectorize",
            RejectReason::InternalInvariant => "internal-invariant",
        }
    }

    /// Whether the loop was never a candidate (as opposed to a candidate the
    /// analysis couldn't prove safe or profitable).
    pub const fn is_non_candidate(self) -> bool {
        matches!(
            self,
            RejectReason::Disabled | RejectReason::AlreadyVectorized | RejectReason::CleanupLoop
        )
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rejected: {}", self.tag())
    }
}

/// Outcome of an analysis step.
pub type Legality<T> = Result<T, RejectReason>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags() {
        assert_eq!(
            RejectReason::UnsafeDependence.to_string(),
            "rejected: unsafe-dependence"
        );
        assert_eq!(RejectReason::UnsupportedType.tag(), "unsupported-type");
        assert!(RejectReason::CleanupLoop.is_non_candidate());
        assert!(!RejectReason::FpReduction.is_non_candidate());
    }
}
