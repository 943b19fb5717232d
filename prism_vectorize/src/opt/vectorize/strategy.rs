//! Vectorization strategy selection.
//!
//! Predicated execution is preferred whenever the target has it: the final
//! partial vector is masked, so no unrolling and no remainder loop are
//! needed. Otherwise the loop runs fixed-width vectors unrolled by up to four
//! copies, followed by a scalar cleanup loop unless a proven trip count
//! divides evenly.

use smallvec::SmallVec;

use crate::ir::{InstId, Lanes, ScalarType, VectorShape};

use super::VectorizeConfig;
use super::dependence::DependenceReport;
use super::legality::{Legality, RejectReason};

/// How the vector loop handles lanes past the trip count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodegenStyle {
    /// Whole vectors only; a scalar loop runs the remainder.
    Fixed,
    /// Run-time vector length, last vector masked by `VecPredWhile`.
    Predicated,
}

/// The chosen shape of the vector loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorPlan {
    /// Element type that determines the lane count.
    pub elem: ScalarType,
    pub lanes: Lanes,
    /// Vector copies per iteration of the vector loop.
    pub unroll: u32,
    pub style: CodegenStyle,
    /// Whether the scalar loop stays behind the vector loop.
    pub needs_cleanup: bool,
    /// References that must differ for the vector loop to run.
    pub guards: SmallVec<[(InstId, InstId); 2]>,
    /// Proven iteration count, if constant.
    pub trip_count: Option<u64>,
}

impl VectorPlan {
    #[inline]
    pub fn shape(&self, elem: ScalarType) -> VectorShape {
        VectorShape::new(elem, self.lanes)
    }

    /// Scalar iterations per vector iteration, when known statically.
    #[inline]
    pub fn fixed_step(&self) -> Option<u64> {
        match self.lanes {
            Lanes::Fixed(n) => Some(n as u64 * self.unroll as u64),
            Lanes::Scalable => None,
        }
    }
}

/// Pick a plan for a loop computing with `types`.
pub fn select(
    config: &VectorizeConfig,
    types: &[ScalarType],
    report: &DependenceReport,
    trip_count: Option<u64>,
) -> Legality<VectorPlan> {
    let target = &config.target;
    let &elem = types.first().ok_or(RejectReason::NothingToVectorize)?;
    if types
        .iter()
        .any(|&t| !target.element_types.supports(t) || t.bits() != elem.bits())
    {
        return Err(RejectReason::UnsupportedType);
    }
    if trip_count.is_some_and(|tc| tc < config.min_trip_count) {
        return Err(RejectReason::TripCountTooSmall);
    }
    let guards = report.guards.clone();

    let predicated = config.prefer_predicated
        && target
            .max_scalable_lanes(elem)
            .is_some_and(|max| max >= 1 && report.max_lanes.is_none_or(|d| max <= d));
    if predicated {
        return Ok(VectorPlan {
            elem,
            lanes: Lanes::Scalable,
            unroll: 1,
            style: CodegenStyle::Predicated,
            needs_cleanup: !guards.is_empty(),
            guards,
            trip_count,
        });
    }

    let natural = target.fixed_lanes(elem);
    let lanes = match report.max_lanes {
        Some(d) => prev_power_of_two(natural.min(d)),
        None => prev_power_of_two(natural),
    };
    if lanes < 2 {
        return Err(if natural >= 2 {
            RejectReason::UnsafeDependence
        } else {
            RejectReason::UnsupportedType
        });
    }
    let lanes_u16 = u16::try_from(lanes).map_err(|_| RejectReason::UnsupportedType)?;
    let lanes_u64 = u64::from(lanes);

    let max_unroll = prev_power_of_two(config.max_unroll.max(1));
    let factors = || {
        std::iter::successors(Some(max_unroll), |&u| (u > 1).then_some(u / 2))
    };
    // With a known trip count, unroll by the largest factor whose step
    // divides it. Otherwise take the unrolled factor that leaves the
    // fewest iterations to the cleanup loop, preferring fewer copies.
    let unroll = match trip_count {
        Some(tc) if tc < lanes_u64 => return Err(RejectReason::TripCountTooSmall),
        Some(tc) => {
            let step = |u: u32| lanes_u64 * u64::from(u);
            let unrolled: SmallVec<[u32; 4]> =
                factors().filter(|&u| u > 1 && step(u) <= tc).collect();
            unrolled
                .iter()
                .copied()
                .find(|&u| tc % step(u) == 0)
                .or_else(|| unrolled.iter().copied().min_by_key(|&u| (tc % step(u), u)))
                .unwrap_or(1)
        }
        None => max_unroll,
    };
    let step = lanes_u64 * u64::from(unroll);
    let needs_cleanup = !guards.is_empty() || trip_count.is_none_or(|tc| tc % step != 0);

    Ok(VectorPlan {
        elem,
        lanes: Lanes::Fixed(lanes_u16),
        unroll,
        style: CodegenStyle::Fixed,
        needs_cleanup,
        guards,
        trip_count,
    })
}

#[inline]
fn prev_power_of_two(n: u32) -> u32 {
    if n == 0 { 0 } else { 1 << (31 - n.leading_zeros()) }
}
