//! Induction and reduction recognition.
//!
//! Each header phi is run through a small state machine:
//!
//! ```text
//! Unclassified ─┬─► Induction   v' = v ± c, c a constant
//!               ├─► Reduction   acc' = acc OP x, acc used by nothing else
//!               └─► Rejected
//! ```
//!
//! Derived inductions (`i + k`, `2 * i`) need no phi of their own; the access
//! analysis folds them into affine index forms.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::ir::{BinOp, Function, InstId, Opcode, ScalarType, User};

use super::legality::{Legality, RejectReason};
use super::region::{LoopRegion, Operand};

/// A basic induction variable: `phi = init + step * iteration`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Induction {
    pub phi: InstId,
    /// The instruction computing the next value.
    pub update: InstId,
    pub init: Operand,
    pub step: i64,
    pub ty: ScalarType,
}

/// A loop-carried accumulation `acc' = acc OP operand`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reduction {
    pub phi: InstId,
    pub update: InstId,
    pub op: BinOp,
    /// The value folded in every iteration.
    pub operand: InstId,
    /// Value entering the loop.
    pub init: InstId,
    pub ty: ScalarType,
}

impl Reduction {
    /// Operator combining partial lane results. Subtraction accumulates
    /// `acc - x0 - x1 ...`, so lane partials are combined with addition.
    #[inline]
    pub fn combine(&self) -> BinOp {
        match self.op {
            BinOp::Sub => BinOp::Add,
            op => op,
        }
    }

    /// Neutral value for the inactive and non-leading lanes.
    #[inline]
    pub fn identity(&self) -> Option<i64> {
        self.combine().int_identity(self.ty)
    }
}

/// Classification state of one header phi.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhiState {
    Unclassified,
    /// Shaped like a reduction; its uses are not checked yet.
    ReductionCandidate(Reduction),
    Induction(Induction),
    Reduction(Reduction),
    Rejected(RejectReason),
}

impl PhiState {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PhiState::Induction(_) | PhiState::Reduction(_) | PhiState::Rejected(_)
        )
    }
}

/// All loop-carried values of a loop.
#[derive(Debug, Clone)]
pub struct LoopCarried {
    /// Induction tested by the exit condition; always steps by one.
    pub primary: Induction,
    /// Every induction, the primary included.
    pub inductions: SmallVec<[Induction; 2]>,
    pub reductions: SmallVec<[Reduction; 2]>,
}

impl LoopCarried {
    pub fn induction(&self, phi: InstId) -> Option<&Induction> {
        self.inductions.iter().find(|i| i.phi == phi)
    }

    pub fn reduction(&self, phi: InstId) -> Option<&Reduction> {
        self.reductions.iter().find(|r| r.phi == phi)
    }

    /// The reduction whose update is `v`.
    pub fn reduction_update(&self, v: InstId) -> Option<&Reduction> {
        self.reductions.iter().find(|r| r.update == v)
    }
}

/// Classify every header phi of `region`.
pub fn classify(
    func: &Function,
    region: &LoopRegion,
    users: &FxHashMap<InstId, SmallVec<[User; 4]>>,
) -> Legality<LoopCarried> {
    let mut inductions = SmallVec::new();
    let mut reductions = SmallVec::new();

    for &phi in &func.block(region.header).phis {
        let mut state = PhiState::Unclassified;
        while !state.is_terminal() {
            state = advance(state, func, region, users, phi);
        }
        tracing::trace!(phi = ?phi, state = ?state, "classified loop phi");
        match state {
            PhiState::Induction(ind) => inductions.push(ind),
            PhiState::Reduction(red) => reductions.push(red),
            PhiState::Rejected(reason) => return Err(reason),
            PhiState::Unclassified | PhiState::ReductionCandidate(_) => {
                return Err(RejectReason::InternalInvariant);
            }
        }
    }

    let primary = *inductions
        .iter()
        .find(|i: &&Induction| i.phi == region.index)
        .ok_or(RejectReason::UnsupportedPhi)?;
    if primary.step != 1 {
        return Err(RejectReason::NonUnitStride);
    }
    Ok(LoopCarried {
        primary,
        inductions,
        reductions,
    })
}

/// One transition of the per-phi state machine. Terminal states map to
/// themselves.
pub fn advance(
    state: PhiState,
    func: &Function,
    region: &LoopRegion,
    users: &FxHashMap<InstId, SmallVec<[User; 4]>>,
    phi: InstId,
) -> PhiState {
    match state {
        PhiState::Unclassified => recognize(func, region, phi),
        PhiState::ReductionCandidate(red) => {
            // Inside the loop the accumulator may only flow into its own
            // update, and the update only back into the phi. Code after the
            // loop may read the phi.
            let in_loop = |u: &User| match *u {
                User::Inst(v) => !region.is_invariant(func, v),
                User::Terminator(b) => region.blocks.contains(&b),
            };
            let phi_ok = users.get(&phi).is_some_and(|us| {
                us.iter()
                    .filter(|u| in_loop(u))
                    .all(|u| *u == User::Inst(red.update))
            });
            let update_ok = users
                .get(&red.update)
                .is_some_and(|us| us.iter().all(|u| *u == User::Inst(phi)));
            if phi_ok && update_ok {
                PhiState::Reduction(red)
            } else {
                PhiState::Rejected(RejectReason::UnsupportedPhi)
            }
        }
        terminal => terminal,
    }
}

fn recognize(func: &Function, region: &LoopRegion, phi: InstId) -> PhiState {
    let inst = func.inst(phi);
    let Some(ty) = inst.ty.scalar() else {
        return PhiState::Rejected(RejectReason::UnsupportedType);
    };
    let (Some(init), Some(latch)) = (
        inst.phi_input(region.preheader),
        inst.phi_input(region.body),
    ) else {
        return PhiState::Rejected(RejectReason::ComplexControlFlow);
    };
    let update = func.inst(latch);
    if update.block != region.body {
        return PhiState::Rejected(RejectReason::UnsupportedPhi);
    }
    let Opcode::Binary(op) = update.opcode else {
        return PhiState::Rejected(RejectReason::UnsupportedPhi);
    };
    let (lhs, rhs) = (update.args[0], update.args[1]);

    if ty.is_int() {
        let step = match op {
            BinOp::Add if lhs == phi => func.int_const(rhs),
            BinOp::Add if rhs == phi => func.int_const(lhs),
            BinOp::Sub if lhs == phi => func.int_const(rhs).and_then(i64::checked_neg),
            _ => None,
        };
        if let Some(step) = step {
            return PhiState::Induction(Induction {
                phi,
                update: latch,
                init: region.operand(func, init),
                step,
                ty,
            });
        }
    }

    let operand = match (lhs == phi, rhs == phi) {
        (true, false) => rhs,
        (false, true) if op.is_commutative() => lhs,
        _ => return PhiState::Rejected(RejectReason::UnsupportedPhi),
    };
    if ty.is_float() {
        return PhiState::Rejected(RejectReason::FpReduction);
    }
    if !ty.is_int() {
        return PhiState::Rejected(RejectReason::UnsupportedType);
    }
    PhiState::ReductionCandidate(Reduction {
        phi,
        update: latch,
        op,
        operand,
        init,
        ty,
    })
}
