//! Canonical loop shape recognition.
//!
//! The vectorizer handles the loop shape produced by counted `for` loops:
//!
//! ```text
//!   preheader ──► header ──► body ──┐
//!                  ▲  │             │
//!                  │  └──► exit     │
//!                  └────────────────┘
//! ```
//!
//! The header holds the phis and a single compare of the primary induction
//! against a loop-invariant bound; the body is one block ending in the back
//! edge. Anything else is rejected as complex control flow.

use crate::ir::{BlockId, Cfg, CmpOp, Function, InstId, Loop, LoopHint, Opcode, Terminator, User};

use super::legality::{Legality, RejectReason};

/// A loop-invariant scalar operand: folded constant or SSA value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Const(i64),
    Value(InstId),
}

impl Operand {
    #[inline]
    pub fn as_const(self) -> Option<i64> {
        match self {
            Operand::Const(c) => Some(c),
            Operand::Value(_) => None,
        }
    }
}

/// The blocks and exit test of a canonical counted loop.
#[derive(Debug, Clone)]
pub struct LoopRegion {
    pub preheader: BlockId,
    pub header: BlockId,
    pub body: BlockId,
    pub exit: BlockId,
    /// Sorted blocks of the loop.
    pub blocks: Vec<BlockId>,
    /// The exit compare in the header.
    pub cond: InstId,
    /// Induction phi tested by the exit compare.
    pub index: InstId,
    /// The loop continues while `index < limit` (signed).
    pub limit: Operand,
}

impl LoopRegion {
    /// Whether `v` is defined outside the loop.
    #[inline]
    pub fn is_invariant(&self, func: &Function, v: InstId) -> bool {
        self.blocks.binary_search(&func.inst(v).block).is_err()
    }

    /// Value of `v` as an invariant operand, folding integer constants.
    pub fn operand(&self, func: &Function, v: InstId) -> Operand {
        match func.int_const(v) {
            Some(c) => Operand::Const(c),
            None => Operand::Value(v),
        }
    }
}

/// Match `lp` against the canonical shape.
pub fn extract(func: &Function, cfg: &Cfg, lp: &Loop) -> Legality<LoopRegion> {
    let header = lp.header;
    match func.block(header).hint {
        LoopHint::Vectorized => return Err(RejectReason::AlreadyVectorized),
        LoopHint::Cleanup => return Err(RejectReason::CleanupLoop),
        LoopHint::None => {}
    }
    if !lp.is_innermost() || lp.body.len() != 2 || lp.latches.len() != 1 {
        return Err(RejectReason::ComplexControlFlow);
    }
    let body = lp.latches[0];
    if body == header || func.block(body).term != Some(Terminator::Jump(header)) {
        return Err(RejectReason::ComplexControlFlow);
    }

    // Exactly one entry edge, from a dedicated preheader.
    let preheader = match cfg.preds(header) {
        [a, b] if *b == body => *a,
        [a, b] if *a == body => *b,
        _ => return Err(RejectReason::ComplexControlFlow),
    };
    if cfg.succs(preheader) != [header] {
        return Err(RejectReason::ComplexControlFlow);
    }

    let Some(Terminator::Branch {
        cond,
        then_block,
        else_block,
    }) = func.block(header).term
    else {
        return Err(RejectReason::ComplexControlFlow);
    };
    let (exit, body_on_true) = if then_block == body {
        (else_block, true)
    } else if else_block == body {
        (then_block, false)
    } else {
        return Err(RejectReason::ComplexControlFlow);
    };
    if exit == header || exit == body {
        return Err(RejectReason::ComplexControlFlow);
    }

    // The header computes only the exit test, and nothing else reads it.
    if func.block(header).insts.as_slice() != [cond] {
        return Err(RejectReason::ComplexControlFlow);
    }
    let users = func.users();
    if users.get(&cond).map(|u| u.as_slice()) != Some(&[User::Terminator(header)][..]) {
        return Err(RejectReason::ComplexControlFlow);
    }

    let mut region = LoopRegion {
        preheader,
        header,
        body,
        exit,
        blocks: lp.body.clone(),
        cond,
        index: InstId::INVALID,
        limit: Operand::Const(0),
    };

    let inst = func.inst(cond);
    let Opcode::Compare(op) = inst.opcode else {
        return Err(RejectReason::ComplexControlFlow);
    };
    let op = if body_on_true {
        op
    } else {
        op.negated().ok_or(RejectReason::ComplexControlFlow)?
    };
    let (lhs, rhs) = (inst.args[0], inst.args[1]);
    let is_header_phi = |v: InstId| func.block(header).phis.contains(&v);
    let (index, bound, op) = if is_header_phi(lhs) && region.is_invariant(func, rhs) {
        (lhs, rhs, op)
    } else if is_header_phi(rhs) && region.is_invariant(func, lhs) {
        (rhs, lhs, op.swapped())
    } else {
        return Err(RejectReason::ComplexControlFlow);
    };

    let ty = func
        .value_type(index)
        .scalar()
        .filter(|s| s.is_int())
        .ok_or(RejectReason::UnsupportedType)?;

    region.index = index;
    region.limit = match (op, region.operand(func, bound)) {
        (CmpOp::Lt, limit) => limit,
        // `i <= c` runs while `i < c + 1`.
        (CmpOp::Le, Operand::Const(c)) if c < ty.int_max() => Operand::Const(c + 1),
        (CmpOp::Gt | CmpOp::Ge, _) => return Err(RejectReason::NonUnitStride),
        _ => return Err(RejectReason::ComplexControlFlow),
    };
    Ok(region)
}

/// Iterations executed by `for (i = init; i < limit; i++)` when both ends
/// are constant.
pub fn static_trip_count(init: Operand, limit: Operand) -> Option<u64> {
    let (init, limit) = (init.as_const()?, limit.as_const()?);
    Some(if limit > init {
        (limit as i128 - init as i128) as u64
    } else {
        0
    })
}
