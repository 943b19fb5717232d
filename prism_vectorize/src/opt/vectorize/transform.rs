//! Vector loop construction.
//!
//! The scalar loop is left in place and a vector loop is inserted on its
//! entry edge:
//!
//! ```text
//!   preheader ──► vpre ──► vheader ──► vbody ──┐
//!                            ▲  │              │
//!                            │  └──► vexit     │
//!                            └─────────────────┘
//!   vexit ──► header (cleanup loop, resumes at the vector exit values)
//!        or ──► exit  (no remainder possible: scalar loop deleted)
//! ```
//!
//! `vpre` computes the trip count, the vector trip count, the alias guard,
//! broadcasts of invariants and reduction seeds. `vbody` holds `unroll`
//! copies of the body in fixed mode, or one predicated copy. `vexit` folds
//! reduction lanes and computes the values the scalar phis resume from.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::error::TransformError;
use crate::ir::{
    BinOp, BlockId, CmpOp, Const, Function, InstId, Lanes, LoopHint, Opcode, ScalarType,
    Terminator, Type,
};

use super::access::{Affine, ArrayAccess};
use super::induction::{LoopCarried, Reduction};
use super::narrowing::{NarrowOperand, NarrowingPlan};
use super::region::{LoopRegion, Operand};
use super::shape::{BodyShapes, ValueKind};
use super::strategy::{CodegenStyle, VectorPlan};

/// Headers of the loops left behind by a successful rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rewritten {
    pub vector_header: BlockId,
    /// The original header, now running the remainder; `None` when the
    /// scalar loop was deleted.
    pub cleanup_header: Option<BlockId>,
}

/// Analysis results the rewrite consumes.
pub struct LoopFacts<'a> {
    pub region: &'a LoopRegion,
    pub carried: &'a LoopCarried,
    pub accesses: &'a [ArrayAccess],
    pub shapes: &'a BodyShapes,
    pub narrowing: &'a NarrowingPlan,
}

/// Rewrite the loop in `func` according to `plan`.
///
/// On error `func` is left in an unspecified state; callers work on a copy.
pub fn vectorize_loop(
    func: &mut Function,
    facts: &LoopFacts<'_>,
    plan: &VectorPlan,
) -> Result<Rewritten, TransformError> {
    let region = facts.region;
    let vpre = func.create_block_after(region.preheader);
    let vheader = func.create_block_after(vpre);
    let vbody = func.create_block_after(vheader);
    let vexit = func.create_block_after(vbody);

    let mut cg = Codegen {
        func,
        facts,
        plan,
        index_ty: facts.shapes.index_ty,
        vpre,
        vbody,
        scalars: FxHashMap::default(),
        splats: FxHashMap::default(),
        consts: FxHashMap::default(),
        series_bases: FxHashMap::default(),
        copies: Vec::new(),
        vi: InstId::INVALID,
        pred: None,
    };

    // Vector preheader.
    if let Some(term) = cg.func.block_mut(region.preheader).term.as_mut() {
        term.retarget(region.header, vpre);
    }
    let init = cg.operand(facts.carried.primary.init);
    let trip_count = cg.trip_count(init);
    let vector_trip_count = cg.vector_trip_count(trip_count);
    let seeds: SmallVec<[(Reduction, InstId); 2]> = facts
        .carried
        .reductions
        .iter()
        .map(|red| Ok((*red, cg.seed(red)?)))
        .collect::<Result<_, TransformError>>()?;
    let lane_count = match plan.style {
        CodegenStyle::Predicated => cg.func.append_inst(
            vpre,
            Opcode::VecLaneCount(plan.elem),
            Type::Scalar(cg.index_ty),
            &[],
        ),
        CodegenStyle::Fixed => {
            let step = plan.fixed_step().ok_or(TransformError::Unexpected(region.cond))?;
            cg.konst(vpre, cg.index_ty, step as i64)
        }
    };
    cg.func.set_terminator(vpre, Terminator::Jump(vheader));

    // Vector header.
    let zero = cg.konst(vpre, cg.index_ty, 0);
    let vi = cg.func.add_phi(vheader, Type::Scalar(cg.index_ty));
    cg.func.add_phi_incoming(vi, vpre, zero);
    cg.vi = vi;
    let mut accumulators: FxHashMap<InstId, InstId> = FxHashMap::default();
    let mut acc_phis: SmallVec<[(Reduction, InstId); 2]> = SmallVec::new();
    for (red, seed) in &seeds {
        let phi = cg.func.add_phi(vheader, cg.vector_type(red.ty));
        cg.func.add_phi_incoming(phi, vpre, *seed);
        accumulators.insert(red.phi, phi);
        acc_phis.push((*red, phi));
    }
    let cond = cg.func.append_inst(
        vheader,
        Opcode::Compare(CmpOp::Ult),
        Type::BOOL,
        &[vi, vector_trip_count],
    );
    cg.func.set_terminator(
        vheader,
        Terminator::Branch {
            cond,
            then_block: vbody,
            else_block: vexit,
        },
    );
    cg.func.block_mut(vheader).hint = LoopHint::Vectorized;

    // Vector body.
    if plan.style == CodegenStyle::Predicated {
        let pred_ty = Type::Predicate(plan.shape(plan.elem));
        cg.pred = Some(cg.func.append_inst(
            vbody,
            Opcode::VecPredWhile,
            pred_ty,
            &[vi, vector_trip_count],
        ));
    }
    for copy in 0..plan.unroll {
        cg.emit_copy(copy, &mut accumulators)?;
    }
    let next = cg.func.append_inst(
        vbody,
        Opcode::Binary(BinOp::Add),
        Type::Scalar(cg.index_ty),
        &[vi, lane_count],
    );
    cg.func.add_phi_incoming(vi, vbody, next);
    for (red, phi) in &acc_phis {
        let last = *accumulators
            .get(&red.phi)
            .ok_or(TransformError::Unmapped(red.phi))?;
        cg.func.add_phi_incoming(*phi, vbody, last);
    }
    cg.func.set_terminator(vbody, Terminator::Jump(vheader));

    // Vector exit: values the scalar phis continue from.
    let mut resume: FxHashMap<InstId, InstId> = FxHashMap::default();
    for ind in &facts.carried.inductions {
        let start = cg.operand(ind.init);
        let advanced = match ind.step {
            1 => vector_trip_count,
            step => {
                let k = cg.konst(vexit, cg.index_ty, step);
                cg.binary(vexit, BinOp::Mul, vector_trip_count, k)
            }
        };
        let value = if cg.func.int_const(start) == Some(0) {
            advanced
        } else {
            cg.binary(vexit, BinOp::Add, start, advanced)
        };
        resume.insert(ind.phi, value);
    }
    for (red, phi) in &acc_phis {
        let folded = cg.func.append_inst(
            vexit,
            Opcode::VecReduce(red.combine()),
            Type::Scalar(red.ty),
            &[*phi],
        );
        resume.insert(red.phi, folded);
    }

    let func = cg.func;
    let header_phis = func.block(region.header).phis.clone();
    if plan.needs_cleanup {
        for &phi in &header_phis {
            let value = *resume.get(&phi).ok_or(TransformError::Unmapped(phi))?;
            let inst = func.inst_mut(phi);
            for (k, block) in inst.phi_blocks.iter_mut().enumerate() {
                if *block == region.preheader {
                    *block = vexit;
                    inst.args[k] = value;
                }
            }
        }
        func.set_terminator(vexit, Terminator::Jump(region.header));
        func.block_mut(region.header).hint = LoopHint::Cleanup;
        Ok(Rewritten {
            vector_header: vheader,
            cleanup_header: Some(region.header),
        })
    } else {
        func.set_terminator(vexit, Terminator::Jump(region.exit));
        func.remove_from_layout(&[region.header, region.body]);
        for &phi in &header_phis {
            let value = *resume.get(&phi).ok_or(TransformError::Unmapped(phi))?;
            func.replace_all_uses(phi, value);
        }
        func.rename_phi_edge(region.exit, region.header, vexit);
        Ok(Rewritten {
            vector_header: vheader,
            cleanup_header: None,
        })
    }
}

// =============================================================================
// Code Generation State
// =============================================================================

struct Codegen<'f, 'a> {
    func: &'f mut Function,
    facts: &'a LoopFacts<'a>,
    plan: &'a VectorPlan,
    index_ty: ScalarType,
    vpre: BlockId,
    vbody: BlockId,
    /// Scalar copies of uniform loop values.
    scalars: FxHashMap<InstId, InstId>,
    /// Broadcasts keyed by their scalar source.
    splats: FxHashMap<InstId, InstId>,
    /// Integer constants in the vector preheader.
    consts: FxHashMap<(ScalarType, i64), InstId>,
    /// Iteration-independent part of series and index forms, keyed by value.
    series_bases: FxHashMap<InstId, InstId>,
    /// Vector values per unrolled copy.
    copies: Vec<CopyState>,
    vi: InstId,
    pred: Option<InstId>,
}

#[derive(Default)]
struct CopyState {
    vectors: FxHashMap<InstId, InstId>,
    /// First scalar iteration handled by this copy, relative to the loop start.
    iteration: Option<InstId>,
}

impl Codegen<'_, '_> {
    // -------------------------------------------------------------------------
    // Scalars
    // -------------------------------------------------------------------------

    fn konst(&mut self, block: BlockId, ty: ScalarType, value: i64) -> InstId {
        let value = ty.wrap(value);
        if block != self.vpre {
            return self
                .func
                .append_const(block, Type::Scalar(ty), Const::Int(value));
        }
        if let Some(&c) = self.consts.get(&(ty, value)) {
            return c;
        }
        let c = self
            .func
            .append_const(block, Type::Scalar(ty), Const::Int(value));
        self.consts.insert((ty, value), c);
        c
    }

    fn binary(&mut self, block: BlockId, op: BinOp, lhs: InstId, rhs: InstId) -> InstId {
        let ty = self.func.value_type(lhs);
        self.func.append_inst(block, Opcode::Binary(op), ty, &[lhs, rhs])
    }

    fn operand(&mut self, op: Operand) -> InstId {
        match op {
            Operand::Value(v) => v,
            Operand::Const(c) => self.konst(self.vpre, self.index_ty, c),
        }
    }

    /// `limit > init ? limit - init : 0`, folded when both ends are constant.
    fn trip_count(&mut self, init: InstId) -> InstId {
        let region = self.facts.region;
        if let Some(tc) = self.plan.trip_count {
            return self.konst(self.vpre, self.index_ty, tc as i64);
        }
        let limit = self.operand(region.limit);
        let vpre = self.vpre;
        let positive =
            self.func
                .append_inst(vpre, Opcode::Compare(CmpOp::Gt), Type::BOOL, &[limit, init]);
        let span = self.binary(vpre, BinOp::Sub, limit, init);
        let zero = self.konst(vpre, self.index_ty, 0);
        self.func.append_inst(
            vpre,
            Opcode::Select,
            Type::Scalar(self.index_ty),
            &[positive, span, zero],
        )
    }

    /// Iterations run by the vector loop; zero when an alias guard fails.
    fn vector_trip_count(&mut self, trip_count: InstId) -> InstId {
        let vpre = self.vpre;
        let mut vtc = match self.plan.fixed_step() {
            None => trip_count,
            Some(step) => match self.func.int_const(trip_count) {
                Some(tc) => {
                    let tc = self.index_ty.as_unsigned(tc);
                    self.konst(vpre, self.index_ty, (tc - tc % step) as i64)
                }
                None => {
                    let mask = self.konst(vpre, self.index_ty, -(step as i64));
                    self.binary(vpre, BinOp::And, trip_count, mask)
                }
            },
        };

        let mut guard: Option<InstId> = None;
        for &(a, b) in &self.plan.guards {
            let distinct =
                self.func
                    .append_inst(vpre, Opcode::Compare(CmpOp::Ne), Type::BOOL, &[a, b]);
            guard = Some(match guard {
                Some(g) => self.binary(vpre, BinOp::And, g, distinct),
                None => distinct,
            });
        }
        if let Some(guard) = guard {
            let zero = self.konst(vpre, self.index_ty, 0);
            vtc = self.func.append_inst(
                vpre,
                Opcode::Select,
                Type::Scalar(self.index_ty),
                &[guard, vtc, zero],
            );
        }
        vtc
    }

    /// Accumulator entering the vector loop: the initial value in lane zero,
    /// the identity everywhere else.
    fn seed(&mut self, red: &Reduction) -> Result<InstId, TransformError> {
        let identity = red.identity().ok_or(TransformError::Unexpected(red.update))?;
        let vpre = self.vpre;
        let identity = self.konst(vpre, red.ty, identity);
        let ty = self.vector_type(red.ty);
        Ok(self
            .func
            .append_inst(vpre, Opcode::VecSetScalars, ty, &[red.init, identity]))
    }

    /// Materialize the iteration-independent part of an affine form.
    fn affine_base(&mut self, form: &Affine, ty: ScalarType) -> InstId {
        let vpre = self.vpre;
        let mut acc: Option<InstId> = None;
        for &(term, coef) in &form.terms {
            let scaled = if coef == 1 {
                term
            } else {
                let k = self.konst(vpre, ty, coef);
                self.binary(vpre, BinOp::Mul, term, k)
            };
            acc = Some(match acc {
                Some(a) => self.binary(vpre, BinOp::Add, a, scaled),
                None => scaled,
            });
        }
        match acc {
            None => self.konst(vpre, ty, form.offset),
            Some(a) if form.offset == 0 => a,
            Some(a) => {
                let k = self.konst(vpre, ty, form.offset);
                self.binary(vpre, BinOp::Add, a, k)
            }
        }
    }

    /// `vi + copy * lanes`, the first iteration handled by `copy`.
    fn iteration(&mut self, copy: usize) -> InstId {
        if let Some(it) = self.copies[copy].iteration {
            return it;
        }
        let it = match self.plan.lanes {
            Lanes::Fixed(n) if copy > 0 => {
                let vbody = self.vbody;
                let k = self.konst(self.vpre, self.index_ty, copy as i64 * n as i64);
                self.binary(vbody, BinOp::Add, self.vi, k)
            }
            _ => self.vi,
        };
        self.copies[copy].iteration = Some(it);
        it
    }

    /// Scalar index of the first lane of an access in `copy`.
    fn lane_index(&mut self, access: InstId, copy: usize) -> Result<InstId, TransformError> {
        let form = self
            .facts
            .accesses
            .iter()
            .find(|a| a.inst == access)
            .map(|a| a.affine.base())
            .ok_or(TransformError::Unmapped(access))?;
        let iteration = self.iteration(copy);
        if form.terms.is_empty() && form.offset == 0 {
            return Ok(iteration);
        }
        let base = match self.series_bases.get(&access) {
            Some(&b) => b,
            None => {
                let b = self.affine_base(&form, self.index_ty);
                self.series_bases.insert(access, b);
                b
            }
        };
        Ok(self.binary(self.vbody, BinOp::Add, base, iteration))
    }

    /// Copy a uniform instruction into `block` with remapped operands.
    fn clone_scalar(&mut self, block: BlockId, v: InstId) -> Result<InstId, TransformError> {
        let inst = self.func.inst(v).clone();
        let mut args: SmallVec<[InstId; 4]> = SmallVec::with_capacity(inst.args.len());
        for &a in &inst.args {
            args.push(match self.facts.shapes.kind(a) {
                ValueKind::Invariant => a,
                _ => *self.scalars.get(&a).ok_or(TransformError::Unmapped(a))?,
            });
        }
        let copy = self.func.append_inst(block, inst.opcode, inst.ty, &args);
        self.scalars.insert(v, copy);
        Ok(copy)
    }

    // -------------------------------------------------------------------------
    // Vectors
    // -------------------------------------------------------------------------

    fn vector_type(&self, elem: ScalarType) -> Type {
        Type::Vector(self.plan.shape(elem))
    }

    fn splat(&mut self, block: BlockId, scalar: InstId) -> Result<InstId, TransformError> {
        if let Some(&s) = self.splats.get(&scalar) {
            return Ok(s);
        }
        let elem = self
            .func
            .value_type(scalar)
            .scalar()
            .ok_or(TransformError::Unexpected(scalar))?;
        let ty = self.vector_type(elem);
        let s = self
            .func
            .append_inst(block, Opcode::VecReplicateScalar, ty, &[scalar]);
        self.splats.insert(scalar, s);
        Ok(s)
    }

    /// The vector form of `v` in `copy`.
    fn vector(&mut self, v: InstId, copy: usize) -> Result<InstId, TransformError> {
        if let Some(&vec) = self.copies[copy].vectors.get(&v) {
            return Ok(vec);
        }
        match self.facts.shapes.kind(v).clone() {
            ValueKind::Invariant => self.splat(self.vpre, v),
            ValueKind::Uniform { hoisted } => {
                let scalar = *self.scalars.get(&v).ok_or(TransformError::Unmapped(v))?;
                let block = if hoisted { self.vpre } else { self.vbody };
                self.splat(block, scalar)
            }
            ValueKind::Series(form) => {
                let series = self.series(v, &form, copy)?;
                self.copies[copy].vectors.insert(v, series);
                Ok(series)
            }
            ValueKind::Varying | ValueKind::Reduction => Err(TransformError::Unmapped(v)),
        }
    }

    /// `VecSeries` holding the values of an affine series for `copy`.
    fn series(&mut self, v: InstId, form: &Affine, copy: usize) -> Result<InstId, TransformError> {
        let ty = self
            .func
            .value_type(v)
            .scalar()
            .ok_or(TransformError::Unexpected(v))?;
        let vbody = self.vbody;
        let iteration = self.iteration(copy);
        let scaled = if form.stride == 1 {
            iteration
        } else {
            let k = self.konst(self.vpre, ty, form.stride);
            self.binary(vbody, BinOp::Mul, iteration, k)
        };
        let base_form = form.base();
        let start = if base_form.terms.is_empty() && base_form.offset == 0 {
            scaled
        } else {
            let base = match self.series_bases.get(&v) {
                Some(&b) => b,
                None => {
                    let b = self.affine_base(&base_form, ty);
                    self.series_bases.insert(v, b);
                    b
                }
            };
            self.binary(vbody, BinOp::Add, base, scaled)
        };
        let stride = self.konst(self.vpre, ty, form.stride);
        let vty = self.vector_type(ty);
        Ok(self
            .func
            .append_inst(vbody, Opcode::VecSeries, vty, &[start, stride]))
    }

    /// Append a vector instruction to the body, governed by the loop
    /// predicate when there is one.
    fn vector_op(&mut self, opcode: Opcode, ty: Type, args: &[InstId]) -> InstId {
        let mut args: SmallVec<[InstId; 4]> = SmallVec::from_slice(args);
        if let Some(pred) = self.pred {
            args.push(pred);
        }
        self.func.append_inst(self.vbody, opcode, ty, &args)
    }

    fn narrow_operand(
        &mut self,
        op: NarrowOperand,
        ty: ScalarType,
        copy: usize,
    ) -> Result<InstId, TransformError> {
        match op {
            NarrowOperand::Value(v) => self.vector(v, copy),
            NarrowOperand::Const(k) => {
                let c = self.konst(self.vpre, ty, k);
                self.splat(self.vpre, c)
            }
        }
    }

    /// Emit one copy of the loop body.
    fn emit_copy(
        &mut self,
        copy: u32,
        accumulators: &mut FxHashMap<InstId, InstId>,
    ) -> Result<(), TransformError> {
        let copy = copy as usize;
        self.copies.push(CopyState::default());
        let body: Vec<InstId> = self.func.block(self.facts.region.body).insts.clone();

        for v in body {
            if self.facts.narrowing.is_absorbed(v) {
                continue;
            }
            if let Some(&narrow) = self.facts.narrowing.rewrite(v) {
                let lhs = self.narrow_operand(narrow.lhs, narrow.ty, copy)?;
                let rhs = self.narrow_operand(narrow.rhs, narrow.ty, copy)?;
                let ty = self.vector_type(narrow.ty);
                let vec = self.vector_op(Opcode::VecBinary(narrow.op), ty, &[lhs, rhs]);
                self.copies[copy].vectors.insert(v, vec);
                continue;
            }

            let inst = self.func.inst(v).clone();
            match self.facts.shapes.kind(v).clone() {
                ValueKind::Invariant => return Err(TransformError::Unexpected(v)),
                ValueKind::Uniform { hoisted } => {
                    if copy == 0 {
                        let block = if hoisted { self.vpre } else { self.vbody };
                        self.clone_scalar(block, v)?;
                    }
                }
                ValueKind::Series(_) => {}
                ValueKind::Reduction => {
                    let red = *self
                        .facts
                        .carried
                        .reduction_update(v)
                        .ok_or(TransformError::Unexpected(v))?;
                    let acc = *accumulators
                        .get(&red.phi)
                        .ok_or(TransformError::Unmapped(red.phi))?;
                    let x = self.vector(red.operand, copy)?;
                    let ty = self.vector_type(red.ty);
                    let next = self.vector_op(Opcode::VecBinary(red.op), ty, &[acc, x]);
                    accumulators.insert(red.phi, next);
                }
                ValueKind::Varying => {
                    let vec = match inst.opcode {
                        Opcode::ArrayGet => {
                            let index = self.lane_index(v, copy)?;
                            let ty = self.vector_type(
                                inst.ty.scalar().ok_or(TransformError::Unexpected(v))?,
                            );
                            self.vector_op(Opcode::VecLoad, ty, &[inst.args[0], index])
                        }
                        Opcode::ArraySet => {
                            let index = self.lane_index(v, copy)?;
                            let value = self.vector(inst.args[2], copy)?;
                            let args = [inst.args[0], index, value];
                            self.vector_op(Opcode::VecStore, Type::Void, &args)
                        }
                        Opcode::Binary(op) => {
                            let lhs = self.vector(inst.args[0], copy)?;
                            let rhs = self.vector(inst.args[1], copy)?;
                            let ty = self.vector_type(
                                inst.ty.scalar().ok_or(TransformError::Unexpected(v))?,
                            );
                            self.vector_op(Opcode::VecBinary(op), ty, &[lhs, rhs])
                        }
                        Opcode::Convert => {
                            let src = self.vector(inst.args[0], copy)?;
                            let ty = self.vector_type(
                                inst.ty.scalar().ok_or(TransformError::Unexpected(v))?,
                            );
                            self.vector_op(Opcode::VecConvert, ty, &[src])
                        }
                        _ => return Err(TransformError::Unexpected(v)),
                    };
                    self.copies[copy].vectors.insert(v, vec);
                }
            }
        }
        Ok(())
    }
}
