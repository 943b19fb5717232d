//! Per-value shape of the loop body.
//!
//! Every value the vector loop may need is one of:
//! - **Invariant**: defined outside the loop.
//! - **Uniform**: computed in the loop but equal in every iteration. Pure
//!   uniform values whose operands are available before the loop are hoisted
//!   into the vector preheader; the rest (loads from a fixed element) are
//!   computed once per vector iteration.
//! - **Series**: affine in the iteration count, materialized as
//!   `VecSeries` only when used as data.
//! - **Varying**: a different value in every lane.
//! - **Reduction**: a reduction phi or its update.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::ir::{Function, InstId, Opcode, ScalarType};

use super::access::{Affine, AffineAnalysis, ArrayAccess};
use super::induction::LoopCarried;
use super::legality::{Legality, RejectReason};
use super::narrowing::NarrowingPlan;
use super::region::LoopRegion;

/// Shape of one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Invariant,
    Uniform { hoisted: bool },
    Series(Affine),
    Varying,
    Reduction,
}

impl ValueKind {
    /// Same value in every iteration.
    #[inline]
    pub fn is_uniform(&self) -> bool {
        matches!(self, ValueKind::Invariant | ValueKind::Uniform { .. })
    }

    /// Computable before the loop.
    #[inline]
    pub fn is_hoistable(&self) -> bool {
        matches!(
            self,
            ValueKind::Invariant | ValueKind::Uniform { hoisted: true }
        )
    }
}

static INVARIANT: ValueKind = ValueKind::Invariant;

/// Shapes of the header phis and body instructions of one loop.
#[derive(Debug, Clone)]
pub struct BodyShapes {
    kinds: FxHashMap<InstId, ValueKind>,
    /// Type of the primary induction; every unit-stride index has it.
    pub index_ty: ScalarType,
}

impl BodyShapes {
    /// Shape of `v`; values the analysis never saw are loop-invariant.
    pub fn kind(&self, v: InstId) -> &ValueKind {
        self.kinds.get(&v).unwrap_or(&INVARIANT)
    }

    /// Element types the vector loop computes with.
    pub fn vector_types(
        &self,
        func: &Function,
        region: &LoopRegion,
        carried: &LoopCarried,
        narrowing: &NarrowingPlan,
    ) -> SmallVec<[ScalarType; 4]> {
        let mut types: SmallVec<[ScalarType; 4]> = SmallVec::new();
        let mut note = |ty: Option<ScalarType>| {
            if let Some(ty) = ty.filter(|t| !types.contains(t)) {
                types.push(ty);
            }
        };

        for &v in &func.block(region.body).insts {
            if narrowing.is_absorbed(v) {
                continue;
            }
            let inst = func.inst(v);
            if let Some(rewrite) = narrowing.rewrite(v) {
                note(Some(rewrite.ty));
                continue;
            }
            match self.kind(v) {
                ValueKind::Varying => {}
                ValueKind::Reduction => {
                    note(carried.reduction_update(v).map(|r| r.ty));
                }
                _ => continue,
            }
            match inst.opcode {
                Opcode::ArraySet => note(func.value_type(inst.args[0]).array_elem()),
                _ => note(inst.ty.scalar()),
            }
            for &arg in data_operands(func, carried, v) {
                match self.kind(arg) {
                    ValueKind::Series(_) | ValueKind::Varying => note(func.value_type(arg).scalar()),
                    _ => {}
                }
            }
        }
        types
    }
}

/// Operands of `v` that become vector lanes, as opposed to addresses and
/// accumulators.
pub fn data_operands<'f>(func: &'f Function, carried: &LoopCarried, v: InstId) -> &'f [InstId] {
    let inst = func.inst(v);
    if let Some(red) = carried.reduction_update(v) {
        let pos = usize::from(inst.args[0] == red.phi);
        return &inst.args[pos..pos + 1];
    }
    match inst.opcode {
        Opcode::ArraySet => &inst.args[2..3],
        Opcode::Binary(_) | Opcode::Convert => &inst.args[..],
        _ => &[],
    }
}

/// Classify every loop value.
pub fn analyze(
    func: &Function,
    region: &LoopRegion,
    carried: &LoopCarried,
    accesses: &[ArrayAccess],
    affine: &mut AffineAnalysis<'_>,
) -> Legality<BodyShapes> {
    let index_ty = carried.primary.ty;
    if carried.inductions.iter().any(|ind| ind.ty != index_ty) {
        return Err(RejectReason::UnsupportedType);
    }

    let mut kinds = FxHashMap::default();
    for ind in &carried.inductions {
        let form = affine.of(ind.phi).ok_or(RejectReason::InternalInvariant)?;
        kinds.insert(ind.phi, ValueKind::Series(form));
    }
    for red in &carried.reductions {
        kinds.insert(red.phi, ValueKind::Reduction);
        kinds.insert(red.update, ValueKind::Reduction);
    }

    let body = func.block(region.body);
    if !body.phis.is_empty() {
        return Err(RejectReason::UnsupportedPhi);
    }

    let mut shapes = BodyShapes { kinds, index_ty };
    for &v in &body.insts {
        if shapes.kinds.contains_key(&v) {
            continue;
        }
        let inst = func.inst(v);
        let kind = match inst.opcode {
            op if op.is_vector() => return Err(RejectReason::AlreadyVectorized),
            Opcode::NewArray => return Err(RejectReason::SideEffect),
            Opcode::Phi | Opcode::Param(_) => return Err(RejectReason::ComplexControlFlow),
            Opcode::Const(_) => ValueKind::Uniform { hoisted: true },
            Opcode::ArrayGet | Opcode::ArraySet => {
                let access = accesses
                    .iter()
                    .find(|a| a.inst == v)
                    .ok_or(RejectReason::InternalInvariant)?;
                match (access.is_lane_varying(), access.is_write) {
                    (true, _) => ValueKind::Varying,
                    (false, false) => ValueKind::Uniform { hoisted: false },
                    // Every lane would write the same element.
                    (false, true) => return Err(RejectReason::UnsafeDependence),
                }
            }
            _ => {
                let series = if inst.ty.is_int() {
                    affine.of(v).filter(|f| !f.is_invariant())
                } else {
                    None
                };
                match series {
                    Some(form) => ValueKind::Series(form),
                    None => shapes.combine(inst.opcode, &inst.args)?,
                }
            }
        };
        tracing::trace!(value = ?v, kind = ?kind, "loop value shape");
        shapes.kinds.insert(v, kind);
    }
    Ok(shapes)
}

impl BodyShapes {
    /// Shape of an ordinary operation from the shapes of its operands.
    fn combine(&self, opcode: Opcode, args: &[InstId]) -> Legality<ValueKind> {
        if args.iter().all(|&a| self.kind(a).is_uniform()) {
            let hoisted = opcode.is_pure() && args.iter().all(|&a| self.kind(a).is_hoistable());
            return Ok(ValueKind::Uniform { hoisted });
        }
        match opcode {
            Opcode::Binary(_) | Opcode::Convert => Ok(ValueKind::Varying),
            _ => Err(RejectReason::UnsupportedOp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Cfg, CmpOp, DominatorTree, FunctionBuilder, LoopAnalysis, Type};
    use crate::opt::vectorize::{access, induction, region};

    fn shapes_of(f: &Function) -> Legality<(BodyShapes, LoopCarried, LoopRegion)> {
        let cfg = Cfg::build(f);
        let dom = DominatorTree::build(&cfg);
        let loops = LoopAnalysis::compute(&cfg, &dom);
        let region = region::extract(f, &cfg, &loops.loops[0])?;
        let carried = induction::classify(f, &region, &f.users())?;
        let mut affine = AffineAnalysis::new(f, &region, &carried);
        let accesses = access::collect(f, &region, &mut affine, carried.primary.ty)?;
        let shapes = analyze(f, &region, &carried, &accesses, &mut affine)?;
        Ok((shapes, carried, region))
    }

    #[test]
    fn test_uniform_load_and_series() {
        // x[i] = (int) y[0] + i
        let mut b = FunctionBuilder::new("f", Type::Void);
        let x = b.param(Type::Ref(ScalarType::I32));
        let y = b.param(Type::Ref(ScalarType::I64));
        let zero = b.iconst(ScalarType::I32, 0);
        let n = b.array_length(x);
        let lp = b.counted_loop(ScalarType::I32, zero, n);
        let first = b.iconst(ScalarType::I32, 0);
        let wide = b.array_get(y, first);
        let narrow = b.convert(ScalarType::I32, wide);
        let sum = b.add(narrow, lp.index);
        b.array_set(x, lp.index, sum);
        b.close_loop(&lp, &[]);
        b.ret(None);
        let f = b.finish();

        let (shapes, carried, region) = shapes_of(&f).unwrap();
        assert_eq!(*shapes.kind(first), ValueKind::Uniform { hoisted: true });
        assert_eq!(*shapes.kind(wide), ValueKind::Uniform { hoisted: false });
        assert_eq!(*shapes.kind(narrow), ValueKind::Uniform { hoisted: false });
        assert!(matches!(shapes.kind(lp.index), ValueKind::Series(_)));
        assert_eq!(*shapes.kind(sum), ValueKind::Varying);
        assert_eq!(*shapes.kind(n), ValueKind::Invariant);

        let types = shapes.vector_types(&f, &region, &carried, &NarrowingPlan::default());
        assert_eq!(types.as_slice(), &[ScalarType::I32]);
    }

    #[test]
    fn test_varying_compare_rejected() {
        let mut b = FunctionBuilder::new("f", Type::Void);
        let x = b.param(Type::Ref(ScalarType::I32));
        let zero = b.iconst(ScalarType::I32, 0);
        let n = b.array_length(x);
        let lp = b.counted_loop(ScalarType::I32, zero, n);
        let v = b.array_get(x, lp.index);
        let c = b.compare(CmpOp::Lt, v, zero);
        let s = b.select(c, zero, v);
        b.array_set(x, lp.index, s);
        b.close_loop(&lp, &[]);
        b.ret(None);
        let f = b.finish();
        assert_eq!(shapes_of(&f).unwrap_err(), RejectReason::UnsupportedOp);
    }

    #[test]
    fn test_uniform_store_rejected() {
        let mut b = FunctionBuilder::new("f", Type::Void);
        let x = b.param(Type::Ref(ScalarType::I32));
        let zero = b.iconst(ScalarType::I32, 0);
        let n = b.array_length(x);
        let lp = b.counted_loop(ScalarType::I32, zero, n);
        b.array_set(x, zero, lp.index);
        b.close_loop(&lp, &[]);
        b.ret(None);
        let f = b.finish();
        assert_eq!(shapes_of(&f).unwrap_err(), RejectReason::UnsafeDependence);
    }
}
