//! Affine index forms and array access collection.
//!
//! An index is affine when it can be written as
//!
//! ```text
//! Σ coef_k * inv_k + offset + stride * t
//! ```
//!
//! where the `inv_k` are loop-invariant values and `t` counts iterations
//! from zero. Inductions contribute their initial value to the invariant
//! part and their step to the stride.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::ir::{BinOp, Function, InstId, Opcode, ScalarType};

use super::induction::LoopCarried;
use super::legality::{Legality, RejectReason};
use super::region::{LoopRegion, Operand};

// =============================================================================
// Affine Forms
// =============================================================================

/// Affine function of the iteration count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Affine {
    /// Invariant values with coefficients, sorted by value, no zero
    /// coefficients.
    pub terms: SmallVec<[(InstId, i64); 2]>,
    pub offset: i64,
    pub stride: i64,
}

impl Affine {
    pub fn constant(offset: i64) -> Self {
        Affine {
            offset,
            ..Default::default()
        }
    }

    pub fn value(v: InstId) -> Self {
        Affine {
            terms: smallvec::smallvec![(v, 1)],
            ..Default::default()
        }
    }

    /// Same value in every iteration.
    #[inline]
    pub fn is_invariant(&self) -> bool {
        self.stride == 0
    }

    /// Whether `self` and `other` differ by a known constant.
    #[inline]
    pub fn same_symbols(&self, other: &Affine) -> bool {
        self.terms == other.terms
    }

    /// Offset of `other` relative to `self` at equal iteration counts, if
    /// both share symbols and stride.
    pub fn distance_to(&self, other: &Affine) -> Option<i64> {
        (self.same_symbols(other) && self.stride == other.stride)
            .then(|| other.offset.checked_sub(self.offset))
            .flatten()
    }

    /// The iteration-independent part: the value at `t = 0`.
    pub fn base(&self) -> Affine {
        Affine {
            terms: self.terms.clone(),
            offset: self.offset,
            stride: 0,
        }
    }

    fn add(&self, other: &Affine, sign: i64) -> Option<Affine> {
        let mut terms: SmallVec<[(InstId, i64); 2]> = self.terms.clone();
        for &(v, c) in &other.terms {
            let c = c.checked_mul(sign)?;
            match terms.iter_mut().find(|(t, _)| *t == v) {
                Some((_, existing)) => *existing = existing.checked_add(c)?,
                None => terms.push((v, c)),
            }
        }
        terms.retain(|(_, c)| *c != 0);
        terms.sort_by_key(|(v, _)| *v);
        Some(Affine {
            terms,
            offset: self.offset.checked_add(other.offset.checked_mul(sign)?)?,
            stride: self.stride.checked_add(other.stride.checked_mul(sign)?)?,
        })
    }

    fn scale(&self, k: i64) -> Option<Affine> {
        let mut terms = SmallVec::new();
        for &(v, c) in &self.terms {
            let c = c.checked_mul(k)?;
            if c != 0 {
                terms.push((v, c));
            }
        }
        Some(Affine {
            terms,
            offset: self.offset.checked_mul(k)?,
            stride: self.stride.checked_mul(k)?,
        })
    }

    /// The constant value, if there are no symbolic terms and no stride.
    fn as_const(&self) -> Option<i64> {
        (self.terms.is_empty() && self.stride == 0).then_some(self.offset)
    }
}

/// Memoizing affine analysis for one loop.
pub struct AffineAnalysis<'a> {
    func: &'a Function,
    region: &'a LoopRegion,
    carried: &'a LoopCarried,
    memo: FxHashMap<InstId, Option<Affine>>,
}

impl<'a> AffineAnalysis<'a> {
    pub fn new(func: &'a Function, region: &'a LoopRegion, carried: &'a LoopCarried) -> Self {
        AffineAnalysis {
            func,
            region,
            carried,
            memo: FxHashMap::default(),
        }
    }

    /// Affine form of an integer value, if it has one.
    pub fn of(&mut self, v: InstId) -> Option<Affine> {
        if let Some(known) = self.memo.get(&v) {
            return known.clone();
        }
        let result = self.compute(v);
        self.memo.insert(v, result.clone());
        result
    }

    fn compute(&mut self, v: InstId) -> Option<Affine> {
        let inst = self.func.inst(v);
        let ty: ScalarType = inst.ty.scalar().filter(|s| s.is_int())?;
        if let Some(c) = inst.as_int_const() {
            return Some(Affine::constant(c));
        }
        if self.region.is_invariant(self.func, v) {
            return Some(Affine::value(v));
        }
        if let Some(ind) = self.carried.induction(v) {
            let mut form = match ind.init {
                Operand::Const(c) => Affine::constant(c),
                Operand::Value(init) => Affine::value(init),
            };
            form.stride = ind.step;
            return Some(form);
        }

        let Opcode::Binary(op) = inst.opcode else {
            return None;
        };
        let (lhs, rhs) = (inst.args[0], inst.args[1]);
        let form = match op {
            BinOp::Add => self.of(lhs)?.add(&self.of(rhs)?, 1)?,
            BinOp::Sub => self.of(lhs)?.add(&self.of(rhs)?, -1)?,
            BinOp::Mul => {
                let (a, b) = (self.of(lhs)?, self.of(rhs)?);
                match (a.as_const(), b.as_const()) {
                    (Some(k), _) => b.scale(k)?,
                    (_, Some(k)) => a.scale(k)?,
                    _ => return None,
                }
            }
            _ => return None,
        };
        // Folded constants that leave the value's range would wrap in the
        // scalar code; such forms are not trusted.
        (ty.fits(form.offset) && ty.fits(form.stride)).then_some(form)
    }
}

// =============================================================================
// Array Accesses
// =============================================================================

/// A load or store in the loop body.
#[derive(Debug, Clone)]
pub struct ArrayAccess {
    pub inst: InstId,
    /// The array reference; always loop-invariant.
    pub base: InstId,
    pub index: InstId,
    pub affine: Affine,
    pub is_write: bool,
    pub elem: ScalarType,
}

impl ArrayAccess {
    /// Touches a different element in every iteration.
    #[inline]
    pub fn is_lane_varying(&self) -> bool {
        !self.affine.is_invariant()
    }
}

/// Collect the body's accesses in program order.
pub fn collect(
    func: &Function,
    region: &LoopRegion,
    affine: &mut AffineAnalysis<'_>,
    index_ty: ScalarType,
) -> Legality<Vec<ArrayAccess>> {
    let mut accesses = Vec::new();
    for &v in &func.block(region.body).insts {
        let inst = func.inst(v);
        let is_write = match inst.opcode {
            Opcode::ArrayGet => false,
            Opcode::ArraySet => true,
            _ => continue,
        };
        let (base, index) = (inst.args[0], inst.args[1]);
        if !region.is_invariant(func, base) {
            return Err(RejectReason::NonAffineAccess);
        }
        let form = affine.of(index).ok_or(RejectReason::NonAffineAccess)?;
        if !matches!(form.stride, 0 | 1) {
            return Err(RejectReason::NonUnitStride);
        }
        if form.stride != 0 && func.value_type(index).scalar() != Some(index_ty) {
            return Err(RejectReason::UnsupportedType);
        }
        let elem = func
            .value_type(base)
            .array_elem()
            .ok_or(RejectReason::InternalInvariant)?;
        accesses.push(ArrayAccess {
            inst: v,
            base,
            index,
            affine: form,
            is_write,
            elem,
        });
    }
    Ok(accesses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Cfg, DominatorTree, FunctionBuilder, LoopAnalysis, Type};
    use crate::opt::vectorize::{induction, region};

    #[test]
    fn test_affine_arithmetic() {
        let a = InstId::new(1);
        let x = Affine::value(a).add(&Affine::constant(3), 1).unwrap();
        let y = Affine::value(a).add(&Affine::constant(-1), 1).unwrap();
        assert_eq!(y.distance_to(&x), Some(4));
        let gone = x.add(&Affine::value(a), -1).unwrap();
        assert!(gone.terms.is_empty());
        assert_eq!(gone.offset, 3);
        assert_eq!(x.scale(2).unwrap().terms.as_slice(), &[(a, 2)]);
    }

    #[test]
    fn test_stencil_indices() {
        // a[i] = b[i - 1] + b[i] + b[i + 1] for i in 1..n-1
        let mut b = FunctionBuilder::new("stencil", Type::Void);
        let a = b.param(Type::Ref(ScalarType::I32));
        let src = b.param(Type::Ref(ScalarType::I32));
        let n = b.param(Type::I32);
        let one = b.iconst(ScalarType::I32, 1);
        let limit = b.sub(n, one);
        let lp = b.counted_loop(ScalarType::I32, one, limit);
        let minus1 = b.iconst(ScalarType::I32, -1);
        let im1 = b.add(lp.index, minus1);
        let plus1 = b.iconst(ScalarType::I32, 1);
        let ip1 = b.add(lp.index, plus1);
        let l0 = b.array_get(src, im1);
        let l1 = b.array_get(src, lp.index);
        let l2 = b.array_get(src, ip1);
        let s0 = b.add(l0, l1);
        let s1 = b.add(s0, l2);
        b.array_set(a, lp.index, s1);
        b.close_loop(&lp, &[]);
        b.ret(None);
        let f = b.finish();

        let cfg = Cfg::build(&f);
        let dom = DominatorTree::build(&cfg);
        let loops = LoopAnalysis::compute(&cfg, &dom);
        let region = region::extract(&f, &cfg, &loops.loops[0]).unwrap();
        let carried = induction::classify(&f, &region, &f.users()).unwrap();
        let mut affine = AffineAnalysis::new(&f, &region, &carried);
        let accesses = collect(&f, &region, &mut affine, ScalarType::I32).unwrap();

        let offsets: Vec<_> = accesses.iter().map(|a| a.affine.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2, 1]);
        assert!(accesses.iter().all(|a| a.affine.stride == 1 && a.affine.terms.is_empty()));
        assert!(accesses[3].is_write);
        assert_eq!(accesses[0].base, src);
    }
}
