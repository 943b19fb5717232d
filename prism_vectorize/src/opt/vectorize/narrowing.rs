//! Type-width narrowing.
//!
//! Java-style code widens before arithmetic and truncates on store:
//!
//! ```text
//! x[i] = (int) (y[i] + 1L)      // TypeConversion.i32(Add.i64(TypeConversion.i64(y[i]), 1))
//! ```
//!
//! Truncation commutes with wrapping add, sub, mul and the bitwise ops, so
//! the whole expression can run at the narrow width:
//!
//! ```text
//! x[i] = y[i] + 1               // VecAdd.i32, twice the lanes of VecAdd.i64
//! ```
//!
//! A wide operand is accepted when it is a sign extension of a narrow value
//! used only here, or an integer constant inside the narrow type's signed
//! range. The constant is converted once in the vector preheader and
//! broadcast.
//!
//! Uniform conversions (`(int) y[0]`) need no rewriting: they are computed
//! once per vector iteration, or once before the loop when their operands
//! allow, and broadcast.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::ir::{BinOp, Function, InstId, Opcode, ScalarType, User};

use super::region::LoopRegion;
use super::shape::{BodyShapes, ValueKind};

/// One operand of a narrowed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrowOperand {
    /// A value that already has the narrow type.
    Value(InstId),
    /// A constant known to fit the narrow type.
    Const(i64),
}

/// A wide binary operation rewritten at the narrow width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NarrowOp {
    pub op: BinOp,
    pub ty: ScalarType,
    pub lhs: NarrowOperand,
    pub rhs: NarrowOperand,
}

/// Rewrites keyed by the truncating conversion they replace.
#[derive(Debug, Clone, Default)]
pub struct NarrowingPlan {
    rewrites: FxHashMap<InstId, NarrowOp>,
    /// Wide instructions made dead by the rewrites.
    absorbed: FxHashSet<InstId>,
}

impl NarrowingPlan {
    #[inline]
    pub fn rewrite(&self, v: InstId) -> Option<&NarrowOp> {
        self.rewrites.get(&v)
    }

    #[inline]
    pub fn is_absorbed(&self, v: InstId) -> bool {
        self.absorbed.contains(&v)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rewrites.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rewrites.is_empty()
    }
}

fn narrowable(op: BinOp) -> bool {
    matches!(
        op,
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::And | BinOp::Or | BinOp::Xor
    )
}

/// Find every narrowable truncation in the loop body.
pub fn find(
    func: &Function,
    region: &LoopRegion,
    shapes: &BodyShapes,
    users: &FxHashMap<InstId, SmallVec<[User; 4]>>,
) -> NarrowingPlan {
    let mut plan = NarrowingPlan::default();
    let only_user = |v: InstId, user: InstId| {
        users.get(&v).map(|u| u.as_slice()) == Some(&[User::Inst(user)][..])
    };

    for &v in &func.block(region.body).insts {
        let inst = func.inst(v);
        if inst.opcode != Opcode::Convert || *shapes.kind(v) != ValueKind::Varying {
            continue;
        }
        let Some(narrow) = inst.ty.scalar().filter(|s| s.is_int()) else {
            continue;
        };
        let wide_id = inst.args[0];
        let wide = func.inst(wide_id);
        let Opcode::Binary(op) = wide.opcode else {
            continue;
        };
        let Some(wide_ty) = wide.ty.scalar().filter(|s| s.is_int()) else {
            continue;
        };
        if !narrowable(op)
            || wide_ty.bits() <= narrow.bits()
            || *shapes.kind(wide_id) != ValueKind::Varying
            || !only_user(wide_id, v)
        {
            continue;
        }

        let mut absorbed: SmallVec<[InstId; 3]> = smallvec::smallvec![wide_id];
        let mut operand = |arg: InstId| -> Option<NarrowOperand> {
            if let Some(k) = func.int_const(arg) {
                return narrow.fits(k).then_some(NarrowOperand::Const(k));
            }
            let ext = func.inst(arg);
            let source = *ext.args.first()?;
            let is_sign_extension = ext.opcode == Opcode::Convert
                && func.value_type(source).scalar() == Some(narrow)
                && only_user(arg, wide_id);
            if !is_sign_extension {
                return None;
            }
            if !region.is_invariant(func, arg) {
                absorbed.push(arg);
            }
            Some(NarrowOperand::Value(source))
        };
        let (Some(lhs), Some(rhs)) = (operand(wide.args[0]), operand(wide.args[1])) else {
            continue;
        };

        tracing::trace!(
            convert = ?v,
            op = op.name(),
            from = %wide_ty,
            to = %narrow,
            "narrowed operation"
        );
        plan.rewrites.insert(
            v,
            NarrowOp {
                op,
                ty: narrow,
                lhs,
                rhs,
            },
        );
        plan.absorbed.extend(absorbed);
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Cfg, DominatorTree, FunctionBuilder, LoopAnalysis, Type};
    use crate::opt::vectorize::access::{self, AffineAnalysis};
    use crate::opt::vectorize::{induction, region, shape};

    fn plan_for(f: &Function) -> (NarrowingPlan, BodyShapes) {
        let cfg = Cfg::build(f);
        let dom = DominatorTree::build(&cfg);
        let loops = LoopAnalysis::compute(&cfg, &dom);
        let region = region::extract(f, &cfg, &loops.loops[0]).unwrap();
        let users = f.users();
        let carried = induction::classify(f, &region, &users).unwrap();
        let mut affine = AffineAnalysis::new(f, &region, &carried);
        let accesses = access::collect(f, &region, &mut affine, carried.primary.ty).unwrap();
        let shapes = shape::analyze(f, &region, &carried, &accesses, &mut affine).unwrap();
        (find(f, &region, &shapes, &users), shapes)
    }

    /// `x[i] = (int) (y[i] + k)` with a long constant `k`.
    fn add_long_constant(k: i64) -> (Function, InstId, InstId) {
        let mut b = FunctionBuilder::new("f", Type::Void);
        let x = b.param(Type::Ref(ScalarType::I32));
        let y = b.param(Type::Ref(ScalarType::I32));
        let zero = b.iconst(ScalarType::I32, 0);
        let n = b.array_length(x);
        let lp = b.counted_loop(ScalarType::I32, zero, n);
        let v = b.array_get(y, lp.index);
        let wide = b.convert(ScalarType::I64, v);
        let k = b.iconst(ScalarType::I64, k);
        let sum = b.add(wide, k);
        let narrow = b.convert(ScalarType::I32, sum);
        b.array_set(x, lp.index, narrow);
        b.close_loop(&lp, &[]);
        b.ret(None);
        (b.finish(), narrow, v)
    }

    #[test]
    fn test_narrow_add_of_long_constant() {
        let (f, narrow, load) = add_long_constant(1);
        let (plan, _) = plan_for(&f);
        assert_eq!(plan.len(), 1);
        assert_eq!(
            plan.rewrite(narrow),
            Some(&NarrowOp {
                op: BinOp::Add,
                ty: ScalarType::I32,
                lhs: NarrowOperand::Value(load),
                rhs: NarrowOperand::Const(1),
            })
        );
        // The widening conversion and the wide add disappear.
        let absorbed = f
            .block(f.inst(narrow).block)
            .insts
            .iter()
            .filter(|&&v| plan.is_absorbed(v))
            .count();
        assert_eq!(absorbed, 2);
    }

    #[test]
    fn test_constant_out_of_range_not_narrowed() {
        let (f, _, _) = add_long_constant(1 << 40);
        let (plan, _) = plan_for(&f);
        assert!(plan.is_empty());
    }
}
