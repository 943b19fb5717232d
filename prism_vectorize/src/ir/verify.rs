//! Structural and type verifier.
//!
//! Run after construction in tests and after every vectorized loop is
//! materialized. Only live (laid out, reachable) blocks are checked.

use rustc_hash::FxHashMap;

use super::cfg::{Cfg, DominatorTree};
use super::function::Function;
use super::instruction::{BlockId, CmpOp, InstId, Opcode, Terminator};
use super::types::{ScalarType, Type, VectorShape};
use crate::error::IrError;

/// Verify `func`, returning the first problem found.
pub fn verify(func: &Function) -> Result<(), IrError> {
    for &block in &func.layout {
        let term = func.block(block).term.ok_or(IrError::MissingTerminator(block))?;
        for target in term.successors() {
            if !func.layout.contains(&target) {
                return Err(IrError::UnknownBlock { block, target });
            }
        }
    }

    let cfg = Cfg::build(func);
    let dom = DominatorTree::build(&cfg);
    let positions = positions(func, &cfg);
    let ctx = Verifier {
        func,
        cfg: &cfg,
        dom: &dom,
        positions,
    };

    for &block in cfg.rpo() {
        for &phi in &func.block(block).phis {
            ctx.check_phi(block, phi)?;
        }
        for &inst in &func.block(block).insts {
            ctx.check_operands(inst)?;
            check_types(func, inst)?;
        }
        ctx.check_terminator(block)?;
    }
    Ok(())
}

/// Position of every live instruction within its block; phis come first.
fn positions(func: &Function, cfg: &Cfg) -> FxHashMap<InstId, (BlockId, usize)> {
    let mut map = FxHashMap::default();
    for &block in cfg.rpo() {
        for (i, v) in func.block_values(block).enumerate() {
            map.insert(v, (block, i));
        }
    }
    map
}

struct Verifier<'f> {
    func: &'f Function,
    cfg: &'f Cfg,
    dom: &'f DominatorTree,
    positions: FxHashMap<InstId, (BlockId, usize)>,
}

impl Verifier<'_> {
    /// `value` must be available at the end of `block`.
    fn available_at_end(&self, value: InstId, block: BlockId, user: InstId) -> Result<(), IrError> {
        let &(def_block, _) = self
            .positions
            .get(&value)
            .ok_or(IrError::UndefinedValue(value))?;
        if self.dom.dominates(def_block, block) {
            Ok(())
        } else {
            Err(IrError::NotDominated { value, user })
        }
    }

    fn check_operands(&self, inst: InstId) -> Result<(), IrError> {
        let &(block, pos) = &self.positions[&inst];
        for &arg in &self.func.inst(inst).args {
            let &(def_block, def_pos) = self
                .positions
                .get(&arg)
                .ok_or(IrError::UndefinedValue(arg))?;
            let ok = if def_block == block {
                def_pos < pos
            } else {
                self.dom.dominates(def_block, block)
            };
            if !ok {
                return Err(IrError::NotDominated {
                    value: arg,
                    user: inst,
                });
            }
        }
        Ok(())
    }

    fn check_phi(&self, block: BlockId, phi: InstId) -> Result<(), IrError> {
        let inst = self.func.inst(phi);
        let preds = self.cfg.preds(block);
        if inst.args.len() != preds.len() || inst.phi_blocks.len() != inst.args.len() {
            return Err(IrError::PhiArity {
                phi,
                incoming: inst.args.len(),
                preds: preds.len(),
            });
        }
        for &pred in preds {
            let value = inst
                .phi_input(pred)
                .ok_or(IrError::PhiMissingEdge { phi, pred })?;
            self.available_at_end(value, pred, phi)?;
            if self.func.value_type(value) != inst.ty {
                return Err(mismatch(phi, "phi input type differs from phi type"));
            }
        }
        Ok(())
    }

    fn check_terminator(&self, block: BlockId) -> Result<(), IrError> {
        let Some(term) = self.func.block(block).term else {
            return Err(IrError::MissingTerminator(block));
        };
        match term {
            Terminator::Branch { cond, .. } => {
                let &(def_block, _) = self
                    .positions
                    .get(&cond)
                    .ok_or(IrError::UndefinedValue(cond))?;
                if !self.dom.dominates(def_block, block) {
                    return Err(IrError::NotDominated {
                        value: cond,
                        user: cond,
                    });
                }
                if !self.func.value_type(cond).is_bool() {
                    return Err(mismatch(cond, "branch condition is not bool"));
                }
            }
            Terminator::Return(value) => {
                let ty = value.map_or(Type::Void, |v| self.func.value_type(v));
                if ty != self.func.ret {
                    return Err(IrError::ReturnType(block));
                }
                if let Some(v) = value {
                    if !self.positions.contains_key(&v) {
                        return Err(IrError::UndefinedValue(v));
                    }
                }
            }
            Terminator::Jump(_) | Terminator::Unreachable => {}
        }
        Ok(())
    }
}

fn mismatch(inst: InstId, detail: &str) -> IrError {
    IrError::TypeMismatch {
        inst,
        detail: detail.to_string(),
    }
}

fn scalar(func: &Function, v: InstId) -> Option<ScalarType> {
    func.value_type(v).scalar()
}

fn int_scalar(func: &Function, v: InstId) -> bool {
    func.value_type(v).is_int()
}

/// Whether a predicate shape governs vectors of `shape`.
fn governs(pred: VectorShape, shape: VectorShape) -> bool {
    pred.lanes == shape.lanes && (!pred.lanes.is_scalable() || pred.elem.bits() == shape.elem.bits())
}

fn check_types(func: &Function, id: InstId) -> Result<(), IrError> {
    let inst = func.inst(id);
    let args = &inst.args;
    let ty = inst.ty;

    if let Some(base) = inst.opcode.base_arity() {
        let with_pred = inst.opcode.accepts_predicate() && args.len() == base + 1;
        if args.len() != base && !with_pred {
            return Err(IrError::Arity {
                inst: id,
                expected: base,
                found: args.len(),
            });
        }
    }

    let arg_ty = |i: usize| func.value_type(args[i]);

    let ok = match inst.opcode {
        Opcode::Const(_) => ty.scalar().is_some(),
        Opcode::Param(_) => ty != Type::Void,
        Opcode::Phi => true,
        Opcode::Binary(op) => {
            matches!(ty, Type::Scalar(s) if op.supports(s)) && arg_ty(0) == ty && arg_ty(1) == ty
        }
        Opcode::Compare(op) => {
            let same = arg_ty(0) == arg_ty(1);
            let operand_ok = match op {
                CmpOp::Eq | CmpOp::Ne => {
                    matches!(arg_ty(0), Type::Scalar(_) | Type::Ref(_))
                }
                CmpOp::Ult => arg_ty(0).is_int(),
                _ => matches!(arg_ty(0), Type::Scalar(s) if s != ScalarType::Bool),
            };
            ty.is_bool() && same && operand_ok
        }
        Opcode::Select => arg_ty(0).is_bool() && arg_ty(1) == ty && arg_ty(2) == ty,
        Opcode::Convert => ty.scalar().is_some() && scalar(func, args[0]).is_some(),
        Opcode::NewArray => matches!(ty, Type::Ref(_)) && int_scalar(func, args[0]),
        Opcode::ArrayGet => {
            matches!(arg_ty(0), Type::Ref(e) if ty == Type::Scalar(e)) && int_scalar(func, args[1])
        }
        Opcode::ArraySet => {
            matches!(arg_ty(0), Type::Ref(e) if arg_ty(2) == Type::Scalar(e))
                && int_scalar(func, args[1])
                && ty == Type::Void
        }
        Opcode::ArrayLength => matches!(arg_ty(0), Type::Ref(_)) && ty == Type::I32,
        Opcode::VecLaneCount(_) => ty.is_int(),
        Opcode::VecReplicateScalar => {
            matches!(ty, Type::Vector(s) if arg_ty(0) == Type::Scalar(s.elem))
        }
        Opcode::VecSetScalars => {
            matches!(ty, Type::Vector(s) if arg_ty(0) == Type::Scalar(s.elem) && arg_ty(1) == Type::Scalar(s.elem))
        }
        Opcode::VecSeries => {
            matches!(ty, Type::Vector(s) if s.elem.is_int()
                && arg_ty(0) == Type::Scalar(s.elem)
                && arg_ty(1) == Type::Scalar(s.elem))
        }
        Opcode::VecLoad => {
            matches!((arg_ty(0), ty), (Type::Ref(e), Type::Vector(s)) if s.elem == e)
                && int_scalar(func, args[1])
        }
        Opcode::VecStore => {
            matches!((arg_ty(0), arg_ty(2)), (Type::Ref(e), Type::Vector(s)) if s.elem == e)
                && int_scalar(func, args[1])
                && ty == Type::Void
        }
        Opcode::VecBinary(op) => {
            matches!(ty, Type::Vector(s) if op.supports(s.elem)) && arg_ty(0) == ty && arg_ty(1) == ty
        }
        Opcode::VecConvert => {
            matches!((arg_ty(0), ty), (Type::Vector(a), Type::Vector(b)) if a.lanes == b.lanes
                && (!a.lanes.is_scalable() || a.elem.bits() == b.elem.bits()))
        }
        Opcode::VecReduce(op) => {
            matches!(arg_ty(0), Type::Vector(s) if ty == Type::Scalar(s.elem) && op.supports(s.elem))
        }
        Opcode::VecPredWhile => {
            matches!(ty, Type::Predicate(_)) && arg_ty(0).is_int() && arg_ty(0) == arg_ty(1)
        }
    };
    if !ok {
        return Err(mismatch(id, inst.opcode.name()));
    }

    if let Some(pred) = inst.predicate() {
        let shape = match inst.opcode {
            Opcode::VecStore => arg_ty(2).vector_shape(),
            _ => ty.vector_shape(),
        };
        let governed = match (func.value_type(pred), shape) {
            (Type::Predicate(p), Some(s)) => governs(p, s),
            _ => false,
        };
        if !governed {
            return Err(mismatch(id, "governing predicate does not match vector shape"));
        }
    }
    Ok(())
}
