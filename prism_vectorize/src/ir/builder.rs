//! Convenience API for constructing functions.
//!
//! ```text
//! let mut b = FunctionBuilder::new("scale", Type::Void);
//! let x = b.param(Type::Ref(ScalarType::F32));
//! let lp = b.counted_loop(ScalarType::I32, zero, hundred);
//! ... body ...
//! b.close_loop(&lp, &[]);
//! b.ret(None);
//! ```

use super::function::Function;
use super::instruction::{BinOp, BlockId, CmpOp, Const, InstId, Opcode, Terminator};
use super::types::{ScalarType, Type};

/// Blocks and primary induction of a loop opened by
/// [`FunctionBuilder::counted_loop`].
#[derive(Debug, Clone, Copy)]
pub struct CountedLoop {
    pub preheader: BlockId,
    pub header: BlockId,
    pub body: BlockId,
    pub exit: BlockId,
    /// The induction phi, running from `start` while `< limit`.
    pub index: InstId,
}

/// Appends instructions to a current block of a [`Function`].
#[derive(Debug)]
pub struct FunctionBuilder {
    func: Function,
    current: BlockId,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, ret: Type) -> Self {
        let func = Function::new(name, ret);
        let current = func.entry;
        FunctionBuilder { func, current }
    }

    pub fn param(&mut self, ty: Type) -> InstId {
        self.func.add_param(ty, false)
    }

    /// Parameter the caller promises is not aliased by any other parameter.
    pub fn param_noalias(&mut self, ty: Type) -> InstId {
        self.func.add_param(ty, true)
    }

    pub fn create_block(&mut self) -> BlockId {
        self.func.create_block()
    }

    pub fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    #[inline]
    pub fn current_block(&self) -> BlockId {
        self.current
    }

    pub fn func(&self) -> &Function {
        &self.func
    }

    pub fn finish(self) -> Function {
        self.func
    }

    fn emit(&mut self, opcode: Opcode, ty: Type, args: &[InstId]) -> InstId {
        self.func.append_inst(self.current, opcode, ty, args)
    }

    // =========================================================================
    // Scalars
    // =========================================================================

    /// Integer constant, wrapped to `ty`.
    pub fn iconst(&mut self, ty: ScalarType, value: i64) -> InstId {
        self.emit(
            Opcode::Const(Const::Int(ty.wrap(value))),
            Type::Scalar(ty),
            &[],
        )
    }

    pub fn fconst(&mut self, ty: ScalarType, value: f64) -> InstId {
        self.emit(Opcode::Const(Const::Float(value)), Type::Scalar(ty), &[])
    }

    /// Binary operation; the result has the type of `lhs`.
    pub fn binary(&mut self, op: BinOp, lhs: InstId, rhs: InstId) -> InstId {
        let ty = self.func.value_type(lhs);
        self.emit(Opcode::Binary(op), ty, &[lhs, rhs])
    }

    pub fn add(&mut self, lhs: InstId, rhs: InstId) -> InstId {
        self.binary(BinOp::Add, lhs, rhs)
    }

    pub fn sub(&mut self, lhs: InstId, rhs: InstId) -> InstId {
        self.binary(BinOp::Sub, lhs, rhs)
    }

    pub fn mul(&mut self, lhs: InstId, rhs: InstId) -> InstId {
        self.binary(BinOp::Mul, lhs, rhs)
    }

    pub fn compare(&mut self, op: CmpOp, lhs: InstId, rhs: InstId) -> InstId {
        self.emit(Opcode::Compare(op), Type::BOOL, &[lhs, rhs])
    }

    pub fn select(&mut self, cond: InstId, if_true: InstId, if_false: InstId) -> InstId {
        let ty = self.func.value_type(if_true);
        self.emit(Opcode::Select, ty, &[cond, if_true, if_false])
    }

    pub fn convert(&mut self, to: ScalarType, value: InstId) -> InstId {
        self.emit(Opcode::Convert, Type::Scalar(to), &[value])
    }

    // =========================================================================
    // Arrays
    // =========================================================================

    pub fn new_array(&mut self, elem: ScalarType, len: InstId) -> InstId {
        self.emit(Opcode::NewArray, Type::Ref(elem), &[len])
    }

    pub fn array_get(&mut self, array: InstId, index: InstId) -> InstId {
        let elem = self
            .func
            .value_type(array)
            .array_elem()
            .map_or(Type::Void, Type::Scalar);
        self.emit(Opcode::ArrayGet, elem, &[array, index])
    }

    pub fn array_set(&mut self, array: InstId, index: InstId, value: InstId) -> InstId {
        self.emit(Opcode::ArraySet, Type::Void, &[array, index, value])
    }

    pub fn array_length(&mut self, array: InstId) -> InstId {
        self.emit(Opcode::ArrayLength, Type::I32, &[array])
    }

    // =========================================================================
    // Control Flow
    // =========================================================================

    /// Empty phi in the current block.
    pub fn phi(&mut self, ty: Type) -> InstId {
        self.func.add_phi(self.current, ty)
    }

    pub fn phi_incoming(&mut self, phi: InstId, pred: BlockId, value: InstId) {
        self.func.add_phi_incoming(phi, pred, value);
    }

    pub fn jump(&mut self, target: BlockId) {
        self.func.set_terminator(self.current, Terminator::Jump(target));
    }

    pub fn branch(&mut self, cond: InstId, then_block: BlockId, else_block: BlockId) {
        self.func.set_terminator(
            self.current,
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            },
        );
    }

    pub fn ret(&mut self, value: Option<InstId>) {
        self.func.set_terminator(self.current, Terminator::Return(value));
    }

    // =========================================================================
    // Loops
    // =========================================================================

    /// Open `for (i = start; i < limit; i++)`.
    ///
    /// The current block becomes the preheader. On return the builder is
    /// positioned in the loop body.
    pub fn counted_loop(&mut self, ty: ScalarType, start: InstId, limit: InstId) -> CountedLoop {
        let preheader = self.current;
        let header = self.create_block();
        let body = self.create_block();
        let exit = self.create_block();
        self.jump(header);

        self.switch_to(header);
        let index = self.phi(Type::Scalar(ty));
        self.phi_incoming(index, preheader, start);
        let cond = self.compare(CmpOp::Lt, index, limit);
        self.branch(cond, body, exit);

        self.switch_to(body);
        CountedLoop {
            preheader,
            header,
            body,
            exit,
            index,
        }
    }

    /// Additional loop-carried value entering the loop as `init`.
    pub fn loop_phi(&mut self, lp: &CountedLoop, init: InstId) -> InstId {
        let ty = self.func.value_type(init);
        let phi = self.func.add_phi(lp.header, ty);
        self.func.add_phi_incoming(phi, lp.preheader, init);
        phi
    }

    /// Close the loop from the current block: increment the index, feed
    /// `updates` (phi, next value) into the header and continue in the exit.
    pub fn close_loop(&mut self, lp: &CountedLoop, updates: &[(InstId, InstId)]) {
        let latch = self.current;
        let ty = self.func.value_type(lp.index).scalar().unwrap_or(ScalarType::I32);
        let one = self.iconst(ty, 1);
        let next = self.add(lp.index, one);
        self.func.add_phi_incoming(lp.index, latch, next);
        for &(phi, value) in updates {
            self.func.add_phi_incoming(phi, latch, value);
        }
        self.jump(lp.header);
        self.switch_to(lp.exit);
    }
}
