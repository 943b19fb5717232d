//! Instructions, terminators and blocks.
//!
//! Every instruction produces at most one value and is identified by its
//! [`InstId`]; values and instructions are the same thing. Vector operations
//! that accept a governing predicate take it as an optional trailing operand.
//! Predication is merging: inactive lanes of an arithmetic result keep the
//! first operand's lane, masked loads produce zero lanes and masked stores
//! leave memory untouched.

use smallvec::SmallVec;

use super::arena::Id;
use super::types::{ScalarType, Type};

/// Instruction handle, also used as the SSA value name.
pub type InstId = Id<Instruction>;

/// Basic block handle.
pub type BlockId = Id<Block>;

// =============================================================================
// Constants and Operators
// =============================================================================

/// Immediate value of a `Const` instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Const {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Const {
    #[inline]
    pub const fn as_int(self) -> Option<i64> {
        match self {
            Const::Int(v) => Some(v),
            _ => None,
        }
    }
}

/// Two-operand arithmetic and bitwise operators.
///
/// Integer arithmetic wraps at the operand width. `Min`/`Max` are signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Min,
    Max,
}

impl BinOp {
    #[inline]
    pub const fn is_commutative(self) -> bool {
        !matches!(self, BinOp::Sub)
    }

    /// Whether `op` is defined on operands of type `ty`.
    pub const fn supports(self, ty: ScalarType) -> bool {
        match self {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Min | BinOp::Max => {
                ty.is_int() || ty.is_float()
            }
            BinOp::And | BinOp::Or | BinOp::Xor => {
                ty.is_int() || matches!(ty, ScalarType::Bool)
            }
        }
    }

    /// Identity element, if the operator has one for integers of type `ty`.
    pub const fn int_identity(self, ty: ScalarType) -> Option<i64> {
        match self {
            BinOp::Add | BinOp::Sub | BinOp::Or | BinOp::Xor => Some(0),
            BinOp::Mul => Some(1),
            BinOp::And => Some(-1),
            BinOp::Min => Some(ty.int_max()),
            BinOp::Max => Some(ty.int_min()),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            BinOp::Add => "Add",
            BinOp::Sub => "Sub",
            BinOp::Mul => "Mul",
            BinOp::And => "And",
            BinOp::Or => "Or",
            BinOp::Xor => "Xor",
            BinOp::Min => "Min",
            BinOp::Max => "Max",
        }
    }
}

/// Comparison operators. All but `Ult` are signed; `Ult` compares the
/// operands as unsigned integers of their width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Ult,
}

impl CmpOp {
    /// The operator that gives the same result with operands exchanged.
    pub const fn swapped(self) -> CmpOp {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
            other => other,
        }
    }

    /// Logical negation, for signed operators.
    pub const fn negated(self) -> Option<CmpOp> {
        match self {
            CmpOp::Eq => Some(CmpOp::Ne),
            CmpOp::Ne => Some(CmpOp::Eq),
            CmpOp::Lt => Some(CmpOp::Ge),
            CmpOp::Le => Some(CmpOp::Gt),
            CmpOp::Gt => Some(CmpOp::Le),
            CmpOp::Ge => Some(CmpOp::Lt),
            CmpOp::Ult => None,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            CmpOp::Eq => "Equal",
            CmpOp::Ne => "NotEqual",
            CmpOp::Lt => "LessThan",
            CmpOp::Le => "LessThanOrEqual",
            CmpOp::Gt => "GreaterThan",
            CmpOp::Ge => "GreaterThanOrEqual",
            CmpOp::Ult => "Below",
        }
    }
}

// =============================================================================
// Opcodes
// =============================================================================

/// Operation performed by an instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Opcode {
    // Scalar
    Const(Const),
    /// Function parameter by position.
    Param(u16),
    /// SSA merge; incoming blocks are in [`Instruction::phi_blocks`].
    Phi,
    Binary(BinOp),
    Compare(CmpOp),
    /// `[cond, if_true, if_false]`
    Select,
    /// Numeric conversion to the instruction's type.
    Convert,

    // Memory
    /// `[length]`, allocates a zeroed array.
    NewArray,
    /// `[array, index]`
    ArrayGet,
    /// `[array, index, value]`
    ArraySet,
    /// `[array]`
    ArrayLength,

    // Vector
    /// Run-time lane count of vectors with the given element type.
    VecLaneCount(ScalarType),
    /// `[scalar]`, broadcast to every lane.
    VecReplicateScalar,
    /// `[first, rest]`: lane 0 gets `first`, every other lane gets `rest`.
    VecSetScalars,
    /// `[start, step]`: lane k gets `start + k * step`.
    VecSeries,
    /// `[array, index, pred?]`, loads consecutive lanes from `index`.
    VecLoad,
    /// `[array, index, value, pred?]`
    VecStore,
    /// `[lhs, rhs, pred?]`
    VecBinary(BinOp),
    /// `[value, pred?]`, lane-wise conversion to the result element type.
    VecConvert,
    /// `[vector]`, horizontal fold of all lanes into a scalar.
    VecReduce(BinOp),
    /// `[low, high]`: lane k active while `low + k < high` (unsigned).
    VecPredWhile,
}

impl Opcode {
    /// Operand count not counting an optional governing predicate.
    /// `None` for phis, whose arity follows the block's predecessors.
    pub const fn base_arity(self) -> Option<usize> {
        Some(match self {
            Opcode::Phi => return None,
            Opcode::Const(_) | Opcode::Param(_) | Opcode::VecLaneCount(_) => 0,
            Opcode::Convert
            | Opcode::NewArray
            | Opcode::ArrayLength
            | Opcode::VecReplicateScalar
            | Opcode::VecConvert
            | Opcode::VecReduce(_) => 1,
            Opcode::Binary(_)
            | Opcode::Compare(_)
            | Opcode::ArrayGet
            | Opcode::VecSetScalars
            | Opcode::VecSeries
            | Opcode::VecLoad
            | Opcode::VecBinary(_)
            | Opcode::VecPredWhile => 2,
            Opcode::Select | Opcode::ArraySet | Opcode::VecStore => 3,
        })
    }

    /// Whether the opcode accepts a trailing governing predicate.
    #[inline]
    pub const fn accepts_predicate(self) -> bool {
        matches!(
            self,
            Opcode::VecLoad | Opcode::VecStore | Opcode::VecBinary(_) | Opcode::VecConvert
        )
    }

    #[inline]
    pub const fn is_vector(self) -> bool {
        matches!(
            self,
            Opcode::VecLaneCount(_)
                | Opcode::VecReplicateScalar
                | Opcode::VecSetScalars
                | Opcode::VecSeries
                | Opcode::VecLoad
                | Opcode::VecStore
                | Opcode::VecBinary(_)
                | Opcode::VecConvert
                | Opcode::VecReduce(_)
                | Opcode::VecPredWhile
        )
    }

    /// Neither reads memory, writes memory nor can fault. Pure instructions
    /// may be moved to any point dominated by their operands.
    #[inline]
    pub const fn is_pure(self) -> bool {
        matches!(
            self,
            Opcode::Const(_)
                | Opcode::Binary(_)
                | Opcode::Compare(_)
                | Opcode::Select
                | Opcode::Convert
                | Opcode::ArrayLength
                | Opcode::VecLaneCount(_)
                | Opcode::VecReplicateScalar
                | Opcode::VecSetScalars
                | Opcode::VecSeries
        )
    }

    /// Mnemonic used by the printer.
    pub const fn name(self) -> &'static str {
        match self {
            Opcode::Const(_) => "Const",
            Opcode::Param(_) => "Param",
            Opcode::Phi => "Phi",
            Opcode::Binary(op) => op.name(),
            Opcode::Compare(op) => op.name(),
            Opcode::Select => "Select",
            Opcode::Convert => "TypeConversion",
            Opcode::NewArray => "NewArray",
            Opcode::ArrayGet => "ArrayGet",
            Opcode::ArraySet => "ArraySet",
            Opcode::ArrayLength => "ArrayLength",
            Opcode::VecLaneCount(_) => "VecLaneCount",
            Opcode::VecReplicateScalar => "VecReplicateScalar",
            Opcode::VecSetScalars => "VecSetScalars",
            Opcode::VecSeries => "VecSeries",
            Opcode::VecLoad => "VecLoad",
            Opcode::VecStore => "VecStore",
            Opcode::VecBinary(BinOp::Add) => "VecAdd",
            Opcode::VecBinary(BinOp::Sub) => "VecSub",
            Opcode::VecBinary(BinOp::Mul) => "VecMul",
            Opcode::VecBinary(BinOp::And) => "VecAnd",
            Opcode::VecBinary(BinOp::Or) => "VecOr",
            Opcode::VecBinary(BinOp::Xor) => "VecXor",
            Opcode::VecBinary(BinOp::Min) => "VecMin",
            Opcode::VecBinary(BinOp::Max) => "VecMax",
            Opcode::VecConvert => "VecConvert",
            Opcode::VecReduce(_) => "VecReduce",
            Opcode::VecPredWhile => "VecPredWhile",
        }
    }
}

// =============================================================================
// Instruction
// =============================================================================

/// A single SSA instruction.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    /// Result type; `Void` for stores.
    pub ty: Type,
    pub args: SmallVec<[InstId; 4]>,
    /// Incoming blocks of a phi, parallel to `args`. Empty otherwise.
    pub phi_blocks: SmallVec<[BlockId; 2]>,
    /// Block holding the instruction.
    pub block: BlockId,
}

impl Instruction {
    pub fn new(opcode: Opcode, ty: Type, args: &[InstId], block: BlockId) -> Self {
        Instruction {
            opcode,
            ty,
            args: SmallVec::from_slice(args),
            phi_blocks: SmallVec::new(),
            block,
        }
    }

    /// Constant payload for `Const` instructions.
    #[inline]
    pub fn as_const(&self) -> Option<Const> {
        match self.opcode {
            Opcode::Const(c) => Some(c),
            _ => None,
        }
    }

    /// Integer payload for integer `Const` instructions.
    #[inline]
    pub fn as_int_const(&self) -> Option<i64> {
        self.as_const().and_then(Const::as_int)
    }

    /// Governing predicate of a predicated vector operation.
    pub fn predicate(&self) -> Option<InstId> {
        let base = self.opcode.base_arity()?;
        if self.opcode.accepts_predicate() && self.args.len() == base + 1 {
            self.args.last().copied()
        } else {
            None
        }
    }

    /// Incoming value of a phi along the edge from `pred`.
    pub fn phi_input(&self, pred: BlockId) -> Option<InstId> {
        self.phi_blocks
            .iter()
            .position(|&b| b == pred)
            .map(|i| self.args[i])
    }
}

// =============================================================================
// Blocks
// =============================================================================

/// Block terminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    Jump(BlockId),
    Branch {
        cond: InstId,
        then_block: BlockId,
        else_block: BlockId,
    },
    Return(Option<InstId>),
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match *self {
            Terminator::Jump(t) => smallvec::smallvec![t],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => smallvec::smallvec![then_block, else_block],
            Terminator::Return(_) | Terminator::Unreachable => SmallVec::new(),
        }
    }

    /// Value operand, if any.
    pub fn operand(&self) -> Option<InstId> {
        match *self {
            Terminator::Branch { cond, .. } => Some(cond),
            Terminator::Return(v) => v,
            _ => None,
        }
    }

    /// Redirect every edge to `from` so it goes to `to`.
    pub fn retarget(&mut self, from: BlockId, to: BlockId) {
        match self {
            Terminator::Jump(t) if *t == from => *t = to,
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => {
                if *then_block == from {
                    *then_block = to;
                }
                if *else_block == from {
                    *else_block = to;
                }
            }
            _ => {}
        }
    }
}

/// Marker left on loop headers by the vectorizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopHint {
    #[default]
    None,
    /// Header of a loop produced by vectorization.
    Vectorized,
    /// Header of a scalar loop that finishes a vectorized loop's iterations.
    Cleanup,
}

/// A basic block: phis, straight-line instructions and a terminator.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub phis: Vec<InstId>,
    pub insts: Vec<InstId>,
    pub term: Option<Terminator>,
    pub hint: LoopHint,
}

impl Block {
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        self.term.map(|t| t.successors()).unwrap_or_default()
    }
}
