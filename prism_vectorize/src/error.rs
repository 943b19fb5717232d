//! Error types shared by the IR, the interpreter and the vectorizer.

use thiserror::Error;

use crate::ir::{BlockId, InstId};

/// Structural or typing error found while building or verifying a function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrError {
    #[error("block {0} has no terminator")]
    MissingTerminator(BlockId),
    #[error("block {block} jumps to unknown block {target}")]
    UnknownBlock { block: BlockId, target: BlockId },
    #[error("instruction {0} is not defined")]
    UndefinedValue(InstId),
    #[error("use of {value} in {user} is not dominated by its definition")]
    NotDominated { value: InstId, user: InstId },
    #[error("phi {phi} has {incoming} incoming values but its block has {preds} predecessors")]
    PhiArity {
        phi: InstId,
        incoming: usize,
        preds: usize,
    },
    #[error("phi {phi} has no incoming value for predecessor {pred}")]
    PhiMissingEdge { phi: InstId, pred: BlockId },
    #[error("type mismatch at {inst}: {detail}")]
    TypeMismatch { inst: InstId, detail: String },
    #[error("wrong operand count at {inst}: expected {expected}, found {found}")]
    Arity {
        inst: InstId,
        expected: usize,
        found: usize,
    },
    #[error("return type mismatch in block {0}")]
    ReturnType(BlockId),
}

/// Fault raised while interpreting a function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecError {
    #[error("index {index} out of bounds for array of length {len}")]
    OutOfBounds { index: i64, len: usize },
    #[error("negative array size {0}")]
    NegativeSize(i64),
    #[error("unknown array reference {0}")]
    BadReference(usize),
    #[error("expected {expected} for {inst}")]
    TypeMismatch { inst: InstId, expected: &'static str },
    #[error("function expects {expected} arguments, got {found}")]
    ArgumentCount { expected: usize, found: usize },
    #[error("no phi input for edge from {0}")]
    MissingPhiInput(BlockId),
    #[error("reached unreachable code in {0}")]
    Unreachable(BlockId),
    #[error("instruction budget of {0} exhausted")]
    OutOfFuel(u64),
}

/// Failure while materializing a vectorized loop.
///
/// The pass never surfaces these to callers; they are turned into a rejected
/// decision and the scalar loop is kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("value {0} has no lowering in the vector loop")]
    Unmapped(InstId),
    #[error("unexpected instruction {0} in loop body")]
    Unexpected(InstId),
    #[error("rewritten function failed verification: {0}")]
    Verify(#[from] IrError),
}
