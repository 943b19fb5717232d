//! Intermediate representation consumed and produced by the vectorizer.

pub mod arena;
pub mod builder;
pub mod cfg;
pub mod function;
pub mod instruction;
pub mod printer;
pub mod types;
pub mod verify;

pub use arena::{Arena, BitSet, Id};
pub use builder::{CountedLoop, FunctionBuilder};
pub use cfg::{Cfg, DominatorTree, Loop, LoopAnalysis};
pub use function::{Function, Param, User};
pub use instruction::{
    BinOp, Block, BlockId, CmpOp, Const, InstId, Instruction, LoopHint, Opcode, Terminator,
};
pub use types::{Lanes, ScalarType, Type, VectorShape};
pub use verify::verify;
