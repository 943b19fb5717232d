//! Functions: the unit the optimizer transforms.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::arena::Arena;
use super::instruction::{Block, BlockId, Const, InstId, Instruction, Opcode, Terminator};
use super::types::Type;

/// A formal parameter.
#[derive(Debug, Clone, Copy)]
pub struct Param {
    /// The `Param` instruction in the entry block.
    pub value: InstId,
    pub ty: Type,
    /// For array references: the caller guarantees this array is not
    /// reachable through any other parameter.
    pub noalias: bool,
}

/// Something that reads a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum User {
    Inst(InstId),
    Terminator(BlockId),
}

/// A function in block-structured SSA form.
///
/// Blocks listed in `layout` are the live blocks; the printer, verifier and
/// use queries only look at those. Blocks dropped from the layout stay in
/// the arena but are dead.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub ret: Type,
    pub insts: Arena<Instruction>,
    pub blocks: Arena<Block>,
    pub layout: Vec<BlockId>,
    pub params: Vec<Param>,
    pub entry: BlockId,
}

impl Function {
    /// Create a function with an empty entry block.
    pub fn new(name: impl Into<String>, ret: Type) -> Self {
        let mut blocks = Arena::new();
        let entry = blocks.alloc(Block::default());
        Function {
            name: name.into(),
            ret,
            insts: Arena::new(),
            blocks,
            layout: vec![entry],
            params: Vec::new(),
            entry,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.insts[id]
    }

    #[inline]
    pub fn inst_mut(&mut self, id: InstId) -> &mut Instruction {
        &mut self.insts[id]
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    #[inline]
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id]
    }

    #[inline]
    pub fn value_type(&self, v: InstId) -> Type {
        self.insts[v].ty
    }

    /// Integer value of `v` if it is an integer constant.
    #[inline]
    pub fn int_const(&self, v: InstId) -> Option<i64> {
        self.insts[v].as_int_const()
    }

    /// Parameter record for a `Param` instruction.
    pub fn param_of(&self, v: InstId) -> Option<&Param> {
        match self.insts[v].opcode {
            Opcode::Param(idx) => self.params.get(idx as usize),
            _ => None,
        }
    }

    /// Phis followed by ordinary instructions of `block`.
    pub fn block_values(&self, block: BlockId) -> impl Iterator<Item = InstId> + '_ {
        let b = &self.blocks[block];
        b.phis.iter().chain(b.insts.iter()).copied()
    }

    pub fn successors(&self, block: BlockId) -> SmallVec<[BlockId; 2]> {
        self.blocks[block].successors()
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Create a block at the end of the layout.
    pub fn create_block(&mut self) -> BlockId {
        let id = self.blocks.alloc(Block::default());
        self.layout.push(id);
        id
    }

    /// Create a block placed right after `after` in the layout.
    pub fn create_block_after(&mut self, after: BlockId) -> BlockId {
        let id = self.blocks.alloc(Block::default());
        let pos = self
            .layout
            .iter()
            .position(|&b| b == after)
            .map_or(self.layout.len(), |p| p + 1);
        self.layout.insert(pos, id);
        id
    }

    /// Append an instruction to the end of `block` (before its terminator).
    pub fn append_inst(
        &mut self,
        block: BlockId,
        opcode: Opcode,
        ty: Type,
        args: &[InstId],
    ) -> InstId {
        let id = self.insts.alloc(Instruction::new(opcode, ty, args, block));
        self.blocks[block].insts.push(id);
        id
    }

    /// Append an integer or boolean constant of scalar type `ty` to `block`.
    pub fn append_const(&mut self, block: BlockId, ty: Type, value: Const) -> InstId {
        self.append_inst(block, Opcode::Const(value), ty, &[])
    }

    /// Add an empty phi to `block`.
    pub fn add_phi(&mut self, block: BlockId, ty: Type) -> InstId {
        let id = self.insts.alloc(Instruction::new(Opcode::Phi, ty, &[], block));
        self.blocks[block].phis.push(id);
        id
    }

    pub fn add_phi_incoming(&mut self, phi: InstId, pred: BlockId, value: InstId) {
        let inst = &mut self.insts[phi];
        inst.args.push(value);
        inst.phi_blocks.push(pred);
    }

    /// Rename the incoming edge `from` of every phi in `block` to `to`.
    pub fn rename_phi_edge(&mut self, block: BlockId, from: BlockId, to: BlockId) {
        for i in 0..self.blocks[block].phis.len() {
            let phi = self.blocks[block].phis[i];
            for b in self.insts[phi].phi_blocks.iter_mut() {
                if *b == from {
                    *b = to;
                }
            }
        }
    }

    pub fn set_terminator(&mut self, block: BlockId, term: Terminator) {
        self.blocks[block].term = Some(term);
    }

    /// Declare a parameter. Its `Param` instruction is placed in the entry
    /// block ahead of any other instruction.
    pub fn add_param(&mut self, ty: Type, noalias: bool) -> InstId {
        let index = self.params.len();
        let entry = self.entry;
        let id = self
            .insts
            .alloc(Instruction::new(Opcode::Param(index as u16), ty, &[], entry));
        self.blocks[entry].insts.insert(index, id);
        self.params.push(Param {
            value: id,
            ty,
            noalias,
        });
        id
    }

    /// Drop blocks from the layout, making them dead.
    pub fn remove_from_layout(&mut self, dead: &[BlockId]) {
        self.layout.retain(|b| !dead.contains(b));
    }

    // =========================================================================
    // Use Queries
    // =========================================================================

    /// Users of every live value.
    pub fn users(&self) -> FxHashMap<InstId, SmallVec<[User; 4]>> {
        let mut users: FxHashMap<InstId, SmallVec<[User; 4]>> = FxHashMap::default();
        for &block in &self.layout {
            for v in self.block_values(block) {
                for &arg in &self.insts[v].args {
                    users.entry(arg).or_default().push(User::Inst(v));
                }
            }
            if let Some(op) = self.blocks[block].term.and_then(|t| t.operand()) {
                users.entry(op).or_default().push(User::Terminator(block));
            }
        }
        users
    }

    /// Rewrite every live use of `old` to `new`.
    pub fn replace_all_uses(&mut self, old: InstId, new: InstId) {
        for i in 0..self.layout.len() {
            let block = self.layout[i];
            let values: SmallVec<[InstId; 32]> = self.block_values(block).collect();
            for v in values {
                for arg in self.insts[v].args.iter_mut() {
                    if *arg == old {
                        *arg = new;
                    }
                }
            }
            if let Some(term) = self.blocks[block].term.as_mut() {
                match term {
                    Terminator::Branch { cond, .. } if *cond == old => *cond = new,
                    Terminator::Return(Some(v)) if *v == old => *v = new,
                    _ => {}
                }
            }
        }
    }

    /// Whether any live block contains a vector instruction.
    pub fn has_vector_code(&self) -> bool {
        self.layout.iter().any(|&b| {
            self.block_values(b)
                .any(|v| self.insts[v].opcode.is_vector())
        })
    }
}
