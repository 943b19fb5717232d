//! Textual form of functions, used for debugging output and shape assertions.

use std::fmt::{self, Write};

use super::function::Function;
use super::instruction::{BlockId, Const, InstId, LoopHint, Opcode, Terminator};

struct V(InstId);

impl fmt::Display for V {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0.index())
    }
}

struct B(BlockId);

impl fmt::Display for B {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0.index())
    }
}

impl Function {
    /// One line rendering of an instruction, e.g. `v7 = VecAdd.<4 x i32> v5, v6`.
    pub fn display_inst(&self, id: InstId) -> String {
        let inst = self.inst(id);
        let mut out = String::new();
        let _ = write!(out, "{} = {}", V(id), inst.opcode.name());
        if let Opcode::VecReduce(op) = inst.opcode {
            let _ = write!(out, "[{}]", op.name());
        }
        let _ = write!(out, ".{}", inst.ty);
        match inst.opcode {
            Opcode::Const(Const::Int(v)) => {
                let _ = write!(out, " {v}");
            }
            Opcode::Const(Const::Float(v)) => {
                let _ = write!(out, " {v:?}");
            }
            Opcode::Const(Const::Bool(v)) => {
                let _ = write!(out, " {v}");
            }
            Opcode::Param(i) => {
                let _ = write!(out, " {i}");
            }
            Opcode::Phi => {
                for (arg, block) in inst.args.iter().zip(&inst.phi_blocks) {
                    let _ = write!(out, " [{}, {}]", V(*arg), B(*block));
                }
            }
            _ => {
                for (i, arg) in inst.args.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    let _ = write!(out, "{sep}{}", V(*arg));
                }
            }
        }
        out
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", V(p.value), p.ty)?;
            if p.noalias {
                f.write_str(" noalias")?;
            }
        }
        writeln!(f, ") -> {} {{", self.ret)?;

        for &block in &self.layout {
            write!(f, "{}:", B(block))?;
            match self.block(block).hint {
                LoopHint::None => {}
                LoopHint::Vectorized => f.write_str(" ; vectorized")?,
                LoopHint::Cleanup => f.write_str(" ; cleanup")?,
            }
            writeln!(f)?;
            for v in self.block_values(block) {
                writeln!(f, "  {}", self.display_inst(v))?;
            }
            match self.block(block).term {
                Some(Terminator::Jump(t)) => writeln!(f, "  jump {}", B(t))?,
                Some(Terminator::Branch {
                    cond,
                    then_block,
                    else_block,
                }) => writeln!(f, "  branch {}, {}, {}", V(cond), B(then_block), B(else_block))?,
                Some(Terminator::Return(Some(v))) => writeln!(f, "  return {}", V(v))?,
                Some(Terminator::Return(None)) => writeln!(f, "  return")?,
                Some(Terminator::Unreachable) => writeln!(f, "  unreachable")?,
                None => writeln!(f, "  <no terminator>")?,
            }
        }
        f.write_str("}\n")
    }
}
