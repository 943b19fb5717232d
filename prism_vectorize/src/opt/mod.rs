//! Optimization passes.

pub mod vectorize;

use crate::ir::Function;

/// A transformation over a single function.
pub trait OptimizationPass {
    /// Short pass name for diagnostics.
    fn name(&self) -> &'static str;

    /// Run the pass. Returns `true` if the function changed.
    fn run(&mut self, func: &mut Function) -> bool;
}
