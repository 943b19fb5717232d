//! Loop vectorizer for the Prism JIT.
//!
//! Rewrites counted scalar loops over arrays into SIMD form:
//! - Block-structured SSA IR with scalar and vector instructions
//! - Dependence and aliasing analysis with runtime alias guards
//! - Induction and reduction recognition
//! - Fixed-width unrolled or predicated (scalable) code generation
//! - Scalar cleanup loops for remainder iterations
//!
//! A reference interpreter executes both forms so transformed programs can
//! be checked for observational equivalence.
#![deny(unsafe_code)]

pub mod error;
pub mod interp;
pub mod ir;
pub mod opt;

pub use error::{ExecError, IrError, TransformError};
pub use opt::OptimizationPass;
pub use opt::vectorize::{Vectorize, VectorizeConfig, VectorizeStats};
