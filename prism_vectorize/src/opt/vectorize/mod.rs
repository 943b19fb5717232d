//! Loop Vectorization Pass
//!
//! Rewrites counted scalar loops over arrays into SIMD form:
//!
//! - **Dependence Analysis**: distance-based tests between affine accesses,
//!   runtime guards for references that may be the same array
//! - **Induction/Reduction Recognition**: per-phi state machine
//! - **Strategy**: predicated (scalable) vectors when the target has them,
//!   otherwise fixed-width vectors unrolled up to four times
//! - **Transformation**: vector loop plus scalar cleanup loop
//! - **Narrowing**: wide arithmetic truncated on store runs at the narrow
//!   width
//!
//! # Module Structure
//!
//! - `target`: target SIMD capabilities
//! - `region`: canonical loop shape
//! - `induction`: inductions and reductions
//! - `access`: affine index forms
//! - `dependence`: alias verdicts and guards
//! - `shape`: uniform / series / varying values
//! - `narrowing`: narrow-width rewrites
//! - `strategy`: vector plan selection
//! - `transform`: code generation
//! - `orchestrator`: per-function driver
//!
//! # Example
//!
//! ```text
//! Before:
//!   for (int i = 1; i < n - 1; i++)
//!       a[i] = b[i - 1] + b[i] + b[i + 1];
//!
//! After (4 lanes, unrolled twice, a and b possibly the same array):
//!   tc  = n - 2 > 0 ? n - 2 : 0
//!   vtc = a != b ? tc & -8 : 0
//!   for (vi = 0; vi <u vtc; vi += 8)
//!       a[vi+1 .. vi+9] = b[vi .. vi+8] + b[vi+1 .. vi+9] + b[vi+2 .. vi+10]
//!   for (i = 1 + vtc; i < n - 1; i++)
//!       a[i] = b[i - 1] + b[i] + b[i + 1];
//! ```

pub mod access;
pub mod dependence;
pub mod induction;
pub mod legality;
pub mod narrowing;
pub mod orchestrator;
pub mod region;
pub mod shape;
pub mod strategy;
pub mod target;
pub mod transform;

use crate::ir::Function;
use crate::opt::OptimizationPass;

pub use dependence::{AliasVerdict, DependenceReport};
pub use induction::{Induction, LoopCarried, PhiState, Reduction};
pub use legality::RejectReason;
pub use orchestrator::{LoopDecision, LoopOutcome, VectorizationOrchestrator};
pub use strategy::{CodegenStyle, VectorPlan};
pub use target::{ElementTypes, TargetCapabilities};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the vectorization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorizeConfig {
    /// Master switch.
    pub enabled: bool,
    /// Target SIMD capabilities.
    pub target: TargetCapabilities,
    /// Use predicated vectors when the target has them.
    pub prefer_predicated: bool,
    /// Largest unroll factor for fixed-width vector loops.
    pub max_unroll: u32,
    /// Allow vectorizing under a runtime check that two arrays differ.
    pub allow_runtime_guards: bool,
    /// Loops with a proven trip count below this stay scalar.
    pub min_trip_count: u64,
    /// Verify every rewritten function before committing it.
    pub verify: bool,
}

impl Default for VectorizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target: TargetCapabilities::avx2(),
            prefer_predicated: true,
            max_unroll: 4,
            allow_runtime_guards: true,
            min_trip_count: 2,
            verify: true,
        }
    }
}

impl VectorizeConfig {
    /// Create configuration for SSE4.2 targets.
    pub fn sse42() -> Self {
        Self {
            target: TargetCapabilities::sse42(),
            ..Default::default()
        }
    }

    /// Create configuration for NEON targets.
    pub fn neon() -> Self {
        Self {
            target: TargetCapabilities::neon(),
            ..Default::default()
        }
    }

    /// Create configuration for AVX2 targets.
    pub fn avx2() -> Self {
        Self::default()
    }

    /// Create configuration for AVX-512 targets.
    pub fn avx512() -> Self {
        Self {
            target: TargetCapabilities::avx512(),
            ..Default::default()
        }
    }

    /// Create configuration for a predicated target with vectors of up to
    /// `max_bits`.
    pub fn sve(max_bits: u32) -> Self {
        Self {
            target: TargetCapabilities::sve(max_bits),
            ..Default::default()
        }
    }

    /// Create aggressive configuration for maximum vectorization.
    pub fn aggressive() -> Self {
        Self {
            target: TargetCapabilities::avx512(),
            max_unroll: 8,
            min_trip_count: 0,
            ..Default::default()
        }
    }

    /// Default configuration with environment overrides applied.
    ///
    /// - `PRISM_VECTORIZE=0` disables the pass
    /// - `PRISM_FORCE_PREDICATED_SIMD=1` / `=0` turns predicated code
    ///   generation on or off
    /// - `PRISM_VECTOR_BITS=<n>` overrides the fixed vector width
    pub fn from_env() -> Self {
        Self::default().with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides read through `var`.
    pub fn with_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = var("PRISM_VECTORIZE") {
            self.enabled = truthy(&value);
        }
        if let Some(value) = var("PRISM_FORCE_PREDICATED_SIMD") {
            self.prefer_predicated = truthy(&value);
        }
        if let Some(value) = var("PRISM_VECTOR_BITS") {
            match value.parse::<u32>() {
                Ok(bits) if bits.is_power_of_two() && (64..=2048).contains(&bits) => {
                    self.target.vector_bits = bits;
                }
                _ => tracing::warn!(%value, "ignoring invalid PRISM_VECTOR_BITS"),
            }
        }
        self
    }
}

#[inline]
fn truthy(value: &str) -> bool {
    !matches!(value.trim(), "" | "0" | "off" | "false")
}

// =============================================================================
// Statistics
// =============================================================================

/// Statistics from vectorization passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VectorizeStats {
    /// Number of loops analyzed.
    pub loops_analyzed: usize,
    /// Number of loops successfully vectorized.
    pub loops_vectorized: usize,
    /// Number of loops left scalar.
    pub loops_rejected: usize,
    /// Alias checks emitted in vector preheaders.
    pub guards_inserted: usize,
    /// Vectorized loops that kept a scalar remainder loop.
    pub cleanup_loops: usize,
    /// Reductions turned into vector accumulators.
    pub reductions: usize,
    /// Wide operations rewritten at a narrower width.
    pub narrowed_ops: usize,
}

impl VectorizeStats {
    /// Merge statistics from another instance.
    pub fn merge(&mut self, other: &VectorizeStats) {
        self.loops_analyzed += other.loops_analyzed;
        self.loops_vectorized += other.loops_vectorized;
        self.loops_rejected += other.loops_rejected;
        self.guards_inserted += other.guards_inserted;
        self.cleanup_loops += other.cleanup_loops;
        self.reductions += other.reductions;
        self.narrowed_ops += other.narrowed_ops;
    }

    /// Get the vectorization success rate.
    pub fn success_rate(&self) -> f32 {
        if self.loops_analyzed == 0 {
            0.0
        } else {
            self.loops_vectorized as f32 / self.loops_analyzed as f32
        }
    }
}

// =============================================================================
// Main Pass
// =============================================================================

/// Loop vectorization pass.
pub struct Vectorize {
    config: VectorizeConfig,
    stats: VectorizeStats,
    /// Decisions of the most recent run.
    decisions: Vec<LoopDecision>,
}

impl Vectorize {
    pub fn new(config: VectorizeConfig) -> Self {
        Self {
            config,
            stats: VectorizeStats::default(),
            decisions: Vec::new(),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &VectorizeConfig {
        &self.config
    }

    /// Get accumulated statistics.
    pub fn stats(&self) -> &VectorizeStats {
        &self.stats
    }

    /// One decision per loop seen by the most recent run.
    pub fn decisions(&self) -> &[LoopDecision] {
        &self.decisions
    }

    /// Get number of loops vectorized.
    pub fn loops_vectorized(&self) -> usize {
        self.stats.loops_vectorized
    }
}

impl Default for Vectorize {
    fn default() -> Self {
        Self::new(VectorizeConfig::default())
    }
}

impl OptimizationPass for Vectorize {
    fn name(&self) -> &'static str {
        "vectorize"
    }

    fn run(&mut self, func: &mut Function) -> bool {
        let mut orchestrator = VectorizationOrchestrator::new(&self.config);
        let changed = orchestrator.run(func);
        self.stats.merge(orchestrator.stats());
        self.decisions = orchestrator.into_decisions();
        changed
    }
}

// =============================================================================
// Tests
// =============================================================================
