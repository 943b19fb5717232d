//! Vectorization Orchestrator
//!
//! Drives the pipeline over every loop of a function, one loop at a time:
//!
//! 1. **Region**: match the canonical counted-loop shape
//! 2. **Induction/Reduction**: classify the header phis
//! 3. **Accesses/Dependence**: affine indices, alias verdicts, guards
//! 4. **Shape/Narrowing**: per-value lane behavior, narrow-width rewrites
//! 5. **Strategy**: lane count, unroll factor, predication
//! 6. **Transform**: rewrite a copy of the function, verify, commit
//!
//! A loop is either rewritten completely or not at all. Control-flow
//! analyses are rebuilt after every rewrite, since the rewrite adds blocks.

use rustc_hash::FxHashSet;

use crate::error::TransformError;
use crate::ir::{BlockId, Cfg, DominatorTree, Function, Loop, LoopAnalysis, verify};

use super::access::{self, AffineAnalysis};
use super::legality::{Legality, RejectReason};
use super::strategy::{CodegenStyle, VectorPlan};
use super::transform::{self, LoopFacts, Rewritten};
use super::{VectorizeConfig, VectorizeStats};
use super::{dependence, induction, narrowing, region, shape, strategy};

// =============================================================================
// Orchestration Decision
// =============================================================================

/// What happened to one loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    Vectorized(VectorPlan),
    Rejected(RejectReason),
}

/// Decision for a single loop, identified by its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopDecision {
    pub header: BlockId,
    pub outcome: LoopOutcome,
}

impl LoopDecision {
    #[inline]
    pub fn is_vectorized(&self) -> bool {
        matches!(self.outcome, LoopOutcome::Vectorized(_))
    }

    #[inline]
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self.outcome {
            LoopOutcome::Rejected(reason) => Some(reason),
            LoopOutcome::Vectorized(_) => None,
        }
    }

    #[inline]
    pub fn plan(&self) -> Option<&VectorPlan> {
        match &self.outcome {
            LoopOutcome::Vectorized(plan) => Some(plan),
            LoopOutcome::Rejected(_) => None,
        }
    }
}

/// A successful rewrite, not yet committed.
struct Candidate {
    func: Function,
    plan: VectorPlan,
    rewritten: Rewritten,
    reductions: usize,
    narrowed: usize,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Runs the loop vectorization pipeline over a function.
pub struct VectorizationOrchestrator<'c> {
    config: &'c VectorizeConfig,
    stats: VectorizeStats,
    decisions: Vec<LoopDecision>,
}

impl<'c> VectorizationOrchestrator<'c> {
    pub fn new(config: &'c VectorizeConfig) -> Self {
        Self {
            config,
            stats: VectorizeStats::default(),
            decisions: Vec::new(),
        }
    }

    pub fn stats(&self) -> &VectorizeStats {
        &self.stats
    }

    pub fn decisions(&self) -> &[LoopDecision] {
        &self.decisions
    }

    pub fn into_decisions(self) -> Vec<LoopDecision> {
        self.decisions
    }

    /// Vectorize every eligible loop of `func`.
    ///
    /// Returns `true` if any loop was rewritten.
    pub fn run(&mut self, func: &mut Function) -> bool {
        let mut visited: FxHashSet<BlockId> = FxHashSet::default();
        let mut changed = false;

        loop {
            let cfg = Cfg::build(func);
            let dom = DominatorTree::build(&cfg);
            let loops = LoopAnalysis::compute(&cfg, &dom);
            let next = func
                .layout
                .iter()
                .filter_map(|&b| loops.loop_for_header(b))
                .find(|lp| !visited.contains(&lp.header))
                .cloned();
            let Some(lp) = next else {
                break;
            };
            visited.insert(lp.header);
            self.stats.loops_analyzed += 1;

            let outcome = if self.config.enabled {
                self.try_loop(func, &cfg, &lp)
            } else {
                Err(RejectReason::Disabled)
            };
            let outcome = match outcome {
                Ok(candidate) => {
                    visited.insert(candidate.rewritten.vector_header);
                    self.record_success(&candidate, lp.header);
                    *func = candidate.func;
                    changed = true;
                    LoopOutcome::Vectorized(candidate.plan)
                }
                Err(reason) => {
                    self.stats.loops_rejected += 1;
                    tracing::debug!(
                        function = %func.name,
                        header = %lp.header,
                        reason = %reason.tag(),
                        "loop left scalar"
                    );
                    LoopOutcome::Rejected(reason)
                }
            };
            self.decisions.push(LoopDecision {
                header: lp.header,
                outcome,
            });
        }
        changed
    }

    fn record_success(&mut self, candidate: &Candidate, header: BlockId) {
        let plan = &candidate.plan;
        self.stats.loops_vectorized += 1;
        self.stats.guards_inserted += plan.guards.len();
        self.stats.cleanup_loops += usize::from(candidate.rewritten.cleanup_header.is_some());
        self.stats.reductions += candidate.reductions;
        self.stats.narrowed_ops += candidate.narrowed;
        tracing::debug!(
            function = %candidate.func.name,
            header = %header,
            vector_header = %candidate.rewritten.vector_header,
            elem = %plan.elem,
            lanes = %plan.lanes,
            unroll = plan.unroll,
            style = match plan.style {
                CodegenStyle::Fixed => "fixed",
                CodegenStyle::Predicated => "predicated",
            },
            cleanup = plan.needs_cleanup,
            guards = plan.guards.len(),
            "loop vectorized"
        );
    }

    /// Run the analyses and the rewrite for one loop.
    fn try_loop(&self, func: &Function, cfg: &Cfg, lp: &Loop) -> Legality<Candidate> {
        let region = region::extract(func, cfg, lp)?;
        let users = func.users();
        let carried = induction::classify(func, &region, &users)?;

        let mut affine = AffineAnalysis::new(func, &region, &carried);
        let accesses = access::collect(func, &region, &mut affine, carried.primary.ty)?;
        let report = dependence::analyze(func, &accesses, self.config.allow_runtime_guards)?;
        let shapes = shape::analyze(func, &region, &carried, &accesses, &mut affine)?;
        let narrowing = narrowing::find(func, &region, &shapes, &users);

        let types = shapes.vector_types(func, &region, &carried, &narrowing);
        let trip_count = region::static_trip_count(carried.primary.init, region.limit);
        let plan = strategy::select(self.config, &types, &report, trip_count)?;
        tracing::trace!(header = %region.header, ?plan, ?types, "selected vector plan");

        let facts = LoopFacts {
            region: &region,
            carried: &carried,
            accesses: &accesses,
            shapes: &shapes,
            narrowing: &narrowing,
        };
        let mut rewritten_func = func.clone();
        let rewritten =
            transform::vectorize_loop(&mut rewritten_func, &facts, &plan).map_err(internal)?;
        if self.config.verify {
            verify(&rewritten_func).map_err(|e| internal(TransformError::from(e)))?;
        }

        Ok(Candidate {
            func: rewritten_func,
            plan,
            rewritten,
            reductions: carried.reductions.len(),
            narrowed: narrowing.len(),
        })
    }
}

/// An analysis promised something the rewrite could not deliver.
fn internal(error: TransformError) -> RejectReason {
    tracing::warn!(%error, "vectorizer invariant violated; loop left scalar");
    RejectReason::InternalInvariant
}
