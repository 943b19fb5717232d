//! Dependence and aliasing analysis.
//!
//! Accesses are compared pairwise in program order. For two accesses `p`
//! before `q` to the same array with unit-stride indices `e_p + t` and
//! `e_q + t`, an element touched by `p` in iteration `t` is touched by `q` in
//! iteration `t + (e_p - e_q)`. When that iteration comes first
//! (`e_q > e_p`), executing a whole vector of `p` before `q` reorders the
//! conflict unless the distance is at least the number of lanes processed
//! together.
//!
//! Two different array references may or may not be the same array. When
//! the same-array verdict is not independent, the loop can still run under a
//! runtime guard comparing the references.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::ir::{Function, InstId, Opcode};

use super::access::ArrayAccess;
use super::legality::{Legality, RejectReason};

/// Verdict for a pair of accesses or array references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasVerdict {
    Independent,
    /// Vectorizable with at most this many lanes per vector.
    SafeDistance(u32),
    Unsafe,
    /// Vectorizable only when the two references differ at run time.
    RuntimeGuard(InstId, InstId),
}

impl AliasVerdict {
    /// The more restrictive of two verdicts.
    fn meet(self, other: AliasVerdict) -> AliasVerdict {
        use AliasVerdict::*;
        match (self, other) {
            (Unsafe, _) | (_, Unsafe) => Unsafe,
            (RuntimeGuard(a, b), _) | (_, RuntimeGuard(a, b)) => RuntimeGuard(a, b),
            (SafeDistance(x), SafeDistance(y)) => SafeDistance(x.min(y)),
            (SafeDistance(d), Independent) | (Independent, SafeDistance(d)) => SafeDistance(d),
            (Independent, Independent) => Independent,
        }
    }
}

/// Relation between two array references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseRelation {
    Same,
    Distinct,
    MayAlias,
}

/// Whether `a` and `b` can refer to the same array.
pub fn base_relation(func: &Function, a: InstId, b: InstId) -> BaseRelation {
    if a == b {
        return BaseRelation::Same;
    }
    if func.value_type(a) != func.value_type(b) {
        return BaseRelation::Distinct;
    }
    let fresh = |v: InstId| matches!(func.inst(v).opcode, Opcode::NewArray);
    let noalias = |v: InstId| func.param_of(v).is_some_and(|p| p.noalias);
    let param = |v: InstId| func.param_of(v).is_some();
    if noalias(a) || noalias(b) {
        return BaseRelation::Distinct;
    }
    // A fresh allocation is unreachable from any parameter and from other
    // allocations.
    if (fresh(a) && (fresh(b) || param(b))) || (fresh(b) && param(a)) {
        return BaseRelation::Distinct;
    }
    BaseRelation::MayAlias
}

/// Verdict for `p` followed by `q`, assuming they address the same array.
pub fn access_pair(p: &ArrayAccess, q: &ArrayAccess) -> AliasVerdict {
    if !p.is_write && !q.is_write {
        return AliasVerdict::Independent;
    }
    let (fp, fq) = (&p.affine, &q.affine);
    if !fp.same_symbols(fq) {
        return AliasVerdict::Unsafe;
    }
    match (fp.is_invariant(), fq.is_invariant()) {
        (true, true) if fp.offset != fq.offset => AliasVerdict::Independent,
        (false, false) => match fq.offset.checked_sub(fp.offset) {
            Some(d) if d <= 0 => AliasVerdict::Independent,
            Some(d) => match u32::try_from(d) {
                Ok(1) => AliasVerdict::Unsafe,
                Ok(d) => AliasVerdict::SafeDistance(d),
                Err(_) => AliasVerdict::Independent,
            },
            None => AliasVerdict::Unsafe,
        },
        _ => AliasVerdict::Unsafe,
    }
}

/// Summary of the dependence constraints of one loop.
#[derive(Debug, Clone, Default)]
pub struct DependenceReport {
    /// Verdict per unordered pair of distinct references, in discovery order.
    pub pairs: Vec<(InstId, InstId, AliasVerdict)>,
    /// Reference pairs that must differ for the vector loop to run.
    pub guards: SmallVec<[(InstId, InstId); 2]>,
    /// Upper bound on lanes per vector, if any dependence limits it.
    pub max_lanes: Option<u32>,
}

/// Analyze all accesses of a loop body.
pub fn analyze(
    func: &Function,
    accesses: &[ArrayAccess],
    allow_guards: bool,
) -> Legality<DependenceReport> {
    let mut report = DependenceReport::default();
    let mut cross: FxHashMap<(InstId, InstId), AliasVerdict> = FxHashMap::default();

    let constrain = |report: &mut DependenceReport, verdict: AliasVerdict| match verdict {
        AliasVerdict::SafeDistance(d) => {
            report.max_lanes = Some(report.max_lanes.map_or(d, |m| m.min(d)));
            Ok(())
        }
        AliasVerdict::Unsafe => Err(RejectReason::UnsafeDependence),
        AliasVerdict::Independent | AliasVerdict::RuntimeGuard(..) => Ok(()),
    };

    for (i, p) in accesses.iter().enumerate() {
        for q in &accesses[i + 1..] {
            match base_relation(func, p.base, q.base) {
                BaseRelation::Distinct => {}
                BaseRelation::Same => {
                    let verdict = access_pair(p, q);
                    tracing::trace!(p = ?p.inst, q = ?q.inst, ?verdict, "same-array dependence");
                    constrain(&mut report, verdict)?;
                }
                BaseRelation::MayAlias => {
                    let key = if p.base < q.base {
                        (p.base, q.base)
                    } else {
                        (q.base, p.base)
                    };
                    let entry = cross.entry(key).or_insert(AliasVerdict::Independent);
                    *entry = entry.meet(access_pair(p, q));
                }
            }
        }
    }

    let mut keys: Vec<_> = cross.into_iter().collect();
    keys.sort_by_key(|(k, _)| *k);
    for ((a, b), verdict) in keys {
        let verdict = match verdict {
            AliasVerdict::Unsafe if allow_guards => AliasVerdict::RuntimeGuard(a, b),
            v => v,
        };
        tracing::trace!(a = ?a, b = ?b, ?verdict, "cross-array verdict");
        constrain(&mut report, verdict)?;
        if let AliasVerdict::RuntimeGuard(a, b) = verdict {
            report.guards.push((a, b));
        }
        report.pairs.push((a, b, verdict));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ScalarType, Type};
    use crate::opt::vectorize::access::Affine;

    fn access(base: u32, offset: i64, stride: i64, is_write: bool) -> ArrayAccess {
        ArrayAccess {
            inst: InstId::new(100),
            base: InstId::new(base),
            index: InstId::new(101),
            affine: Affine {
                offset,
                stride,
                ..Default::default()
            },
            is_write,
            elem: ScalarType::I32,
        }
    }

    #[test]
    fn test_forward_and_backward_distances() {
        // read b[i + 1] then write b[i]: the write lands after the read.
        assert_eq!(
            access_pair(&access(0, 1, 1, false), &access(0, 0, 1, true)),
            AliasVerdict::Independent
        );
        // read b[i - 1] then write b[i]: a true recurrence.
        assert_eq!(
            access_pair(&access(0, -1, 1, false), &access(0, 0, 1, true)),
            AliasVerdict::Unsafe
        );
        assert_eq!(
            access_pair(&access(0, -8, 1, false), &access(0, 0, 1, true)),
            AliasVerdict::SafeDistance(8)
        );
        assert_eq!(
            access_pair(&access(0, 0, 1, false), &access(0, 5, 1, false)),
            AliasVerdict::Independent
        );
    }

    #[test]
    fn test_uniform_accesses() {
        assert_eq!(
            access_pair(&access(0, 0, 0, false), &access(0, 1, 0, true)),
            AliasVerdict::Independent
        );
        assert_eq!(
            access_pair(&access(0, 0, 0, false), &access(0, 0, 1, true)),
            AliasVerdict::Unsafe
        );
    }

    #[test]
    fn test_meet() {
        let g = AliasVerdict::RuntimeGuard(InstId::new(0), InstId::new(1));
        assert_eq!(AliasVerdict::Independent.meet(g), g);
        assert_eq!(g.meet(AliasVerdict::Unsafe), AliasVerdict::Unsafe);
        assert_eq!(
            AliasVerdict::SafeDistance(4).meet(AliasVerdict::SafeDistance(2)),
            AliasVerdict::SafeDistance(2)
        );
    }

    #[test]
    fn test_base_relations() {
        let mut f = Function::new("f", Type::Void);
        let a = f.add_param(Type::Ref(ScalarType::I32), false);
        let b = f.add_param(Type::Ref(ScalarType::I32), false);
        let c = f.add_param(Type::Ref(ScalarType::I32), true);
        let l = f.add_param(Type::Ref(ScalarType::I64), false);
        assert_eq!(base_relation(&f, a, a), BaseRelation::Same);
        assert_eq!(base_relation(&f, a, b), BaseRelation::MayAlias);
        assert_eq!(base_relation(&f, a, c), BaseRelation::Distinct);
        assert_eq!(base_relation(&f, a, l), BaseRelation::Distinct);
    }

    #[test]
    fn test_guard_for_possible_self_stencil() {
        let mut f = Function::new("f", Type::Void);
        let a = f.add_param(Type::Ref(ScalarType::I32), false);
        let b = f.add_param(Type::Ref(ScalarType::I32), false);
        let mut read = access(0, -1, 1, false);
        read.base = b;
        let mut write = access(0, 0, 1, true);
        write.base = a;
        let accesses = [read, write];

        let report = analyze(&f, &accesses, true).unwrap();
        assert_eq!(report.guards.as_slice(), &[(a, b)]);
        assert_eq!(
            analyze(&f, &accesses, false).unwrap_err(),
            RejectReason::UnsafeDependence
        );
    }
}
