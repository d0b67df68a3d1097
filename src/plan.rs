//! ExecutionPlan compiler (spec.md §3 "Data flow", new in the expanded
//! spec): compiles a validated phase set's DAG into the waves/tracks the
//! scheduler will walk, surfaces dependencies the author left implicit,
//! and flags risk signals worth a human's attention before `apply`.

use std::collections::HashSet;

use serde::Serialize;

use crate::dag::Dag;
use crate::model::{Phase, PhaseId};
use crate::scope::scopes_overlap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PlanRiskKind {
    /// Two phases' scopes overlap but neither depends on the other, and
    /// overlap was only tolerated via `allow_scope_overlap`.
    ToleratedScopeOverlap,
    /// A phase sits alone on a track with no scope declared — its true
    /// footprint, and so its real conflicts, are invisible to the
    /// scheduler.
    UndeclaredScope,
    /// A phase has no declared dependencies or scope and high DAG impact
    /// — a downstream bottleneck that's easy to mis-schedule.
    UnconstrainedBottleneck,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanRisk {
    pub kind: PlanRiskKind,
    pub phases: Vec<PhaseId>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub waves: Vec<Vec<PhaseId>>,
    pub tracks: Vec<Vec<PhaseId>>,
    /// Pairs `(from, to)` the compiler believes *should* have been
    /// declared dependencies, inferred from scope overlap absent any
    /// declared relationship — advisory only, never injected into the
    /// DAG itself.
    pub inferred_dependencies: Vec<(PhaseId, PhaseId)>,
    pub risks: Vec<PlanRisk>,
}

/// Compiles `phases` (already validated) and their `dag` into an
/// [`ExecutionPlan`].
pub fn compile(phases: &[Phase], dag: &Dag) -> ExecutionPlan {
    // `dag` is already validated acyclic by this point (spec.md §4.10
    // runs before §3's plan compilation), so a cycle here would be a
    // validation bug upstream, not a condition this compiler should
    // propagate as its own error.
    let waves = dag.waves().unwrap_or_default();
    let tracks = dag.tracks();
    let impact = dag.impact_scores();

    let by_id: std::collections::HashMap<&PhaseId, &Phase> = phases.iter().map(|p| (&p.id, p)).collect();

    let mut inferred_dependencies = Vec::new();
    let mut risks = Vec::new();
    let mut flagged_overlap_pairs: HashSet<(PhaseId, PhaseId)> = HashSet::new();

    for (i, a) in phases.iter().enumerate() {
        if a.scope.is_empty() {
            if impact.get(&a.id).copied().unwrap_or(0.0) > 0.5 && a.dependencies.is_empty() {
                risks.push(PlanRisk {
                    kind: PlanRiskKind::UnconstrainedBottleneck,
                    phases: vec![a.id.clone()],
                    message: format!("{} has high impact but no declared scope or dependencies", a.id),
                });
            } else {
                risks.push(PlanRisk {
                    kind: PlanRiskKind::UndeclaredScope,
                    phases: vec![a.id.clone()],
                    message: format!("{} declares no scope; the scheduler cannot detect its file conflicts", a.id),
                });
            }
        }

        for b in &phases[i + 1..] {
            if !scopes_overlap(&a.scope, &b.scope) {
                continue;
            }
            if dag.connected(&a.id, &b.id) {
                continue;
            }
            let pair = (a.id.clone(), b.id.clone());
            if !flagged_overlap_pairs.insert(pair.clone()) {
                continue;
            }
            inferred_dependencies.push(pair);
            if a.allow_scope_overlap || b.allow_scope_overlap {
                risks.push(PlanRisk {
                    kind: PlanRiskKind::ToleratedScopeOverlap,
                    phases: vec![a.id.clone(), b.id.clone()],
                    message: format!("{} and {} share scope and rely on allow_scope_overlap instead of an ordering", a.id, b.id),
                });
            }
        }
    }

    let _ = by_id;
    ExecutionPlan { waves, tracks, inferred_dependencies, risks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PhaseType;

    fn phase(id: &str, deps: Vec<&str>, scope: Vec<&str>, allow_overlap: bool) -> Phase {
        Phase {
            id: PhaseId::new(id),
            title: "t".to_string(),
            priority: 0,
            phase_type: PhaseType::Task,
            dependencies: deps.into_iter().map(PhaseId::new).collect(),
            blocks: vec![],
            scope: scope.into_iter().map(str::to_string).collect(),
            allow_scope_overlap: allow_overlap,
            gate: None,
            max_review_cycles: None,
            max_budget_usd: None,
            model: None,
            labels: vec![],
            assignee: None,
            body: String::new(),
            source_file: format!("{id}.md"),
        }
    }

    fn dag_for(phases: &[Phase]) -> Dag {
        let mut dag = Dag::new();
        for p in phases {
            dag.add_node_idempotent(p.id.clone(), p.priority);
        }
        for p in phases {
            for dep in &p.dependencies {
                dag.add_edge(dep, &p.id).unwrap();
            }
        }
        dag
    }

    #[test]
    fn flags_tolerated_overlap() {
        let phases = vec![
            phase("a", vec![], vec!["internal/*.go"], true),
            phase("b", vec![], vec!["internal/*.go"], true),
        ];
        let dag = dag_for(&phases);
        let plan = compile(&phases, &dag);
        assert_eq!(plan.inferred_dependencies.len(), 1);
        assert!(plan.risks.iter().any(|r| r.kind == PlanRiskKind::ToleratedScopeOverlap));
    }

    #[test]
    fn connected_phases_produce_no_risk() {
        let phases = vec![phase("a", vec![], vec!["internal/*.go"], false), phase("b", vec!["a"], vec!["internal/*.go"], false)];
        let dag = dag_for(&phases);
        let plan = compile(&phases, &dag);
        assert!(plan.inferred_dependencies.is_empty());
    }

    #[test]
    fn undeclared_scope_flagged() {
        let phases = vec![phase("a", vec![], vec![], false)];
        let dag = dag_for(&phases);
        let plan = compile(&phases, &dag);
        assert!(plan.risks.iter().any(|r| r.kind == PlanRiskKind::UndeclaredScope));
    }
}
