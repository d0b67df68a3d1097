//! DecompositionEngine (spec.md §4.9): atomic DAG surgery that replaces
//! a struggling phase with 2-3 sub-phases in a live graph, preserving the
//! topological position of its predecessors and successors.

use std::collections::HashSet;

use thiserror::Error;
use tracing::warn;

use crate::dag::Dag;
use crate::model::{Phase, PhaseId};
use crate::parsing;

#[derive(Debug, Error)]
pub enum DecompositionError {
    #[error("original phase {0} not found in the DAG")]
    OriginalNotFound(PhaseId),
    #[error("sub-phase count must be 2 or 3, got {0}")]
    InvalidSubPhaseCount(usize),
    #[error("duplicate sub-phase id {0}")]
    DuplicateSubId(PhaseId),
    #[error("sub-phase id {0} collides with an existing phase")]
    SubIdCollision(PhaseId),
    #[error("adding sub-phase edges would create a cycle: {0}")]
    WouldCycle(String),
    #[error("failed to write sub-phase file {0}: {1}")]
    Write(String, String),
}

/// One planned replacement phase: its full `Phase` record plus the
/// source text to write to disk.
pub struct SubPhaseSpec {
    pub phase: Phase,
    pub file_contents: String,
}

pub struct DecomposeOp {
    pub original_id: PhaseId,
    pub sub_phases: Vec<SubPhaseSpec>,
}

/// Performs the DAG surgery and disk writes for one [`DecomposeOp`].
/// Operates on `dag` and `phases` in place; on any validation or cycle
/// failure, returns an error and leaves both untouched.
pub fn decompose(dag: &mut Dag, phases: &mut Vec<Phase>, op: DecomposeOp) -> Result<(), DecompositionError> {
    if !(2..=3).contains(&op.sub_phases.len()) {
        return Err(DecompositionError::InvalidSubPhaseCount(op.sub_phases.len()));
    }
    if !dag.contains(&op.original_id) {
        return Err(DecompositionError::OriginalNotFound(op.original_id));
    }

    let mut sub_ids = HashSet::new();
    for sub in &op.sub_phases {
        if !sub_ids.insert(sub.phase.id.clone()) {
            return Err(DecompositionError::DuplicateSubId(sub.phase.id.clone()));
        }
        if sub.phase.id != op.original_id && dag.contains(&sub.phase.id) {
            return Err(DecompositionError::SubIdCollision(sub.phase.id.clone()));
        }
    }

    let predecessors = dag.deps_for(&op.original_id);
    let successors = dag.direct_dependents(&op.original_id);

    // Work on a scratch copy so a cycle failure leaves the live DAG untouched.
    let mut scratch = dag.clone();
    scratch.remove(&op.original_id);

    for sub in &op.sub_phases {
        scratch.add_node_idempotent(sub.phase.id.clone(), sub.phase.priority);
    }
    for sub in &op.sub_phases {
        for predecessor in &predecessors {
            scratch
                .add_edge(predecessor, &sub.phase.id)
                .map_err(|e| DecompositionError::WouldCycle(e.to_string()))?;
        }
    }
    for successor in &successors {
        for sub in &op.sub_phases {
            scratch.add_edge(&sub.phase.id, successor).map_err(|e| DecompositionError::WouldCycle(e.to_string()))?;
        }
    }
    for sub in &op.sub_phases {
        for dep in &sub.phase.dependencies {
            if sub_ids.contains(dep) {
                scratch.add_edge(dep, &sub.phase.id).map_err(|e| DecompositionError::WouldCycle(e.to_string()))?;
            }
        }
    }

    for sub in &op.sub_phases {
        std::fs::write(&sub.phase.source_file, &sub.file_contents)
            .map_err(|e| DecompositionError::Write(sub.phase.source_file.clone(), e.to_string()))?;
    }

    *dag = scratch;
    phases.retain(|p| p.id != op.original_id);
    for sub in op.sub_phases {
        phases.push(sub.phase);
    }

    annotate_decomposed(phases, &op.original_id);
    Ok(())
}

/// Best-effort: marks the original phase file's frontmatter with
/// `decomposed = true`. Failure is logged, never fatal — the DAG surgery
/// has already committed by the time this runs.
fn annotate_decomposed(phases: &[Phase], original_id: &PhaseId) {
    let Some(original_source) = phases.iter().find_map(|p| (p.source_file == original_id.to_string()).then(|| p.source_file.clone())) else {
        return;
    };
    let Ok(contents) = std::fs::read_to_string(&original_source) else {
        warn!(original_id = %original_id, "could not reread original phase file to annotate decomposed=true");
        return;
    };
    let annotated = match parsing::parse_phase_file(&original_source, &contents) {
        Ok(_) => contents.replacen("+++\n", "+++\ndecomposed = true\n", 1),
        Err(_) => return,
    };
    if let Err(e) = std::fs::write(&original_source, annotated) {
        warn!(original_id = %original_id, error = %e, "failed to annotate original phase file as decomposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PhaseType;

    fn phase(id: &str, priority: i32, deps: Vec<&str>) -> Phase {
        Phase {
            id: PhaseId::new(id),
            title: id.to_string(),
            priority,
            phase_type: PhaseType::Task,
            dependencies: deps.into_iter().map(PhaseId::new).collect(),
            blocks: vec![],
            scope: vec![],
            allow_scope_overlap: false,
            gate: None,
            max_review_cycles: None,
            max_budget_usd: None,
            model: None,
            labels: vec![],
            assignee: None,
            body: String::new(),
            source_file: format!("/tmp/nonexistent-{id}.md"),
        }
    }

    fn sub(id: &str, priority: i32, deps: Vec<&str>) -> SubPhaseSpec {
        SubPhaseSpec { phase: phase(id, priority, deps), file_contents: format!("+++\nid = \"{id}\"\ntitle = \"{id}\"\n+++\n") }
    }

    #[test]
    fn preserves_predecessor_successor_ordering() {
        let mut dag = Dag::new();
        dag.add_node(PhaseId::new("pre"), 0).unwrap();
        dag.add_node(PhaseId::new("orig"), 0).unwrap();
        dag.add_node(PhaseId::new("post"), 0).unwrap();
        dag.add_edge(&PhaseId::new("pre"), &PhaseId::new("orig")).unwrap();
        dag.add_edge(&PhaseId::new("orig"), &PhaseId::new("post")).unwrap();

        let mut phases = vec![phase("pre", 0, vec![]), phase("orig", 0, vec!["pre"]), phase("post", 0, vec!["orig"])];

        let op = DecomposeOp {
            original_id: PhaseId::new("orig"),
            sub_phases: vec![sub("orig-a", 0, vec![]), sub("orig-b", 0, vec!["orig-a"])],
        };
        decompose(&mut dag, &mut phases, op).unwrap();

        assert!(!dag.contains(&PhaseId::new("orig")));
        assert_eq!(dag.len(), 4);
        assert!(dag.connected(&PhaseId::new("pre"), &PhaseId::new("orig-a")));
        assert!(dag.connected(&PhaseId::new("orig-b"), &PhaseId::new("post")));
    }

    #[test]
    fn rejects_wrong_sub_phase_count() {
        let mut dag = Dag::new();
        dag.add_node(PhaseId::new("orig"), 0).unwrap();
        let mut phases = vec![phase("orig", 0, vec![])];
        let op = DecomposeOp { original_id: PhaseId::new("orig"), sub_phases: vec![sub("only-one", 0, vec![])] };
        let err = decompose(&mut dag, &mut phases, op).unwrap_err();
        assert!(matches!(err, DecompositionError::InvalidSubPhaseCount(1)));
    }
}
