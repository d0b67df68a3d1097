//! PhaseTracker: mutable in-memory record of which phases are done, failed,
//! or in-flight. Filters a ready list for scope conflicts and
//! dependency-failure transitivity (spec.md §4.3).

use std::collections::{HashMap, HashSet};

use crate::dag::Dag;
use crate::model::{Phase, PhaseId};
use crate::scope::scopes_overlap;

#[derive(Debug, Default)]
pub struct PhaseTracker {
    done: HashSet<PhaseId>,
    failed: HashSet<PhaseId>,
    in_flight: HashSet<PhaseId>,
    index: HashMap<PhaseId, Phase>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index_phase(&mut self, phase: Phase) {
        self.index.insert(phase.id.clone(), phase);
    }

    pub fn get(&self, id: &PhaseId) -> Option<&Phase> {
        self.index.get(id)
    }

    pub fn done(&self) -> &HashSet<PhaseId> {
        &self.done
    }

    pub fn failed(&self) -> &HashSet<PhaseId> {
        &self.failed
    }

    pub fn in_flight(&self) -> &HashSet<PhaseId> {
        &self.in_flight
    }

    pub fn mark_in_flight(&mut self, id: PhaseId) {
        self.in_flight.insert(id);
    }

    pub fn clear_in_flight(&mut self, id: &PhaseId) {
        self.in_flight.remove(id);
    }

    /// Marks a phase done. Idempotent.
    pub fn mark_done(&mut self, id: &PhaseId) {
        self.in_flight.remove(id);
        self.done.insert(id.clone());
    }

    /// Marks a phase failed. Per spec.md §4.3, `done[id]` is also set so
    /// its dependents become ready — they are then filtered back out here
    /// by the transitive-failure check, rather than never becoming ready
    /// at all. This lets the scheduler discover them (and skip them) in
    /// one batch instead of needing a separate failure-propagation pass.
    pub fn mark_failed(&mut self, id: &PhaseId) {
        self.in_flight.remove(id);
        self.failed.insert(id.clone());
        self.done.insert(id.clone());
    }

    /// Clears a phase from failed/done/in-flight, for an explicit RETRY
    /// intervention (spec.md §4.6).
    pub fn reset_for_retry(&mut self, id: &PhaseId) {
        self.failed.remove(id);
        self.done.remove(id);
        self.in_flight.remove(id);
    }

    /// True if any ancestor of `id` (via `dag`) is in `failed`.
    fn blocked_by_failure(&self, id: &PhaseId, dag: &Dag) -> bool {
        dag.ancestors(id).iter().any(|a| self.failed.contains(a)) || self.failed.contains(id)
    }

    fn overlaps_in_flight(&self, phase: &Phase) -> Option<PhaseId> {
        for other_id in &self.in_flight {
            if other_id == &phase.id {
                continue;
            }
            let Some(other) = self.index.get(other_id) else {
                continue;
            };
            if phase.allow_scope_overlap && other.allow_scope_overlap {
                continue;
            }
            if scopes_overlap(&phase.scope, &other.scope) {
                return Some(other_id.clone());
            }
        }
        None
    }

    /// Returns ids from `ready` that are not in-flight, not failed, have no
    /// failed predecessor, and whose scope does not overlap any currently
    /// in-flight phase (unless both sides carry `allow_scope_overlap`).
    /// Preserves the input ordering (impact order).
    pub fn filter_eligible(&self, ready: &[PhaseId], dag: &Dag) -> Vec<PhaseId> {
        ready
            .iter()
            .filter(|id| !self.in_flight.contains(*id))
            .filter(|id| !self.blocked_by_failure(id, dag))
            .filter(|id| match self.index.get(*id) {
                Some(phase) => self.overlaps_in_flight(phase).is_none(),
                None => true,
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PhaseType;

    fn phase(id: &str, scope: Vec<&str>, allow_overlap: bool) -> Phase {
        Phase {
            id: PhaseId::new(id),
            title: id.to_string(),
            priority: 0,
            phase_type: PhaseType::Task,
            dependencies: vec![],
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

    #[test]
    fn filters_scope_conflicts() {
        let mut tracker = PhaseTracker::new();
        tracker.index_phase(phase("a", vec!["internal/*.go"], false));
        tracker.index_phase(phase("b", vec!["internal/*.go"], false));
        tracker.mark_in_flight(PhaseId::new("a"));

        let dag = Dag::new();
        let ready = vec![PhaseId::new("b")];
        let eligible = tracker.filter_eligible(&ready, &dag);
        assert!(eligible.is_empty());
    }

    #[test]
    fn allow_scope_overlap_permits_both() {
        let mut tracker = PhaseTracker::new();
        tracker.index_phase(phase("a", vec!["internal/*.go"], true));
        tracker.index_phase(phase("b", vec!["internal/*.go"], true));
        tracker.mark_in_flight(PhaseId::new("a"));

        let dag = Dag::new();
        let ready = vec![PhaseId::new("b")];
        let eligible = tracker.filter_eligible(&ready, &dag);
        assert_eq!(eligible, vec![PhaseId::new("b")]);
    }

    #[test]
    fn transitive_failure_blocks_dependents() {
        let mut dag = Dag::new();
        dag.add_node(PhaseId::new("a"), 0).unwrap();
        dag.add_node(PhaseId::new("b"), 0).unwrap();
        dag.add_edge(&PhaseId::new("a"), &PhaseId::new("b")).unwrap();

        let mut tracker = PhaseTracker::new();
        tracker.index_phase(phase("a", vec![], false));
        tracker.index_phase(phase("b", vec![], false));
        tracker.mark_failed(&PhaseId::new("a"));

        let ready = vec![PhaseId::new("b")];
        let eligible = tracker.filter_eligible(&ready, &dag);
        assert!(eligible.is_empty());
    }
}
