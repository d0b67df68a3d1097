//! Scheduler: wraps the [`Dag`], identifies independent tracks, computes
//! per-phase impact scores, and returns ready-phase lists sorted by impact
//! (spec.md §4.2).

use std::collections::{HashMap, HashSet};

use crate::dag::Dag;
use crate::model::PhaseId;

pub struct Scheduler<'a> {
    dag: &'a Dag,
}

impl<'a> Scheduler<'a> {
    pub fn new(dag: &'a Dag) -> Self {
        Self { dag }
    }

    /// Nodes whose every dependency is in `done` and which are not
    /// themselves in `done`, sorted by descending impact, ties broken by
    /// ascending priority then id.
    pub fn ready(&self, done: &HashSet<PhaseId>) -> Vec<PhaseId> {
        let impact = self.dag.impact_scores();
        let mut ready: Vec<PhaseId> = self
            .dag
            .node_ids()
            .filter(|id| !done.contains(*id))
            .filter(|id| self.dag.deps_for(id).iter().all(|d| done.contains(d)))
            .cloned()
            .collect();

        ready.sort_by(|a, b| {
            let ia = impact.get(a).copied().unwrap_or(0.0);
            let ib = impact.get(b).copied().unwrap_or(0.0);
            ib.partial_cmp(&ia)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| self.dag.priority(a).unwrap_or(0).cmp(&self.dag.priority(b).unwrap_or(0)))
                .then_with(|| a.cmp(b))
        });
        ready
    }

    /// Weakly connected components of the DAG.
    pub fn tracks(&self) -> Vec<Vec<PhaseId>> {
        self.dag.tracks()
    }

    /// The track index containing `id`, if any.
    pub fn track_for(&self, id: &PhaseId) -> Option<usize> {
        self.tracks().iter().position(|t| t.contains(id))
    }

    /// `min(len(tracks), max_workers)`, 0 for an empty track set.
    pub fn track_parallelism(tracks: &[Vec<PhaseId>], max_workers: usize) -> usize {
        if tracks.is_empty() {
            0
        } else {
            tracks.len().min(max_workers)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PhaseId;

    fn pid(s: &str) -> PhaseId {
        PhaseId::new(s)
    }

    #[test]
    fn ready_excludes_done_and_unsatisfied() {
        let mut dag = Dag::new();
        dag.add_node(pid("a"), 0).unwrap();
        dag.add_node(pid("b"), 0).unwrap();
        dag.add_node(pid("c"), 0).unwrap();
        dag.add_edge(&pid("a"), &pid("b")).unwrap();

        let scheduler = Scheduler::new(&dag);
        let done = HashSet::new();
        let ready = scheduler.ready(&done);
        assert!(ready.contains(&pid("a")));
        assert!(ready.contains(&pid("c")));
        assert!(!ready.contains(&pid("b")));

        let mut done = HashSet::new();
        done.insert(pid("a"));
        let ready = scheduler.ready(&done);
        assert!(ready.contains(&pid("b")));
        assert!(!ready.contains(&pid("a")));
    }

    #[test]
    fn track_parallelism_caps_at_max_workers() {
        let tracks = vec![vec![pid("a")], vec![pid("b")], vec![pid("c")]];
        assert_eq!(Scheduler::track_parallelism(&tracks, 2), 2);
        assert_eq!(Scheduler::track_parallelism(&tracks, 10), 3);
        assert_eq!(Scheduler::track_parallelism(&[], 10), 0);
    }
}
