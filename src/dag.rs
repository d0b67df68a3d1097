//! The dependency DAG: directed graph of phase ids with priorities.
//!
//! Supports add/remove node, add/remove edge, cycle detection, topological
//! sort, ancestors, and impact scoring (spec.md §4.1). Invariants: the graph
//! is always acyclic; every edge references existing nodes; `remove` is
//! O(V+E) and atomic (no partial mutation is observable).

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;

use crate::model::PhaseId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DagError {
    #[error("node {0} already exists")]
    DuplicateNode(PhaseId),
    #[error("node {0} not found")]
    UnknownNode(PhaseId),
    #[error("adding edge {from} -> {to} would create a cycle")]
    WouldCycle { from: PhaseId, to: PhaseId },
    #[error("cycle detected during topological sort")]
    CycleDetected,
}

#[derive(Debug, Clone)]
struct Node {
    priority: i32,
    deps: BTreeSet<PhaseId>,
    dependents: BTreeSet<PhaseId>,
}

/// Directed acyclic graph of phase ids.
#[derive(Debug, Clone, Default)]
pub struct Dag {
    nodes: HashMap<PhaseId, Node>,
}

impl Dag {
    pub fn new() -> Self {
        Self { nodes: HashMap::new() }
    }

    /// Add a node. Errors on duplicate.
    pub fn add_node(&mut self, id: PhaseId, priority: i32) -> Result<(), DagError> {
        if self.nodes.contains_key(&id) {
            return Err(DagError::DuplicateNode(id));
        }
        self.nodes.insert(
            id,
            Node {
                priority,
                deps: BTreeSet::new(),
                dependents: BTreeSet::new(),
            },
        );
        Ok(())
    }

    /// Idempotent variant of [`Dag::add_node`]: returns `Ok(())` whether or
    /// not the node already existed, leaving an existing node untouched.
    pub fn add_node_idempotent(&mut self, id: PhaseId, priority: i32) {
        self.nodes.entry(id).or_insert_with(|| Node {
            priority,
            deps: BTreeSet::new(),
            dependents: BTreeSet::new(),
        });
    }

    pub fn contains(&self, id: &PhaseId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn priority(&self, id: &PhaseId) -> Option<i32> {
        self.nodes.get(id).map(|n| n.priority)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &PhaseId> {
        self.nodes.keys()
    }

    /// Add the edge `from -> to` (`to` depends on `from`). Errors if either
    /// endpoint is missing, or if adding it would create a cycle — detected
    /// by a DFS from `to` looking for `from`.
    pub fn add_edge(&mut self, from: &PhaseId, to: &PhaseId) -> Result<(), DagError> {
        if !self.nodes.contains_key(from) {
            return Err(DagError::UnknownNode(from.clone()));
        }
        if !self.nodes.contains_key(to) {
            return Err(DagError::UnknownNode(to.clone()));
        }
        if from == to || self.connected_directed(to, from) {
            return Err(DagError::WouldCycle {
                from: from.clone(),
                to: to.clone(),
            });
        }
        self.nodes.get_mut(to).unwrap().deps.insert(from.clone());
        self.nodes.get_mut(from).unwrap().dependents.insert(to.clone());
        Ok(())
    }

    /// True if `target` is reachable from `start` by following dependent
    /// edges (used internally to detect would-be cycles).
    fn connected_directed(&self, start: &PhaseId, target: &PhaseId) -> bool {
        let mut seen = HashSet::new();
        let mut stack = vec![start.clone()];
        while let Some(cur) = stack.pop() {
            if &cur == target {
                return true;
            }
            if !seen.insert(cur.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&cur) {
                stack.extend(node.dependents.iter().cloned());
            }
        }
        false
    }

    /// Remove a node and all incident edges. No-op if absent.
    pub fn remove(&mut self, id: &PhaseId) {
        let Some(node) = self.nodes.remove(id) else {
            return;
        };
        for dep in &node.deps {
            if let Some(n) = self.nodes.get_mut(dep) {
                n.dependents.remove(id);
            }
        }
        for dependent in &node.dependents {
            if let Some(n) = self.nodes.get_mut(dependent) {
                n.deps.remove(id);
            }
        }
    }

    /// Direct predecessors ("must complete first").
    pub fn deps_for(&self, id: &PhaseId) -> Vec<PhaseId> {
        self.nodes
            .get(id)
            .map(|n| n.deps.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Direct successors, alphabetically sorted for determinism.
    pub fn direct_dependents(&self, id: &PhaseId) -> Vec<PhaseId> {
        self.nodes
            .get(id)
            .map(|n| n.dependents.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Transitive predecessors.
    pub fn ancestors(&self, id: &PhaseId) -> HashSet<PhaseId> {
        let mut result = HashSet::new();
        let mut queue: VecDeque<PhaseId> = self.deps_for(id).into();
        while let Some(cur) = queue.pop_front() {
            if result.insert(cur.clone()) {
                queue.extend(self.deps_for(&cur));
            }
        }
        result
    }

    /// Undirected reachability.
    pub fn connected(&self, a: &PhaseId, b: &PhaseId) -> bool {
        if a == b {
            return true;
        }
        let mut seen = HashSet::new();
        let mut stack = vec![a.clone()];
        while let Some(cur) = stack.pop() {
            if &cur == b {
                return true;
            }
            if !seen.insert(cur.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&cur) {
                stack.extend(node.deps.iter().cloned());
                stack.extend(node.dependents.iter().cloned());
            }
        }
        false
    }

    /// Kahn's algorithm. Errors on cycle.
    pub fn topological_sort(&self) -> Result<Vec<PhaseId>, DagError> {
        let mut in_degree: HashMap<PhaseId, usize> =
            self.nodes.iter().map(|(id, n)| (id.clone(), n.deps.len())).collect();
        let mut queue: Vec<PhaseId> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(id, _)| id.clone())
            .collect();
        queue.sort();

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue: VecDeque<PhaseId> = queue.into();
        while let Some(id) = queue.pop_front() {
            order.push(id.clone());
            let mut newly_ready = Vec::new();
            for dependent in self.direct_dependents(&id) {
                let degree = in_degree.get_mut(&dependent).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    newly_ready.push(dependent);
                }
            }
            newly_ready.sort();
            queue.extend(newly_ready);
        }

        if order.len() != self.nodes.len() {
            return Err(DagError::CycleDetected);
        }
        Ok(order)
    }

    /// Kahn-style level sets. Within a level, order by priority ascending
    /// then by id.
    pub fn waves(&self) -> Result<Vec<Vec<PhaseId>>, DagError> {
        let mut in_degree: HashMap<PhaseId, usize> =
            self.nodes.iter().map(|(id, n)| (id.clone(), n.deps.len())).collect();
        let mut remaining = self.nodes.len();
        let mut waves = Vec::new();

        loop {
            let mut wave: Vec<PhaseId> = in_degree
                .iter()
                .filter(|(_, &d)| d == 0)
                .map(|(id, _)| id.clone())
                .collect();
            if wave.is_empty() {
                break;
            }
            wave.sort_by(|a, b| {
                self.priority(a)
                    .unwrap_or(0)
                    .cmp(&self.priority(b).unwrap_or(0))
                    .then_with(|| a.cmp(b))
            });
            for id in &wave {
                in_degree.remove(id);
                remaining -= 1;
                for dependent in self.direct_dependents(id) {
                    if let Some(degree) = in_degree.get_mut(&dependent) {
                        *degree -= 1;
                    }
                }
            }
            waves.push(wave);
        }

        if remaining != 0 {
            return Err(DagError::CycleDetected);
        }
        Ok(waves)
    }

    /// Weakly connected components (tracks).
    pub fn tracks(&self) -> Vec<Vec<PhaseId>> {
        let mut seen = HashSet::new();
        let mut tracks = Vec::new();
        let mut ids: Vec<&PhaseId> = self.nodes.keys().collect();
        ids.sort();
        for id in ids {
            if seen.contains(id) {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![id.clone()];
            while let Some(cur) = stack.pop() {
                if !seen.insert(cur.clone()) {
                    continue;
                }
                component.push(cur.clone());
                if let Some(node) = self.nodes.get(&cur) {
                    stack.extend(node.deps.iter().cloned());
                    stack.extend(node.dependents.iter().cloned());
                }
            }
            component.sort();
            tracks.push(component);
        }
        tracks
    }

    /// `impact(n) = 1 + sum(impact(d) for d in direct_dependents(n))`,
    /// normalized by the maximum impact in the graph. Used to sort ready
    /// sets (spec.md §4.1, §4.2).
    pub fn impact_scores(&self) -> HashMap<PhaseId, f64> {
        let mut memo: HashMap<PhaseId, u64> = HashMap::new();
        let mut ids: Vec<&PhaseId> = self.nodes.keys().collect();
        ids.sort();
        for id in &ids {
            self.impact_raw(id, &mut memo, &mut HashSet::new());
        }
        let max = memo.values().copied().max().unwrap_or(1).max(1) as f64;
        memo.into_iter().map(|(id, raw)| (id, raw as f64 / max)).collect()
    }

    fn impact_raw(&self, id: &PhaseId, memo: &mut HashMap<PhaseId, u64>, visiting: &mut HashSet<PhaseId>) -> u64 {
        if let Some(v) = memo.get(id) {
            return *v;
        }
        // visiting guards against infinite recursion; the graph is acyclic
        // by construction, so this only matters defensively.
        if !visiting.insert(id.clone()) {
            return 1;
        }
        let mut total: u64 = 1;
        for dependent in self.direct_dependents(id) {
            total = total.saturating_add(self.impact_raw(&dependent, memo, visiting));
        }
        visiting.remove(id);
        memo.insert(id.clone(), total);
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> PhaseId {
        PhaseId::new(s)
    }

    fn linear() -> Dag {
        let mut dag = Dag::new();
        dag.add_node(pid("a"), 0).unwrap();
        dag.add_node(pid("b"), 0).unwrap();
        dag.add_node(pid("c"), 0).unwrap();
        dag.add_edge(&pid("a"), &pid("b")).unwrap();
        dag.add_edge(&pid("b"), &pid("c")).unwrap();
        dag
    }

    #[test]
    fn topo_sort_respects_edges() {
        let dag = linear();
        let order = dag.topological_sort().unwrap();
        assert_eq!(order, vec![pid("a"), pid("b"), pid("c")]);
    }

    #[test]
    fn waves_group_diamond() {
        let mut dag = Dag::new();
        for n in ["root", "left", "right", "join"] {
            dag.add_node(pid(n), 0).unwrap();
        }
        dag.add_edge(&pid("root"), &pid("left")).unwrap();
        dag.add_edge(&pid("root"), &pid("right")).unwrap();
        dag.add_edge(&pid("left"), &pid("join")).unwrap();
        dag.add_edge(&pid("right"), &pid("join")).unwrap();

        let waves = dag.waves().unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0], vec![pid("root")]);
        assert_eq!(waves[1], vec![pid("left"), pid("right")]);
        assert_eq!(waves[2], vec![pid("join")]);
    }

    #[test]
    fn add_edge_rejects_cycle() {
        let mut dag = linear();
        let err = dag.add_edge(&pid("c"), &pid("a")).unwrap_err();
        assert_eq!(
            err,
            DagError::WouldCycle {
                from: pid("c"),
                to: pid("a")
            }
        );
    }

    #[test]
    fn remove_drops_incident_edges() {
        let mut dag = linear();
        dag.remove(&pid("b"));
        assert!(dag.deps_for(&pid("c")).is_empty());
        assert!(dag.direct_dependents(&pid("a")).is_empty());
        assert_eq!(dag.len(), 2);
    }

    #[test]
    fn ancestors_is_transitive() {
        let dag = linear();
        let anc = dag.ancestors(&pid("c"));
        assert!(anc.contains(&pid("a")));
        assert!(anc.contains(&pid("b")));
    }

    #[test]
    fn impact_score_favors_upstream_nodes() {
        let dag = linear();
        let scores = dag.impact_scores();
        // `a` blocks b and c transitively, so it has the highest impact.
        assert!(scores[&pid("a")] >= scores[&pid("b")]);
        assert!(scores[&pid("b")] >= scores[&pid("c")]);
        assert_eq!(scores[&pid("c")], 1.0 / 3.0);
    }

    #[test]
    fn tracks_splits_disconnected_components() {
        let mut dag = Dag::new();
        dag.add_node(pid("x"), 0).unwrap();
        dag.add_node(pid("y"), 0).unwrap();
        let tracks = dag.tracks();
        assert_eq!(tracks.len(), 2);
    }
}
