//! Property tests over randomly generated acyclic phase graphs (spec.md
//! §8's quantified properties), grounded in the teacher's
//! `property_dependency_resolver.rs` use of `proptest` over generated
//! task graphs.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use quasar_nebula::dag::Dag;
use quasar_nebula::model::PhaseId;

/// Builds an acyclic DAG of `size` nodes named `n0..n{size-1}`, where
/// node `i` may depend on any subset of `0..i` selected by `edge_bits`
/// — by construction, every edge points from a lower index to a higher
/// one, so no cycle is possible.
fn acyclic_dag(size: usize, edge_bits: &[u8]) -> Dag {
    let mut dag = Dag::new();
    let ids: Vec<PhaseId> = (0..size).map(|i| PhaseId::new(format!("n{i}"))).collect();
    for id in &ids {
        dag.add_node(id.clone(), 0).unwrap();
    }
    for i in 0..size {
        for j in 0..i {
            let bit_index = i * size + j;
            if edge_bits.get(bit_index % edge_bits.len().max(1)).copied().unwrap_or(0) & 1 == 1 {
                let _ = dag.add_edge(&ids[j], &ids[i]);
            }
        }
    }
    dag
}

proptest! {
    /// `waves()` never reports a cycle for a DAG built by construction
    /// to be acyclic, and every node in a later wave has all its
    /// dependencies in an earlier wave.
    #[test]
    fn waves_respect_dependency_order(size in 1usize..25, edge_bits in prop::collection::vec(any::<u8>(), 1..200)) {
        let dag = acyclic_dag(size, &edge_bits);
        let waves = dag.waves().expect("construction guarantees acyclicity");

        let mut wave_of: HashMap<PhaseId, usize> = HashMap::new();
        for (idx, wave) in waves.iter().enumerate() {
            for id in wave {
                wave_of.insert(id.clone(), idx);
            }
        }

        for id in dag.node_ids() {
            let this_wave = wave_of[id];
            for dep in dag.deps_for(id) {
                prop_assert!(wave_of[&dep] < this_wave);
            }
        }

        let total: usize = waves.iter().map(Vec::len).sum();
        prop_assert_eq!(total, size);
    }

    /// Topological sort visits every dependency strictly before its
    /// dependents.
    #[test]
    fn topological_sort_respects_edges(size in 1usize..25, edge_bits in prop::collection::vec(any::<u8>(), 1..200)) {
        let dag = acyclic_dag(size, &edge_bits);
        let order = dag.topological_sort().expect("construction guarantees acyclicity");
        let position: HashMap<PhaseId, usize> = order.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();

        for id in dag.node_ids() {
            for dep in dag.deps_for(id) {
                prop_assert!(position[&dep] < position[id]);
            }
        }
    }

    /// Impact scores are always normalized into `[0, 1]`.
    #[test]
    fn impact_scores_are_normalized(size in 1usize..25, edge_bits in prop::collection::vec(any::<u8>(), 1..200)) {
        let dag = acyclic_dag(size, &edge_bits);
        let scores = dag.impact_scores();
        for (_, score) in scores {
            prop_assert!((0.0..=1.0).contains(&score));
        }
    }

    /// Removing a node drops every edge incident to it, and every other
    /// node's dependency set is otherwise untouched.
    #[test]
    fn remove_drops_only_incident_edges(size in 2usize..25, edge_bits in prop::collection::vec(any::<u8>(), 1..200), victim_idx in 0usize..24) {
        let mut dag = acyclic_dag(size, &edge_bits);
        let victim = PhaseId::new(format!("n{}", victim_idx % size));

        let other_deps_before: HashMap<PhaseId, HashSet<PhaseId>> = dag
            .node_ids()
            .filter(|id| **id != victim)
            .map(|id| (id.clone(), dag.deps_for(id).into_iter().filter(|d| *d != victim).collect()))
            .collect();

        dag.remove(&victim);
        prop_assert!(!dag.contains(&victim));

        for (id, expected) in other_deps_before {
            let actual: HashSet<PhaseId> = dag.deps_for(&id).into_iter().collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
