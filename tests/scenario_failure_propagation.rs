//! A failed phase's dependents never dispatch, while unrelated phases
//! run to completion; the overall run still exits cleanly rather than
//! propagating the per-phase failure as a run-level error (spec.md §8,
//! scenario 3; spec.md §4.3 "transitive failure").

mod helpers;

use std::sync::Arc;

use quasar_nebula::hot_reload::HotReloader;
use quasar_nebula::model::{ExecutionDefaults, FabricPhaseState, PhaseId};
use quasar_nebula::worker_group::WorkerGroup;

#[tokio::test]
async fn failed_phase_blocks_its_dependents_only() {
    let phases = vec![
        helpers::phase("a", &[]),
        helpers::phase("b", &["a"]),
        helpers::phase("unrelated", &[]),
    ];
    let dag = helpers::dag_from(&phases);
    let (executor, fabric) = helpers::scripted_executor(vec![PhaseId::new("a")]).await;

    let dir = tempfile::tempdir().unwrap();
    let seed_ids = phases.iter().map(|p| p.id.clone()).collect();
    let mut hot_reloader = HotReloader::new(dir.path(), dag.clone(), seed_ids).unwrap();

    let mut group =
        WorkerGroup::new(dag, phases, fabric.clone(), Arc::new(executor), dir.path(), 4, ExecutionDefaults::default(), String::new());

    group.run(&mut hot_reloader).await.unwrap();

    assert_eq!(fabric.get_phase_state(&PhaseId::new("a")).await.unwrap(), Some(FabricPhaseState::Running));
    assert_eq!(fabric.get_phase_state(&PhaseId::new("b")).await.unwrap(), None);
    assert_eq!(fabric.get_phase_state(&PhaseId::new("unrelated")).await.unwrap(), Some(FabricPhaseState::Done));
}
