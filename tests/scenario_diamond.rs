//! A diamond dependency (`root -> {left, right} -> join`) runs `left`
//! and `right` as an independent wave before `join` becomes eligible
//! (spec.md §8, scenario 2).

mod helpers;

use std::sync::Arc;

use quasar_nebula::hot_reload::HotReloader;
use quasar_nebula::model::{ExecutionDefaults, FabricPhaseState, PhaseId};
use quasar_nebula::worker_group::WorkerGroup;

#[tokio::test]
async fn diamond_all_phases_complete() {
    let phases = vec![
        helpers::phase("root", &[]),
        helpers::phase("left", &["root"]),
        helpers::phase("right", &["root"]),
        helpers::phase("join", &["left", "right"]),
    ];
    let dag = helpers::dag_from(&phases);
    let (executor, fabric) = helpers::mock_executor().await;

    let dir = tempfile::tempdir().unwrap();
    let seed_ids = phases.iter().map(|p| p.id.clone()).collect();
    let mut hot_reloader = HotReloader::new(dir.path(), dag.clone(), seed_ids).unwrap();

    let mut group =
        WorkerGroup::new(dag, phases, fabric.clone(), Arc::new(executor), dir.path(), 4, ExecutionDefaults::default(), String::new());

    group.run(&mut hot_reloader).await.unwrap();

    for id in ["root", "left", "right", "join"] {
        assert_eq!(fabric.get_phase_state(&PhaseId::new(id)).await.unwrap(), Some(FabricPhaseState::Done));
    }
}
