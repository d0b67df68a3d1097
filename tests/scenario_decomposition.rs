//! A `DECOMPOSE` sentinel replaces a single phase with two sub-phases
//! before dispatch begins, and the run completes against the rewritten
//! graph rather than the original phase (spec.md §8, scenario 5;
//! spec.md §4.9).

mod helpers;

use std::sync::Arc;

use quasar_nebula::hot_reload::HotReloader;
use quasar_nebula::model::{ExecutionDefaults, FabricPhaseState, PhaseId};
use quasar_nebula::worker_group::WorkerGroup;

#[tokio::test]
async fn decompose_sentinel_replaces_original_with_sub_phases() {
    let phases = vec![helpers::phase("big", &[])];
    let dag = helpers::dag_from(&phases);
    let (executor, fabric) = helpers::mock_executor().await;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("DECOMPOSE"),
        r#"{
            "original_id": "big",
            "sub_phases": [
                {"id": "big-a", "title": "Big A"},
                {"id": "big-b", "title": "Big B", "dependencies": ["big-a"]}
            ]
        }"#,
    )
    .unwrap();

    let seed_ids = phases.iter().map(|p| p.id.clone()).collect();
    let mut hot_reloader = HotReloader::new(dir.path(), dag.clone(), seed_ids).unwrap();

    let mut group =
        WorkerGroup::new(dag, phases, fabric.clone(), Arc::new(executor), dir.path(), 4, ExecutionDefaults::default(), String::new());

    group.run(&mut hot_reloader).await.unwrap();

    assert!(!dir.path().join("DECOMPOSE").exists());
    assert_eq!(fabric.get_phase_state(&PhaseId::new("big")).await.unwrap(), None);
    assert_eq!(fabric.get_phase_state(&PhaseId::new("big-a")).await.unwrap(), Some(FabricPhaseState::Done));
    assert_eq!(fabric.get_phase_state(&PhaseId::new("big-b")).await.unwrap(), Some(FabricPhaseState::Done));
    assert!(dir.path().join("big-a.md").exists());
    assert!(dir.path().join("big-b.md").exists());
}
