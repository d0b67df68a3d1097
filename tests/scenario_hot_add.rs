//! A phase file dropped into the nebula directory mid-run is picked up
//! by the next hot-reload poll and dispatched in the same run, without
//! restarting anything (spec.md §8, scenario 6; spec.md §4.8).

mod helpers;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use quasar_nebula::hot_reload::HotReloader;
use quasar_nebula::model::{ExecutionDefaults, FabricPhaseState, PhaseId};
use quasar_nebula::worker_group::WorkerGroup;

#[tokio::test]
async fn hot_added_phase_file_runs_within_the_same_run() {
    let phases = vec![helpers::phase("a", &[])];
    let dag = helpers::dag_from(&phases);

    let mut delays = HashMap::new();
    delays.insert(PhaseId::new("a"), Duration::from_millis(200));
    let (executor, fabric) = helpers::delayed_executor(delays).await;

    let dir = tempfile::tempdir().unwrap();
    let seed_ids = phases.iter().map(|p| p.id.clone()).collect();
    let mut hot_reloader = HotReloader::new(dir.path(), dag.clone(), seed_ids).unwrap();

    let dir_path = dir.path().to_path_buf();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        std::fs::write(dir_path.join("b.md"), "+++\nid = \"b\"\ntitle = \"B\"\n+++\n").unwrap();
    });

    let mut group =
        WorkerGroup::new(dag, phases, fabric.clone(), Arc::new(executor), dir.path(), 4, ExecutionDefaults::default(), String::new());

    group.run(&mut hot_reloader).await.unwrap();

    assert_eq!(fabric.get_phase_state(&PhaseId::new("a")).await.unwrap(), Some(FabricPhaseState::Done));
    assert_eq!(fabric.get_phase_state(&PhaseId::new("b")).await.unwrap(), Some(FabricPhaseState::Done));
}
