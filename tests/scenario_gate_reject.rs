//! A phase gated `Approve` is rejected by [`AutoGater`] (which never
//! guesses on a human-required gate), terminating the run with a
//! `GateTermination::Rejected` and exit code 3 (spec.md §8, scenario 4;
//! spec.md §6 exit codes).

mod helpers;

use std::sync::Arc;

use quasar_nebula::error::{exit_code, GateTerminationKind, NebulaError};
use quasar_nebula::hot_reload::HotReloader;
use quasar_nebula::model::{ExecutionDefaults, GateMode};
use quasar_nebula::worker_group::WorkerGroup;

#[tokio::test]
async fn approve_gate_rejection_terminates_the_run() {
    let phases = vec![helpers::phase_with_gate("gated", &[], GateMode::Approve), helpers::phase("after", &["gated"])];
    let dag = helpers::dag_from(&phases);
    let (executor, fabric) = helpers::mock_executor().await;

    let dir = tempfile::tempdir().unwrap();
    let seed_ids = phases.iter().map(|p| p.id.clone()).collect();
    let mut hot_reloader = HotReloader::new(dir.path(), dag.clone(), seed_ids).unwrap();

    let mut group =
        WorkerGroup::new(dag, phases, fabric, Arc::new(executor), dir.path(), 4, ExecutionDefaults::default(), String::new());

    let result = group.run(&mut hot_reloader).await;
    let err = result.unwrap_err();
    assert!(matches!(err, NebulaError::GateTermination(GateTerminationKind::Rejected(ref id)) if id.as_str() == "gated"));
    assert_eq!(exit_code(&Err(err)), 3);
}
