//! A phase that requires a symbol nobody publishes is blocked by the
//! poller, retried up to the default retry cap, then escalated —
//! terminating the run with `GateTermination::Escalated` (spec.md §8,
//! scenario 7; spec.md §4.5 policy table).

mod helpers;

use std::sync::Arc;

use quasar_nebula::error::{GateTerminationKind, NebulaError};
use quasar_nebula::hot_reload::HotReloader;
use quasar_nebula::model::{ExecutionDefaults, FabricPhaseState, PhaseId};
use quasar_nebula::worker_group::WorkerGroup;

#[tokio::test]
async fn unresolvable_requirement_escalates_after_retries() {
    let phases = vec![helpers::phase_with_body(
        "needs-thing",
        &[],
        "## Requires\n\n- `NeverPublished`\n",
    )];
    let dag = helpers::dag_from(&phases);
    let (executor, fabric) = helpers::mock_executor().await;

    let dir = tempfile::tempdir().unwrap();
    let seed_ids = phases.iter().map(|p| p.id.clone()).collect();
    let mut hot_reloader = HotReloader::new(dir.path(), dag.clone(), seed_ids).unwrap();

    let mut group =
        WorkerGroup::new(dag, phases, fabric.clone(), Arc::new(executor), dir.path(), 4, ExecutionDefaults::default(), String::new());

    let result = group.run(&mut hot_reloader).await;
    let err = result.unwrap_err();
    assert!(matches!(err, NebulaError::GateTermination(GateTerminationKind::Escalated(ref id)) if id.as_str() == "needs-thing"));
    assert_eq!(
        fabric.get_phase_state(&PhaseId::new("needs-thing")).await.unwrap(),
        Some(FabricPhaseState::HumanDecision)
    );
}
