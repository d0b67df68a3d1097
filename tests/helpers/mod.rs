//! Shared scaffolding for the scenario tests: phase/dag fixtures, an
//! in-memory fabric, and a `MockPhaseRunner`-backed executor, mirroring
//! the teacher's `tests/helpers/database.rs` in-memory-database
//! convention.

#![allow(dead_code)]

use std::sync::Arc;

use quasar_nebula::beads::NullBeadsClient;
use quasar_nebula::dag::Dag;
use quasar_nebula::executor::PhaseExecutor;
use quasar_nebula::fabric::sqlite_store::SqliteFabric;
use quasar_nebula::fabric::Fabric;
use quasar_nebula::gate::AutoGater;
use quasar_nebula::git::{DiffStat, GitCommitter, GitResult};
use quasar_nebula::model::{GateMode, Phase, PhaseId, PhaseType};
use quasar_nebula::runner::{MockPhaseRunner, PhaseRunner, RunOutcome, RunRequest, RunResult};

/// Builds a minimal phase with no scope, no gate override, and a
/// `kebab-case` id, for tests that only care about dependency wiring.
pub fn phase(id: &str, deps: &[&str]) -> Phase {
    Phase {
        id: PhaseId::new(id),
        title: id.to_string(),
        priority: 0,
        phase_type: PhaseType::Task,
        dependencies: deps.iter().map(|d| PhaseId::new(*d)).collect(),
        blocks: vec![],
        scope: vec![],
        allow_scope_overlap: false,
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

pub fn phase_with_gate(id: &str, deps: &[&str], gate: GateMode) -> Phase {
    Phase { gate: Some(gate), ..phase(id, deps) }
}

/// A phase as per [`phase`], but with a scope glob, for scope-overlap
/// scenarios.
pub fn phase_with_scope(id: &str, deps: &[&str], scope: &[&str]) -> Phase {
    Phase { scope: scope.iter().map(|s| s.to_string()).collect(), ..phase(id, deps) }
}

/// A phase as per [`phase`], but with a markdown body, for scenarios
/// exercising the `## Requires`/`## Produces` poller checks.
pub fn phase_with_body(id: &str, deps: &[&str], body: &str) -> Phase {
    Phase { body: body.to_string(), ..phase(id, deps) }
}

/// Builds a [`Dag`] from a phase slice, wiring `depends_on` edges.
pub fn dag_from(phases: &[Phase]) -> Dag {
    let mut dag = Dag::new();
    for p in phases {
        dag.add_node_idempotent(p.id.clone(), p.priority);
    }
    for p in phases {
        for dep in &p.dependencies {
            dag.add_edge(dep, &p.id).unwrap();
        }
    }
    dag
}

/// A [`GitCommitter`] that records nothing and never touches a real
/// repository, so scenario tests don't need an actual git working tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopGitCommitter;

#[async_trait::async_trait]
impl GitCommitter for NoopGitCommitter {
    async fn commit_phase(&self, _repo_root: &str, _message: &str) -> GitResult<Option<String>> {
        Ok(Some("deadbeef".to_string()))
    }

    async fn diff(&self, _repo_root: &str) -> GitResult<String> {
        Ok(String::new())
    }

    async fn diff_last_commit(&self, _repo_root: &str) -> GitResult<String> {
        Ok(String::new())
    }

    async fn diff_stat_last_commit(&self, _repo_root: &str) -> GitResult<DiffStat> {
        Ok(DiffStat::default())
    }

    async fn diff_range(&self, _repo_root: &str, _from: &str, _to: &str) -> GitResult<String> {
        Ok(String::new())
    }

    async fn diff_stat_range(&self, _repo_root: &str, _from: &str, _to: &str) -> GitResult<DiffStat> {
        Ok(DiffStat::default())
    }

    async fn reset_to(&self, _repo_root: &str, _commit: &str) -> GitResult<()> {
        Ok(())
    }

    async fn head(&self, _repo_root: &str) -> GitResult<String> {
        Ok("deadbeef".to_string())
    }
}

/// A [`PhaseRunner`] whose success/failure is keyed by phase id, so a
/// scenario can script one phase failing while the rest succeed.
pub struct ScriptedPhaseRunner {
    pub fail_ids: Vec<PhaseId>,
}

#[async_trait::async_trait]
impl PhaseRunner for ScriptedPhaseRunner {
    async fn run(&self, request: RunRequest) -> RunResult<RunOutcome> {
        let succeeded = !self.fail_ids.contains(&request.phase.id);
        Ok(RunOutcome {
            succeeded,
            summary: if succeeded { "ok".to_string() } else { "scripted failure".to_string() },
            cost_usd: 0.01,
            ..Default::default()
        })
    }
}

/// A [`PhaseRunner`] that sleeps for a per-phase duration before
/// succeeding, for scenarios that need a dispatched phase to still be
/// in flight while something else happens concurrently (e.g. a
/// hot-added phase file landing on disk).
pub struct DelayedPhaseRunner {
    pub delays: std::collections::HashMap<PhaseId, std::time::Duration>,
}

#[async_trait::async_trait]
impl PhaseRunner for DelayedPhaseRunner {
    async fn run(&self, request: RunRequest) -> RunResult<RunOutcome> {
        if let Some(delay) = self.delays.get(&request.phase.id) {
            tokio::time::sleep(*delay).await;
        }
        Ok(RunOutcome { succeeded: true, summary: "ok".to_string(), cost_usd: 0.0, ..Default::default() })
    }
}

/// A [`PhaseRunner`] that records how many phases are running
/// concurrently at any instant, for scenarios that assert mutual
/// exclusion (e.g. scope-overlap serialization) rather than just
/// eventual completion.
pub struct ConcurrencyTrackingPhaseRunner {
    pub delay: std::time::Duration,
    pub active: Arc<std::sync::atomic::AtomicUsize>,
    pub max_seen: Arc<std::sync::atomic::AtomicUsize>,
}

#[async_trait::async_trait]
impl PhaseRunner for ConcurrencyTrackingPhaseRunner {
    async fn run(&self, _request: RunRequest) -> RunResult<RunOutcome> {
        use std::sync::atomic::Ordering;
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(RunOutcome { succeeded: true, summary: "ok".to_string(), cost_usd: 0.0, ..Default::default() })
    }
}

pub async fn concurrency_tracking_executor(
    delay: std::time::Duration,
) -> (PhaseExecutor, Arc<dyn Fabric>, Arc<std::sync::atomic::AtomicUsize>) {
    let fabric: Arc<dyn Fabric> = Arc::new(SqliteFabric::open_in_memory().await.unwrap());
    let max_seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let executor = PhaseExecutor {
        runner: Arc::new(ConcurrencyTrackingPhaseRunner {
            delay,
            active: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
            max_seen: Arc::clone(&max_seen),
        }),
        git: Arc::new(NoopGitCommitter),
        gater: Arc::new(AutoGater),
        fabric: Arc::clone(&fabric),
        beads: Arc::new(NullBeadsClient),
        repo_root: ".".to_string(),
        nebula_name: "test-nebula".to_string(),
    };
    (executor, fabric, max_seen)
}

pub async fn delayed_executor(delays: std::collections::HashMap<PhaseId, std::time::Duration>) -> (PhaseExecutor, Arc<dyn Fabric>) {
    let fabric: Arc<dyn Fabric> = Arc::new(SqliteFabric::open_in_memory().await.unwrap());
    let executor = PhaseExecutor {
        runner: Arc::new(DelayedPhaseRunner { delays }),
        git: Arc::new(NoopGitCommitter),
        gater: Arc::new(AutoGater),
        fabric: Arc::clone(&fabric),
        beads: Arc::new(NullBeadsClient),
        repo_root: ".".to_string(),
        nebula_name: "test-nebula".to_string(),
    };
    (executor, fabric)
}

/// Builds a [`PhaseExecutor`] wired to an in-memory fabric, the
/// deterministic [`MockPhaseRunner`], a no-op git committer, and
/// [`AutoGater`] so every phase gate resolves without an operator.
pub async fn mock_executor() -> (PhaseExecutor, Arc<dyn Fabric>) {
    let fabric: Arc<dyn Fabric> = Arc::new(SqliteFabric::open_in_memory().await.unwrap());
    let executor = PhaseExecutor {
        runner: Arc::new(MockPhaseRunner),
        git: Arc::new(NoopGitCommitter),
        gater: Arc::new(AutoGater),
        fabric: Arc::clone(&fabric),
        beads: Arc::new(NullBeadsClient),
        repo_root: ".".to_string(),
        nebula_name: "test-nebula".to_string(),
    };
    (executor, fabric)
}

/// Like [`mock_executor`], but the runner fails every id in `fail_ids`.
pub async fn scripted_executor(fail_ids: Vec<PhaseId>) -> (PhaseExecutor, Arc<dyn Fabric>) {
    let fabric: Arc<dyn Fabric> = Arc::new(SqliteFabric::open_in_memory().await.unwrap());
    let executor = PhaseExecutor {
        runner: Arc::new(ScriptedPhaseRunner { fail_ids }),
        git: Arc::new(NoopGitCommitter),
        gater: Arc::new(AutoGater),
        fabric: Arc::clone(&fabric),
        beads: Arc::new(NullBeadsClient),
        repo_root: ".".to_string(),
        nebula_name: "test-nebula".to_string(),
    };
    (executor, fabric)
}
