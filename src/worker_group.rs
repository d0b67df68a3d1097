//! WorkerGroup (spec.md §4.6): the single dispatch loop that drives a
//! batch of executor tasks per iteration, bounded by a semaphore of
//! capacity `MaxWorkers`. One coarse mutex (`state`) protects tracker
//! sets, results, and the gate-signal queue; it is never held across a
//! `PhaseRunner`, git, or fabric call (spec.md §5 "Locking discipline").

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

use serde::Deserialize;

use crate::dag::Dag;
use crate::decomposition::{self, DecomposeOp, SubPhaseSpec};
use crate::error::{GateTerminationKind, NebulaError, NebulaResult};
use crate::executor::{self, ExecutionDefaults, PhaseExecutor, ResolvedExecution, RoutingTable, WorkerResult};
use crate::fabric::{Fabric, FabricSnapshot};
use crate::gate::GateAction;
use crate::hot_reload::HotReloader;
use crate::journal::Journal;
use crate::metrics::{MetricsTracker, PhaseMetrics};
use crate::model::{FabricPhaseState, Phase, PhaseId, PhaseState, PhaseStatus, PhaseType, PollDecision, PollResult};
use crate::phase_tracker::PhaseTracker;
use crate::poller::{BlockedTracker, DefaultPoller, Poller, PushbackDecision, PushbackHandler};
use crate::scheduler::Scheduler;
use crate::scope::scopes_overlap;

/// Operator intervention read from a sentinel file in the nebula
/// directory. `Stop` beats `Decompose` beats `Retry` beats `Pause` when
/// more than one is present in a single drain.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Intervention {
    Pause,
    Stop,
    Retry(PhaseId),
    Decompose,
}

/// On-disk shape of the `DECOMPOSE` sentinel: a 2-3 sub-phase plan for a
/// struggling phase, authored externally (spec.md §4.9 — the core only
/// performs the surgery, never decides when to decompose).
#[derive(Debug, Deserialize)]
struct DecomposeFile {
    original_id: String,
    sub_phases: Vec<SubPhaseFile>,
}

#[derive(Debug, Deserialize)]
struct SubPhaseFile {
    id: String,
    title: String,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    scope: Vec<String>,
    #[serde(default)]
    body: String,
}

#[derive(Debug, Clone)]
struct GateSignal {
    phase_id: PhaseId,
    action: GateAction,
}

/// Coarse, mutex-protected mutable state shared between the driver loop
/// and in-flight executor tasks.
struct SharedState {
    tracker: PhaseTracker,
    results: Vec<WorkerResult>,
    gate_signals: Vec<GateSignal>,
}

pub struct WorkerGroup {
    dag: Dag,
    state: Arc<Mutex<SharedState>>,
    semaphore: Arc<Semaphore>,
    fabric: Arc<dyn Fabric>,
    executor: Arc<PhaseExecutor>,
    nebula_dir: PathBuf,
    manifest_defaults: ExecutionDefaults,
    routing_table: RoutingTable,
    project_context: String,
    journal: Option<(Arc<Mutex<Journal>>, PathBuf)>,
    metrics: Option<(Arc<Mutex<MetricsTracker>>, PathBuf)>,
}

impl WorkerGroup {
    pub fn new(
        dag: Dag,
        phases: Vec<Phase>,
        fabric: Arc<dyn Fabric>,
        executor: Arc<PhaseExecutor>,
        nebula_dir: impl Into<PathBuf>,
        max_workers: usize,
        manifest_defaults: ExecutionDefaults,
        project_context: String,
    ) -> Self {
        let mut tracker = PhaseTracker::new();
        for phase in phases {
            tracker.index_phase(phase);
        }
        Self {
            dag,
            state: Arc::new(Mutex::new(SharedState { tracker, results: Vec::new(), gate_signals: Vec::new() })),
            semaphore: Arc::new(Semaphore::new(max_workers.max(1))),
            fabric,
            executor,
            nebula_dir: nebula_dir.into(),
            manifest_defaults,
            routing_table: RoutingTable::default(),
            project_context,
            journal: None,
            metrics: None,
        }
    }

    /// Wires a journal so every phase-state transition (spec.md §3
    /// "Rewritten atomically after every mutation") is persisted as it
    /// happens, rather than only once at the end of the run.
    pub fn with_journal(mut self, journal: Arc<Mutex<Journal>>, path: impl Into<PathBuf>) -> Self {
        self.journal = Some((journal, path.into()));
        self
    }

    /// Wires a metrics tracker so each phase's cost is folded in as the
    /// phase completes (spec.md §3/§4 "Metrics").
    pub fn with_metrics(mut self, metrics: Arc<Mutex<MetricsTracker>>, path: impl Into<PathBuf>) -> Self {
        self.metrics = Some((metrics, path.into()));
        self
    }

    fn known_phases(&self, tracker: &PhaseTracker) -> Vec<Phase> {
        self.dag.node_ids().filter_map(|id| tracker.get(id).cloned()).collect()
    }

    /// Builds a [`FabricSnapshot`]. Per spec.md §4.4: takes the mutex,
    /// reads tracker state, releases the mutex to do fabric I/O, then
    /// only touches the mutex again (elsewhere, via [`Self::eligible_for_batch`])
    /// to poll — so in-flight executors can record a result while the
    /// snapshot's fabric reads are outstanding.
    async fn build_fabric_snapshot(&self) -> FabricSnapshot {
        let (in_progress, completed) = {
            let guard = self.state.lock().await;
            (guard.tracker.in_flight().iter().cloned().collect::<Vec<_>>(), guard.tracker.done().iter().cloned().collect::<Vec<_>>())
        };

        let entanglements = self.fabric.all_entanglements().await.unwrap_or_else(|e| {
            warn!(error = %e, "fabric read demoted to warning, snapshot entanglements empty");
            Vec::new()
        });
        let all_states = self.fabric.all_phase_states().await.unwrap_or_default();
        let mut file_claims = HashMap::new();
        for owner in all_states.keys() {
            for path in self.fabric.claims_for(owner).await.unwrap_or_default() {
                file_claims.insert(path, owner.clone());
            }
        }

        FabricSnapshot { entanglements, completed, in_progress, file_claims }
    }

    /// Reads pending sentinel files (`STOP`, `RETRY`, `PAUSE`) from the
    /// nebula directory, highest-priority-wins.
    fn drain_intervention(nebula_dir: &Path) -> Option<Intervention> {
        if nebula_dir.join("STOP").exists() {
            return Some(Intervention::Stop);
        }
        if nebula_dir.join("DECOMPOSE").exists() {
            return Some(Intervention::Decompose);
        }
        if let Ok(contents) = std::fs::read_to_string(nebula_dir.join("RETRY")) {
            let id = contents.trim();
            if !id.is_empty() {
                return Some(Intervention::Retry(PhaseId::new(id)));
            }
        }
        if nebula_dir.join("PAUSE").exists() {
            return Some(Intervention::Pause);
        }
        None
    }

    async fn apply_retry(&self, id: &PhaseId) {
        let mut guard = self.state.lock().await;
        if !guard.tracker.failed().contains(id) {
            return;
        }
        guard.tracker.reset_for_retry(id);
        let _ = std::fs::remove_file(self.nebula_dir.join("RETRY"));
    }

    /// Reads and applies the `DECOMPOSE` sentinel (spec.md §4.9). A
    /// malformed sentinel is logged and discarded rather than treated as
    /// fatal, since the surgery never touched the live DAG in that case;
    /// a cycle or collision the surgery itself rejects is likewise
    /// logged and discarded for the same reason. Only a post-surgery
    /// inconsistency would be fatal, and `decomposition::decompose`
    /// leaves the DAG untouched on every error path, so none occurs here.
    async fn apply_decompose(&mut self) {
        let sentinel_path = self.nebula_dir.join("DECOMPOSE");
        let remove_sentinel = || {
            let _ = std::fs::remove_file(&sentinel_path);
        };

        let contents = match std::fs::read_to_string(&sentinel_path) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "failed to read DECOMPOSE sentinel");
                remove_sentinel();
                return;
            }
        };
        let file: DecomposeFile = match serde_json::from_str(&contents) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "malformed DECOMPOSE sentinel, discarding");
                remove_sentinel();
                return;
            }
        };

        let original_id = PhaseId::new(file.original_id);
        let sub_phases: Vec<SubPhaseSpec> = file
            .sub_phases
            .into_iter()
            .map(|sub| {
                let id = PhaseId::new(sub.id);
                let source_file = self.nebula_dir.join(format!("{}.md", id.as_str()));
                let phase = Phase {
                    id,
                    title: sub.title,
                    priority: sub.priority,
                    phase_type: PhaseType::Task,
                    dependencies: sub.dependencies.into_iter().map(PhaseId::new).collect(),
                    blocks: Vec::new(),
                    scope: sub.scope,
                    allow_scope_overlap: false,
                    gate: None,
                    max_review_cycles: None,
                    max_budget_usd: None,
                    model: None,
                    labels: Vec::new(),
                    assignee: None,
                    body: sub.body,
                    source_file: source_file.display().to_string(),
                };
                let file_contents = render_sub_phase_file(&phase);
                SubPhaseSpec { phase, file_contents }
            })
            .collect();

        let op = DecomposeOp { original_id: original_id.clone(), sub_phases };

        let mut phases: Vec<Phase> = {
            let guard = self.state.lock().await;
            self.known_phases(&guard.tracker)
        };

        match decomposition::decompose(&mut self.dag, &mut phases, op) {
            Ok(()) => {
                let mut guard = self.state.lock().await;
                for phase in phases {
                    guard.tracker.index_phase(phase);
                }
                info!(original_id = %original_id, "decomposition applied");
            }
            Err(e) => {
                warn!(original_id = %original_id, error = %e, "decomposition rejected, discarding sentinel");
            }
        }
        remove_sentinel();
    }

    /// Computes this batch's eligible set: scheduler readiness, filtered
    /// for scope/in-flight/failure conflicts, then filtered again by the
    /// fabric poller. Phases the poller blocks are returned separately so
    /// the caller can register them with a [`BlockedTracker`].
    async fn eligible_for_batch(&self) -> (Vec<PhaseId>, Vec<(PhaseId, PollResult)>) {
        let snapshot = self.build_fabric_snapshot().await;
        let (ready_and_filtered, phases_by_id) = {
            let guard = self.state.lock().await;
            let scheduler = Scheduler::new(&self.dag);
            let ready = scheduler.ready(guard.tracker.done());
            let filtered = guard.tracker.filter_eligible(&ready, &self.dag);
            let phases_by_id: HashMap<PhaseId, Phase> =
                filtered.iter().filter_map(|id| guard.tracker.get(id).map(|p| (id.clone(), p.clone()))).collect();
            (filtered, phases_by_id)
        };

        let mut accepted = Vec::new();
        let mut accepted_phases: Vec<Phase> = Vec::new();
        let mut blocked = Vec::new();
        for id in ready_and_filtered {
            // `filter_eligible` only excludes phases already in-flight from a
            // prior batch; two phases with no dependency edge between them
            // can both appear here in the same batch, so scope overlap among
            // this batch's own accepted phases is re-checked as each is added.
            if let Some(phase) = phases_by_id.get(&id) {
                let conflicts_with_batch = accepted_phases.iter().any(|other| {
                    if phase.allow_scope_overlap && other.allow_scope_overlap {
                        return false;
                    }
                    scopes_overlap(&phase.scope, &other.scope)
                });
                if conflicts_with_batch {
                    continue;
                }
            }

            let result = {
                let guard = self.state.lock().await;
                let poller = DefaultPoller::new(&guard.tracker);
                poller.poll(&id, &snapshot).await
            };
            if matches!(result.decision, PollDecision::Proceed | PollDecision::Unknown) {
                if let Some(phase) = phases_by_id.get(&id) {
                    accepted_phases.push(phase.clone());
                }
                accepted.push(id);
            } else {
                blocked.push((id, result));
            }
        }
        (accepted, blocked)
    }

    /// Re-evaluates every currently blocked phase once, escalating any
    /// whose retries are exhausted (spec.md §4.5's policy table).
    async fn reevaluate_blocked(&self, blocked_tracker: &mut BlockedTracker) -> NebulaResult<()> {
        let pushback = PushbackHandler::default();
        let (in_progress, known): (HashSet<PhaseId>, Vec<Phase>) = {
            let guard = self.state.lock().await;
            (guard.tracker.in_flight().clone(), self.known_phases(&guard.tracker))
        };
        let phase_refs: Vec<&Phase> = known.iter().collect();

        let ids: Vec<PhaseId> = blocked_tracker.all().map(|b| b.id.clone()).collect();
        for id in ids {
            let Some(blocked) = blocked_tracker.get(&id).cloned() else { continue };
            match pushback.handle(&blocked, &in_progress, &phase_refs) {
                PushbackDecision::Retry => {}
                PushbackDecision::Proceed => blocked_tracker.unblock(&id),
                PushbackDecision::Escalate => {
                    self.escalate(&id).await?;
                    blocked_tracker.unblock(&id);
                }
            }
        }
        Ok(())
    }

    /// Escalation protocol (spec.md §4.5): fabric state -> human_decision,
    /// mark the phase failed so the DAG treats it as terminal, then
    /// terminate the run.
    async fn escalate(&self, id: &PhaseId) -> NebulaResult<()> {
        if let Err(e) = self.fabric.set_phase_state(id, FabricPhaseState::HumanDecision).await {
            warn!(phase = %id, error = %e, "fabric escalation write demoted to warning");
        }
        let mut guard = self.state.lock().await;
        guard.tracker.mark_failed(id);
        drop(guard);
        warn!(phase = %id, "phase escalated to human_decision after exhausting retries");
        Err(NebulaError::GateTermination(GateTerminationKind::Escalated(id.clone())))
    }

    /// Processes the batch's queued gate signals. A `Reject` or `Skip`
    /// terminates the run, marking every still-pending phase as skipped
    /// first so the journal reflects a clean stop. `Retry`/`Accept` are
    /// no-ops here since the phase already left in-flight.
    async fn process_gate_signals(&self, all_phase_ids: &[PhaseId]) -> NebulaResult<()> {
        let mut guard = self.state.lock().await;
        let signals = std::mem::take(&mut guard.gate_signals);
        for signal in signals {
            match signal.action {
                GateAction::Reject => {
                    Self::mark_remaining_skipped(&mut guard.tracker, all_phase_ids);
                    return Err(NebulaError::GateTermination(GateTerminationKind::Rejected(signal.phase_id)));
                }
                GateAction::Skip => {
                    Self::mark_remaining_skipped(&mut guard.tracker, all_phase_ids);
                    return Err(NebulaError::GateTermination(GateTerminationKind::Skipped(signal.phase_id)));
                }
                GateAction::Retry | GateAction::Accept => {}
            }
        }
        Ok(())
    }

    fn mark_remaining_skipped(tracker: &mut PhaseTracker, all_phase_ids: &[PhaseId]) {
        for id in all_phase_ids {
            if !tracker.done().contains(id) {
                tracker.mark_done(id);
            }
        }
    }

    /// Runs until no phases remain, a `STOP` sentinel is observed, or a
    /// gate rejects/skips a phase past recovery.
    pub async fn run(&mut self, hot_reloader: &mut HotReloader) -> NebulaResult<()> {
        let mut blocked_tracker = BlockedTracker::new();
        let all_phase_ids: Vec<PhaseId> = self.dag.node_ids().cloned().collect();

        loop {
            match Self::drain_intervention(&self.nebula_dir) {
                Some(Intervention::Stop) => {
                    info!("run stopped by operator intervention");
                    return Err(NebulaError::Cancelled);
                }
                Some(Intervention::Retry(id)) => self.apply_retry(&id).await,
                Some(Intervention::Decompose) => self.apply_decompose().await,
                Some(Intervention::Pause) => {
                    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
                    continue;
                }
                None => {}
            }

            {
                let known = {
                    let guard = self.state.lock().await;
                    self.known_phases(&guard.tracker)
                };
                let outcomes = {
                    let guard = self.state.lock().await;
                    hot_reloader.process_events(&known, &guard.tracker).unwrap_or_default()
                };
                for outcome in outcomes {
                    info!(?outcome, "hot-reload event processed");
                    if let crate::hot_reload::HotAddOutcome::Added(phase_id) = outcome {
                        let Some(phase) = hot_reloader.take_added_phase(&phase_id) else { continue };
                        self.dag.add_node_idempotent(phase.id.clone(), phase.priority);
                        for dep in &phase.dependencies {
                            let _ = self.dag.add_edge(dep, &phase.id);
                        }
                        let mut guard = self.state.lock().await;
                        guard.tracker.index_phase(phase);
                    }
                }
            }

            let (eligible, newly_blocked) = self.eligible_for_batch().await;
            for (id, result) in newly_blocked {
                blocked_tracker.block(id, result);
            }

            let any_in_flight = {
                let guard = self.state.lock().await;
                !guard.tracker.in_flight().is_empty()
            };

            if eligible.is_empty() {
                if any_in_flight || !blocked_tracker.is_empty() {
                    self.reevaluate_blocked(&mut blocked_tracker).await?;
                    if any_in_flight {
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    }
                    continue;
                }
                break;
            }

            let mut handles = Vec::new();
            for id in eligible {
                let permit = Arc::clone(&self.semaphore).acquire_owned().await.expect("semaphore closed");
                let phase = {
                    let mut guard = self.state.lock().await;
                    guard.tracker.mark_in_flight(id.clone());
                    guard.tracker.get(&id).cloned()
                };
                let Some(phase) = phase else { continue };

                let executor = Arc::clone(&self.executor);
                let manifest_defaults = self.manifest_defaults.clone();
                let routing_table = self.routing_table.clone();
                let project_context = self.project_context.clone();
                let ancestor_count = self.dag.ancestors(&id).len();
                let state_arc = Arc::clone(&self.state);
                let journal = self.journal.clone();
                let metrics = self.metrics.clone();

                handles.push(tokio::spawn(async move {
                    let _permit = permit;
                    let score = executor::complexity_score(&phase, ancestor_count);
                    let global_defaults = ExecutionDefaults::default();
                    let resolved: ResolvedExecution =
                        executor::resolve_execution(&phase, &manifest_defaults, &global_defaults, Some((&routing_table, score)));

                    let mut state = PhaseState::new_pending(Utc::now());
                    // in_progress lands in the journal before the runner is
                    // ever invoked (spec.md §5 ordering).
                    state.transition(PhaseStatus::InProgress, Utc::now());
                    if let Some((j, path)) = &journal {
                        let mut guard = j.lock().await;
                        guard.set_phase(&phase.id, state.clone());
                        if let Err(e) = guard.save(path) {
                            warn!(phase = %phase.id, error = %e, "journal write demoted to warning");
                        }
                    }

                    let result = executor.run(&phase, &mut state, &project_context, resolved).await;

                    if let Some((j, path)) = &journal {
                        let mut guard = j.lock().await;
                        guard.set_phase(&result.phase_id, state.clone());
                        if let Err(e) = guard.save(path) {
                            warn!(phase = %result.phase_id, error = %e, "journal write demoted to warning");
                        }
                    }
                    if let Some((m, path)) = &metrics {
                        let mut guard = m.lock().await;
                        guard.record_phase(&result.phase_id, PhaseMetrics { cost_usd: result.cost_usd, ..Default::default() });
                        if let Err(e) = guard.save(path) {
                            warn!(phase = %result.phase_id, error = %e, "metrics write demoted to warning");
                        }
                    }

                    let mut guard = state_arc.lock().await;
                    if result.succeeded {
                        guard.tracker.mark_done(&result.phase_id);
                    } else {
                        guard.tracker.mark_failed(&result.phase_id);
                    }
                    if let Some(action) = result.gate_action.clone() {
                        guard.gate_signals.push(GateSignal { phase_id: result.phase_id.clone(), action });
                    }
                    guard.results.push(result);
                }));
            }

            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "executor task panicked");
                }
            }

            self.process_gate_signals(&all_phase_ids).await?;
        }

        info!("run complete");
        Ok(())
    }
}

/// Renders a sub-phase's frontmatter+body in the same `+++`-delimited
/// format [`crate::parsing::parse_phase_file`] expects, so a decomposed
/// sub-phase file round-trips through the hot-reloader exactly like one
/// authored by hand.
fn render_sub_phase_file(phase: &Phase) -> String {
    let mut frontmatter = String::new();
    frontmatter.push_str(&format!("id = \"{}\"\n", phase.id));
    frontmatter.push_str(&format!("title = \"{}\"\n", phase.title.replace('"', "\\\"")));
    frontmatter.push_str(&format!("priority = {}\n", phase.priority));
    if !phase.dependencies.is_empty() {
        let deps: Vec<String> = phase.dependencies.iter().map(|d| format!("\"{d}\"")).collect();
        frontmatter.push_str(&format!("depends_on = [{}]\n", deps.join(", ")));
    }
    if !phase.scope.is_empty() {
        let scope: Vec<String> = phase.scope.iter().map(|s| format!("\"{s}\"")).collect();
        frontmatter.push_str(&format!("scope = [{}]\n", scope.join(", ")));
    }
    format!("+++\n{frontmatter}+++\n{}\n", phase.body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_sentinel_beats_retry_and_pause() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("STOP"), "").unwrap();
        std::fs::write(dir.path().join("RETRY"), "some-phase").unwrap();
        std::fs::write(dir.path().join("PAUSE"), "").unwrap();
        assert_eq!(WorkerGroup::drain_intervention(dir.path()), Some(Intervention::Stop));
    }

    #[test]
    fn retry_sentinel_beats_pause() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("RETRY"), "some-phase").unwrap();
        std::fs::write(dir.path().join("PAUSE"), "").unwrap();
        assert_eq!(WorkerGroup::drain_intervention(dir.path()), Some(Intervention::Retry(PhaseId::new("some-phase"))));
    }

    #[test]
    fn no_sentinels_means_no_intervention() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(WorkerGroup::drain_intervention(dir.path()), None);
    }
}
