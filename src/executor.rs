//! PhaseExecutor (spec.md §4.7): runs one phase end to end — resolves
//! execution config, calls the external runner, commits, builds a
//! checkpoint, invokes the gate, then reports back to the tracker and
//! fabric. Ordering guarantees (spec.md §5) are encoded directly in this
//! function's statement order; there is no retry/looping here beyond
//! what the gate's `Retry` action triggers.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::beads::BeadsClient;
use crate::fabric::Fabric;
use crate::gate::{Checkpoint, GateAction, Gater};
use crate::git::GitCommitter;
use crate::model::{Entanglement, ExecutionDefaults, FabricPhaseState, GateMode, Phase, PhaseId, PhaseState, PhaseStatus};
use crate::parsing;
use crate::runner::{PhaseRunner, RunRequest};

/// Per-field execution config after resolution (spec.md §4.7
/// "Execution resolution").
#[derive(Debug, Clone)]
pub struct ResolvedExecution {
    pub model: Option<String>,
    pub max_review_cycles: u32,
    pub max_budget_usd: f64,
}

const BUILTIN_MAX_REVIEW_CYCLES: u32 = 3;
const BUILTIN_MAX_BUDGET_USD: f64 = 5.0;

/// Complexity-score -> model-tier routing table for auto-routing
/// (spec.md §4.7 "Auto-routing"). Band upper bounds are exclusive except
/// the last; score 1.0 always lands in the last band.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    pub bands: Vec<(f64, String)>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self {
            bands: vec![
                (0.35, "lite".to_string()),
                (0.65, "standard".to_string()),
                (1.01, "heavy".to_string()),
            ],
        }
    }
}

impl RoutingTable {
    pub fn tier_for(&self, score: f64) -> &str {
        self.bands
            .iter()
            .find(|(upper, _)| score < *upper)
            .map(|(_, tier)| tier.as_str())
            .unwrap_or("heavy")
    }
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Complexity score in `[0, 1]` from scope size, body length, DAG depth,
/// and phase type (spec.md §4.7 weights).
pub fn complexity_score(phase: &Phase, ancestor_count: usize) -> f64 {
    const W_SCOPE: f64 = 0.25;
    const W_BODY: f64 = 0.35;
    const W_DEPTH: f64 = 0.25;
    const W_TYPE: f64 = 0.15;

    let scope_term = clamp01(phase.scope.len() as f64 / 10.0);
    let body_term = clamp01(phase.body_runes() as f64 / 3000.0);
    let depth_term = clamp01(ancestor_count as f64 / 8.0);
    let type_term = phase.phase_type.type_weight();

    W_SCOPE * scope_term + W_BODY * body_term + W_DEPTH * depth_term + W_TYPE * type_term
}

/// Resolves Model/MaxReviewCycles/MaxBudgetUSD with the precedence
/// ordering from spec.md §4.7: phase-level, then manifest-execution
/// level, then (Model only, when enabled) auto-routed, then global
/// CLI/env default, then built-in default.
pub fn resolve_execution(
    phase: &Phase,
    manifest_defaults: &ExecutionDefaults,
    global_defaults: &ExecutionDefaults,
    auto_routing: Option<(&RoutingTable, f64)>,
) -> ResolvedExecution {
    let auto_routed_model = auto_routing.map(|(table, score)| table.tier_for(score).to_string());

    let model = phase
        .model
        .clone()
        .or_else(|| manifest_defaults.model.clone())
        .or(auto_routed_model)
        .or_else(|| global_defaults.model.clone());

    let max_review_cycles = phase
        .max_review_cycles
        .filter(|v| *v != 0)
        .or(manifest_defaults.max_review_cycles.filter(|v| *v != 0))
        .or(global_defaults.max_review_cycles.filter(|v| *v != 0))
        .unwrap_or(BUILTIN_MAX_REVIEW_CYCLES);

    let max_budget_usd = phase
        .max_budget_usd
        .filter(|v| *v != 0.0)
        .or(manifest_defaults.max_budget_usd.filter(|v| *v != 0.0))
        .or(global_defaults.max_budget_usd.filter(|v| *v != 0.0))
        .unwrap_or(BUILTIN_MAX_BUDGET_USD);

    ResolvedExecution { model, max_review_cycles, max_budget_usd }
}

/// Outcome of running one phase through the executor, fed back into the
/// worker group's result bookkeeping.
#[derive(Debug, Clone)]
pub struct WorkerResult {
    pub phase_id: PhaseId,
    pub succeeded: bool,
    pub cost_usd: f64,
    pub gate_action: Option<GateAction>,
    pub message: String,
}

pub struct PhaseExecutor {
    pub runner: Arc<dyn PhaseRunner>,
    pub git: Arc<dyn GitCommitter>,
    pub gater: Arc<dyn Gater>,
    pub fabric: Arc<dyn Fabric>,
    pub beads: Arc<dyn BeadsClient>,
    pub repo_root: String,
    pub nebula_name: String,
}

impl PhaseExecutor {
    /// Runs one phase per the 11-step sequence in spec.md §4.7. Bails
    /// early (returning a failed [`WorkerResult`]) at any step that
    /// errors; later steps are simply skipped rather than panicking.
    pub async fn run(
        &self,
        phase: &Phase,
        state: &mut PhaseState,
        project_context: &str,
        resolved: ResolvedExecution,
    ) -> WorkerResult {
        // Step 1 (spec.md §4.7): a phase without a bead id has not been
        // registered with the work-item tracker yet; assign one now, and
        // if that fails, record the failure and never signal readiness to
        // the runner at all.
        if state.bead_id.is_none() {
            match self.beads.create_bead(phase).await {
                Ok(bead_id) => {
                    state.bead_id = Some(bead_id);
                    state.transition(PhaseStatus::Created, Utc::now());
                }
                Err(e) => {
                    state.transition(PhaseStatus::Failed, Utc::now());
                    return WorkerResult {
                        phase_id: phase.id.clone(),
                        succeeded: false,
                        cost_usd: 0.0,
                        gate_action: None,
                        message: format!("bead creation failed: {e}"),
                    };
                }
            }
        }

        state.transition(PhaseStatus::InProgress, Utc::now());
        if let Err(e) = self.fabric.set_phase_state(&phase.id, FabricPhaseState::Running).await {
            warn!(phase = %phase.id, error = %e, "fabric state write demoted to warning");
        }

        let request = RunRequest {
            phase: phase.clone(),
            project_context: project_context.to_string(),
            working_dir: self.repo_root.clone(),
            model: resolved.model.clone(),
        };

        let outcome = match self.runner.run(request).await {
            Ok(o) => o,
            Err(e) => {
                return WorkerResult {
                    phase_id: phase.id.clone(),
                    succeeded: false,
                    cost_usd: 0.0,
                    gate_action: None,
                    message: format!("runner failed: {e}"),
                };
            }
        };

        if !outcome.succeeded {
            return WorkerResult {
                phase_id: phase.id.clone(),
                succeeded: false,
                cost_usd: outcome.cost_usd,
                gate_action: None,
                message: outcome.summary,
            };
        }

        let commit_message = truncate_message(&format!("{}/{}: {}", self.nebula_name, phase.id, phase.title), 80);
        let commit = match self.git.commit_phase(&self.repo_root, &commit_message).await {
            Ok(c) => c,
            Err(e) => {
                warn!(phase = %phase.id, error = %e, "git commit failed, demoted to warning");
                None
            }
        };

        // Prefer the runner's own reported commit range (spec.md §6
        // `BaseCommitSHA`/`FinalCommitSHA`) when available; fall back to
        // diffing the single commit this executor just made otherwise.
        let diff_stat = match (&outcome.base_commit_sha, &outcome.final_commit_sha) {
            (Some(base), Some(final_sha)) => match self.git.diff_stat_range(&self.repo_root, base, final_sha).await {
                Ok(stat) => stat,
                Err(_) => Default::default(),
            },
            _ => match self.git.diff_stat_last_commit(&self.repo_root).await {
                Ok(stat) => stat,
                Err(_) => Default::default(),
            },
        };

        let checkpoint = Checkpoint {
            phase_title: phase.title.clone(),
            commit: commit.clone(),
            diff_stat,
            review: outcome.review.clone(),
            cost_usd: outcome.cost_usd,
        };

        let action = match self.gater.phase_gate(phase, &checkpoint).await {
            Ok(a) => a,
            Err(e) => {
                warn!(phase = %phase.id, error = %e, "gate read failed, defaulting to reject");
                GateAction::Reject
            }
        };

        let succeeded = matches!(action, GateAction::Accept | GateAction::Skip);
        state.transition(if succeeded { PhaseStatus::Done } else { PhaseStatus::Failed }, Utc::now());

        if succeeded {
            let published_at = Utc::now();
            let entanglements: Vec<Entanglement> = parsing::scan_produced_entanglements(phase, &self.nebula_name)
                .into_iter()
                .map(|(kind, name, signature)| Entanglement {
                    producer: phase.id.clone(),
                    kind,
                    name,
                    signature,
                    package: self.nebula_name.clone(),
                    published_at,
                })
                .collect();
            if !entanglements.is_empty() {
                if let Err(e) = self.fabric.publish_entanglements(entanglements).await {
                    warn!(phase = %phase.id, error = %e, "fabric entanglement publish demoted to warning");
                }
            }
            if let Err(e) = self.fabric.set_phase_state(&phase.id, FabricPhaseState::Done).await {
                warn!(phase = %phase.id, error = %e, "fabric completion write demoted to warning");
            }
            if let Err(e) = self.fabric.release_claims(&phase.id).await {
                warn!(phase = %phase.id, error = %e, "fabric claim release demoted to warning");
            }
        }

        WorkerResult {
            phase_id: phase.id.clone(),
            succeeded,
            cost_usd: outcome.cost_usd,
            gate_action: Some(action),
            message: outcome.summary,
        }
    }
}

fn truncate_message(message: &str, max_len: usize) -> String {
    if message.chars().count() <= max_len {
        message.to_string()
    } else {
        message.chars().take(max_len).collect()
    }
}

/// Whether a phase's declared gate mode (or the absence of one) requires
/// interactive operator attention at all.
pub fn requires_human_attention(phase: &Phase) -> bool {
    matches!(phase.gate, Some(GateMode::Approve))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PhaseType;

    fn phase_with(model: Option<&str>, cycles: Option<u32>, budget: Option<f64>) -> Phase {
        Phase {
            id: PhaseId::new("p"),
            title: "p".to_string(),
            priority: 0,
            phase_type: PhaseType::Task,
            dependencies: vec![],
            blocks: vec![],
            scope: vec![],
            allow_scope_overlap: false,
            gate: None,
            max_review_cycles: cycles,
            max_budget_usd: budget,
            model: model.map(str::to_string),
            labels: vec![],
            assignee: None,
            body: String::new(),
            source_file: "p.md".to_string(),
        }
    }

    #[test]
    fn phase_level_model_wins() {
        let resolved = resolve_execution(&phase_with(Some("opus"), None, None), &ExecutionDefaults::default(), &ExecutionDefaults::default(), None);
        assert_eq!(resolved.model, Some("opus".to_string()));
    }

    #[test]
    fn falls_back_to_builtin_defaults() {
        let resolved = resolve_execution(&phase_with(None, None, None), &ExecutionDefaults::default(), &ExecutionDefaults::default(), None);
        assert_eq!(resolved.max_review_cycles, BUILTIN_MAX_REVIEW_CYCLES);
        assert_eq!(resolved.max_budget_usd, BUILTIN_MAX_BUDGET_USD);
    }

    #[test]
    fn auto_routing_only_applies_when_phase_and_manifest_are_silent() {
        let table = RoutingTable::default();
        let resolved = resolve_execution(&phase_with(None, None, None), &ExecutionDefaults::default(), &ExecutionDefaults::default(), Some((&table, 0.9)));
        assert_eq!(resolved.model, Some("heavy".to_string()));

        let resolved = resolve_execution(&phase_with(Some("sonnet"), None, None), &ExecutionDefaults::default(), &ExecutionDefaults::default(), Some((&table, 0.9)));
        assert_eq!(resolved.model, Some("sonnet".to_string()));
    }

    #[test]
    fn complexity_score_is_clamped_to_unit_interval() {
        let huge = Phase { scope: vec!["a".into(); 50], body: "x".repeat(10_000), ..phase_with(None, None, None) };
        let score = complexity_score(&huge, 100);
        assert!(score <= 1.0);
    }

    #[test]
    fn truncates_long_commit_messages() {
        let long = "x".repeat(200);
        assert_eq!(truncate_message(&long, 80).chars().count(), 80);
    }
}
