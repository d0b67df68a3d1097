//! Gater — the human checkpoint after a phase succeeds (spec.md §4.7,
//! §6). `PhaseGate` runs once per completed phase; `PlanGate` runs once
//! before execution begins, for a human sign-off on the whole plan.

use async_trait::async_trait;
use console::style;
use std::io::Write;
use thiserror::Error;

use crate::git::DiffStat;
use crate::model::{GateMode, Phase, ReviewReport};

#[derive(Debug, Error)]
pub enum GateError {
    #[error("failed to read operator input: {0}")]
    Io(String),
}

pub type GateResult<T> = Result<T, GateError>;

/// Action an operator (or an automatic policy) takes at a gate
/// checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    Accept,
    Reject,
    Retry,
    Skip,
}

/// Summary of a phase's diff and review, presented at the gate
/// (spec.md GLOSSARY "Checkpoint").
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub phase_title: String,
    pub commit: Option<String>,
    pub diff_stat: DiffStat,
    pub review: Option<ReviewReport>,
    pub cost_usd: f64,
}

/// `PhaseGate(phase, checkpoint) -> GateAction`, `PlanGate(checkpoint) ->
/// Result<()>` (spec.md §6).
#[async_trait]
pub trait Gater: Send + Sync {
    async fn phase_gate(&self, phase: &Phase, checkpoint: &Checkpoint) -> GateResult<GateAction>;
    async fn plan_gate(&self, summary: &str) -> GateResult<()>;
}

/// Policy-driven gate with no operator in the loop: resolves the action
/// purely from the phase's [`GateMode`] and the runner's self-review, for
/// unattended runs and tests.
///
/// - `Trust` — always accept.
/// - `Review` — accept unless the runner's review flagged
///   `needs_human_review`, in which case retry once then accept.
/// - `Approve` — always requires a human; `AutoGater` rejects rather than
///   guessing.
/// - `Watch` — accept, recorded for later audit only.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoGater;

#[async_trait]
impl Gater for AutoGater {
    async fn phase_gate(&self, phase: &Phase, checkpoint: &Checkpoint) -> GateResult<GateAction> {
        let mode = phase.gate.unwrap_or(GateMode::Trust);
        let action = match mode {
            GateMode::Trust | GateMode::Watch => GateAction::Accept,
            GateMode::Review => match &checkpoint.review {
                Some(r) if r.needs_human_review => GateAction::Retry,
                _ => GateAction::Accept,
            },
            GateMode::Approve => GateAction::Reject,
        };
        Ok(action)
    }

    async fn plan_gate(&self, _summary: &str) -> GateResult<()> {
        Ok(())
    }
}

/// Terminal-driven gate: prints the checkpoint and reads an operator
/// decision from stdin, in the same `console`-styled reporting idiom the
/// teacher uses for its CLI output.
#[derive(Debug, Default, Clone, Copy)]
pub struct InteractiveGater;

impl InteractiveGater {
    fn read_line(&self, prompt: &str) -> GateResult<String> {
        print!("{prompt}");
        std::io::stdout().flush().map_err(|e| GateError::Io(e.to_string()))?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map_err(|e| GateError::Io(e.to_string()))?;
        Ok(line.trim().to_lowercase())
    }
}

#[async_trait]
impl Gater for InteractiveGater {
    async fn phase_gate(&self, phase: &Phase, checkpoint: &Checkpoint) -> GateResult<GateAction> {
        println!("{} {}", style("Gate:").bold().cyan(), checkpoint.phase_title);
        if let Some(commit) = &checkpoint.commit {
            println!("  commit: {commit}");
        }
        println!(
            "  diff: {} files, +{} -{}",
            checkpoint.diff_stat.files_changed, checkpoint.diff_stat.insertions, checkpoint.diff_stat.deletions
        );
        if let Some(review) = &checkpoint.review {
            println!(
                "  review: satisfaction={:.2} risk={:.2} needs_human_review={}",
                review.satisfaction, review.risk, review.needs_human_review
            );
        }
        println!("  cost: ${:.2}", checkpoint.cost_usd);

        loop {
            let input = self.read_line(&format!("[{}] accept/reject/retry/skip > ", phase.id))?;
            return Ok(match input.as_str() {
                "a" | "accept" | "" => GateAction::Accept,
                "r" | "reject" => GateAction::Reject,
                "t" | "retry" => GateAction::Retry,
                "s" | "skip" => GateAction::Skip,
                _ => {
                    println!("{}", style("unrecognized, try again").yellow());
                    continue;
                }
            });
        }
    }

    async fn plan_gate(&self, summary: &str) -> GateResult<()> {
        println!("{}", style("Plan:").bold().cyan());
        println!("{summary}");
        let input = self.read_line("proceed? [Y/n] > ")?;
        if input == "n" || input == "no" {
            return Err(GateError::Io("plan rejected by operator".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PhaseId, PhaseType};

    fn phase(gate: Option<GateMode>) -> Phase {
        Phase {
            id: PhaseId::new("p"),
            title: "p".to_string(),
            priority: 0,
            phase_type: PhaseType::Task,
            dependencies: vec![],
            blocks: vec![],
            scope: vec![],
            allow_scope_overlap: false,
            gate,
            max_review_cycles: None,
            max_budget_usd: None,
            model: None,
            labels: vec![],
            assignee: None,
            body: String::new(),
            source_file: "p.md".to_string(),
        }
    }

    fn checkpoint(review: Option<ReviewReport>) -> Checkpoint {
        Checkpoint { phase_title: "p".to_string(), commit: None, diff_stat: DiffStat::default(), review, cost_usd: 0.0 }
    }

    #[tokio::test]
    async fn trust_always_accepts() {
        let gater = AutoGater;
        let action = gater.phase_gate(&phase(Some(GateMode::Trust)), &checkpoint(None)).await.unwrap();
        assert_eq!(action, GateAction::Accept);
    }

    #[tokio::test]
    async fn review_retries_when_flagged() {
        let gater = AutoGater;
        let review = ReviewReport { satisfaction: 0.4, risk: 0.8, needs_human_review: true, summary: String::new() };
        let action = gater.phase_gate(&phase(Some(GateMode::Review)), &checkpoint(Some(review))).await.unwrap();
        assert_eq!(action, GateAction::Retry);
    }

    #[tokio::test]
    async fn approve_requires_human() {
        let gater = AutoGater;
        let action = gater.phase_gate(&phase(Some(GateMode::Approve)), &checkpoint(None)).await.unwrap();
        assert_eq!(action, GateAction::Reject);
    }
}
