//! PhaseRunner — the external collaborator that actually performs a
//! phase's code-modification work (spec.md §1/§6). The core never
//! inspects *how* a phase was executed, only the [`RunOutcome`] it
//! reports back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Phase, ReviewReport};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to spawn phase runner: {0}")]
    Spawn(String),
    #[error("phase runner timed out after {0}s")]
    Timeout(u64),
}

pub type RunResult<T> = Result<T, RunError>;

/// What a runner was asked to do with a phase.
#[derive(Debug, Clone, Serialize)]
pub struct RunRequest {
    pub phase: Phase,
    pub project_context: String,
    pub working_dir: String,
    pub model: Option<String>,
}

/// What a runner reports back once it's done. `cost_usd` feeds the
/// budget tracker; `review` is populated only when the runner itself did
/// self-review (spec.md §4.7 combines this with gate review when both are
/// configured). `base_commit_sha`/`final_commit_sha`, when both present,
/// let the executor diff the phase's exact commit range (spec.md §6)
/// instead of falling back to "last commit".
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RunOutcome {
    pub succeeded: bool,
    pub summary: String,
    pub cost_usd: f64,
    pub review: Option<ReviewReport>,
    pub base_commit_sha: Option<String>,
    pub final_commit_sha: Option<String>,
}

/// `Run(phase, projectContext) -> RunOutcome` (spec.md §6).
#[async_trait]
pub trait PhaseRunner: Send + Sync {
    async fn run(&self, request: RunRequest) -> RunResult<RunOutcome>;
}

/// Deterministic runner for tests and dry runs: always succeeds, reports
/// zero cost, and writes nothing. Grounded in the same role the teacher's
/// `MockLlmSubstrate`-style test doubles play for its swarm orchestrator.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockPhaseRunner;

#[async_trait]
impl PhaseRunner for MockPhaseRunner {
    async fn run(&self, request: RunRequest) -> RunResult<RunOutcome> {
        Ok(RunOutcome {
            succeeded: true,
            summary: format!("mock runner completed {}", request.phase.id),
            cost_usd: 0.0,
            ..Default::default()
        })
    }
}

/// Shells out to an external agent CLI to perform the phase's work, in
/// the same spawn-and-wait idiom as the teacher's Claude Code substrate.
/// Left undocumented beyond its shape here: the concrete CLI invocation
/// (binary path, prompt framing, streamed-output parsing) is a deployment
/// detail outside this crate's scope — production use should supply a
/// [`PhaseRunner`] impl wired to whatever coding agent is available.
#[derive(Debug, Clone)]
pub struct ShellPhaseRunner {
    pub binary: String,
    pub timeout_secs: u64,
}

impl Default for ShellPhaseRunner {
    fn default() -> Self {
        Self { binary: "nebula-agent".to_string(), timeout_secs: 1800 }
    }
}

#[async_trait]
impl PhaseRunner for ShellPhaseRunner {
    async fn run(&self, request: RunRequest) -> RunResult<RunOutcome> {
        use std::process::Stdio;

        use tokio::process::Command;
        use tokio::time::{timeout, Duration};

        let child = Command::new(&self.binary)
            .arg("--phase-id")
            .arg(request.phase.id.as_str())
            .current_dir(&request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RunError::Spawn(e.to_string()))?;

        let output = timeout(Duration::from_secs(self.timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| RunError::Timeout(self.timeout_secs))?
            .map_err(|e| RunError::Spawn(e.to_string()))?;

        Ok(RunOutcome {
            succeeded: output.status.success(),
            summary: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            cost_usd: 0.0,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PhaseId, PhaseType};

    fn phase() -> Phase {
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
            max_review_cycles: None,
            max_budget_usd: None,
            model: None,
            labels: vec![],
            assignee: None,
            body: String::new(),
            source_file: "p.md".to_string(),
        }
    }

    #[tokio::test]
    async fn mock_runner_always_succeeds() {
        let runner = MockPhaseRunner;
        let outcome = runner
            .run(RunRequest { phase: phase(), project_context: String::new(), working_dir: ".".to_string(), model: None })
            .await
            .unwrap();
        assert!(outcome.succeeded);
        assert_eq!(outcome.cost_usd, 0.0);
    }
}
