//! Crate-wide error taxonomy.
//!
//! Mirrors the five effect classes from the design's error-handling section:
//! structural failures block a run before it starts, transient failures are
//! logged and swallowed by callers, phase failures and gate terminations are
//! recorded per-run, and fatal errors abort the process.

use crate::model::PhaseId;
use thiserror::Error;

/// Errors the core can produce. Only [`NebulaError::Structural`],
/// [`NebulaError::GateTermination`] and [`NebulaError::Fatal`] ever escape
/// [`crate::worker_group::WorkerGroup::run`] — phase-runner failures are
/// captured per-phase in `WorkerResult` instead of propagated.
#[derive(Debug, Error)]
pub enum NebulaError {
    /// Validation failed before any phase was dispatched (cycle, duplicate
    /// id, unknown dependency that auto-correction could not repair, ...).
    #[error("structural validation failed: {0}")]
    Structural(String),

    /// An I/O or coordination-store failure that the caller can recover
    /// from by retrying or proceeding optimistically. Never returned from
    /// a public entry point; logged with `tracing::warn!` at the call site.
    #[error("transient failure: {0}")]
    Transient(String),

    /// A phase's `PhaseRunner` invocation failed or returned a
    /// non-success report. Recorded in the phase's `WorkerResult`.
    #[error("phase {0} failed: {1}")]
    PhaseFailure(PhaseId, String),

    /// The run ended because of an operator decision at the human gate.
    #[error("run terminated at gate: {0}")]
    GateTermination(#[from] GateTerminationKind),

    /// An unrecoverable error: the journal could not be written, or DAG
    /// surgery left the graph corrupt. The run aborts immediately.
    #[error("fatal: {0}")]
    Fatal(String),

    /// The run was stopped by an operator `STOP` sentinel rather than
    /// ending naturally or via the gate. Maps to exit code 130.
    #[error("run cancelled by operator")]
    Cancelled,
}

/// Why a run terminated at the human gate.
#[derive(Debug, Clone, Error)]
pub enum GateTerminationKind {
    /// `PhaseGate` returned `Reject` for some phase.
    #[error("phase {0} rejected at gate")]
    Rejected(PhaseId),
    /// `PhaseGate` returned `Skip` for some phase.
    #[error("phase {0} skipped at gate")]
    Skipped(PhaseId),
    /// A blocked phase exhausted its retries and was escalated.
    #[error("phase {0} escalated after exhausting retries")]
    Escalated(PhaseId),
}

/// Convenience alias used throughout the core.
pub type NebulaResult<T> = Result<T, NebulaError>;

/// CLI process exit codes, per spec.md §6.
pub fn exit_code(result: &NebulaResult<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(NebulaError::Structural(_)) => 2,
        Err(NebulaError::GateTermination(_)) => 3,
        Err(NebulaError::PhaseFailure(..)) => 1,
        Err(NebulaError::Transient(_)) => 1,
        Err(NebulaError::Fatal(_)) => 1,
        Err(NebulaError::Cancelled) => 130,
    }
}
