//! Fabric (coordination store) value types: entanglements, file claims,
//! blocked-phase bookkeeping and poll results. See spec.md §3–§4.4–§4.5.

use crate::model::phase::PhaseId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of contract a phase can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntanglementKind {
    Interface,
    Type,
    Function,
    Constant,
}

/// A published contract: a symbol a phase produced, that downstream phases
/// may depend on. `(name, kind)` uniqueness per producer is *not* enforced
/// at write time (spec.md §3) — contradictions are surfaced by the poller
/// as a detectable conflict rather than rejected here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entanglement {
    pub producer: PhaseId,
    pub kind: EntanglementKind,
    pub name: String,
    pub signature: String,
    pub package: String,
    pub published_at: DateTime<Utc>,
}

/// A single-owner claim on a file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileClaim {
    pub path: String,
    pub owner: PhaseId,
}

/// Decision returned by a [`crate::poller::Poller`] for one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollDecision {
    /// The phase may run now.
    Proceed,
    /// The phase references symbols not yet published.
    NeedInfo,
    /// The phase's scope collides with an in-progress claim or with a
    /// contradictory contract.
    Conflict,
    /// The poller could not reach a decision (treated as `Proceed` by the
    /// pushback handler — an override).
    Unknown,
}

/// Result of polling the fabric for one phase.
#[derive(Debug, Clone)]
pub struct PollResult {
    pub decision: PollDecision,
    pub reason: String,
    pub missing_info: Vec<String>,
    pub conflict_with: Option<PhaseId>,
}

impl PollResult {
    pub fn proceed() -> Self {
        Self {
            decision: PollDecision::Proceed,
            reason: String::new(),
            missing_info: Vec::new(),
            conflict_with: None,
        }
    }

    pub fn need_info(reason: impl Into<String>, missing: Vec<String>) -> Self {
        Self {
            decision: PollDecision::NeedInfo,
            reason: reason.into(),
            missing_info: missing,
            conflict_with: None,
        }
    }

    pub fn conflict(reason: impl Into<String>, with: PhaseId) -> Self {
        Self {
            decision: PollDecision::Conflict,
            reason: reason.into(),
            missing_info: Vec::new(),
            conflict_with: Some(with),
        }
    }
}

/// A phase currently held back by the [`crate::poller::BlockedTracker`].
#[derive(Debug, Clone)]
pub struct BlockedPhase {
    pub id: PhaseId,
    pub last_result: PollResult,
    pub retry_count: u32,
    pub first_blocked_at: DateTime<Utc>,
}

/// Durable phase-state enum as stored by the fabric (`SetPhaseState` /
/// `GetPhaseState`), distinct from [`crate::model::phase_state::PhaseStatus`]
/// — the fabric's vocabulary tracks coordination phases (`scanning`,
/// `blocked`, `human_decision`) that the journal does not need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FabricPhaseState {
    Pending,
    Scanning,
    Running,
    Blocked,
    HumanDecision,
    Done,
    Failed,
}

impl FabricPhaseState {
    pub fn as_str(self) -> &'static str {
        match self {
            FabricPhaseState::Pending => "pending",
            FabricPhaseState::Scanning => "scanning",
            FabricPhaseState::Running => "running",
            FabricPhaseState::Blocked => "blocked",
            FabricPhaseState::HumanDecision => "human_decision",
            FabricPhaseState::Done => "done",
            FabricPhaseState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => FabricPhaseState::Pending,
            "scanning" => FabricPhaseState::Scanning,
            "running" => FabricPhaseState::Running,
            "blocked" => FabricPhaseState::Blocked,
            "human_decision" => FabricPhaseState::HumanDecision,
            "done" => FabricPhaseState::Done,
            "failed" => FabricPhaseState::Failed,
            _ => return None,
        })
    }
}
