//! [`PhaseState`]: the journalled lifecycle record for a phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a phase, journalled after every transition.
///
/// Transitions: `Pending -> Created -> InProgress -> {Done, Failed, Skipped}`.
/// `Failed` may be reset to `InProgress` only by an explicit `RETRY`
/// intervention. `Done` and `Skipped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Created,
    InProgress,
    Done,
    Failed,
    Skipped,
}

impl PhaseStatus {
    /// Whether this status is a terminal state a phase cannot leave
    /// (barring the `Failed -> InProgress` retry exception, which the
    /// caller enforces explicitly rather than through this predicate).
    pub fn is_terminal(self) -> bool {
        matches!(self, PhaseStatus::Done | PhaseStatus::Skipped)
    }
}

/// Review outcome attached to a `PhaseState` by a successful `PhaseRunner`
/// invocation that performed its own review cycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewReport {
    pub satisfaction: f64,
    pub risk: f64,
    pub needs_human_review: bool,
    pub summary: String,
}

/// Journalled state for one phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseState {
    /// External work-item handle, assigned on creation.
    pub bead_id: Option<String>,
    pub status: PhaseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub review: Option<ReviewReport>,
}

impl PhaseState {
    pub fn new_pending(now: DateTime<Utc>) -> Self {
        Self {
            bead_id: None,
            status: PhaseStatus::Pending,
            created_at: now,
            updated_at: now,
            review: None,
        }
    }

    pub fn transition(&mut self, status: PhaseStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }
}
