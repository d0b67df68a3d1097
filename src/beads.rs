//! BeadsClient — the external work-item tracker a phase is registered
//! against before it ever reaches a runner (spec.md §4.7 step 1, §6
//! GLOSSARY "Bead"). `create_bead` is what turns a `pending` PhaseState
//! into `created`; a failure here means the phase never signals
//! readiness at all.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::Phase;

#[derive(Debug, Error)]
pub enum BeadsError {
    #[error("bead creation failed: {0}")]
    Create(String),
}

pub type BeadsResult<T> = Result<T, BeadsError>;

/// `CreateBead(phase) -> BeadID` (spec.md §6 "BeadsClient").
#[async_trait]
pub trait BeadsClient: Send + Sync {
    async fn create_bead(&self, phase: &Phase) -> BeadsResult<String>;
}

/// The default when no external bead tracker is configured: synthesizes a
/// stable bead id from the phase id itself rather than leaving it unset,
/// so the `pending -> created` transition still has somewhere to land.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBeadsClient;

#[async_trait]
impl BeadsClient for NullBeadsClient {
    async fn create_bead(&self, phase: &Phase) -> BeadsResult<String> {
        Ok(format!("local-{}", phase.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PhaseId, PhaseType};

    #[tokio::test]
    async fn null_client_always_assigns_a_bead() {
        let phase = Phase {
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
        };
        let bead_id = NullBeadsClient.create_bead(&phase).await.unwrap();
        assert_eq!(bead_id, "local-p");
    }
}
