//! Fabric: the persistent coordination store (spec.md §4.4).
//!
//! Holds phase states, published entanglements, file claims, discoveries
//! and pulses. The trait is intentionally small — discoveries, pulses, and
//! the inter-agent messages table are written by the external runner and
//! read only by the metrics collector, so they are not part of the core's
//! consumed interface.

pub mod sqlite_store;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Entanglement, FabricPhaseState, PhaseId};

#[derive(Debug, Error)]
pub enum FabricError {
    #[error("fabric I/O error: {0}")]
    Io(String),
}

pub type FabricResult<T> = Result<T, FabricError>;

/// Durable coordination operations, spec.md §4.4's table. All accept no
/// explicit context parameter — cancellation is handled by the caller's
/// async runtime — and may fail with [`FabricError::Io`].
#[async_trait]
pub trait Fabric: Send + Sync {
    async fn set_phase_state(&self, id: &PhaseId, state: FabricPhaseState) -> FabricResult<()>;
    async fn get_phase_state(&self, id: &PhaseId) -> FabricResult<Option<FabricPhaseState>>;
    async fn publish_entanglement(&self, e: Entanglement) -> FabricResult<()>;
    async fn publish_entanglements(&self, es: Vec<Entanglement>) -> FabricResult<()>;
    async fn entanglements_for(&self, id: &PhaseId) -> FabricResult<Vec<Entanglement>>;
    async fn all_entanglements(&self) -> FabricResult<Vec<Entanglement>>;
    async fn claim_file(&self, path: &str, owner: &PhaseId) -> FabricResult<()>;
    async fn file_owner(&self, path: &str) -> FabricResult<Option<PhaseId>>;
    async fn claims_for(&self, owner: &PhaseId) -> FabricResult<Vec<String>>;
    async fn release_claims(&self, owner: &PhaseId) -> FabricResult<()>;
    async fn all_phase_states(&self) -> FabricResult<HashMap<PhaseId, FabricPhaseState>>;
}

/// A pure-data snapshot the scheduler builds once per scheduling cycle
/// (spec.md §4.4). Built by reading tracker state under the worker-group
/// mutex, releasing the mutex, issuing fabric reads, then re-acquiring to
/// return — see [`crate::worker_group::WorkerGroup::build_fabric_snapshot`].
#[derive(Debug, Clone, Default)]
pub struct FabricSnapshot {
    pub entanglements: Vec<Entanglement>,
    pub completed: Vec<PhaseId>,
    pub in_progress: Vec<PhaseId>,
    pub file_claims: HashMap<String, PhaseId>,
}

/// Abstraction boundary (design notes §9) letting the HotReloader and the
/// Tycho scheduler obtain a fresh snapshot without holding a back-pointer
/// into the `WorkerGroup`.
#[async_trait]
pub trait SnapshotBuilder: Send + Sync {
    async fn build_snapshot(&self) -> FabricResult<FabricSnapshot>;
}
