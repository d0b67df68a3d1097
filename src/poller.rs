//! Poller, PushbackHandler and BlockedTracker — the "Tycho scheduler"
//! (spec.md §4.5).

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;

use crate::fabric::FabricSnapshot;
use crate::model::{BlockedPhase, Phase, PhaseId, PollDecision, PollResult};
use crate::parsing;
use crate::phase_tracker::PhaseTracker;
use crate::scope::scopes_overlap;

/// `Poll(phaseID, snapshot) -> PollResult` (spec.md §4.5). Called by the
/// scheduler for each eligible phase before dispatch and for each blocked
/// phase on re-evaluation.
#[async_trait]
pub trait Poller: Send + Sync {
    async fn poll(&self, phase_id: &PhaseId, snapshot: &FabricSnapshot) -> PollResult;
}

/// Default poller: analyzes the phase body (via [`parsing::required_symbols`])
/// and the snapshot. If the phase references symbols not yet published,
/// returns `NeedInfo`; if its scope overlaps an in-progress file claim,
/// returns `Conflict`; otherwise `Proceed`.
pub struct DefaultPoller<'a> {
    tracker: &'a PhaseTracker,
}

impl<'a> DefaultPoller<'a> {
    pub fn new(tracker: &'a PhaseTracker) -> Self {
        Self { tracker }
    }
}

#[async_trait]
impl<'a> Poller for DefaultPoller<'a> {
    async fn poll(&self, phase_id: &PhaseId, snapshot: &FabricSnapshot) -> PollResult {
        let Some(phase) = self.tracker.get(phase_id) else {
            return PollResult::proceed();
        };

        let required = parsing::required_symbols(phase);
        let published: HashSet<&str> = snapshot.entanglements.iter().map(|e| e.name.as_str()).collect();
        let missing: Vec<String> = required.into_iter().filter(|r| !published.contains(r.as_str())).collect();
        if !missing.is_empty() {
            return PollResult::need_info(format!("{} symbol(s) not yet published", missing.len()), missing);
        }

        for (path, owner) in &snapshot.file_claims {
            if owner == phase_id {
                continue;
            }
            if scopes_overlap(&phase.scope, std::slice::from_ref(path)) {
                return PollResult::conflict(format!("scope overlaps claim on {path}"), owner.clone());
            }
        }

        PollResult::proceed()
    }
}

/// Decision a [`PushbackHandler`] reaches for a blocked phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushbackDecision {
    Retry,
    Escalate,
    Proceed,
}

/// `Handle(blockedPhase, inProgressIDs, snapshot) -> {Retry, Escalate,
/// Proceed}` (spec.md §4.5 policy table).
pub struct PushbackHandler {
    pub max_retries: u32,
}

impl Default for PushbackHandler {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

impl PushbackHandler {
    /// Finds a phase in `phases` whose declared `## Produces` section
    /// claims to produce `symbol`, if any.
    fn plausible_producer(symbol: &str, phases: &[&Phase]) -> Option<PhaseId> {
        phases
            .iter()
            .find(|p| parsing::produced_symbol_names(p).iter().any(|n| n == symbol))
            .map(|p| p.id.clone())
    }

    pub fn handle(
        &self,
        blocked: &BlockedPhase,
        in_progress_ids: &HashSet<PhaseId>,
        phases: &[&Phase],
    ) -> PushbackDecision {
        match blocked.last_result.decision {
            PollDecision::NeedInfo => {
                let has_in_progress_producer = blocked
                    .last_result
                    .missing_info
                    .iter()
                    .filter_map(|sym| Self::plausible_producer(sym, phases))
                    .any(|producer| in_progress_ids.contains(&producer));

                if has_in_progress_producer {
                    PushbackDecision::Retry
                } else if blocked.retry_count >= self.max_retries {
                    PushbackDecision::Escalate
                } else {
                    PushbackDecision::Retry
                }
            }
            PollDecision::Conflict => {
                if let Some(owner) = &blocked.last_result.conflict_with {
                    if in_progress_ids.contains(owner) {
                        PushbackDecision::Retry
                    } else {
                        PushbackDecision::Escalate
                    }
                } else {
                    PushbackDecision::Escalate
                }
            }
            PollDecision::Proceed | PollDecision::Unknown => PushbackDecision::Proceed,
        }
    }
}

/// Tracks phases currently held back by the poller.
#[derive(Debug, Default)]
pub struct BlockedTracker {
    blocked: HashMap<PhaseId, BlockedPhase>,
    overridden: HashSet<PhaseId>,
}

impl BlockedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or updates an entry and increments its retry count.
    pub fn block(&mut self, id: PhaseId, result: PollResult) {
        match self.blocked.get_mut(&id) {
            Some(entry) => {
                entry.retry_count += 1;
                entry.last_result = result;
            }
            None => {
                self.blocked.insert(
                    id.clone(),
                    BlockedPhase {
                        id,
                        last_result: result,
                        retry_count: 1,
                        first_blocked_at: Utc::now(),
                    },
                );
            }
        }
    }

    pub fn unblock(&mut self, id: &PhaseId) {
        self.blocked.remove(id);
    }

    /// Marks a phase to skip future polling until it completes.
    pub fn r#override(&mut self, id: PhaseId) {
        self.overridden.insert(id);
    }

    pub fn is_overridden(&self, id: &PhaseId) -> bool {
        self.overridden.contains(id)
    }

    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &BlockedPhase> {
        self.blocked.values()
    }

    pub fn get(&self, id: &PhaseId) -> Option<&BlockedPhase> {
        self.blocked.get(id)
    }
}
