//! HotReloader (spec.md §4.8): watches the phase-file directory and
//! maintains a live DAG/phase-index that mirrors the worker group's, safe
//! to mutate under the worker-group mutex. File-watching uses `notify`,
//! in the same watch-and-poll shape as the config-reload watcher found
//! elsewhere in the example pack.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;

use crate::dag::Dag;
use crate::model::{Phase, PhaseId};
use crate::parsing::{self, ParseError};
use crate::phase_tracker::PhaseTracker;

#[derive(Debug, Error)]
pub enum HotReloadError {
    #[error("failed to start file watcher: {0}")]
    Watch(String),
    #[error("failed to read phase file {0}: {1}")]
    Read(String, String),
}

/// A file-system change the reloader noticed, classified by the static
/// file extension convention (`*.md` phase files only).
#[derive(Debug, Clone, PartialEq, Eq)]
enum PhaseFileChange {
    Added(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
}

/// Outcome of processing one hot-add, reported back to the dispatch loop.
#[derive(Debug, Clone)]
pub enum HotAddOutcome {
    Added(PhaseId),
    Rejected { source_file: String, reason: String },
    Dropped { source_file: String, reason: String },
}

/// Watches `phases_dir` for `.md` files and mirrors them into a live DAG
/// and phase index, independent from (but structurally identical to) the
/// worker group's own tracker.
pub struct HotReloader {
    phases_dir: PathBuf,
    rx: Receiver<notify::Result<Event>>,
    _watcher: RecommendedWatcher,
    live_dag: Dag,
    live_index: HashSet<PhaseId>,
    pending_refactors: std::collections::HashMap<PhaseId, String>,
    /// Full `Phase` records for outstanding `Added` outcomes, drained by
    /// the driver loop via [`Self::take_added_phase`] since
    /// [`HotAddOutcome::Added`] itself only carries the id.
    added_phases: std::collections::HashMap<PhaseId, Phase>,
}

impl HotReloader {
    pub fn new(phases_dir: impl Into<PathBuf>, seed_dag: Dag, seed_ids: HashSet<PhaseId>) -> Result<Self, HotReloadError> {
        let phases_dir = phases_dir.into();
        let (tx, rx) = mpsc::channel();

        let mut watcher = RecommendedWatcher::new(move |res| {
            let _ = tx.send(res);
        }, notify::Config::default())
        .map_err(|e| HotReloadError::Watch(e.to_string()))?;

        if phases_dir.exists() {
            watcher.watch(&phases_dir, RecursiveMode::NonRecursive).map_err(|e| HotReloadError::Watch(e.to_string()))?;
        }

        Ok(Self {
            phases_dir,
            rx,
            _watcher: watcher,
            live_dag: seed_dag,
            live_index: seed_ids,
            pending_refactors: std::collections::HashMap::new(),
            added_phases: std::collections::HashMap::new(),
        })
    }

    /// Non-blocking poll of queued filesystem events, deduplicated by
    /// path and classified into add/modify/remove.
    fn poll_changes(&self) -> Vec<PhaseFileChange> {
        let mut changes = Vec::new();
        let mut seen = HashSet::new();

        while let Ok(Ok(event)) = self.rx.try_recv() {
            let classify = match event.kind {
                EventKind::Create(_) => Some(PhaseFileChange::Added as fn(PathBuf) -> PhaseFileChange),
                EventKind::Modify(_) => Some(PhaseFileChange::Modified as fn(PathBuf) -> PhaseFileChange),
                EventKind::Remove(_) => Some(PhaseFileChange::Removed as fn(PathBuf) -> PhaseFileChange),
                _ => None,
            };
            let Some(ctor) = classify else { continue };

            for path in event.paths {
                if path.extension().and_then(|e| e.to_str()) != Some("md") {
                    continue;
                }
                if seen.insert(path.clone()) {
                    changes.push(ctor(path));
                }
            }
        }
        changes
    }

    /// Handles a `Modified` event: stashes the new body in
    /// `pending_refactors`, keyed by phase id. Whether the phase is
    /// currently in flight or still pending, the executor drains this
    /// map via [`Self::take_pending_refactor`] the next time it touches
    /// that phase, rather than over a dedicated live channel.
    fn handle_modified(&mut self, path: &Path, _tracker: &PhaseTracker) -> Result<(), HotReloadError> {
        let contents = std::fs::read_to_string(path).map_err(|e| HotReloadError::Read(path.display().to_string(), e.to_string()))?;
        let Ok(phase) = parsing::parse_phase_file(&path.display().to_string(), &contents) else {
            return Ok(());
        };
        self.pending_refactors.insert(phase.id, phase.body);
        Ok(())
    }

    /// Drains a pending refactor body for `id`, if one was queued by a
    /// `Modified` event while the phase wasn't running.
    pub fn take_pending_refactor(&mut self, id: &PhaseId) -> Option<String> {
        self.pending_refactors.remove(id)
    }

    /// Handles an `Added` event: parses the file, applies hot-add
    /// validation against the live DAG, and mutates `self.live_dag` /
    /// `self.live_index` on success. All mutations for a rejected phase
    /// are rolled back.
    fn handle_added(&mut self, path: &Path, all_phases: &[Phase]) -> Result<HotAddOutcome, HotReloadError> {
        let source_file = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|e| HotReloadError::Read(source_file.clone(), e.to_string()))?;

        let phase = match parsing::parse_phase_file(&source_file, &contents) {
            Ok(p) => p,
            Err(ParseError::MissingField(_, field)) => {
                return Ok(HotAddOutcome::Dropped { source_file, reason: format!("missing {field}") });
            }
            Err(e) => return Ok(HotAddOutcome::Dropped { source_file, reason: e.to_string() }),
        };

        if self.live_index.contains(&phase.id) {
            return Ok(HotAddOutcome::Rejected { source_file, reason: format!("duplicate id {}", phase.id) });
        }

        self.live_dag.add_node_idempotent(phase.id.clone(), phase.priority);
        self.live_index.insert(phase.id.clone());

        // `remove` drops every edge incident to `phase.id`, which is exactly
        // what's needed to undo every edge added below in one call.
        for dep in &phase.dependencies {
            if self.live_dag.add_edge(dep, &phase.id).is_err() {
                self.live_dag.remove(&phase.id);
                self.live_index.remove(&phase.id);
                return Ok(HotAddOutcome::Rejected { source_file, reason: format!("edge {dep} -> {} would cycle", phase.id) });
            }
        }

        for target in &phase.blocks {
            let already_started = all_phases.iter().any(|p| p.id == *target) && self.live_index.contains(target);
            if !already_started {
                continue;
            }
            if self.live_dag.add_edge(&phase.id, target).is_err() {
                self.live_dag.remove(&phase.id);
                self.live_index.remove(&phase.id);
                return Ok(HotAddOutcome::Rejected { source_file, reason: format!("edge {} -> {target} would cycle", phase.id) });
            }
        }

        let id = phase.id.clone();
        self.added_phases.insert(id.clone(), phase);
        Ok(HotAddOutcome::Added(id))
    }

    /// Drains the full [`Phase`] record behind an [`HotAddOutcome::Added`]
    /// for `id`, so the driver loop can merge it into its own DAG and
    /// tracker without re-reading the file.
    pub fn take_added_phase(&mut self, id: &PhaseId) -> Option<Phase> {
        self.added_phases.remove(id)
    }

    /// Processes every queued filesystem change, returning outcomes for
    /// any `Added` events (dispatch-relevant); `Modified`/`Removed` are
    /// handled internally and produce no outcome.
    pub fn process_events(&mut self, all_phases: &[Phase], tracker: &PhaseTracker) -> Result<Vec<HotAddOutcome>, HotReloadError> {
        let mut outcomes = Vec::new();
        for change in self.poll_changes() {
            match change {
                PhaseFileChange::Added(path) => outcomes.push(self.handle_added(&path, all_phases)?),
                PhaseFileChange::Modified(path) => self.handle_modified(&path, tracker)?,
                PhaseFileChange::Removed(_) => {}
            }
        }
        Ok(outcomes)
    }

    /// `CheckHotAddedReady` (spec.md §4.8): phases in the live index whose
    /// predecessors are all done and that are neither in-flight nor
    /// failed become newly eligible.
    pub fn check_hot_added_ready(&self, tracker: &PhaseTracker) -> Vec<PhaseId> {
        self.live_index
            .iter()
            .filter(|id| !tracker.done().contains(*id))
            .filter(|id| !tracker.in_flight().contains(*id))
            .filter(|id| !tracker.failed().contains(*id))
            .filter(|id| self.live_dag.deps_for(id).iter().all(|d| tracker.done().contains(d)))
            .cloned()
            .collect()
    }

    pub fn phases_dir(&self) -> &Path {
        &self.phases_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_check_requires_all_deps_done() {
        let mut dag = Dag::new();
        dag.add_node(PhaseId::new("a"), 0).unwrap();
        dag.add_node(PhaseId::new("b"), 0).unwrap();
        dag.add_edge(&PhaseId::new("a"), &PhaseId::new("b")).unwrap();

        let mut live_index = HashSet::new();
        live_index.insert(PhaseId::new("a"));
        live_index.insert(PhaseId::new("b"));

        let tmp = tempfile::tempdir().unwrap();
        let reloader = HotReloader::new(tmp.path(), dag, live_index).unwrap();

        let tracker = PhaseTracker::new();
        let ready = reloader.check_hot_added_ready(&tracker);
        assert_eq!(ready, vec![PhaseId::new("a")]);
    }
}
