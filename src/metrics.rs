//! Run metrics (spec.md §4 "Metrics", new in the expanded spec): per
//! phase, per wave, and process-global totals, persisted to
//! `nebula.metrics.toml` with a capped run history. Structured after the
//! teacher's `services::budget_tracker` snapshot-plus-tracker shape:
//! a plain-data record type plus a small owning tracker with update
//! methods, no free-standing globals.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::PhaseId;

const MAX_RUN_HISTORY: usize = 10;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to read metrics file: {0}")]
    Read(String),
    #[error("failed to write metrics file: {0}")]
    Write(String),
    #[error("failed to parse metrics file: {0}")]
    Parse(String),
}

pub type MetricsResult<T> = Result<T, MetricsError>;

/// Per-phase metrics (spec.md §4): duration, cost, review cycles spent,
/// time spent blocked by the poller, whether it ever hit a scope
/// conflict, how many times it was retried, and its final review
/// satisfaction score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseMetrics {
    pub duration_secs: f64,
    pub cost_usd: f64,
    pub cycles_used: u32,
    pub lock_wait_secs: f64,
    pub conflict_flag: bool,
    pub restart_count: u32,
    pub satisfaction: Option<f64>,
}

/// Per-wave metrics: how long the wave took end to end, how many phases
/// actually ran in parallel, total lines changed, how many file claims
/// were live during the wave, and their average age at wave end.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaveMetrics {
    pub total_duration_secs: f64,
    pub effective_parallelism: f64,
    pub change_volume: u32,
    pub active_claim_count: u32,
    pub avg_claim_age_secs: f64,
}

/// One completed (or in-progress) run's metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetrics {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_cost_usd: f64,
    pub phases: HashMap<String, PhaseMetrics>,
    pub waves: Vec<WaveMetrics>,
}

/// Process-global metrics file: the current run plus a capped history of
/// prior runs, oldest dropped first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsFile {
    pub current: RunMetrics,
    pub history: Vec<RunMetrics>,
}

/// In-memory accumulator for the run in progress; flushed to disk via
/// [`MetricsTracker::save`].
#[derive(Debug, Default)]
pub struct MetricsTracker {
    file: MetricsFile,
}

impl MetricsTracker {
    pub fn new() -> Self {
        let mut file = MetricsFile::default();
        file.current.started_at = Some(Utc::now());
        Self { file }
    }

    pub fn record_phase(&mut self, id: &PhaseId, metrics: PhaseMetrics) {
        self.file.current.total_cost_usd += metrics.cost_usd;
        self.file.current.phases.insert(id.as_str().to_string(), metrics);
    }

    pub fn record_wave(&mut self, metrics: WaveMetrics) {
        self.file.current.waves.push(metrics);
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.file.current.total_cost_usd
    }

    /// Closes out the current run, rotates it into history (dropping the
    /// oldest entry beyond [`MAX_RUN_HISTORY`]), and starts a fresh
    /// current run.
    pub fn rotate(&mut self) {
        self.file.current.finished_at = Some(Utc::now());
        let finished = std::mem::take(&mut self.file.current);
        self.file.history.push(finished);
        if self.file.history.len() > MAX_RUN_HISTORY {
            let overflow = self.file.history.len() - MAX_RUN_HISTORY;
            self.file.history.drain(0..overflow);
        }
        self.file.current = RunMetrics { started_at: Some(Utc::now()), ..Default::default() };
    }

    pub fn load(path: impl AsRef<Path>) -> MetricsResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| MetricsError::Read(e.to_string()))?;
        let file: MetricsFile = toml::from_str(&contents).map_err(|e| MetricsError::Parse(e.to_string()))?;
        Ok(Self { file })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> MetricsResult<()> {
        let toml = toml::to_string_pretty(&self.file).map_err(|e| MetricsError::Write(e.to_string()))?;
        std::fs::write(path, toml).map_err(|e| MetricsError::Write(e.to_string()))?;
        Ok(())
    }
}
