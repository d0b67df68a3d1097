//! State journal (spec.md §3/§6): `nebula.state.toml` records enough to
//! resume a run — the total spend so far and each phase's bead id,
//! status, and timestamps. Written atomically: serialize to a sibling
//! `.tmp` file, `fsync`, then rename over the real path, so a crash
//! mid-write never leaves a corrupt journal behind.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{PhaseId, PhaseState};

const JOURNAL_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("failed to read journal: {0}")]
    Read(String),
    #[error("failed to parse journal: {0}")]
    Parse(String),
    #[error("failed to write journal: {0}")]
    Write(String),
}

pub type JournalResult<T> = Result<T, JournalError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub version: u32,
    pub nebula_name: String,
    pub total_cost_usd: f64,
    pub phases: HashMap<String, PhaseState>,
}

impl Journal {
    pub fn new(nebula_name: impl Into<String>) -> Self {
        Self { version: JOURNAL_VERSION, nebula_name: nebula_name.into(), total_cost_usd: 0.0, phases: HashMap::new() }
    }

    pub fn set_phase(&mut self, id: &PhaseId, state: PhaseState) {
        self.phases.insert(id.as_str().to_string(), state);
    }

    pub fn get_phase(&self, id: &PhaseId) -> Option<&PhaseState> {
        self.phases.get(id.as_str())
    }

    pub fn load(path: impl AsRef<Path>) -> JournalResult<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path).map_err(|e| JournalError::Read(e.to_string()))?;
        let journal: Journal = toml::from_str(&contents).map_err(|e| JournalError::Parse(e.to_string()))?;
        Ok(Some(journal))
    }

    /// Writes `self` to `path` via a temp-file-then-rename sequence so a
    /// reader never observes a half-written journal.
    pub fn save(&self, path: impl AsRef<Path>) -> JournalResult<()> {
        let path = path.as_ref();
        let tmp_path = path.with_extension("toml.tmp");

        let toml = toml::to_string_pretty(self).map_err(|e| JournalError::Write(e.to_string()))?;

        let mut file = std::fs::File::create(&tmp_path).map_err(|e| JournalError::Write(e.to_string()))?;
        file.write_all(toml.as_bytes()).map_err(|e| JournalError::Write(e.to_string()))?;
        file.sync_all().map_err(|e| JournalError::Write(e.to_string()))?;
        drop(file);

        std::fs::rename(&tmp_path, path).map_err(|e| JournalError::Write(e.to_string()))?;
        Ok(())
    }
}
