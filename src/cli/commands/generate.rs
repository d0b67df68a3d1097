//! `nebula generate`: load, validate, and compile a nebula directory into
//! an [`ExecutionPlan`], grounded in the teacher's `cli::commands::task`
//! load-then-render pattern.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use crate::cli::loader::load_nebula_dir;
use crate::cli::output::{output, CommandOutput};
use crate::plan::{self, ExecutionPlan};

#[derive(Debug, Serialize)]
struct GenerateReport {
    nebula_name: String,
    phase_count: usize,
    corrections: Vec<String>,
    plan: ExecutionPlan,
    written_to: Option<String>,
}

impl CommandOutput for GenerateReport {
    fn to_human(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Nebula: {} ({} phases)\n", self.nebula_name, self.phase_count));
        if !self.corrections.is_empty() {
            out.push_str("Auto-corrections applied:\n");
            for c in &self.corrections {
                out.push_str(&format!("  - {c}\n"));
            }
        }
        out.push_str(&format!("Waves: {}\n", self.plan.waves.len()));
        for (i, wave) in self.plan.waves.iter().enumerate() {
            let ids: Vec<&str> = wave.iter().map(|id| id.as_str()).collect();
            out.push_str(&format!("  wave {i}: {}\n", ids.join(", ")));
        }
        if !self.plan.risks.is_empty() {
            out.push_str("Risks:\n");
            for risk in &self.plan.risks {
                out.push_str(&format!("  - {}\n", risk.message));
            }
        }
        if let Some(path) = &self.written_to {
            out.push_str(&format!("Plan written to {path}\n"));
        }
        out
    }

    fn to_json(&self) -> serde_json::Value {
        json!(self)
    }
}

pub fn execute(nebula_dir: &Path, write: bool, json_mode: bool) -> Result<()> {
    let loaded = load_nebula_dir(nebula_dir)?;
    let compiled = plan::compile(&loaded.phases, &loaded.dag);

    let written_to = if write {
        let path = nebula_dir.join("nebula.plan.json");
        std::fs::write(&path, serde_json::to_string_pretty(&compiled)?)?;
        Some(path.display().to_string())
    } else {
        None
    };

    let report = GenerateReport {
        nebula_name: loaded.manifest.name.clone(),
        phase_count: loaded.phases.len(),
        corrections: loaded.corrections,
        plan: compiled,
        written_to,
    };
    output(&report, json_mode);
    Ok(())
}
