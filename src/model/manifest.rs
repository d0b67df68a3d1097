//! `nebula.toml` manifest: the nebula's name, project goals/constraints,
//! and manifest-level execution defaults (spec.md §3, §4.7).

use serde::{Deserialize, Serialize};

/// Manifest-level execution defaults, one precedence rung below
/// phase-level overrides in `ResolveExecution` (spec.md §4.7).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionDefaults {
    pub model: Option<String>,
    pub max_review_cycles: Option<u32>,
    pub max_budget_usd: Option<f64>,
}

/// Top-level `nebula.toml` contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NebulaManifest {
    pub name: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
    #[serde(default)]
    pub execution: ExecutionDefaults,
    /// Maximum concurrently-running phases (`MaxWorkers`). Overridable by
    /// the global config / CLI flag.
    #[serde(default)]
    pub max_workers: Option<usize>,
}

impl NebulaManifest {
    /// Render `[goals + constraints]` as the project-context block the
    /// executor prepends to every phase prompt (spec.md §4.7 step 4).
    pub fn project_context(&self) -> String {
        let mut out = String::new();
        if !self.goals.is_empty() {
            out.push_str("# Goals\n");
            for g in &self.goals {
                out.push_str("- ");
                out.push_str(g);
                out.push('\n');
            }
        }
        if !self.constraints.is_empty() {
            out.push_str("# Constraints\n");
            for c in &self.constraints {
                out.push_str("- ");
                out.push_str(c);
                out.push('\n');
            }
        }
        out
    }
}
