//! Loads a nebula directory from disk: manifest, phase files, validation
//! and correction, and the resulting DAG. Shared by every CLI command.

use std::path::Path;

use anyhow::{Context, Result};

use crate::dag::Dag;
use crate::model::{NebulaManifest, Phase};
use crate::parsing;
use crate::validation;

pub struct LoadedNebula {
    pub manifest: NebulaManifest,
    pub phases: Vec<Phase>,
    pub dag: Dag,
    /// Human-readable descriptions of corrections `validation::correct`
    /// applied automatically.
    pub corrections: Vec<String>,
}

/// Reads `nebula.toml` and every `*.md` phase file under `dir`, validates
/// the set, applies deterministic auto-correction, and builds the DAG.
/// Fails only on I/O errors or validation failures auto-correction could
/// not repair (spec.md §4.10, §7 "Structural").
pub fn load_nebula_dir(dir: &Path) -> Result<LoadedNebula> {
    let manifest_path = dir.join("nebula.toml");
    let manifest_contents = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("reading {}", manifest_path.display()))?;
    let manifest: NebulaManifest = toml::from_str(&manifest_contents).with_context(|| format!("parsing {}", manifest_path.display()))?;

    let mut phases = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading directory {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("md") {
            continue;
        }
        let contents = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let source_file = path.display().to_string();
        match parsing::parse_phase_file(&source_file, &contents) {
            Ok(phase) => phases.push(phase),
            Err(e) => anyhow::bail!("failed to parse {source_file}: {e}"),
        }
    }

    let mut corrections = Vec::new();
    let errors = validation::validate(&phases);
    if !errors.is_empty() {
        let (corrected, applied, remaining) = validation::correct(phases, &errors);
        phases = corrected;
        corrections = applied;
        if !remaining.is_empty() {
            let details: Vec<String> = remaining.iter().map(|e| format!("{}: {:?}", e.phase_id, e.kind)).collect();
            anyhow::bail!("validation failed and could not be auto-corrected: {}", details.join("; "));
        }
    }

    let mut dag = Dag::new();
    for phase in &phases {
        dag.add_node_idempotent(phase.id.clone(), phase.priority);
    }
    for phase in &phases {
        for dep in &phase.dependencies {
            dag.add_edge(dep, &phase.id).map_err(|e| anyhow::anyhow!("{e}"))?;
        }
    }

    Ok(LoadedNebula { manifest, phases, dag, corrections })
}
