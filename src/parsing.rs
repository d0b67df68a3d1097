//! Phase-file parsing and the static source-code scanner.
//!
//! Full TOML-frontmatter parsing and source-code symbol extraction are
//! external collaborators per spec.md §1 — the core only consumes their
//! output. This module gives both a concrete default implementation so the
//! crate is runnable end-to-end: frontmatter parsing is complete (the
//! format is simple and fully specified by spec.md §6), while the symbol
//! scanner is a conservative heuristic over `## Requires` / `## Produces`
//! / `## Files` markdown sections rather than a real source-code scanner.

use thiserror::Error;

use crate::model::{EntanglementKind, GateMode, Phase, PhaseId, PhaseType};

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("phase file {0} is missing frontmatter delimiters (`+++`)")]
    MissingFrontmatter(String),
    #[error("phase file {0}: invalid frontmatter TOML: {1}")]
    InvalidToml(String, String),
    #[error("phase file {0} is missing required field `{1}`")]
    MissingField(String, &'static str),
}

/// Frontmatter as deserialized directly from TOML, before defaults and
/// `source_file`/`body` are attached.
#[derive(Debug, Clone, serde::Deserialize)]
struct Frontmatter {
    id: Option<String>,
    title: Option<String>,
    #[serde(rename = "type")]
    phase_type: Option<PhaseType>,
    priority: Option<i32>,
    depends_on: Option<Vec<String>>,
    blocks: Option<Vec<String>>,
    scope: Option<Vec<String>>,
    allow_scope_overlap: Option<bool>,
    gate: Option<GateMode>,
    max_review_cycles: Option<u32>,
    max_budget_usd: Option<f64>,
    model: Option<String>,
    labels: Option<Vec<String>>,
    assignee: Option<String>,
}

/// Parses one phase file: `+++`-delimited TOML frontmatter followed by a
/// Markdown body. `source_file` is the path to record on the resulting
/// [`Phase`] (relative to the nebula directory).
pub fn parse_phase_file(source_file: &str, contents: &str) -> Result<Phase, ParseError> {
    let mut parts = contents.splitn(3, "+++");
    let _leading = parts.next();
    let Some(frontmatter_src) = parts.next() else {
        return Err(ParseError::MissingFrontmatter(source_file.to_string()));
    };
    let body = parts.next().unwrap_or("").trim_start_matches('\n').to_string();

    let fm: Frontmatter =
        toml::from_str(frontmatter_src).map_err(|e| ParseError::InvalidToml(source_file.to_string(), e.to_string()))?;

    let id = fm.id.ok_or(ParseError::MissingField(source_file.to_string(), "id"))?;
    let title = fm.title.ok_or(ParseError::MissingField(source_file.to_string(), "title"))?;

    Ok(Phase {
        id: PhaseId::new(id),
        title,
        priority: fm.priority.unwrap_or(0),
        phase_type: fm.phase_type.unwrap_or_default(),
        dependencies: fm.depends_on.unwrap_or_default().into_iter().map(PhaseId::new).collect(),
        blocks: fm.blocks.unwrap_or_default().into_iter().map(PhaseId::new).collect(),
        scope: fm.scope.unwrap_or_default(),
        allow_scope_overlap: fm.allow_scope_overlap.unwrap_or(false),
        gate: fm.gate,
        max_review_cycles: fm.max_review_cycles,
        max_budget_usd: fm.max_budget_usd,
        model: fm.model,
        labels: fm.labels.unwrap_or_default(),
        assignee: fm.assignee,
        body,
        source_file: source_file.to_string(),
    })
}

/// Extracts backtick-quoted entries under a named `##` markdown heading,
/// stopping at the next `##` heading or end of body.
fn section_entries(body: &str, heading: &str) -> Vec<String> {
    let mut in_section = false;
    let mut entries = Vec::new();
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("## ") {
            in_section = trimmed.eq_ignore_ascii_case(&format!("## {heading}"));
            continue;
        }
        if !in_section {
            continue;
        }
        let mut rest = trimmed;
        while let Some(start) = rest.find('`') {
            rest = &rest[start + 1..];
            if let Some(end) = rest.find('`') {
                entries.push(rest[..end].to_string());
                rest = &rest[end + 1..];
            } else {
                break;
            }
        }
    }
    entries
}

/// The `## Files` section: paths this phase's body claims to touch.
pub fn scan_files(phase: &Phase) -> Vec<String> {
    section_entries(&phase.body, "Files")
}

/// The `## Requires` section: symbol names this phase's body says it
/// needs from another phase's contract.
pub fn required_symbols(phase: &Phase) -> Vec<String> {
    section_entries(&phase.body, "Requires")
}

/// The `## Produces` section: symbol names this phase's body declares it
/// will publish as entanglements once it completes.
pub fn produced_symbol_names(phase: &Phase) -> Vec<String> {
    section_entries(&phase.body, "Produces")
}

/// Builds [`crate::model::Entanglement`] values for everything a phase's
/// `## Produces` section declares, as of the given producer and package.
/// Used by the executor after a successful commit (spec.md §4.7 step 10).
pub fn scan_produced_entanglements(phase: &Phase, package: &str) -> Vec<(EntanglementKind, String, String)> {
    produced_symbol_names(phase)
        .into_iter()
        .map(|name| (EntanglementKind::Function, name.clone(), format!("{name} (from {})", phase.id)))
        .map(|(k, n, sig)| (k, n, sig))
        .map(|(k, n, sig)| (k, n, format!("{sig} in {package}")))
        .collect()
}
