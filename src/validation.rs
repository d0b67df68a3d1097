//! Validation & correction (spec.md §4.10): structural checks over a
//! parsed phase set, with deterministic auto-fixes for the recoverable
//! categories.

use std::collections::{HashMap, HashSet};

use crate::dag::Dag;
use crate::model::{GateMode, Phase, PhaseId};
use crate::scope::scopes_overlap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    MissingField(&'static str),
    DuplicateId,
    UnknownDep(PhaseId),
    Cycle,
    InvalidGate,
    BoundsViolation(&'static str),
    ScopeOverlap(PhaseId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub phase_id: PhaseId,
    pub kind: ValidationErrorKind,
}

/// Runs every structural check against a phase set, returning all errors
/// found (not just the first).
pub fn validate(phases: &[Phase]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen_ids: HashSet<&str> = HashSet::new();
    let known_ids: HashSet<&PhaseId> = phases.iter().map(|p| &p.id).collect();

    for phase in phases {
        if phase.id.as_str().is_empty() {
            errors.push(ValidationError { phase_id: phase.id.clone(), kind: ValidationErrorKind::MissingField("id") });
        } else if !seen_ids.insert(phase.id.as_str()) {
            errors.push(ValidationError { phase_id: phase.id.clone(), kind: ValidationErrorKind::DuplicateId });
        }

        if phase.title.is_empty() {
            errors.push(ValidationError { phase_id: phase.id.clone(), kind: ValidationErrorKind::MissingField("title") });
        }

        for dep in &phase.dependencies {
            if !known_ids.contains(dep) {
                errors.push(ValidationError { phase_id: phase.id.clone(), kind: ValidationErrorKind::UnknownDep(dep.clone()) });
            }
        }

        if phase.max_review_cycles.is_some() && phase.max_review_cycles == Some(0) {
            errors.push(ValidationError {
                phase_id: phase.id.clone(),
                kind: ValidationErrorKind::BoundsViolation("max_review_cycles"),
            });
        }
        if let Some(budget) = phase.max_budget_usd {
            if budget < 0.0 {
                errors.push(ValidationError {
                    phase_id: phase.id.clone(),
                    kind: ValidationErrorKind::BoundsViolation("max_budget_usd"),
                });
            }
        }
    }

    errors.extend(detect_cycle(phases));
    errors.extend(detect_scope_overlaps(phases));
    errors
}

fn detect_cycle(phases: &[Phase]) -> Vec<ValidationError> {
    let mut dag = Dag::new();
    for phase in phases {
        dag.add_node_idempotent(phase.id.clone(), phase.priority);
    }
    for phase in phases {
        for dep in &phase.dependencies {
            if dag.add_edge(dep, &phase.id).is_err() {
                return vec![ValidationError { phase_id: phase.id.clone(), kind: ValidationErrorKind::Cycle }];
            }
        }
    }
    Vec::new()
}

/// Two scoped phases connected by any dependency chain are serialized by
/// the scheduler and therefore never actually conflict, even if their
/// globs overlap — consult the DAG before flagging an overlap.
fn detect_scope_overlaps(phases: &[Phase]) -> Vec<ValidationError> {
    let mut dag = Dag::new();
    for phase in phases {
        dag.add_node_idempotent(phase.id.clone(), phase.priority);
    }
    for phase in phases {
        for dep in &phase.dependencies {
            let _ = dag.add_edge(dep, &phase.id);
        }
    }

    let mut errors = Vec::new();
    for (i, a) in phases.iter().enumerate() {
        if a.allow_scope_overlap || a.scope.is_empty() {
            continue;
        }
        for b in &phases[i + 1..] {
            if b.allow_scope_overlap || b.scope.is_empty() {
                continue;
            }
            if dag.connected(&a.id, &b.id) {
                continue;
            }
            if scopes_overlap(&a.scope, &b.scope) {
                errors.push(ValidationError { phase_id: a.id.clone(), kind: ValidationErrorKind::ScopeOverlap(b.id.clone()) });
            }
        }
    }
    errors
}

/// Applies the deterministic repairs spec.md §4.10 describes.
/// `Cycle` errors are never auto-corrected and are returned unchanged in
/// `remaining`.
pub fn correct(mut phases: Vec<Phase>, errors: &[ValidationError]) -> (Vec<Phase>, Vec<String>, Vec<ValidationError>) {
    let mut fix_messages = Vec::new();
    let mut remaining = Vec::new();
    let mut by_id: HashMap<PhaseId, usize> = phases.iter().enumerate().map(|(i, p)| (p.id.clone(), i)).collect();

    for error in errors {
        match &error.kind {
            ValidationErrorKind::MissingField("id") => {
                if let Some(idx) = by_id.get(&error.phase_id).copied() {
                    let derived = derive_id_from_source(&phases[idx].source_file);
                    fix_messages.push(format!("derived id '{derived}' for {}", phases[idx].source_file));
                    by_id.remove(&error.phase_id);
                    phases[idx].id = PhaseId::new(derived);
                    by_id.insert(phases[idx].id.clone(), idx);
                }
            }
            ValidationErrorKind::MissingField("title") => {
                if let Some(&idx) = by_id.get(&error.phase_id) {
                    let title = deslugify(phases[idx].id.as_str());
                    fix_messages.push(format!("derived title '{title}' for {}", phases[idx].id));
                    phases[idx].title = title;
                }
            }
            ValidationErrorKind::DuplicateId => {
                if let Some(&idx) = by_id.get(&error.phase_id) {
                    let mut suffix = 2;
                    loop {
                        let candidate = PhaseId::new(format!("{}-{suffix}", error.phase_id));
                        if !by_id.contains_key(&candidate) {
                            fix_messages.push(format!("renamed duplicate id {} -> {candidate}", error.phase_id));
                            phases[idx].id = candidate.clone();
                            by_id.insert(candidate, idx);
                            break;
                        }
                        suffix += 1;
                    }
                }
            }
            ValidationErrorKind::UnknownDep(dep) => {
                if let Some(&idx) = by_id.get(&error.phase_id) {
                    phases[idx].dependencies.retain(|d| d != dep);
                    fix_messages.push(format!("dropped dangling dependency {dep} from {}", error.phase_id));
                }
            }
            ValidationErrorKind::InvalidGate => {
                if let Some(&idx) = by_id.get(&error.phase_id) {
                    phases[idx].gate = None::<GateMode>;
                    fix_messages.push(format!("cleared invalid gate on {}", error.phase_id));
                }
            }
            ValidationErrorKind::BoundsViolation(field) => {
                if let Some(&idx) = by_id.get(&error.phase_id) {
                    match *field {
                        "max_review_cycles" => phases[idx].max_review_cycles = Some(0),
                        "max_budget_usd" => phases[idx].max_budget_usd = Some(0.0),
                        _ => {}
                    }
                    fix_messages.push(format!("clamped {field} to 0 on {}", error.phase_id));
                }
            }
            ValidationErrorKind::ScopeOverlap(_) => {
                if let Some(&idx) = by_id.get(&error.phase_id) {
                    phases[idx].allow_scope_overlap = true;
                    fix_messages.push(format!("set allow_scope_overlap on {}", error.phase_id));
                }
            }
            ValidationErrorKind::Cycle | ValidationErrorKind::MissingField(_) => {
                remaining.push(error.clone());
            }
        }
    }

    (phases, fix_messages, remaining)
}

fn derive_id_from_source(source_file: &str) -> String {
    let stem = source_file.rsplit('/').next().unwrap_or(source_file).trim_end_matches(".md");
    let without_leading_digits = stem.trim_start_matches(|c: char| c.is_ascii_digit() || c == '-');
    without_leading_digits.to_string()
}

fn deslugify(id: &str) -> String {
    id.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
