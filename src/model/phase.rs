//! The [`Phase`] type: a unit of code-modification work parsed from a
//! markdown-with-frontmatter file.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A kebab-case phase identifier, unique within a nebula.
///
/// Phase ids are human-authored in the source file's frontmatter and must
/// stay stable across hot-reload, unlike the teacher's UUID-keyed `Task` —
/// a string newtype is the right representation here (see `DESIGN.md`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhaseId(pub String);

impl PhaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PhaseId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PhaseId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Free-form type tag on a phase (`task`, `bug`, `feature`, ...). Used by
/// auto-routing's complexity score (spec.md §4.7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseType {
    Task,
    Bug,
    Feature,
    #[serde(other)]
    Other,
}

impl Default for PhaseType {
    fn default() -> Self {
        Self::Task
    }
}

impl PhaseType {
    /// Weight used by the auto-routing complexity score, spec.md §4.7.
    pub fn type_weight(&self) -> f64 {
        match self {
            PhaseType::Task => 0.3,
            PhaseType::Bug => 0.4,
            PhaseType::Feature => 0.8,
            PhaseType::Other => 0.5,
        }
    }
}

/// Human-gate policy override for a single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    /// Accept automatically, no human involved.
    Trust,
    /// Present a checkpoint; default action is accept.
    Review,
    /// Block until a human explicitly accepts.
    Approve,
    /// Observe only; never blocks, but is always surfaced.
    Watch,
}

/// A phase: a self-contained unit of work parsed from a phase file.
///
/// `dependencies` is the `depends_on` list ("must complete first"); `blocks`
/// is the reverse declaration and is folded into `dependencies` of the named
/// phases at load time (spec.md §3: `blocks: [Y]` on `X` is equivalent to
/// adding `Y -> X`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub id: PhaseId,
    pub title: String,
    /// Lower runs earlier.
    pub priority: i32,
    #[serde(default)]
    pub phase_type: PhaseType,
    #[serde(default)]
    pub dependencies: Vec<PhaseId>,
    #[serde(default)]
    pub blocks: Vec<PhaseId>,
    /// Glob patterns describing the files this phase owns.
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub allow_scope_overlap: bool,
    #[serde(default)]
    pub gate: Option<GateMode>,
    #[serde(default)]
    pub max_review_cycles: Option<u32>,
    #[serde(default)]
    pub max_budget_usd: Option<f64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    /// The markdown body following the `+++` frontmatter delimiters.
    #[serde(default)]
    pub body: String,
    /// The file this phase was parsed from, relative to the nebula directory.
    pub source_file: String,
}

impl Phase {
    /// Body length in Unicode scalar values, used by the auto-routing
    /// complexity score (spec.md §4.7).
    pub fn body_runes(&self) -> usize {
        self.body.chars().count()
    }
}
