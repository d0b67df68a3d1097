//! Dependency tree rendering, grounded in the teacher's
//! `cli::output::tree` (Unicode box-drawing, recursive descent).

use std::collections::HashMap;

use crate::model::{PhaseId, PhaseStatus};

const TREE_BRANCH: &str = "├── ";
const TREE_LAST: &str = "└── ";
const TREE_PIPE: &str = "│   ";
const TREE_SPACE: &str = "    ";

fn status_icon(status: PhaseStatus) -> &'static str {
    match status {
        PhaseStatus::Pending | PhaseStatus::Created => "○",
        PhaseStatus::InProgress => "◐",
        PhaseStatus::Done => "●",
        PhaseStatus::Failed => "✗",
        PhaseStatus::Skipped => "–",
    }
}

/// Renders the subtree rooted at `phase_id`, walking `dependencies_of` (a
/// phase's `depends_on` list) downward. Cycles cannot occur here since the
/// caller only reaches this from an already-validated `Dag`.
pub fn render_dependency_tree(
    phase_id: &PhaseId,
    titles: &HashMap<PhaseId, String>,
    dependencies_of: &HashMap<PhaseId, Vec<PhaseId>>,
    statuses: &HashMap<PhaseId, PhaseStatus>,
    depth: usize,
    is_last: bool,
    prefix: &str,
) -> String {
    let mut output = String::new();

    let connector = if depth == 0 {
        ""
    } else if is_last {
        TREE_LAST
    } else {
        TREE_BRANCH
    };

    let title = titles.get(phase_id).map(String::as_str).unwrap_or("[unknown phase]");
    let status = statuses.get(phase_id).copied().unwrap_or(PhaseStatus::Pending);

    output.push_str(&format!("{}{}{} {} [{}]\n", prefix, connector, status_icon(status), title, phase_id));

    let deps = dependencies_of.get(phase_id).map(Vec::as_slice).unwrap_or(&[]);
    if !deps.is_empty() {
        let child_prefix = if depth == 0 {
            String::new()
        } else if is_last {
            format!("{}{}", prefix, TREE_SPACE)
        } else {
            format!("{}{}", prefix, TREE_PIPE)
        };

        for (i, dep_id) in deps.iter().enumerate() {
            let is_last_child = i == deps.len() - 1;
            output.push_str(&render_dependency_tree(dep_id, titles, dependencies_of, statuses, depth + 1, is_last_child, &child_prefix));
        }
    }

    output
}

/// Renders one tree per root phase (a phase nothing else depends on,
/// conventionally the final phases in the DAG) followed by a blank line.
pub fn render_forest(
    roots: &[PhaseId],
    titles: &HashMap<PhaseId, String>,
    dependencies_of: &HashMap<PhaseId, Vec<PhaseId>>,
    statuses: &HashMap<PhaseId, PhaseStatus>,
) -> String {
    let mut output = String::new();
    for (i, root) in roots.iter().enumerate() {
        output.push_str(&render_dependency_tree(root, titles, dependencies_of, statuses, 0, true, ""));
        if i + 1 < roots.len() {
            output.push('\n');
        }
    }
    output
}
