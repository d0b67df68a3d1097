//! Phase status table rendering, grounded in the teacher's
//! `cli::output::table::TableFormatter` (comfy-table, color-coded cells).

use std::collections::HashMap;

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};

use crate::model::{Phase, PhaseId, PhaseStatus};

fn status_color(status: PhaseStatus) -> Color {
    match status {
        PhaseStatus::Pending | PhaseStatus::Created => Color::Grey,
        PhaseStatus::InProgress => Color::Yellow,
        PhaseStatus::Done => Color::Green,
        PhaseStatus::Failed => Color::Red,
        PhaseStatus::Skipped => Color::DarkGrey,
    }
}

fn status_label(status: PhaseStatus) -> &'static str {
    match status {
        PhaseStatus::Pending => "pending",
        PhaseStatus::Created => "created",
        PhaseStatus::InProgress => "in_progress",
        PhaseStatus::Done => "done",
        PhaseStatus::Failed => "failed",
        PhaseStatus::Skipped => "skipped",
    }
}

/// Renders one row per phase, ordered as given. `statuses` defaults
/// missing entries to `Pending`.
pub fn render_phase_table(phases: &[Phase], statuses: &HashMap<PhaseId, PhaseStatus>, use_colors: bool) -> String {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED).set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Status").add_attribute(Attribute::Bold),
        Cell::new("Model").add_attribute(Attribute::Bold),
        Cell::new("Depends On").add_attribute(Attribute::Bold),
    ]);

    for phase in phases {
        let status = statuses.get(&phase.id).copied().unwrap_or(PhaseStatus::Pending);
        let status_cell = if use_colors {
            Cell::new(status_label(status)).fg(status_color(status))
        } else {
            Cell::new(status_label(status))
        };
        let depends_on = phase.dependencies.iter().map(PhaseId::to_string).collect::<Vec<_>>().join(", ");
        table.add_row(vec![
            Cell::new(&phase.id),
            Cell::new(&phase.title),
            status_cell,
            Cell::new(phase.model.as_deref().unwrap_or("-")),
            Cell::new(if depends_on.is_empty() { "-".to_string() } else { depends_on }),
        ]);
    }

    table.to_string()
}
