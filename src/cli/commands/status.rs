//! `nebula status`: reports phase states from the on-disk journal plus
//! accumulated run metrics, without touching the fabric or running
//! anything.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use crate::cli::loader::load_nebula_dir;
use crate::cli::output::table::render_phase_table;
use crate::cli::output::tree::render_forest;
use crate::cli::output::{output, CommandOutput};
use crate::journal::Journal;
use crate::metrics::MetricsTracker;
use crate::model::{PhaseId, PhaseStatus};

#[derive(Debug, Serialize)]
struct StatusReport {
    nebula_name: String,
    total_cost_usd: f64,
    statuses: HashMap<String, String>,
    #[serde(skip)]
    table: String,
    #[serde(skip)]
    tree: String,
}

impl CommandOutput for StatusReport {
    fn to_human(&self) -> String {
        format!("{}\n\n{}\n\nTotal spend: ${:.2}\n\n{}\n", self.nebula_name, self.table, self.total_cost_usd, self.tree)
    }

    fn to_json(&self) -> serde_json::Value {
        json!(self)
    }
}

pub fn execute(nebula_dir: &Path, json_mode: bool) -> Result<()> {
    let loaded = load_nebula_dir(nebula_dir)?;
    let journal = Journal::load(nebula_dir.join("nebula.state.toml"))?;
    let metrics = MetricsTracker::load(nebula_dir.join("nebula.metrics.toml"))?;

    let mut statuses: HashMap<PhaseId, PhaseStatus> = HashMap::new();
    if let Some(journal) = &journal {
        for phase in &loaded.phases {
            if let Some(state) = journal.get_phase(&phase.id) {
                statuses.insert(phase.id.clone(), state.status);
            }
        }
    }

    let titles: HashMap<PhaseId, String> = loaded.phases.iter().map(|p| (p.id.clone(), p.title.clone())).collect();
    let dependencies_of: HashMap<PhaseId, Vec<PhaseId>> = loaded.phases.iter().map(|p| (p.id.clone(), p.dependencies.clone())).collect();
    let roots: Vec<PhaseId> = loaded.phases.iter().filter(|p| loaded.dag.direct_dependents(&p.id).is_empty()).map(|p| p.id.clone()).collect();

    let table = render_phase_table(&loaded.phases, &statuses, console::colors_enabled());
    let tree = render_forest(&roots, &titles, &dependencies_of, &statuses);

    let report = StatusReport {
        nebula_name: loaded.manifest.name,
        total_cost_usd: metrics.total_cost_usd(),
        statuses: statuses.into_iter().map(|(id, s)| (id.to_string(), format!("{s:?}"))).collect(),
        table,
        tree,
    };
    output(&report, json_mode);
    Ok(())
}
