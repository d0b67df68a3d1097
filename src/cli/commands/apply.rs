//! `nebula apply` / `nebula resume`: wires the fabric, executor, and
//! worker group together and drives a run to completion, persisting the
//! journal and metrics file as it goes.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::info;

use crate::beads::NullBeadsClient;
use crate::cli::loader::load_nebula_dir;
use crate::cli::output::{output, CommandOutput};
use crate::config::ConfigLoader;
use crate::error::{exit_code, NebulaError};
use crate::executor::PhaseExecutor;
use crate::fabric::sqlite_store::SqliteFabric;
use crate::fabric::Fabric;
use crate::gate::{AutoGater, Gater, InteractiveGater};
use crate::git::ShellGitCommitter;
use crate::hot_reload::HotReloader;
use crate::journal::Journal;
use crate::metrics::MetricsTracker;
use crate::runner::ShellPhaseRunner;
use crate::worker_group::WorkerGroup;

#[derive(Debug, Serialize)]
struct ApplyReport {
    nebula_name: String,
    exit_code: i32,
    total_cost_usd: f64,
    message: String,
}

impl CommandOutput for ApplyReport {
    fn to_human(&self) -> String {
        format!("{}: {} (spend: ${:.2}, exit {})\n", self.nebula_name, self.message, self.total_cost_usd, self.exit_code)
    }

    fn to_json(&self) -> serde_json::Value {
        json!(self)
    }
}

/// Shared by `apply` and `resume`; both load the nebula directory fresh
/// and rely on the journal already on disk to pick phases back up where
/// `PhaseTracker`'s scan of fabric state left off (spec.md §4.8 "Resume").
pub async fn execute(nebula_dir: &Path, max_workers_override: Option<usize>, auto: bool, json_mode: bool) -> Result<()> {
    let loaded = load_nebula_dir(nebula_dir)?;
    let config = ConfigLoader::new().with_nebula_dir(nebula_dir).with_env().load()?;
    let max_workers = max_workers_override.or(loaded.manifest.max_workers).unwrap_or(config.execution.max_workers);

    let db_path = nebula_dir.join(&config.fabric.database_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let fabric: Arc<dyn Fabric> = Arc::new(SqliteFabric::open(&format!("sqlite://{}", db_path.display())).await?);

    let gater: Arc<dyn Gater> = if auto { Arc::new(AutoGater) } else { Arc::new(InteractiveGater) };
    let executor = Arc::new(PhaseExecutor {
        runner: Arc::new(ShellPhaseRunner::default()),
        git: Arc::new(ShellGitCommitter),
        gater,
        fabric: Arc::clone(&fabric),
        beads: Arc::new(NullBeadsClient),
        repo_root: nebula_dir.display().to_string(),
        nebula_name: loaded.manifest.name.clone(),
    });

    let journal_path = nebula_dir.join("nebula.state.toml");
    let journal = Journal::load(&journal_path)?.unwrap_or_else(|| Journal::new(loaded.manifest.name.clone()));
    let journal = Arc::new(Mutex::new(journal));

    let seed_ids: HashSet<_> = loaded.phases.iter().map(|p| p.id.clone()).collect();
    let mut hot_reloader = HotReloader::new(nebula_dir, loaded.dag.clone(), seed_ids)?;

    let metrics_path = nebula_dir.join("nebula.metrics.toml");
    let metrics = MetricsTracker::load(&metrics_path)?;
    let metrics = Arc::new(Mutex::new(metrics));
    let execution_defaults = loaded.manifest.execution.clone();
    let project_context = loaded.manifest.project_context();
    let nebula_name = loaded.manifest.name.clone();

    let mut group = WorkerGroup::new(
        loaded.dag,
        loaded.phases,
        Arc::clone(&fabric),
        Arc::clone(&executor),
        nebula_dir,
        max_workers,
        execution_defaults,
        project_context,
    )
    .with_journal(Arc::clone(&journal), journal_path.clone())
    .with_metrics(Arc::clone(&metrics), metrics_path.clone());

    let run_result = group.run(&mut hot_reloader).await;
    drop(group);

    let mut journal = Arc::try_unwrap(journal).expect("no outstanding journal handles after the run completes").into_inner();
    let mut metrics = Arc::try_unwrap(metrics).expect("no outstanding metrics handles after the run completes").into_inner();

    journal.total_cost_usd = metrics.total_cost_usd();
    journal.save(&journal_path)?;
    metrics.rotate();
    metrics.save(&metrics_path)?;

    let (final_exit_code, message) = match &run_result {
        Ok(()) => (0, "run complete".to_string()),
        Err(e) => (exit_code_for(e), e.to_string()),
    };

    let report = ApplyReport { nebula_name, exit_code: final_exit_code, total_cost_usd: journal.total_cost_usd, message };
    output(&report, json_mode);
    info!(exit_code = final_exit_code, "apply finished");

    if final_exit_code != 0 {
        std::process::exit(final_exit_code);
    }
    Ok(())
}

/// `exit_code` takes a `&NebulaResult<()>`, but `run_result`'s error is
/// already borrowed out of a `match` on itself; reconstructing a
/// throwaway `Err` of the same discriminant avoids needing `Clone` on
/// [`NebulaError`].
fn exit_code_for(e: &NebulaError) -> i32 {
    match e {
        NebulaError::Structural(m) => exit_code(&Err(NebulaError::Structural(m.clone()))),
        NebulaError::GateTermination(k) => exit_code(&Err(NebulaError::GateTermination(k.clone()))),
        NebulaError::PhaseFailure(id, m) => exit_code(&Err(NebulaError::PhaseFailure(id.clone(), m.clone()))),
        NebulaError::Transient(m) => exit_code(&Err(NebulaError::Transient(m.clone()))),
        NebulaError::Fatal(m) => exit_code(&Err(NebulaError::Fatal(m.clone()))),
        NebulaError::Cancelled => exit_code(&Err(NebulaError::Cancelled)),
    }
}
