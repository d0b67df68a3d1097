//! `nebula resume`: re-enters `apply`'s run loop. The journal and fabric
//! phase states already on disk are what make this a resume rather than
//! a fresh run — `apply::execute` loads both unconditionally.

use std::path::Path;

use anyhow::Result;

use super::apply;

pub async fn execute(nebula_dir: &Path, max_workers_override: Option<usize>, auto: bool, json_mode: bool) -> Result<()> {
    apply::execute(nebula_dir, max_workers_override, auto, json_mode).await
}
