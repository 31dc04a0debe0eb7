use anyhow::{Context, Result};
use envsync_core::Operation;
use envsync_reconcile::ChainScheduler;

use super::{Workspace, ensure_success};
use crate::cli::OutputFormat;
use crate::output::{print_pass_report, print_success};

pub async fn remove(ws: &Workspace, target: Option<&str>, format: OutputFormat) -> Result<()> {
    if let Some(id) = target {
        if ws.config.target(id).is_none() {
            anyhow::bail!("Unknown target: {id}");
        }
    }

    let mut chains = Vec::new();
    for cfg in ws.config.targets.iter().filter(|t| target.is_none_or(|id| t.id == id)) {
        let scheduler = ChainScheduler::new(
            cfg.target_id().map_err(anyhow::Error::msg)?,
            cfg.declared_configuration(),
        );
        let keys = cfg.variables.iter().map(|v| (v.key.as_str(), ""));
        let chain = scheduler
            .build_chain(keys, Operation::Remove)
            .with_context(|| format!("Failed to build removal chain for {}", cfg.id))?;
        chains.push(chain);
    }

    let report = ws.run(chains).await;
    ws.persist().await?;

    print_pass_report(&report, format)?;
    ensure_success(&report)?;
    if format == OutputFormat::Table {
        print_success(&format!("State saved to {}", ws.config.state_file.display()));
    }
    Ok(())
}
