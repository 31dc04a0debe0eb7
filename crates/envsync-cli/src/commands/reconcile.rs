use anyhow::{Context, Result};
use envsync_reconcile::plan_pass;

use super::{Workspace, ensure_success};
use crate::cli::OutputFormat;
use crate::output::{print_pass_report, print_success};

pub async fn reconcile(ws: &Workspace, format: OutputFormat) -> Result<()> {
    let desired = ws.config.desired_targets().map_err(anyhow::Error::msg)?;
    let chains = plan_pass(&desired, &ws.ledger).context("Failed to plan reconciliation")?;

    let report = ws.run(chains).await;
    ws.persist().await?;

    print_pass_report(&report, format)?;
    ensure_success(&report)?;
    if format == OutputFormat::Table {
        print_success(&format!("State saved to {}", ws.config.state_file.display()));
    }
    Ok(())
}
