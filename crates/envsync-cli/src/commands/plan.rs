use anyhow::{Context, Result};
use envsync_reconcile::plan_pass;

use super::Workspace;
use crate::cli::OutputFormat;
use crate::output::print_plan;

pub fn plan(ws: &Workspace, format: OutputFormat) -> Result<()> {
    let desired = ws.config.desired_targets().map_err(anyhow::Error::msg)?;
    let chains = plan_pass(&desired, &ws.ledger).context("Failed to plan reconciliation")?;
    print_plan(&chains, format)
}
