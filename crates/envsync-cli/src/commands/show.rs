use anyhow::Result;
use envsync_core::TargetId;

use super::Workspace;
use crate::cli::OutputFormat;
use crate::output::print_vars;

pub fn show(ws: &Workspace, target: &str, format: OutputFormat) -> Result<()> {
    let id = TargetId::new(target)?;
    let Some(vars) = ws.remote.snapshot(&id) else {
        anyhow::bail!("Unknown target: {target}");
    };
    print_vars(&vars, format)
}
