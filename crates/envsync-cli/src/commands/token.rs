use anyhow::Result;
use serde_json::json;

use crate::cli::OutputFormat;
use crate::config::AppConfig;
use crate::output::print_json;

pub fn token(config: &AppConfig, target: &str, format: OutputFormat) -> Result<()> {
    let Some(cfg) = config.target(target) else {
        anyhow::bail!("Target '{target}' is not configured");
    };
    let token = cfg.declared_configuration().staleness_token();
    match format {
        OutputFormat::Json => print_json(&json!({ "target": target, "token": token })),
        OutputFormat::Table => {
            println!("{token}");
            Ok(())
        }
    }
}
