use colored::Colorize;
use envsync_core::EnvVars;
use envsync_reconcile::{ExecutionChain, PassReport, UnitState};
use serde_json::{Value, json};
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_vars(vars: &EnvVars, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(vars)?),
        OutputFormat::Table => {
            if vars.is_empty() {
                println!("No variables set.");
                return Ok(());
            }
            let mut builder = Builder::default();
            builder.push_record(["Key", "Value"]);
            for (key, value) in vars {
                builder.push_record([key.as_str(), value.as_str()]);
            }
            println!("{}", builder.build().with(Style::rounded()));
            Ok(())
        }
    }
}

pub fn print_plan(chains: &[ExecutionChain], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(chains)?),
        OutputFormat::Table => {
            if chains.iter().all(ExecutionChain::is_empty) {
                println!("Nothing to do.");
                return Ok(());
            }
            let mut builder = Builder::default();
            builder.push_record(["Target", "#", "Operation", "Key", "After", "Token"]);
            for chain in chains {
                let token = short_token(chain.staleness_token().as_str());
                for (index, unit) in chain.iter().enumerate() {
                    let position = (index + 1).to_string();
                    let operation = unit.operation().to_string();
                    let after = chain.predecessor(index).map_or("-", |p| p.key());
                    builder.push_record([
                        chain.target_id().as_str(),
                        position.as_str(),
                        operation.as_str(),
                        unit.key(),
                        after,
                        token,
                    ]);
                }
            }
            println!("{}", builder.build().with(Style::rounded()));
            Ok(())
        }
    }
}

pub fn print_pass_report(report: &PassReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(&pass_report_json(report)),
        OutputFormat::Table => {
            if report.chains.iter().all(|c| c.units.is_empty()) {
                println!("Nothing to do.");
            } else {
                let mut builder = Builder::default();
                builder.push_record(["Target", "Operation", "Key", "State", "Attempts", "Detail"]);
                for chain in &report.chains {
                    for unit in &chain.units {
                        let detail = unit.error.as_ref().map(ToString::to_string).unwrap_or_default();
                        builder.push_record([
                            chain.target_id.to_string(),
                            unit.operation.to_string(),
                            unit.key.clone(),
                            unit.state.to_string(),
                            unit.attempts.to_string(),
                            detail,
                        ]);
                    }
                }
                println!("{}", builder.build().with(Style::rounded()));
            }
            for error in &report.errors {
                print_error(&error.to_string());
            }
            println!(
                "{}: {} succeeded, {} skipped, {} failed",
                "Summary".cyan(),
                report.count(UnitState::Succeeded),
                report.count(UnitState::Skipped),
                report.count(UnitState::Failed)
            );
            Ok(())
        }
    }
}

fn pass_report_json(report: &PassReport) -> Value {
    let chains: Vec<Value> = report
        .chains
        .iter()
        .map(|chain| {
            let units: Vec<Value> = chain
                .units
                .iter()
                .map(|unit| {
                    json!({
                        "key": unit.key,
                        "operation": unit.operation,
                        "state": unit.state,
                        "attempts": unit.attempts,
                        "physicalId": unit.physical_id,
                        "error": unit.error.as_ref().map(ToString::to_string),
                    })
                })
                .collect();
            json!({ "target": chain.target_id, "units": units })
        })
        .collect();
    let errors: Vec<String> = report.errors.iter().map(ToString::to_string).collect();
    json!({ "chains": chains, "errors": errors })
}

fn short_token(token: &str) -> &str {
    token.get(..12).unwrap_or(token)
}
