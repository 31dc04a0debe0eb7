use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "envsync")]
#[command(about = "envsync - reconcile environment variables into remote configurations")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the configuration file (defaults to ./envsync.toml)
    #[arg(short, long, global = true, env = "ENVSYNC_CONFIG")]
    pub config: Option<String>,

    /// State file backing the remote configurations (overrides config)
    #[arg(long, global = true)]
    pub state_file: Option<PathBuf>,

    /// Re-apply units even when the ledger shows them current
    #[arg(long, global = true)]
    pub force: bool,

    /// Log level (overrides config; RUST_LOG wins over both)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

impl Cli {
    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(path) = &self.state_file {
            config.state_file = path.clone();
        }
        if self.force {
            config.reconcile.force = true;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply every configured variable and remove keys no longer declared
    Reconcile,
    /// Remove configured variables from their targets
    Remove(RemoveArgs),
    /// Show a target's live variables
    Show(TargetArgs),
    /// Print a target's staleness token
    Token(TargetArgs),
    /// Show the chains a reconcile would run, without running them
    Plan,
    /// Print the effective configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    /// Only remove variables of this target
    #[arg(short, long)]
    pub target: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct TargetArgs {
    /// Target id
    pub target: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "envsync",
            "reconcile",
            "--force",
            "--state-file",
            "/tmp/state.json",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert!(matches!(cli.command, Commands::Reconcile));
        let mut config = AppConfig::default();
        cli.apply_overrides(&mut config);
        assert!(config.reconcile.force);
        assert_eq!(config.state_file, PathBuf::from("/tmp/state.json"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_remove_accepts_target_filter() {
        let cli = Cli::try_parse_from(["envsync", "remove", "--target", "orders-fn"]).unwrap();
        match cli.command {
            Commands::Remove(args) => assert_eq!(args.target.as_deref(), Some("orders-fn")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_show_requires_target() {
        assert!(Cli::try_parse_from(["envsync", "show"]).is_err());
        let cli = Cli::try_parse_from(["envsync", "--format", "json", "show", "F"]).unwrap();
        assert_eq!(cli.format, Some(OutputFormat::Json));
    }

    #[test]
    fn test_without_overrides_config_is_untouched() {
        let cli = Cli::try_parse_from(["envsync", "plan"]).unwrap();
        let mut config = AppConfig::default();
        cli.apply_overrides(&mut config);
        assert!(!config.reconcile.force);
        assert_eq!(config.logging.level, "info");
    }
}
