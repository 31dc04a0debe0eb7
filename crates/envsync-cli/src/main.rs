use anyhow::{Context, Result};
use clap::Parser;

use envsync_cli::cli::{Cli, Commands};
use envsync_cli::commands::{self, Workspace};
use envsync_cli::config::loader::load_config;
use envsync_cli::logging;
use envsync_cli::output::{print_error, print_warning};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.as_deref().unwrap_or("info"));

    let mut config = load_config(cli.config.as_deref())
        .map_err(anyhow::Error::msg)
        .context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);
    logging::apply_logging_level(&config.logging.level);

    let format = cli.format.unwrap_or_default();

    match &cli.command {
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
            print!("{rendered}");
        }
        Commands::Token(args) => {
            commands::token::token(&config, &args.target, format)?;
        }
        Commands::Reconcile => {
            if config.targets.is_empty() {
                print_warning("No targets configured");
            }
            let ws = Workspace::open(config).await?;
            commands::reconcile::reconcile(&ws, format).await?;
        }
        Commands::Remove(args) => {
            let ws = Workspace::open(config).await?;
            commands::remove::remove(&ws, args.target.as_deref(), format).await?;
        }
        Commands::Show(args) => {
            let ws = Workspace::open(config).await?;
            commands::show::show(&ws, &args.target, format)?;
        }
        Commands::Plan => {
            let ws = Workspace::open(config).await?;
            commands::plan::plan(&ws, format)?;
        }
    }

    Ok(())
}
