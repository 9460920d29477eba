use clap::Parser;
use colored::Colorize;

use ironpipe_cli::cli::{Cli, Commands};
use ironpipe_cli::commands;
use ironpipe_cli::error::CliError;
use ironpipe_cli::logging;
use ironpipe_cli::output::OutputWriter;
use ironpipe_core::config::{GeneralConfig, IronpipeConfig};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{} {e}", "error:".red().bold());
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut general = logging_config(&cli).await;
    if let Some(level) = cli.log_level.as_deref() {
        general.log_level = level.to_owned();
    }
    logging::init_tracing(&general)?;
    ironpipe_core::metrics::describe_all();

    tracing::debug!(config = %cli.config.display(), "ironpipe starting");

    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Rules(args) => commands::rules::execute(args, &cli.config, &writer).await,
        Commands::Simulate(args) => commands::simulate::execute(args, &cli.config, &writer).await,
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    }
}

/// `[general]` from the config file when it loads, defaults otherwise.
///
/// Commands that need the full configuration load it themselves and report
/// errors there.
async fn logging_config(cli: &Cli) -> GeneralConfig {
    match IronpipeConfig::load(&cli.config).await {
        Ok(config) => config.general,
        Err(_) => GeneralConfig {
            log_level: "warn".to_owned(),
            log_format: "pretty".to_owned(),
        },
    }
}
