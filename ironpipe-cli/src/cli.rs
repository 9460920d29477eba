//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O happen here.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Ironpipe -- rule-based message processing engine.
///
/// Use `ironpipe <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "ironpipe", version, about, long_about = None)]
pub struct Cli {
    /// Path to the ironpipe.toml configuration file.
    #[arg(short, long, default_value = "ironpipe.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Inspect and validate rule and pipeline sources.
    Rules(RulesArgs),

    /// Run a single message through the configured pipelines.
    Simulate(SimulateArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- rules ----

#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub action: RulesAction,
}

#[derive(Subcommand, Debug)]
pub enum RulesAction {
    /// List rules found in the rules directory with their parse status.
    List {
        /// Rules directory (default: `sources.rules_dir` from the config).
        #[arg(long)]
        rules_dir: Option<PathBuf>,
    },
    /// Parse every rule and pipeline file and report diagnostics.
    Validate {
        /// Rules directory (default: `sources.rules_dir` from the config).
        path: Option<PathBuf>,

        /// Pipelines directory (default: `sources.pipelines_dir` from the config).
        #[arg(long)]
        pipelines_dir: Option<PathBuf>,
    },
}

// ---- simulate ----

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Message fields as a JSON object, e.g. '{"message":"Failed password","source":"sshd"}'.
    #[arg(short, long)]
    pub message: String,

    /// Stream the message starts on (repeatable). Defaults to the default stream.
    #[arg(short, long = "stream")]
    pub streams: Vec<String>,

    /// Run these pipeline ids directly instead of following stream connections (repeatable).
    #[arg(short, long = "pipeline")]
    pub pipelines: Vec<String>,

    /// Print every interpreter event.
    #[arg(long)]
    pub trace: bool,
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, processor, sources).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_rules_validate_defaults() {
        let cli = Cli::try_parse_from(["ironpipe", "rules", "validate"]).expect("parse succeeded");
        match cli.command {
            Commands::Rules(RulesArgs {
                action:
                    RulesAction::Validate {
                        path,
                        pipelines_dir,
                    },
            }) => {
                assert!(path.is_none());
                assert!(pipelines_dir.is_none());
            }
            _ => panic!("expected Rules Validate"),
        }
    }

    #[test]
    fn test_cli_parse_rules_validate_custom_dirs() {
        let cli = Cli::try_parse_from([
            "ironpipe",
            "rules",
            "validate",
            "/tmp/rules",
            "--pipelines-dir",
            "/tmp/pipelines",
        ])
        .expect("parse succeeded");
        match cli.command {
            Commands::Rules(RulesArgs {
                action:
                    RulesAction::Validate {
                        path,
                        pipelines_dir,
                    },
            }) => {
                assert_eq!(path, Some(PathBuf::from("/tmp/rules")));
                assert_eq!(pipelines_dir, Some(PathBuf::from("/tmp/pipelines")));
            }
            _ => panic!("expected Rules Validate"),
        }
    }

    #[test]
    fn test_cli_parse_rules_list() {
        let cli = Cli::try_parse_from(["ironpipe", "rules", "list"]).expect("parse succeeded");
        assert!(matches!(
            cli.command,
            Commands::Rules(RulesArgs {
                action: RulesAction::List { rules_dir: None }
            })
        ));
    }

    #[test]
    fn test_cli_parse_simulate_repeated_flags() {
        let cli = Cli::try_parse_from([
            "ironpipe",
            "simulate",
            "--message",
            r#"{"message":"hi"}"#,
            "--stream",
            "s1",
            "--stream",
            "s2",
            "-p",
            "auth",
            "--trace",
        ])
        .expect("parse succeeded");
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.message, r#"{"message":"hi"}"#);
                assert_eq!(args.streams, vec!["s1", "s2"]);
                assert_eq!(args.pipelines, vec!["auth"]);
                assert!(args.trace);
            }
            _ => panic!("expected Simulate command"),
        }
    }

    #[test]
    fn test_cli_parse_simulate_requires_message() {
        assert!(Cli::try_parse_from(["ironpipe", "simulate"]).is_err());
    }

    #[test]
    fn test_cli_parse_config_show_section() {
        let cli = Cli::try_parse_from(["ironpipe", "config", "show", "--section", "processor"])
            .expect("parse succeeded");
        match cli.command {
            Commands::Config(ConfigArgs {
                action: ConfigAction::Show { section },
            }) => assert_eq!(section.as_deref(), Some("processor")),
            _ => panic!("expected Config Show"),
        }
    }

    #[test]
    fn test_cli_parse_global_flags() {
        let cli = Cli::try_parse_from([
            "ironpipe",
            "-c",
            "/custom/ironpipe.toml",
            "config",
            "validate",
            "--output",
            "json",
            "--log-level",
            "debug",
        ])
        .expect("parse succeeded");
        assert_eq!(cli.config, PathBuf::from("/custom/ironpipe.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.output, OutputFormat::Json));
    }

    #[test]
    fn test_cli_parse_invalid_command_fails() {
        assert!(Cli::try_parse_from(["ironpipe", "scan"]).is_err());
        assert!(Cli::try_parse_from(["ironpipe"]).is_err());
    }

    #[test]
    fn test_cli_verify_command_structure() {
        let cmd = Cli::command();
        assert_eq!(cmd.get_name(), "ironpipe");
        let subcommands: Vec<_> = cmd.get_subcommands().map(|s| s.get_name()).collect();
        assert_eq!(subcommands, vec!["rules", "simulate", "config"]);
    }
}
