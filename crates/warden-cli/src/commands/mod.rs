use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::PathBuf;
use uuid::Uuid;

use warden_config::{ConfigLoader, WardenConfig};
use warden_core::Result;

mod decide;
mod inspect;
mod mode;
mod operation;
mod recovery;
mod render;

use operation::OperationArgs;

/// Warden: adaptive risk advice for commands run by agents and humans
#[derive(Parser)]
#[command(name = "warden", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to warden.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Session identity (default: $USER@<current directory>)
    #[arg(short, long, global = true, env = "WARDEN_IDENTITY")]
    identity: Option<String>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score an operation and record it in the session
    Evaluate(OperationArgs),
    /// Score an operation without recording anything
    Preview(OperationArgs),
    /// Report whether an operation was approved
    Report {
        /// The operation was rejected
        #[arg(long)]
        denied: bool,
        /// The operation turned out to be a mistake
        #[arg(long)]
        mistake: bool,
        #[command(flatten)]
        operation: OperationArgs,
    },
    /// Evaluate an operation, checkpoint it if risky, and say whether it may run
    Authorize {
        /// Allow a blocked operation, provided a checkpoint can be taken
        #[arg(long = "override")]
        override_block: bool,
        #[command(flatten)]
        operation: OperationArgs,
    },
    /// Undo an operation from its checkpoint
    Restore {
        /// Checkpoint id printed by `warden authorize`
        id: Uuid,
    },
    /// List stored checkpoints
    Checkpoints,
    /// Delete expired checkpoints
    Purge,
    /// Show or change the operating mode
    Mode {
        #[command(subcommand)]
        action: Option<ModeAction>,
    },
    /// List the loaded risk rules
    Rules {
        /// List sequence patterns instead
        #[arg(long)]
        sequences: bool,
    },
    /// Show current configuration
    Config,
    /// Check configuration, storage and probes
    Doctor,
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Show version and build info
    Version,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum ModeAction {
    /// Show the current mode
    Show,
    /// Relax confirmations for a while
    Flow {
        /// Minutes to stay in flow (default from config)
        #[arg(short, long)]
        minutes: Option<u32>,
    },
    /// Leave flow or paranoid mode
    Adaptive,
    /// Tighten every threshold
    Paranoid,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();
        self.init_tracing(&config);

        let identity = self.identity.clone().unwrap_or_else(default_identity);
        let json = self.json;

        match self.command {
            Commands::Evaluate(op) => decide::cmd_evaluate(config, &identity, op, json).await,
            Commands::Preview(op) => decide::cmd_preview(config, &identity, op, json).await,
            Commands::Report {
                denied,
                mistake,
                operation,
            } => decide::cmd_report(config, &identity, operation, !denied, mistake, json),
            Commands::Authorize {
                override_block,
                operation,
            } => decide::cmd_authorize(config, &identity, operation, override_block, json).await,
            Commands::Restore { id } => recovery::cmd_restore(config, id, json),
            Commands::Checkpoints => recovery::cmd_checkpoints(config, json),
            Commands::Purge => recovery::cmd_purge(config, json),
            Commands::Mode { action } => {
                mode::cmd_mode(config, &identity, action.unwrap_or(ModeAction::Show), json)
            }
            Commands::Rules { sequences } => inspect::cmd_rules(config, sequences, json),
            Commands::Config => inspect::cmd_config(config, json),
            Commands::Doctor => inspect::cmd_doctor(config, &config_loader).await,
            Commands::Completions { shell } => Self::cmd_completions(shell),
            Commands::Version => inspect::cmd_version(json),
        }
    }

    /// Log level: RUST_LOG > --verbose / --quiet / --log-level > config.
    fn init_tracing(&self, config: &WardenConfig) {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(config.logging.level.as_str())
        };
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

        // Logs go to stderr so `--json` output stays parseable.
        let installed = match config.logging.format.as_str() {
            "json" => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .json()
                .with_target(true)
                .try_init(),
            "compact" => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .compact()
                .with_target(false)
                .try_init(),
            _ => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init(),
        };
        // An embedding host may have installed its own subscriber already.
        if installed.is_err() {
            tracing::debug!("tracing subscriber already installed");
        }
    }

    fn cmd_completions(shell: Shell) -> Result<()> {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "warden", &mut std::io::stdout());
        Ok(())
    }
}

/// `$USER@<cwd>`, so each project directory gets its own trust history.
fn default_identity() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".into());
    let cwd = std::env::current_dir()
        .map(|d| d.display().to_string())
        .unwrap_or_else(|_| "?".into());
    format!("{user}@{cwd}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn evaluate_takes_the_rest_of_the_line() {
        let cli = parse(&["warden", "--json", "evaluate", "rm", "-rf", "build"]);
        assert!(cli.json);
        match cli.command {
            Commands::Evaluate(op) => {
                assert_eq!(op.into_operation().unwrap().raw_text, "rm -rf build");
            }
            _ => panic!("expected evaluate"),
        }
    }

    #[test]
    fn report_flags() {
        let cli = parse(&["warden", "report", "--denied", "--mistake", "git", "push"]);
        match cli.command {
            Commands::Report {
                denied, mistake, ..
            } => assert!(denied && mistake),
            _ => panic!("expected report"),
        }
    }

    #[test]
    fn authorize_override() {
        let cli = parse(&["warden", "authorize", "--override", "rm", "-rf", "dist"]);
        assert!(matches!(
            cli.command,
            Commands::Authorize {
                override_block: true,
                ..
            }
        ));
    }

    #[test]
    fn mode_subcommands() {
        let cli = parse(&["warden", "mode", "flow", "--minutes", "45"]);
        match cli.command {
            Commands::Mode { action } => {
                assert_eq!(action, Some(ModeAction::Flow { minutes: Some(45) }));
            }
            _ => panic!("expected mode"),
        }
        let cli = parse(&["warden", "mode"]);
        assert!(matches!(cli.command, Commands::Mode { action: None }));
    }

    #[test]
    fn restore_requires_uuid() {
        assert!(Cli::try_parse_from(["warden", "restore", "not-a-uuid"]).is_err());
        let id = Uuid::new_v4().to_string();
        assert!(Cli::try_parse_from(["warden", "restore", id.as_str()]).is_ok());
    }

    #[test]
    fn verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["warden", "-v", "-q", "version"]).is_err());
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn default_identity_includes_user_and_dir() {
        let id = default_identity();
        assert!(id.contains('@'));
    }
}
