//! CLI argument definitions.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_CONFIG_PATH;
use crate::sweep::Trigger;

/// Top-level CLI parser for `sweeper`.
#[derive(Debug, Parser)]
#[command(name = "sweeper", version, about = "Mark inactive issues and pull requests stale, then close them")]
pub struct Cli {
    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one sweep.
    Run(RunArgs),
    /// Load the config and print the effective policies.
    Check {
        /// Path to the sweep config file.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

/// Arguments for `sweeper run`.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the sweep config file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
    /// Plan mutations without issuing them.
    #[arg(long)]
    pub dry_run: bool,
    /// How this run was started.
    #[arg(long, value_enum, default_value_t = TriggerArg::Manual)]
    pub trigger: TriggerArg,
    /// Repository the run targets (`owner/name`); defaults to `GITHUB_REPOSITORY`.
    #[arg(long)]
    pub repository: Option<String>,
    /// Sweep an in-memory tracker seeded from this YAML item list.
    #[arg(long)]
    pub fixture: Option<PathBuf>,
    /// Instant to age fixture items against (RFC 3339).
    #[arg(long, requires = "fixture")]
    pub now: Option<DateTime<Utc>>,
}

/// Command-line spelling of [`Trigger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TriggerArg {
    /// The daily scheduled run.
    Schedule,
    /// An on-demand run.
    Manual,
}

impl From<TriggerArg> for Trigger {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::Schedule => Trigger::Schedule,
            TriggerArg::Manual => Trigger::Manual,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, TriggerArg};
    use crate::sweep::Trigger;
    use clap::Parser;

    #[test]
    fn parses_run_defaults() {
        let cli = Cli::parse_from(["sweeper", "run"]);
        let Command::Run(args) = cli.command else { panic!("expected run") };
        assert_eq!(args.config.to_str(), Some(".github/stale.yaml"));
        assert_eq!(Trigger::from(args.trigger), Trigger::Manual);
        assert!(!args.dry_run);
        assert!(args.fixture.is_none());
    }

    #[test]
    fn parses_scheduled_dry_run() {
        let cli = Cli::parse_from([
            "sweeper",
            "run",
            "--trigger",
            "schedule",
            "--dry-run",
            "--repository",
            "netbox-community/netbox",
        ]);
        let Command::Run(args) = cli.command else { panic!("expected run") };
        assert_eq!(args.trigger, TriggerArg::Schedule);
        assert_eq!(Trigger::from(args.trigger), Trigger::Schedule);
        assert!(args.dry_run);
        assert_eq!(args.repository.as_deref(), Some("netbox-community/netbox"));
    }

    #[test]
    fn now_requires_fixture() {
        assert!(Cli::try_parse_from(["sweeper", "run", "--now", "2024-01-01T00:00:00Z"]).is_err());
        let cli = Cli::parse_from([
            "sweeper",
            "run",
            "--fixture",
            "items.yaml",
            "--now",
            "2024-01-01T00:00:00Z",
        ]);
        let Command::Run(args) = cli.command else { panic!("expected run") };
        assert_eq!(args.now.unwrap().to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn parses_check_subcommand() {
        let cli = Cli::parse_from(["sweeper", "check", "--config", "stale.yaml"]);
        assert!(matches!(cli.command, Command::Check { .. }));
    }
}
