//! CLI command definitions and dispatch.

mod plan;
mod run;
mod version;

use clap::{Parser, Subcommand};

use crate::logging::LogFormat;

/// A3S Reaper: container registry retention.
#[derive(Parser)]
#[command(name = "a3s-reaper", version, about)]
pub struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Apply the retention policy to every configured repository
    Run(run::RunArgs),
    /// Show the retention decision for every image without deleting anything
    Plan(plan::PlanArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Run(args) => run::execute(args).await,
        Command::Plan(args) => plan::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "a3s-reaper",
            "run",
            "--config",
            "reaper.yaml",
            "--dry-run",
            "--event",
            "{\"id\":1}",
        ]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.config.unwrap().to_str(), Some("reaper.yaml"));
                assert!(args.dry_run);
                assert_eq!(args.event.as_deref(), Some("{\"id\":1}"));
            }
            _ => panic!("expected run"),
        }
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn test_parse_plan_with_json_logs() {
        let cli = Cli::parse_from(["a3s-reaper", "plan", "--eligible-only", "--log-format", "json"]);
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Command::Plan(args) => assert!(args.eligible_only),
            _ => panic!("expected plan"),
        }
    }

    #[test]
    fn test_run_defaults_to_live_mode() {
        let cli = Cli::parse_from(["a3s-reaper", "run"]);
        match cli.command {
            Command::Run(args) => {
                assert!(!args.dry_run);
                assert!(args.config.is_none());
                assert!(args.event.is_none());
            }
            _ => panic!("expected run"),
        }
    }
}
