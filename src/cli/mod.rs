//! CLI command definitions and handlers

mod init;
mod migrate;
mod report;
mod run;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Parse and validate the concurrency limit (1-256)
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("max concurrency must be at least 1".to_string())
    } else if n > 256 {
        Err("max concurrency cannot exceed 256".to_string())
    } else {
        Ok(n)
    }
}

/// orgstats - per-year statistics for every repository of a GitHub organization
#[derive(Parser, Debug)]
#[command(name = "orgstats")]
#[command(
    version,
    about = "Incremental per-year commit, contributor and code-size statistics for a GitHub organization",
    long_about = "orgstats mirrors every repository of an organization locally and records, \
for each repository and calendar year, the commit count, commits per contributor, \
lines of code and per-commit details. Years whose latest commit is unchanged since \
the previous run are skipped.\n\n\
Run without a subcommand to collect:\n  \
orgstats --token $GITHUB_TOKEN --org my-org",
    after_help = "\
Examples:
  orgstats -o my-org                           Collect through the current year
  orgstats -o my-org -y 2023 -E my-org/huge    Stop at 2023, skip one repository
  orgstats report --format json                Summarize the state file as JSON
  orgstats migrate --input old_stats.json      Upgrade a legacy state file
  orgstats init                                Write an example orgstats.toml"
)]
pub struct Cli {
    /// API token (falls back to GITHUB_TOKEN)
    #[arg(long, short = 't', env = "GITHUB_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Organization to analyze
    #[arg(long, short = 'o', global = true)]
    pub org: Option<String>,

    /// Last year to analyze (default: current UTC year)
    #[arg(long, short = 'y', global = true)]
    pub year: Option<i32>,

    /// State file (default: repo_stats.json)
    #[arg(long = "output", short = 'O', global = true)]
    pub output: Option<PathBuf>,

    /// Repositories to skip, as org/repo; space- or comma-separated, repeatable.
    /// Values run until the next flag, so give a subcommand before -E
    #[arg(
        long,
        short = 'E',
        global = true,
        action = ArgAction::Append,
        num_args = 1..,
        value_delimiter = ','
    )]
    pub exclude: Vec<String>,

    /// Simultaneous clone/fetch operations (1-256, env MAX_CONCURRENCY)
    #[arg(long, global = true, value_parser = parse_concurrency)]
    pub max_concurrency: Option<usize>,

    /// Directory holding <org>/<repo> mirrors
    #[arg(long, global = true)]
    pub mirror_root: Option<PathBuf>,

    /// Config file (default: ./orgstats.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG overrides
    #[arg(long, global = true, default_value = "info", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Collect statistics (the default when no subcommand is given)
    Run,

    /// Summarize a state file per repository and year
    Report {
        /// State file to read (default: the configured output)
        #[arg(long, short = 'i')]
        input: Option<PathBuf>,

        /// Output format: text or json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Upgrade a state file written in a legacy layout
    Migrate {
        /// Legacy state file; `--output` chooses where the upgraded file goes
        /// (default: overwrite the input, keeping a .bak copy)
        #[arg(long, short = 'i')]
        input: PathBuf,
    },

    /// Write an example orgstats.toml in the current directory
    Init,
}

/// Run the CLI
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Init) => init::run(),
        Some(Commands::Report { ref input, ref format }) => {
            report::run(input.clone(), format, cli.config.as_deref(), cli.output.as_deref())
        }
        Some(Commands::Migrate { ref input }) => migrate::run(input, cli.output.as_deref()),
        Some(Commands::Run) | None => run::run(run::RunArgs::from_cli(cli)?),
    }
}
