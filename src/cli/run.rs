//! Run command - collect statistics for an organization

use super::Cli;
use crate::analyzer::GitLogAnalyzer;
use crate::config::PipelineConfig;
use crate::github::{GitHubClient, RetryPolicy, UreqTransport};
use crate::mirror::{MirrorManager, TokenPool};
use crate::pipeline::{install_interrupt_handler, Orchestrator, RunOptions};
use crate::state::StateStore;
use anyhow::{Context, Result};
use chrono::Datelike;
use console::style;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Arguments of a run after validation
pub struct RunArgs {
    token: String,
    org: String,
    year: Option<i32>,
    output: Option<PathBuf>,
    exclude: Vec<String>,
    max_concurrency: Option<usize>,
    mirror_root: Option<PathBuf>,
    config: Option<PathBuf>,
}

impl RunArgs {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let token = cli.token.filter(|t| !t.trim().is_empty());
        let org = cli.org.filter(|o| !o.trim().is_empty());
        let (Some(token), Some(org)) = (token, org) else {
            anyhow::bail!(
                "Both --token (or GITHUB_TOKEN) and --org are required to collect statistics.\n\
                 Run `orgstats --help` for usage."
            );
        };
        Ok(Self {
            token,
            org,
            year: cli.year,
            output: cli.output,
            exclude: cli.exclude,
            max_concurrency: cli.max_concurrency,
            mirror_root: cli.mirror_root,
            config: cli.config,
        })
    }
}

/// Qualify bare repository names with `org` and drop blanks
fn exclusion_set(org: &str, raw: &[String]) -> HashSet<String> {
    raw.iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            if s.contains('/') {
                s.to_string()
            } else {
                format!("{}/{}", org, s)
            }
        })
        .collect()
}

/// How long blocking API calls abandoned by cancellation may delay exit
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Drop the runtime without waiting for blocking calls nobody awaits any more
fn release_runtime(runtime: Runtime) {
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
}

/// Run the collection command
pub fn run(args: RunArgs) -> Result<()> {
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    config.merge(PipelineConfig {
        max_concurrency: args.max_concurrency,
        mirror_root: args.mirror_root.clone(),
        output: args.output.clone(),
        ..Default::default()
    });

    let state_path = config.output();
    let mut store = StateStore::load(&state_path)
        .with_context(|| format!("Refusing to run against {}", state_path.display()))?;

    let end_year = args.year.unwrap_or_else(|| chrono::Utc::now().year());
    let options = RunOptions {
        org: args.org.clone(),
        end_year,
        exclude: exclusion_set(&args.org, &args.exclude),
        mirror_root: config.mirror_root(),
        git_host: config.git_host().to_string(),
        credential: args.token.clone(),
    };

    let client = GitHubClient::new(
        UreqTransport::new(Duration::from_secs(config.http_timeout_secs())),
        config.api_url(),
        args.token,
    )
    .with_page_size(config.page_size())
    .with_retry(RetryPolicy {
        retries: config.http_retries(),
        ..RetryPolicy::default()
    });

    let pool = TokenPool::new(config.max_concurrency());
    let mirrors = MirrorManager::new(pool.clone(), config.git_program())
        .with_timeout_secs(config.process_timeout_secs())
        .with_fallback(config.fallback_branch());
    let analyzer = GitLogAnalyzer::new(config.git_program(), config.line_counter_program())
        .with_timeout_secs(config.process_timeout_secs());

    info!(
        "Collecting {} through {} with up to {} concurrent mirror operations",
        options.org,
        end_year,
        pool.limit()
    );

    let cancel = CancellationToken::new();
    let orchestrator = Orchestrator::new(client, mirrors, analyzer)
        .with_cancel(cancel.clone())
        .with_progress(true);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;
    let report = runtime.block_on(async {
        install_interrupt_handler(cancel.clone(), pool.clone());
        orchestrator.run(&options, &mut store).await
    });

    // Exactly once, whatever happened above
    let flushed = store
        .flush(&state_path)
        .with_context(|| format!("Failed to write {}", state_path.display()));
    release_runtime(runtime);
    let written = flushed?;

    let summary = &report.summary;
    eprintln!(
        "\n{} {}",
        style("Summary:").bold(),
        style(summary.to_string()).dim()
    );
    if written {
        eprintln!("{} Wrote {}", style("✓").green(), style(state_path.display()).cyan());
    }
    if cancel.is_cancelled() && report.fatal.is_none() {
        eprintln!("{} Interrupted; completed years were kept", style("!").yellow());
    }

    if let Some(reason) = report.failure_reason() {
        anyhow::bail!("Run failed: {}", reason);
    }
    Ok(())
}
