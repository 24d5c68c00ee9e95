//! Run orchestration
//!
//! A run validates the credential, discovers the organization's repositories
//! and fans out one task per repository on a [`JoinSet`]. Tasks only read a
//! snapshot of the stored fingerprints; their results are merged into the
//! [`StateStore`] here, in completion order, as each task settles. Flushing is
//! left to the caller so it happens once, after the run returns.

mod summary;
mod task;

pub use summary::{RepoOutcome, RunReport, RunSummary};

use crate::analyzer::YearAnalyzer;
use crate::error::PipelineError;
use crate::github::RepositoryApi;
use crate::mirror::{MirrorProvider, TokenPool};
use crate::models::RepositoryIdentity;
use crate::state::StateStore;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use task::{blocking, TaskContext};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-run parameters
#[derive(Clone)]
pub struct RunOptions {
    pub org: String,
    /// Last calendar year analyzed, inclusive
    pub end_year: i32,
    /// Qualified `org/repo` names never touched
    pub exclude: HashSet<String>,
    pub mirror_root: PathBuf,
    pub git_host: String,
    /// Used as the password of clone URLs
    pub credential: String,
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("org", &self.org)
            .field("end_year", &self.end_year)
            .field("exclude", &self.exclude)
            .field("mirror_root", &self.mirror_root)
            .field("git_host", &self.git_host)
            .field("credential", &"***")
            .finish()
    }
}

/// Drives one collection run over the API, mirror and analyzer seams
pub struct Orchestrator<A, M, Y> {
    api: Arc<A>,
    mirrors: Arc<M>,
    analyzer: Arc<Y>,
    cancel: CancellationToken,
    show_progress: bool,
}

impl<A, M, Y> Orchestrator<A, M, Y>
where
    A: RepositoryApi,
    M: MirrorProvider,
    Y: YearAnalyzer,
{
    pub fn new(api: A, mirrors: M, analyzer: Y) -> Self {
        Self {
            api: Arc::new(api),
            mirrors: Arc::new(mirrors),
            analyzer: Arc::new(analyzer),
            cancel: CancellationToken::new(),
            show_progress: false,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Run to completion or cancellation, merging results into `store`.
    pub async fn run(&self, options: &RunOptions, store: &mut StateStore) -> RunReport {
        let mut report = RunReport::default();

        let login = {
            let api = Arc::clone(&self.api);
            match blocking(&self.cancel, move || api.authenticated_user()).await {
                Ok(login) => login,
                Err(e) => {
                    error!("Credential check failed: {}", e);
                    report.fatal = Some(e);
                    return report;
                }
            }
        };
        info!("Authenticated as {}", login);

        let names = {
            let api = Arc::clone(&self.api);
            let org = options.org.clone();
            match blocking(&self.cancel, move || api.list_organization_repositories(&org)).await {
                Ok(names) => names,
                Err(e) => {
                    error!("Repository discovery failed: {}", e);
                    report.fatal = Some(e);
                    return report;
                }
            }
        };
        report.summary.discovered = names.len();
        if names.is_empty() {
            error!("No repositories discovered for {}", options.org);
            return report;
        }

        let (repos, excluded): (Vec<_>, Vec<_>) = names
            .into_iter()
            .map(|name| RepositoryIdentity::new(options.org.clone(), name))
            .partition(|repo| !options.exclude.contains(&repo.qualified_name()));
        for repo in &excluded {
            info!("Excluding {}", repo);
        }
        report.summary.excluded = excluded.len();
        info!(
            "Discovered {} repositories in {} ({} excluded), analyzing through {}",
            report.summary.discovered,
            options.org,
            report.summary.excluded,
            options.end_year
        );

        let ctx = Arc::new(TaskContext {
            api: Arc::clone(&self.api),
            mirrors: Arc::clone(&self.mirrors),
            analyzer: Arc::clone(&self.analyzer),
            cancel: self.cancel.clone(),
            snapshot: Arc::new(store.fingerprints()),
            end_year: options.end_year,
            mirror_root: options.mirror_root.clone(),
            git_host: options.git_host.clone(),
            login,
            credential: options.credential.clone(),
        });

        let progress = self.progress_bar(repos.len() as u64);
        let mut tasks = JoinSet::new();
        for repo in repos {
            tasks.spawn(Arc::clone(&ctx).process(repo));
        }

        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Repository task aborted: {}", e);
                    report.summary.failed += 1;
                    progress.inc(1);
                    continue;
                }
            };

            let qualified = outcome.repo.qualified_name();
            for (year, stats) in &outcome.years {
                store.merge(&qualified, *year, stats.clone());
            }
            report.summary.record(&outcome);
            progress.set_message(qualified.clone());
            progress.inc(1);

            match outcome.error {
                Some(e) if e.is_run_fatal() => {
                    error!("{}: {}; stopping run", qualified, e);
                    self.cancel.cancel();
                    report.fatal.get_or_insert(e);
                }
                Some(PipelineError::Cancelled) => {
                    debug!("{} interrupted after {} years", qualified, outcome.years.len())
                }
                Some(_) => {}
                None => debug!("{} done", qualified),
            }
        }
        progress.finish_and_clear();

        if self.cancel.is_cancelled() && report.fatal.is_none() {
            warn!("Run interrupted; keeping completed years");
        }
        info!("Run finished: {}", report.summary);
        report
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░  ");
        ProgressBar::new(len).with_style(style)
    }
}

/// Cancel `cancel` and close `pool` on Ctrl-C. Tasks stop at their next
/// suspension point.
pub fn install_interrupt_handler(cancel: CancellationToken, pool: TokenPool) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            signal = tokio::signal::ctrl_c() => {
                if signal.is_ok() {
                    warn!("Interrupt received, finishing up");
                    cancel.cancel();
                    pool.close();
                }
            }
        }
    });
}
