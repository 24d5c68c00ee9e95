//! One repository's walk through its years

use super::summary::RepoOutcome;
use crate::analyzer::YearAnalyzer;
use crate::error::{PipelineError, PipelineResult};
use crate::github::RepositoryApi;
use crate::mirror::MirrorProvider;
use crate::models::{RepositoryIdentity, YearlyStats};
use crate::state::Fingerprints;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared, read-only inputs of every repository task
pub(crate) struct TaskContext<A, M, Y> {
    pub api: Arc<A>,
    pub mirrors: Arc<M>,
    pub analyzer: Arc<Y>,
    pub cancel: CancellationToken,
    pub snapshot: Arc<Fingerprints>,
    pub end_year: i32,
    pub mirror_root: PathBuf,
    pub git_host: String,
    pub login: String,
    pub credential: String,
}

/// Run a blocking API call off the runtime, racing it against cancellation
pub(crate) async fn blocking<T, F>(cancel: &CancellationToken, f: F) -> PipelineResult<T>
where
    F: FnOnce() -> PipelineResult<T> + Send + 'static,
    T: Send + 'static,
{
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    let handle = tokio::task::spawn_blocking(f);
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        joined = handle => joined.map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))?,
    }
}

impl<A, M, Y> TaskContext<A, M, Y>
where
    A: RepositoryApi,
    M: MirrorProvider,
    Y: YearAnalyzer,
{
    pub async fn process(self: Arc<Self>, repo: RepositoryIdentity) -> RepoOutcome {
        let qualified = repo.qualified_name();

        let creation_year = {
            let api = Arc::clone(&self.api);
            let (org, name) = (repo.org.clone(), repo.name.clone());
            match blocking(&self.cancel, move || api.resolve_creation_year(&org, &name)).await {
                Ok(y) => y,
                Err(e) => {
                    log_task_failure(&qualified, "resolving creation year", &e);
                    return RepoOutcome::failed(repo, e);
                }
            }
        };

        let local_path = repo.mirror_path(&self.mirror_root);
        let remote = repo.remote_url(&self.git_host, &self.login, &self.credential);
        if let Err(e) = self
            .mirrors
            .ensure_mirror(&remote, &local_path, &self.cancel)
            .await
        {
            log_task_failure(&qualified, "updating mirror", &e);
            return RepoOutcome::failed(repo, e);
        }

        let mut outcome = RepoOutcome::new(repo);
        for year in creation_year..=self.end_year {
            if self.cancel.is_cancelled() {
                outcome.error = Some(PipelineError::Cancelled);
                break;
            }

            let sha = {
                let api = Arc::clone(&self.api);
                let (org, name) = (outcome.repo.org.clone(), outcome.repo.name.clone());
                blocking(&self.cancel, move || {
                    api.resolve_latest_commit_sha(&org, &name, year)
                })
                .await
            };
            let sha = match sha {
                Ok(Some(sha)) => sha,
                Ok(None) => {
                    debug!("{} has no commits before the end of {}", qualified, year);
                    outcome.skipped_years += 1;
                    continue;
                }
                Err(e) if e.is_run_fatal() || matches!(e, PipelineError::Cancelled) => {
                    outcome.error = Some(e);
                    break;
                }
                Err(e) => {
                    warn!("{} {}: could not resolve latest commit: {}", qualified, year, e);
                    outcome.failed_years += 1;
                    continue;
                }
            };

            if self.snapshot.matches(&qualified, year, &sha) {
                debug!("{} {} unchanged at {}, skipping", qualified, year, sha);
                outcome.skipped_years += 1;
                continue;
            }

            match self.analyze_year(&local_path, year, sha).await {
                Ok(stats) => {
                    info!(
                        "{} {}: {} commits, {} contributors, {} lines",
                        qualified,
                        year,
                        stats.commits_count,
                        stats.contributors.len(),
                        stats.lines_of_code
                    );
                    outcome.malformed_commits += stats.malformed_commits_skipped;
                    outcome.years.push((year, stats));
                }
                Err(PipelineError::Cancelled) => {
                    outcome.error = Some(PipelineError::Cancelled);
                    break;
                }
                Err(e) => {
                    warn!("{} {}: {}", qualified, year, e);
                    outcome.failed_years += 1;
                }
            }
        }

        outcome
    }

    /// Collect one year's stats. Counts and size are required; commit details
    /// are best effort.
    async fn analyze_year(
        &self,
        path: &Path,
        year: i32,
        latest_commit_sha: String,
    ) -> PipelineResult<YearlyStats> {
        let cancel = &self.cancel;
        let required = |what: &str, e: PipelineError| match e {
            PipelineError::Cancelled => PipelineError::Cancelled,
            e => PipelineError::PartialData(format!("{} unavailable, year not recorded ({})", what, e)),
        };

        let commits_count = self
            .analyzer
            .count_commits(path, year, cancel)
            .await
            .map_err(|e| required("commit count", e))?;
        let contributors = self
            .analyzer
            .count_by_contributor(path, year, cancel)
            .await
            .map_err(|e| required("contributors", e))?;
        let lines_of_code = self
            .analyzer
            .count_lines(path, cancel)
            .await
            .map_err(|e| required("line count", e))?;

        let (commits, commits_detail_available, malformed) =
            match self.analyzer.list_commit_details(path, year, cancel).await {
                Ok(batch) => (batch.commits, true, batch.malformed),
                Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
                Err(e) => {
                    warn!(
                        "{} {}: commit details unavailable, recording counts only ({})",
                        path.display(),
                        year,
                        e
                    );
                    (Vec::new(), false, 0)
                }
            };

        let stats = YearlyStats {
            latest_commit_sha,
            lines_of_code,
            commits_count,
            contributors,
            commits,
            commits_detail_available,
            malformed_commits_skipped: malformed,
        };
        if !stats.is_consistent() {
            warn!(
                "{} {}: counts disagree ({} commits, {} by contributor, {} detailed)",
                path.display(),
                year,
                stats.commits_count,
                stats.contributor_total(),
                stats.commits.len()
            );
        }
        Ok(stats)
    }
}

fn log_task_failure(repo: &str, stage: &str, e: &PipelineError) {
    match e {
        PipelineError::Cancelled => debug!("{} cancelled while {}", repo, stage),
        _ => warn!("{} failed while {}: {}", repo, stage, e),
    }
}
