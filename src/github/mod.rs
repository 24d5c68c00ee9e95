//! GitHub API access
//!
//! [`RepositoryApi`] is the seam the orchestrator depends on; the production
//! implementation is [`GitHubClient`] over [`UreqTransport`]. All calls are
//! blocking and are driven from `spawn_blocking` by the pipeline.

mod client;
mod transport;

pub use client::{year_cutoff, GitHubClient, RetryPolicy, DEFAULT_API_URL};
pub use transport::{HttpResponse, HttpTransport, UreqTransport};

use crate::error::PipelineResult;

/// Remote lookups needed by a run
pub trait RepositoryApi: Send + Sync + 'static {
    /// Login of the credential holder; validates the credential
    fn authenticated_user(&self) -> PipelineResult<String>;

    /// Every repository name of `org`, in listing order. Empty on failure.
    fn list_organization_repositories(&self, org: &str) -> PipelineResult<Vec<String>>;

    /// Calendar year (UTC) in which the repository was created
    fn resolve_creation_year(&self, org: &str, repo: &str) -> PipelineResult<i32>;

    /// Newest commit strictly before `year + 1`-01-01T00:00:00Z, if any
    fn resolve_latest_commit_sha(
        &self,
        org: &str,
        repo: &str,
        year: i32,
    ) -> PipelineResult<Option<String>>;
}
