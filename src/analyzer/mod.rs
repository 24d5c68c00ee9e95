//! Year-scoped analysis of a local mirror
//!
//! All queries cover the calendar year `[Y-01-01, Y+1-01-01)` in UTC and read
//! the mirror's checked-out history. Failures are reported per call; the
//! orchestrator decides what a failed call means for that year.

mod git_log;
mod lines;

pub use git_log::{
    count_lines_of_output, parse_commit_records, tally_authors, year_bounds, GitLogAnalyzer,
};
pub use lines::sum_code_lines;

use crate::error::PipelineResult;
use crate::models::CommitBatch;
use indexmap::IndexMap;
use std::future::Future;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Local history and size queries used for one (repository, year)
pub trait YearAnalyzer: Send + Sync + 'static {
    fn count_commits(
        &self,
        path: &Path,
        year: i32,
        cancel: &CancellationToken,
    ) -> impl Future<Output = PipelineResult<u64>> + Send;

    fn count_by_contributor(
        &self,
        path: &Path,
        year: i32,
        cancel: &CancellationToken,
    ) -> impl Future<Output = PipelineResult<IndexMap<String, u64>>> + Send;

    /// Most recent first
    fn list_commit_details(
        &self,
        path: &Path,
        year: i32,
        cancel: &CancellationToken,
    ) -> impl Future<Output = PipelineResult<CommitBatch>> + Send;

    /// Total code lines of the working copy
    fn count_lines(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> impl Future<Output = PipelineResult<u64>> + Send;
}
