//! Local repository mirrors
//!
//! A mirror is a working copy under `<mirror_root>/<org>/<repo>`, created by a
//! clone and refreshed by fetch + checkout of the default branch. Mirror
//! operations across repositories are bounded by a shared [`TokenPool`].

mod manager;
mod pool;

pub use manager::{choose_branch, parse_branch_listing, BranchListing, FallbackBranch, MirrorManager};
pub use pool::{PoolToken, TokenPool, DEFAULT_MAX_CONCURRENCY};

use crate::error::PipelineResult;
use crate::models::RemoteUrl;
use std::future::Future;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Brings a local mirror in line with its remote
pub trait MirrorProvider: Send + Sync + 'static {
    /// Clone into `local_path`, or fetch and check out the default branch if a
    /// working copy is already there.
    fn ensure_mirror(
        &self,
        remote: &RemoteUrl,
        local_path: &Path,
        cancel: &CancellationToken,
    ) -> impl Future<Output = PipelineResult<()>> + Send;
}
