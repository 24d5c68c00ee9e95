//! Clone-or-update of local repository mirrors

use super::pool::TokenPool;
use super::MirrorProvider;
use crate::error::{PipelineError, PipelineResult};
use crate::models::RemoteUrl;
use crate::process::{self, run_tool, ToolOutput};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How to pick a branch when neither `main` nor `master` exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackBranch {
    /// First branch in `git branch -a` order
    #[default]
    ListingOrder,
    /// Branch whose tip has the newest committer date
    MostRecent,
}

impl FromStr for FallbackBranch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "listing-order" | "first" => Ok(FallbackBranch::ListingOrder),
            "most-recent" | "recent" => Ok(FallbackBranch::MostRecent),
            _ => Err(format!(
                "Unknown fallback branch policy '{}'. Valid: listing-order, most-recent",
                s
            )),
        }
    }
}

/// Branches of a working copy, local and `origin` remote-tracking merged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchListing {
    /// De-duplicated, in listing order
    pub branches: Vec<String>,
    /// Names that exist as `origin/<name>`
    pub remote: HashSet<String>,
}

/// Parse `git branch -a` output.
///
/// Strips the current-branch marker and the `remotes/origin/` prefix, and drops
/// `HEAD` pointers and detached-HEAD lines.
pub fn parse_branch_listing(output: &str) -> BranchListing {
    let mut listing = BranchListing::default();
    let mut seen = HashSet::new();

    for line in output.lines() {
        let mut name = line.trim();
        name = name
            .strip_prefix("* ")
            .or_else(|| name.strip_prefix("+ "))
            .unwrap_or(name)
            .trim();

        let is_remote = name.starts_with("remotes/");
        if let Some(rest) = name.strip_prefix("remotes/origin/") {
            name = rest;
        } else if is_remote {
            continue; // other remotes are never checked out
        }

        if name.is_empty() || name.starts_with("HEAD") || name.starts_with('(') {
            continue;
        }
        if is_remote {
            listing.remote.insert(name.to_string());
        }
        if seen.insert(name.to_string()) {
            listing.branches.push(name.to_string());
        }
    }

    listing
}

/// Pick the branch to check out: `main`, then `master`, then the first of
/// `fallback_order` that exists.
pub fn choose_branch(branches: &[String], fallback_order: &[String]) -> Option<String> {
    for preferred in ["main", "master"] {
        if branches.iter().any(|b| b == preferred) {
            return Some(preferred.to_string());
        }
    }
    fallback_order
        .iter()
        .find(|b| branches.contains(b))
        .cloned()
}

/// Maintains mirrors with the git executable; every operation holds a token
pub struct MirrorManager {
    pool: TokenPool,
    git_program: String,
    timeout_secs: u64,
    fallback: FallbackBranch,
}

impl MirrorManager {
    pub fn new(pool: TokenPool, git_program: impl Into<String>) -> Self {
        Self {
            pool,
            git_program: git_program.into(),
            timeout_secs: 0,
            fallback: FallbackBranch::default(),
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackBranch) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn pool(&self) -> &TokenPool {
        &self.pool
    }

    async fn git<I, S>(
        &self,
        args: I,
        cwd: Option<&Path>,
        remote: &RemoteUrl,
        cancel: &CancellationToken,
    ) -> PipelineResult<ToolOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inv = process::git(&self.git_program)
            .args(args)
            .timeout_secs(self.timeout_secs)
            .mask(remote.expose(), remote.to_string());
        if let Some(dir) = cwd {
            inv = inv.current_dir(dir);
        }
        run_tool(&inv, cancel).await
    }

    async fn list_branches(
        &self,
        local_path: &Path,
        remote: &RemoteUrl,
        cancel: &CancellationToken,
    ) -> PipelineResult<(BranchListing, Vec<String>)> {
        let out = self
            .git(["branch", "-a"], Some(local_path), remote, cancel)
            .await?;
        let listing = parse_branch_listing(&out.stdout);

        let order = match self.fallback {
            FallbackBranch::ListingOrder => listing.branches.clone(),
            FallbackBranch::MostRecent => {
                let out = self
                    .git(
                        [
                            "for-each-ref",
                            "--sort=-committerdate",
                            "--format=%(refname)",
                            "refs/heads",
                            "refs/remotes/origin",
                        ],
                        Some(local_path),
                        remote,
                        cancel,
                    )
                    .await?;
                let mut seen = HashSet::new();
                out.stdout
                    .lines()
                    .filter_map(|r| {
                        r.trim()
                            .strip_prefix("refs/heads/")
                            .or_else(|| r.trim().strip_prefix("refs/remotes/origin/"))
                    })
                    .filter(|name| *name != "HEAD")
                    .filter(|name| seen.insert(name.to_string()))
                    .map(str::to_string)
                    .collect()
            }
        };

        Ok((listing, order))
    }

    async fn update(
        &self,
        remote: &RemoteUrl,
        local_path: &Path,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        info!("Mirror {} exists, fetching", local_path.display());

        // Credentials may have rotated since the clone
        self.git(
            ["remote", "set-url", "origin", remote.expose()],
            Some(local_path),
            remote,
            cancel,
        )
        .await?;
        self.git(["fetch", "--prune", "origin"], Some(local_path), remote, cancel)
            .await?;

        let (listing, order) = self.list_branches(local_path, remote, cancel).await?;
        let branch = choose_branch(&listing.branches, &order).ok_or_else(|| {
            PipelineError::Command {
                program: self.git_program.clone(),
                code: None,
                stderr: format!("no branch to check out in {}", local_path.display()),
            }
        })?;

        if listing.remote.contains(&branch) {
            let upstream = format!("origin/{}", branch);
            self.git(
                ["checkout", "-f", "-B", branch.as_str(), upstream.as_str()],
                Some(local_path),
                remote,
                cancel,
            )
            .await?;
        } else {
            self.git(["checkout", branch.as_str()], Some(local_path), remote, cancel)
                .await?;
        }

        debug!("Checked out {} in {}", branch, local_path.display());
        Ok(())
    }

    async fn clone_fresh(
        &self,
        remote: &RemoteUrl,
        local_path: &Path,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        info!("Cloning {} into {}", remote, local_path.display());
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let existed = local_path.exists();

        let target = local_path.to_string_lossy().to_string();
        let result = self
            .git(["clone", remote.expose(), target.as_str()], None, remote, cancel)
            .await;

        if result.is_err() && !existed && local_path.exists() {
            // A half-written clone would be mistaken for a mirror next run
            if let Err(e) = std::fs::remove_dir_all(local_path) {
                warn!("Failed to remove partial clone {}: {}", local_path.display(), e);
            }
        }
        result.map(|_| ())
    }
}

impl MirrorProvider for MirrorManager {
    async fn ensure_mirror(
        &self,
        remote: &RemoteUrl,
        local_path: &Path,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let _token = self.pool.acquire(cancel).await?;

        if local_path.join(".git").is_dir() {
            self.update(remote, local_path, cancel).await
        } else {
            self.clone_fresh(remote, local_path, cancel).await
        }
    }
}
