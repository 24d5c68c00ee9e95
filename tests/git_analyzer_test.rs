//! Analyzer and mirror tests against real git repositories
//!
//! Commits are backdated with GIT_AUTHOR_DATE / GIT_COMMITTER_DATE so year
//! boundaries can be checked exactly.

use orgstats::analyzer::{GitLogAnalyzer, YearAnalyzer};
use orgstats::mirror::{FallbackBranch, MirrorManager, MirrorProvider, TokenPool};
use orgstats::models::RemoteUrl;
use orgstats::PipelineError;
use std::path::Path;
use std::process::Command;
use tokio_util::sync::CancellationToken;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "commit.gpgsign=false", "-c", "init.defaultBranch=main"])
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

fn current_branch(dir: &Path) -> String {
    let out = Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(out.status.success());
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn init_repo(dir: &Path, branch: &str) {
    git(dir, &["init", "-q"]);
    let head = format!("refs/heads/{}", branch);
    git(dir, &["symbolic-ref", "HEAD", &head]);
}

fn commit(dir: &Path, author: &str, date: &str, message: &str) {
    let file = dir.join(format!("{}.txt", author));
    let mut content = std::fs::read_to_string(&file).unwrap_or_default();
    content.push_str(message);
    content.push('\n');
    std::fs::write(&file, content).unwrap();

    git(dir, &["add", "-A"]);
    let email = format!("{}@example.com", author);
    let status = Command::new("git")
        .args(["-c", "commit.gpgsign=false", "commit", "-q", "-m", message])
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", author)
        .env("GIT_AUTHOR_EMAIL", &email)
        .env("GIT_COMMITTER_NAME", author)
        .env("GIT_COMMITTER_EMAIL", &email)
        .env("GIT_AUTHOR_DATE", date)
        .env("GIT_COMMITTER_DATE", date)
        .status()
        .unwrap();
    assert!(status.success());
}

/// 2021: 1 commit, 2022: 2 commits (one in the last second), 2023: 1 commit
fn setup_history(dir: &Path) {
    init_repo(dir, "main");
    commit(dir, "alice", "2021-06-01 12:00:00 +0000", "feat: first");
    commit(dir, "bob", "2022-03-15 08:30:00 +0000", "fix: second");
    commit(
        dir,
        "alice",
        "2022-12-31 23:59:59 +0000",
        "docs: third\n\nWith a body\nover two lines",
    );
    commit(dir, "carol", "2023-01-01 00:00:00 +0000", "chore: fourth");
}

fn analyzer() -> GitLogAnalyzer {
    GitLogAnalyzer::new("git", "cloc").with_timeout_secs(60)
}

#[tokio::test]
async fn test_year_boundaries_are_exact() {
    if !git_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    setup_history(tmp.path());
    let cancel = CancellationToken::new();
    let a = analyzer();

    assert_eq!(a.count_commits(tmp.path(), 2020, &cancel).await.unwrap(), 0);
    assert_eq!(a.count_commits(tmp.path(), 2021, &cancel).await.unwrap(), 1);
    assert_eq!(a.count_commits(tmp.path(), 2022, &cancel).await.unwrap(), 2);
    assert_eq!(a.count_commits(tmp.path(), 2023, &cancel).await.unwrap(), 1);
}

#[tokio::test]
async fn test_contributors_and_details() {
    if !git_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    setup_history(tmp.path());
    let cancel = CancellationToken::new();
    let a = analyzer();

    let contributors = a
        .count_by_contributor(tmp.path(), 2022, &cancel)
        .await
        .unwrap();
    let names: Vec<_> = contributors.keys().cloned().collect();
    assert_eq!(names, vec!["alice", "bob"], "newest author first");
    assert_eq!(contributors.values().sum::<u64>(), 2);

    let batch = a
        .list_commit_details(tmp.path(), 2022, &cancel)
        .await
        .unwrap();
    assert_eq!(batch.malformed, 0);
    assert_eq!(batch.commits.len(), 2);
    assert_eq!(batch.commits[0].author, "alice");
    assert_eq!(
        batch.commits[0].message,
        "docs: third\n\nWith a body\nover two lines"
    );
    assert_eq!(batch.commits[1].subject(), "fix: second");
    for c in &batch.commits {
        assert_eq!(c.sha.len(), 40);
        assert!(c.sha.bytes().all(|b| b.is_ascii_hexdigit()));
    }
}

#[tokio::test]
async fn test_missing_line_counter_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let a = GitLogAnalyzer::new("git", "orgstats-no-such-counter");
    let err = a
        .count_lines(tmp.path(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ToolMissing(_)));
}

#[tokio::test]
async fn test_not_a_repository_is_command_error() {
    if !git_available() {
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let err = analyzer()
        .count_commits(tmp.path(), 2022, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Command { .. }));
}

#[tokio::test]
async fn test_mirror_clone_then_update() {
    if !git_available() {
        return;
    }
    let upstream = tempfile::tempdir().unwrap();
    setup_history(upstream.path());
    let root = tempfile::tempdir().unwrap();
    let local = root.path().join("acme").join("api");

    let remote = RemoteUrl::plain(upstream.path().to_string_lossy());
    let manager = MirrorManager::new(TokenPool::new(2), "git").with_timeout_secs(60);
    let cancel = CancellationToken::new();

    manager.ensure_mirror(&remote, &local, &cancel).await.unwrap();
    assert!(local.join(".git").is_dir());
    assert_eq!(
        analyzer().count_commits(&local, 2023, &cancel).await.unwrap(),
        1
    );

    commit(upstream.path(), "dan", "2023-05-05 10:00:00 +0000", "feat: fifth");
    manager.ensure_mirror(&remote, &local, &cancel).await.unwrap();
    assert_eq!(
        analyzer().count_commits(&local, 2023, &cancel).await.unwrap(),
        2
    );
    assert_eq!(manager.pool().available(), 2, "tokens released");
}

#[tokio::test]
async fn test_mirror_falls_back_to_only_branch() {
    if !git_available() {
        return;
    }
    let upstream = tempfile::tempdir().unwrap();
    init_repo(upstream.path(), "trunk");
    commit(upstream.path(), "alice", "2022-02-02 02:02:02 +0000", "feat: x");

    let root = tempfile::tempdir().unwrap();
    let local = root.path().join("acme").join("lib");
    let remote = RemoteUrl::plain(upstream.path().to_string_lossy());
    let manager = MirrorManager::new(TokenPool::new(1), "git").with_timeout_secs(60);
    let cancel = CancellationToken::new();

    manager.ensure_mirror(&remote, &local, &cancel).await.unwrap();
    commit(upstream.path(), "bob", "2022-03-03 03:03:03 +0000", "fix: y");
    manager.ensure_mirror(&remote, &local, &cancel).await.unwrap();

    assert_eq!(
        analyzer().count_commits(&local, 2022, &cancel).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn test_most_recent_fallback_picks_newest_branch() {
    if !git_available() {
        return;
    }
    // alpha is checked out upstream, zeta has the newer tip
    let upstream = tempfile::tempdir().unwrap();
    init_repo(upstream.path(), "alpha");
    commit(upstream.path(), "alice", "2022-01-10 10:00:00 +0000", "feat: a");
    git(upstream.path(), &["checkout", "-q", "-b", "zeta"]);
    commit(upstream.path(), "bob", "2023-06-01 10:00:00 +0000", "feat: z");
    git(upstream.path(), &["checkout", "-q", "alpha"]);

    let remote = RemoteUrl::plain(upstream.path().to_string_lossy());
    let cancel = CancellationToken::new();

    let root = tempfile::tempdir().unwrap();
    let listing = root.path().join("acme").join("listing");
    let manager = MirrorManager::new(TokenPool::new(1), "git").with_timeout_secs(60);
    manager.ensure_mirror(&remote, &listing, &cancel).await.unwrap();
    manager.ensure_mirror(&remote, &listing, &cancel).await.unwrap();
    assert_eq!(current_branch(&listing), "alpha");

    let recent = root.path().join("acme").join("recent");
    let manager = MirrorManager::new(TokenPool::new(1), "git")
        .with_timeout_secs(60)
        .with_fallback(FallbackBranch::MostRecent);
    manager.ensure_mirror(&remote, &recent, &cancel).await.unwrap();
    assert_eq!(current_branch(&recent), "alpha", "clone follows upstream HEAD");
    manager.ensure_mirror(&remote, &recent, &cancel).await.unwrap();
    assert_eq!(current_branch(&recent), "zeta");
    assert_eq!(
        analyzer().count_commits(&recent, 2023, &cancel).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_failed_clone_leaves_nothing_behind() {
    if !git_available() {
        return;
    }
    let root = tempfile::tempdir().unwrap();
    let local = root.path().join("acme").join("ghost");
    let remote = RemoteUrl::plain(root.path().join("no-such-upstream").to_string_lossy());
    let manager = MirrorManager::new(TokenPool::new(1), "git").with_timeout_secs(60);

    let err = manager
        .ensure_mirror(&remote, &local, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Command { .. }));
    assert!(!local.exists());
}
