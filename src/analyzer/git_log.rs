//! Year-scoped history queries over a local mirror using `git log`

use super::lines::sum_code_lines;
use super::YearAnalyzer;
use crate::error::PipelineResult;
use crate::models::{CommitBatch, CommitDetail};
use crate::process::{self, run_tool, ToolInvocation};
use indexmap::IndexMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Separates commit records in detail output
const RECORD_SEP: char = '\x1e';
/// Separates fields within a record
const FIELD_SEP: char = '\x1f';
/// `git log` format producing `RS sha US author US body`
const DETAIL_FORMAT: &str = "--pretty=format:%x1e%H%x1f%an%x1f%B";

/// `--since`/`--until` bounds covering exactly calendar year `year` (UTC).
///
/// `--until` is inclusive, so the upper bound is the last second of the year.
pub fn year_bounds(year: i32) -> (String, String) {
    (
        format!("--since={}-01-01 00:00:00 +0000", year),
        format!("--until={}-12-31 23:59:59 +0000", year),
    )
}

/// Number of non-empty lines (one per commit for `%H` output)
pub fn count_lines_of_output(output: &str) -> u64 {
    output.lines().filter(|l| !l.trim().is_empty()).count() as u64
}

/// Tally `%an` output; authors keep the position of their first appearance
pub fn tally_authors(output: &str) -> IndexMap<String, u64> {
    let mut tally = IndexMap::new();
    for author in output.lines().map(str::trim).filter(|a| !a.is_empty()) {
        *tally.entry(author.to_string()).or_insert(0) += 1;
    }
    tally
}

fn is_full_sha(s: &str) -> bool {
    s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Parse detail output into commits, counting records that do not have
/// exactly three fields or whose SHA is not 40 hex characters.
pub fn parse_commit_records(output: &str) -> CommitBatch {
    let mut batch = CommitBatch::default();

    for record in output.split(RECORD_SEP) {
        if record.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = record.split(FIELD_SEP).collect();
        if fields.len() != 3 || !is_full_sha(fields[0].trim()) {
            debug!("Malformed commit record skipped ({} fields)", fields.len());
            batch.malformed += 1;
            continue;
        }
        batch.commits.push(CommitDetail {
            sha: fields[0].trim().to_string(),
            author: fields[1].trim().to_string(),
            message: fields[2].trim().to_string(),
        });
    }

    batch
}

/// [`YearAnalyzer`] backed by the git and cloc executables
pub struct GitLogAnalyzer {
    git_program: String,
    line_counter_program: String,
    timeout_secs: u64,
}

impl GitLogAnalyzer {
    pub fn new(git_program: impl Into<String>, line_counter_program: impl Into<String>) -> Self {
        Self {
            git_program: git_program.into(),
            line_counter_program: line_counter_program.into(),
            timeout_secs: 0,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn log(&self, path: &Path, year: i32, format: &str) -> ToolInvocation {
        let (since, until) = year_bounds(year);
        process::git(&self.git_program)
            .current_dir(path)
            .args(["log", since.as_str(), until.as_str(), format])
            .timeout_secs(self.timeout_secs)
    }
}

impl YearAnalyzer for GitLogAnalyzer {
    async fn count_commits(
        &self,
        path: &Path,
        year: i32,
        cancel: &CancellationToken,
    ) -> PipelineResult<u64> {
        let out = run_tool(&self.log(path, year, "--pretty=format:%H"), cancel).await?;
        Ok(count_lines_of_output(&out.stdout))
    }

    async fn count_by_contributor(
        &self,
        path: &Path,
        year: i32,
        cancel: &CancellationToken,
    ) -> PipelineResult<IndexMap<String, u64>> {
        let out = run_tool(&self.log(path, year, "--pretty=format:%an"), cancel).await?;
        Ok(tally_authors(&out.stdout))
    }

    async fn list_commit_details(
        &self,
        path: &Path,
        year: i32,
        cancel: &CancellationToken,
    ) -> PipelineResult<CommitBatch> {
        let out = run_tool(&self.log(path, year, DETAIL_FORMAT), cancel).await?;
        Ok(parse_commit_records(&out.stdout))
    }

    async fn count_lines(&self, path: &Path, cancel: &CancellationToken) -> PipelineResult<u64> {
        let inv = ToolInvocation::new(self.line_counter_program.as_str())
            .arg(path.to_string_lossy())
            .args(["--json", "--quiet"])
            .timeout_secs(self.timeout_secs);
        let out = run_tool(&inv, cancel).await?;
        sum_code_lines(&out.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha(c: char) -> String {
        std::iter::repeat(c).take(40).collect()
    }

    #[test]
    fn test_year_bounds_cover_whole_year() {
        let (since, until) = year_bounds(2022);
        assert_eq!(since, "--since=2022-01-01 00:00:00 +0000");
        assert_eq!(until, "--until=2022-12-31 23:59:59 +0000");
    }

    #[test]
    fn test_count_ignores_blank_lines() {
        assert_eq!(count_lines_of_output(""), 0);
        assert_eq!(count_lines_of_output("a\nb\n\nc\n"), 3);
    }

    #[test]
    fn test_tally_preserves_first_appearance() {
        let tally = tally_authors("bob\nalice\nbob\n\ncarol\nalice\nbob\n");
        let order: Vec<_> = tally.keys().cloned().collect();
        assert_eq!(order, vec!["bob", "alice", "carol"]);
        assert_eq!(tally["bob"], 3);
        assert_eq!(tally["alice"], 2);
        assert_eq!(tally.values().sum::<u64>(), 6);
    }

    #[test]
    fn test_parse_commit_records() {
        let output = format!(
            "\x1e{}\x1fAlice\x1ffeat: add parser\n\nLonger body\nwith lines\n\n\x1e{}\x1fBob Smith\x1ffix(io): handle EOF\n",
            sha('a'),
            sha('b')
        );
        let batch = parse_commit_records(&output);
        assert_eq!(batch.malformed, 0);
        assert_eq!(batch.commits.len(), 2);
        assert_eq!(batch.commits[0].sha, sha('a'));
        assert_eq!(batch.commits[0].author, "Alice");
        assert_eq!(
            batch.commits[0].message,
            "feat: add parser\n\nLonger body\nwith lines"
        );
        assert_eq!(batch.commits[0].subject(), "feat: add parser");
        assert_eq!(batch.commits[1].author, "Bob Smith");
    }

    #[test]
    fn test_malformed_records_are_counted_not_fatal() {
        let output = format!(
            "\x1e{}\x1fAlice\x1fok\n\x1enot-a-sha\x1fBob\x1fbad sha\n\x1e{}\x1fCarol\n\x1e{}\x1fDan\x1fmsg with \x1f inside\n",
            sha('1'),
            sha('2'),
            sha('3')
        );
        let batch = parse_commit_records(&output);
        assert_eq!(batch.commits.len(), 1);
        assert_eq!(batch.malformed, 3);
    }

    #[test]
    fn test_empty_output_has_no_records() {
        assert_eq!(parse_commit_records(""), CommitBatch::default());
    }
}
