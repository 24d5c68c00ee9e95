//! Summaries of a state file
//!
//! Supports two output formats:
//! - `text` - Aligned terminal table
//! - `json` - Machine-readable JSON rows

mod json;
mod text;

use crate::classify::conventional_ratio;
use crate::models::OrganizationState;
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::str::FromStr;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" | "terminal" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(anyhow!("Unknown format '{}'. Valid formats: text, json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// One repository/year line of a report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearRow {
    pub repository: String,
    pub year: String,
    pub commits: u64,
    pub contributors: usize,
    pub top_contributor: Option<String>,
    pub top_contributor_commits: u64,
    pub lines_of_code: u64,
    /// `None` when commit details were not collected
    pub conventional_ratio: Option<f64>,
}

/// Flatten a state into rows, ordered by repository then year
pub fn rows(state: &OrganizationState) -> Vec<YearRow> {
    state
        .iter()
        .flat_map(|(repo, years)| {
            years.iter().map(move |(year, stats)| {
                let top = stats.top_contributor();
                YearRow {
                    repository: repo.clone(),
                    year: year.clone(),
                    commits: stats.commits_count,
                    contributors: stats.contributors.len(),
                    top_contributor: top.map(|(name, _)| name.to_string()),
                    top_contributor_commits: top.map_or(0, |(_, n)| n),
                    lines_of_code: stats.lines_of_code,
                    conventional_ratio: if stats.commits_detail_available {
                        conventional_ratio(&stats.commits)
                    } else {
                        None
                    },
                }
            })
        })
        .collect()
}

/// Render a state in the given format; `color` applies to text only
pub fn report_with_format(
    state: &OrganizationState,
    format: OutputFormat,
    color: bool,
) -> Result<String> {
    let rows = rows(state);
    match format {
        OutputFormat::Text => text::render(&rows, color),
        OutputFormat::Json => json::render(&rows),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{CommitDetail, YearlyStats};
    use indexmap::IndexMap;

    /// A small state with one repository over two years
    pub(crate) fn test_state() -> OrganizationState {
        let mut contributors = IndexMap::new();
        contributors.insert("alice".to_string(), 2);
        contributors.insert("bob".to_string(), 1);

        let commits = vec![
            CommitDetail {
                sha: "a".repeat(40),
                author: "alice".into(),
                message: "feat: one".into(),
            },
            CommitDetail {
                sha: "b".repeat(40),
                author: "bob".into(),
                message: "tweak".into(),
            },
            CommitDetail {
                sha: "c".repeat(40),
                author: "alice".into(),
                message: "fix(x): two".into(),
            },
        ];
        let with_details = YearlyStats {
            latest_commit_sha: "a".repeat(40),
            lines_of_code: 1200,
            commits_count: 3,
            contributors: contributors.clone(),
            commits,
            commits_detail_available: true,
            malformed_commits_skipped: 0,
        };
        let without_details = YearlyStats {
            commits: Vec::new(),
            commits_detail_available: false,
            ..with_details.clone()
        };

        let mut years = std::collections::BTreeMap::new();
        years.insert("2022".to_string(), without_details);
        years.insert("2023".to_string(), with_details);
        let mut state = OrganizationState::new();
        state.insert("acme/api".to_string(), years);
        state
    }

    #[test]
    fn test_rows() {
        let rows = rows(&test_state());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].year, "2022");
        assert_eq!(rows[0].conventional_ratio, None);
        assert_eq!(rows[1].contributors, 2);
        assert_eq!(rows[1].top_contributor.as_deref(), Some("alice"));
        assert_eq!(rows[1].top_contributor_commits, 2);
        let ratio = rows[1].conventional_ratio.unwrap();
        assert!((ratio - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("txt".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("html".parse::<OutputFormat>().is_err());
    }
}
