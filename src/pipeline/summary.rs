//! Per-repository outcomes and the run summary

use crate::error::PipelineError;
use crate::models::{RepositoryIdentity, YearlyStats};
use serde::Serialize;
use std::fmt;

/// Everything one repository task produced
#[derive(Debug)]
pub struct RepoOutcome {
    pub repo: RepositoryIdentity,
    /// Analyzed years, in ascending order
    pub years: Vec<(i32, YearlyStats)>,
    pub skipped_years: usize,
    pub failed_years: usize,
    pub malformed_commits: usize,
    /// Set when the task stopped before finishing its year range
    pub error: Option<PipelineError>,
}

impl RepoOutcome {
    pub fn new(repo: RepositoryIdentity) -> Self {
        Self {
            repo,
            years: Vec::new(),
            skipped_years: 0,
            failed_years: 0,
            malformed_commits: 0,
            error: None,
        }
    }

    pub fn failed(repo: RepositoryIdentity, error: PipelineError) -> Self {
        let mut outcome = Self::new(repo);
        outcome.error = Some(error);
        outcome
    }
}

/// Counters logged at the end of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub discovered: usize,
    pub excluded: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Tasks stopped by cancellation
    pub interrupted: usize,
    pub years_analyzed: usize,
    pub years_skipped: usize,
    pub years_failed: usize,
    pub malformed_commits: usize,
}

impl RunSummary {
    pub(crate) fn record(&mut self, outcome: &RepoOutcome) {
        self.years_analyzed += outcome.years.len();
        self.years_skipped += outcome.skipped_years;
        self.years_failed += outcome.failed_years;
        self.malformed_commits += outcome.malformed_commits;
        match &outcome.error {
            None => self.succeeded += 1,
            Some(PipelineError::Cancelled) => self.interrupted += 1,
            Some(_) => self.failed += 1,
        }
    }

    /// Repositories the run attempted
    pub fn attempted(&self) -> usize {
        self.discovered.saturating_sub(self.excluded)
    }

    /// True when at least one repository was attempted and every one failed
    pub fn all_failed(&self) -> bool {
        self.failed > 0 && self.failed == self.attempted()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} discovered, {} excluded, {} succeeded, {} failed",
            self.discovered, self.excluded, self.succeeded, self.failed
        )?;
        if self.interrupted > 0 {
            write!(f, ", {} interrupted", self.interrupted)?;
        }
        write!(
            f,
            "; years: {} analyzed, {} skipped, {} failed",
            self.years_analyzed, self.years_skipped, self.years_failed
        )?;
        if self.malformed_commits > 0 {
            write!(f, "; {} malformed commits skipped", self.malformed_commits)?;
        }
        Ok(())
    }
}

/// Result of [`super::Orchestrator::run`]
#[derive(Debug, Default)]
pub struct RunReport {
    pub summary: RunSummary,
    /// A condition that makes the whole run unsuccessful
    pub fatal: Option<PipelineError>,
}

impl RunReport {
    /// Why the run should exit with failure, if it should
    pub fn failure_reason(&self) -> Option<String> {
        if let Some(e) = &self.fatal {
            return Some(e.to_string());
        }
        if self.summary.discovered == 0 {
            return Some("no repositories discovered".into());
        }
        if self.summary.all_failed() {
            return Some(format!(
                "all {} repositories failed",
                self.summary.attempted()
            ));
        }
        None
    }
}
