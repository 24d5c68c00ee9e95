//! Detection and upgrade of older state file layouts
//!
//! Two legacy shapes exist in the wild:
//!
//! - nested: `repo -> { "yearly_stats": { year -> {..., "all_commits_raw": [...]} }, ... }`
//! - flat: `repo -> { "latest_commit_sha": ..., ... }` with no year at all
//!
//! Nested entries are upgraded in place. Flat entries cannot be attributed to a
//! year and are dropped with a warning.

use super::store::StateStore;
use super::{is_year_key, StateError};
use crate::models::{OrganizationState, YearlyStats};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Overall layout of a parsed state file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    Canonical,
    Legacy { nested: usize, flat: usize },
    Unrecognized(String),
}

enum RepoShape {
    Canonical,
    Nested,
    Flat,
    Unknown,
}

fn classify_repo(value: &JsonValue) -> RepoShape {
    let Some(obj) = value.as_object() else {
        return RepoShape::Unknown;
    };
    if obj.contains_key("yearly_stats") {
        RepoShape::Nested
    } else if obj.contains_key("latest_commit_sha") {
        RepoShape::Flat
    } else if obj.iter().all(|(k, v)| is_year_key(k) && v.is_object()) {
        RepoShape::Canonical
    } else {
        RepoShape::Unknown
    }
}

/// Classify a parsed state file. Any legacy entry makes the file legacy.
pub fn detect_layout(value: &JsonValue) -> Layout {
    let Some(repos) = value.as_object() else {
        return Layout::Unrecognized("top level is not an object".into());
    };

    let (mut nested, mut flat) = (0, 0);
    for (repo, entry) in repos {
        match classify_repo(entry) {
            RepoShape::Canonical => {}
            RepoShape::Nested => nested += 1,
            RepoShape::Flat => flat += 1,
            RepoShape::Unknown => {
                return Layout::Unrecognized(format!("entry '{}' has an unknown shape", repo))
            }
        }
    }

    if nested + flat > 0 {
        Layout::Legacy { nested, flat }
    } else {
        Layout::Canonical
    }
}

/// What a migration kept and dropped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub repositories: usize,
    pub years: usize,
    pub upgraded_repositories: usize,
    /// Flat entries with no year, dropped
    pub dropped_flat: Vec<String>,
    /// Year entries that could not be read
    pub dropped_years: usize,
    /// Copy of the input written before overwriting it
    pub backup: Option<PathBuf>,
}

fn upgrade_year(mut entry: Map<String, JsonValue>) -> Result<YearlyStats, serde_json::Error> {
    if let Some(raw) = entry.remove("all_commits_raw") {
        entry.entry("commits").or_insert(raw);
    }
    serde_json::from_value(JsonValue::Object(entry))
}

/// Convert any recognized layout into the canonical one
pub fn migrate(value: &JsonValue) -> Result<(OrganizationState, MigrationReport), StateError> {
    let schema_error = |detail: String| StateError::Schema {
        path: "<input>".into(),
        detail,
    };
    let repos = value
        .as_object()
        .ok_or_else(|| schema_error("top level is not an object".into()))?;

    let mut state = OrganizationState::new();
    let mut report = MigrationReport::default();

    for (repo, entry) in repos {
        match classify_repo(entry) {
            RepoShape::Canonical => {
                let years: BTreeMap<String, YearlyStats> =
                    serde_json::from_value(entry.clone())
                        .map_err(|e| schema_error(format!("{}: {}", repo, e)))?;
                report.years += years.len();
                state.insert(repo.clone(), years);
            }
            RepoShape::Nested => {
                let mut years = BTreeMap::new();
                let yearly = entry
                    .get("yearly_stats")
                    .and_then(JsonValue::as_object)
                    .cloned()
                    .unwrap_or_default();
                for (year, stats) in yearly {
                    let parsed = match stats {
                        JsonValue::Object(obj) if is_year_key(&year) => upgrade_year(obj),
                        _ => {
                            warn!("Dropping unreadable year '{}' of {}", year, repo);
                            report.dropped_years += 1;
                            continue;
                        }
                    };
                    match parsed {
                        Ok(stats) => {
                            years.insert(year, stats);
                        }
                        Err(e) => {
                            warn!("Dropping year {} of {}: {}", year, repo, e);
                            report.dropped_years += 1;
                        }
                    }
                }
                report.years += years.len();
                report.upgraded_repositories += 1;
                state.insert(repo.clone(), years);
            }
            RepoShape::Flat => {
                warn!("Dropping {}: entry has no year", repo);
                report.dropped_flat.push(repo.clone());
            }
            RepoShape::Unknown => {
                return Err(schema_error(format!("entry '{}' has an unknown shape", repo)));
            }
        }
    }

    report.repositories = state.len();
    Ok((state, report))
}

/// Migrate `input` and write the canonical file to `output`, or back over
/// `input` after saving `<input>.bak`.
pub fn migrate_file(input: &Path, output: Option<&Path>) -> Result<MigrationReport, StateError> {
    let content = fs::read_to_string(input).map_err(|e| StateError::io(input, e))?;
    let value: JsonValue = serde_json::from_str(&content).map_err(|e| StateError::Schema {
        path: input.display().to_string(),
        detail: e.to_string(),
    })?;

    let (state, mut report) = migrate(&value).map_err(|e| match e {
        StateError::Schema { detail, .. } => StateError::Schema {
            path: input.display().to_string(),
            detail,
        },
        other => other,
    })?;

    let target = output.unwrap_or(input);
    if target == input {
        let mut backup = input.as_os_str().to_owned();
        backup.push(".bak");
        let backup = PathBuf::from(backup);
        fs::copy(input, &backup).map_err(|e| StateError::io(&backup, e))?;
        report.backup = Some(backup);
    }

    StateStore::from_entries(state).write(target)?;
    info!(
        "Migrated {} repositories ({} years) into {}; dropped {} flat entries and {} years",
        report.repositories,
        report.years,
        target.display(),
        report.dropped_flat.len(),
        report.dropped_years
    );
    Ok(report)
}
