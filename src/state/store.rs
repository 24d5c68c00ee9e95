//! Incremental state store with atomic persistence

use super::legacy::{detect_layout, Layout};
use super::StateError;
use crate::models::{OrganizationState, YearlyStats};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File name used when no output path is configured
pub const DEFAULT_STATE_FILE: &str = "repo_stats.json";

/// Read-only view of stored fingerprints, shared with repository tasks.
///
/// Taken once at run start so skip decisions never observe merges made by
/// sibling tasks during the same run.
#[derive(Debug, Clone, Default)]
pub struct Fingerprints {
    by_repo: HashMap<String, HashMap<String, String>>,
}

impl Fingerprints {
    /// True iff `repo`/`year` was stored with exactly `sha`
    pub fn matches(&self, repo: &str, year: i32, sha: &str) -> bool {
        self.by_repo
            .get(repo)
            .and_then(|years| years.get(&year.to_string()))
            .is_some_and(|stored| stored == sha)
    }

    pub fn len(&self) -> usize {
        self.by_repo.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory state plus dirty tracking
#[derive(Debug, Default)]
pub struct StateStore {
    entries: OrganizationState,
    dirty: bool,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding `entries` that has never been written
    pub fn from_entries(entries: OrganizationState) -> Self {
        Self {
            entries,
            dirty: true,
        }
    }

    /// Load the state file at `path`.
    ///
    /// A missing file gives an empty store. A file that is not JSON, or JSON
    /// that does not match the schema, is copied to `<path>.corrupt` and also
    /// gives an empty store. A legacy layout is an error, so it is never
    /// overwritten before migration.
    pub fn load(path: &Path) -> Result<Self, StateError> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No state file at {}, starting fresh", path.display());
                return Ok(Self::new());
            }
            Err(e) => return Err(StateError::io(path, e)),
        };

        let value: JsonValue = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => return Self::discard(path, &format!("not valid JSON ({})", e)),
        };

        match detect_layout(&value) {
            Layout::Canonical => match serde_json::from_value::<OrganizationState>(value) {
                Ok(entries) => {
                    debug!(
                        "Loaded {} repositories from {}",
                        entries.len(),
                        path.display()
                    );
                    Ok(Self {
                        entries,
                        dirty: false,
                    })
                }
                Err(e) => Self::discard(path, &e.to_string()),
            },
            Layout::Legacy { nested, flat } => Err(StateError::LegacyLayout {
                path: path.display().to_string(),
                nested,
                flat,
            }),
            Layout::Unrecognized(detail) => Self::discard(path, &detail),
        }
    }

    /// Keep a copy of an unreadable state file and start from an empty store
    /// that will replace it on the next flush
    fn discard(path: &Path, reason: &str) -> Result<Self, StateError> {
        let kept = corrupt_path(path);
        fs::copy(path, &kept).map_err(|e| StateError::io(&kept, e))?;
        warn!(
            "State file {} is unusable ({}); kept a copy at {}, starting fresh",
            path.display(),
            reason,
            kept.display()
        );
        Ok(Self {
            entries: OrganizationState::new(),
            dirty: true,
        })
    }

    pub fn entries(&self) -> &OrganizationState {
        &self.entries
    }

    pub fn get(&self, repo: &str, year: i32) -> Option<&YearlyStats> {
        self.entries.get(repo)?.get(&year.to_string())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// True iff an entry exists for `repo`/`year` with `latest_commit_sha == sha`
    pub fn should_skip(&self, repo: &str, year: i32, sha: &str) -> bool {
        self.get(repo, year)
            .is_some_and(|stats| stats.latest_commit_sha == sha)
    }

    /// Insert or replace the entry for `repo`/`year`
    pub fn merge(&mut self, repo: &str, year: i32, stats: YearlyStats) {
        let years = self.entries.entry(repo.to_string()).or_default();
        let key = year.to_string();
        if years.get(&key) == Some(&stats) {
            return;
        }
        years.insert(key, stats);
        self.dirty = true;
    }

    /// Snapshot of every stored fingerprint
    pub fn fingerprints(&self) -> Fingerprints {
        let by_repo = self
            .entries
            .iter()
            .map(|(repo, years)| {
                let shas = years
                    .iter()
                    .map(|(year, stats)| (year.clone(), stats.latest_commit_sha.clone()))
                    .collect();
                (repo.clone(), shas)
            })
            .collect();
        Fingerprints { by_repo }
    }

    /// Write to `path` if anything changed or the file does not exist yet.
    /// Returns whether a write happened.
    pub fn flush(&mut self, path: &Path) -> Result<bool, StateError> {
        if !self.dirty && path.exists() {
            debug!("State unchanged, not rewriting {}", path.display());
            return Ok(false);
        }
        self.write(path)?;
        self.dirty = false;
        Ok(true)
    }

    /// Unconditionally write pretty JSON to a sibling temp file, fsync it, and
    /// rename it over `path`. The previous file is untouched on failure.
    pub fn write(&self, path: &Path) -> Result<(), StateError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StateError::io(parent, e))?;
        }

        let tmp = temp_path(path);
        let result = write_synced(&tmp, &self.entries)
            .and_then(|_| fs::rename(&tmp, path).map_err(|e| StateError::io(path, e)));

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        } else {
            info!(
                "Wrote {} repositories to {}",
                self.entries.len(),
                path.display()
            );
        }
        result
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| DEFAULT_STATE_FILE.to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

/// `<path>.corrupt`, next to the state file
fn corrupt_path(path: &Path) -> PathBuf {
    let mut kept = path.as_os_str().to_owned();
    kept.push(".corrupt");
    PathBuf::from(kept)
}

fn write_synced(tmp: &Path, entries: &OrganizationState) -> Result<(), StateError> {
    let file = File::create(tmp).map_err(|e| StateError::io(tmp, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, entries)?;
    writer
        .write_all(b"\n")
        .and_then(|_| writer.flush())
        .map_err(|e| StateError::io(tmp, e))?;
    let file = writer
        .into_inner()
        .map_err(|e| StateError::io(tmp, e.into_error()))?;
    file.sync_all().map_err(|e| StateError::io(tmp, e))
}
