//! Layered configuration for collection runs
//!
//! Sources, lowest priority first:
//! - Built-in defaults
//! - ~/.config/orgstats/config.toml
//! - ./orgstats.toml, or the file given with `--config`
//! - Environment variables (`MAX_CONCURRENCY`, `ORGSTATS_API_URL`)
//! - Command-line flags (applied by the CLI)

use crate::github::DEFAULT_API_URL;
use crate::mirror::{FallbackBranch, DEFAULT_MAX_CONCURRENCY};
use crate::state::DEFAULT_STATE_FILE;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Project config file looked up in the working directory
pub const PROJECT_CONFIG_FILE: &str = "orgstats.toml";

#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// REST API base URL
    pub api_url: Option<String>,
    /// Host used in clone URLs
    pub git_host: Option<String>,
    /// Mirrors live at `<mirror_root>/<org>/<repo>`
    pub mirror_root: Option<PathBuf>,
    /// Simultaneous clone/fetch operations
    pub max_concurrency: Option<usize>,
    pub page_size: Option<u32>,
    pub http_timeout_secs: Option<u64>,
    pub http_retries: Option<u32>,
    /// Per git/cloc invocation; 0 disables the limit
    pub process_timeout_secs: Option<u64>,
    pub git_program: Option<String>,
    pub line_counter_program: Option<String>,
    pub fallback_branch: Option<FallbackBranch>,
    /// State file
    pub output: Option<PathBuf>,
}

impl PipelineConfig {
    /// Load config from files and the environment.
    ///
    /// An unreadable user config is skipped with a warning. A project config
    /// that fails to parse is an error, as is a missing `explicit` path.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = PipelineConfig::default();

        if let Some(path) = Self::user_config_path().filter(|p| p.exists()) {
            match Self::from_file(&path) {
                Ok(user) => config.merge(user),
                Err(e) => warn!("Ignoring user config {}: {:#}", path.display(), e),
            }
        }

        let project = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Some(PathBuf::from(PROJECT_CONFIG_FILE)).filter(|p| p.exists()),
        };
        if let Some(path) = project {
            config.merge(Self::from_file(&path)?);
            debug!("Loaded config from {}", path.display());
        }

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get the user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("orgstats").join("config.toml"))
    }

    /// Merge another config into this one (other takes priority)
    pub fn merge(&mut self, other: PipelineConfig) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        take!(
            api_url,
            git_host,
            mirror_root,
            max_concurrency,
            page_size,
            http_timeout_secs,
            http_retries,
            process_timeout_secs,
            git_program,
            line_counter_program,
            fallback_branch,
            output
        );
    }

    /// Apply environment overrides; unparsable values are ignored with a warning
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("MAX_CONCURRENCY") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.max_concurrency = Some(n),
                _ => warn!("Ignoring MAX_CONCURRENCY={:?}: expected a positive integer", raw),
            }
        }
        if let Some(url) = lookup("ORGSTATS_API_URL").filter(|u| !u.trim().is_empty()) {
            self.api_url = Some(url);
        }
    }

    pub fn api_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    pub fn git_host(&self) -> &str {
        self.git_host.as_deref().unwrap_or("github.com")
    }

    pub fn mirror_root(&self) -> PathBuf {
        self.mirror_root.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_CONCURRENCY)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.unwrap_or(100).clamp(1, 100)
    }

    pub fn http_timeout_secs(&self) -> u64 {
        self.http_timeout_secs.unwrap_or(30)
    }

    pub fn http_retries(&self) -> u32 {
        self.http_retries.unwrap_or(3)
    }

    pub fn process_timeout_secs(&self) -> u64 {
        self.process_timeout_secs.unwrap_or(1800)
    }

    pub fn git_program(&self) -> &str {
        self.git_program.as_deref().unwrap_or("git")
    }

    pub fn line_counter_program(&self) -> &str {
        self.line_counter_program.as_deref().unwrap_or("cloc")
    }

    pub fn fallback_branch(&self) -> FallbackBranch {
        self.fallback_branch.unwrap_or_default()
    }

    pub fn output(&self) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE))
    }

    /// Write an example project config into `dir`; an existing file is kept
    pub fn init_project_config(dir: &Path) -> Result<(PathBuf, bool)> {
        let path = dir.join(PROJECT_CONFIG_FILE);
        if path.exists() {
            return Ok((path, false));
        }
        std::fs::write(&path, EXAMPLE_CONFIG)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok((path, true))
    }
}

const EXAMPLE_CONFIG: &str = r#"# orgstats configuration
# Values here override ~/.config/orgstats/config.toml and are overridden by
# environment variables and command-line flags.

# REST API base URL (GitHub Enterprise: https://HOST/api/v3)
# api_url = "https://api.github.com"

# Host used in clone URLs
# git_host = "github.com"

# Mirrors are kept at <mirror_root>/<org>/<repo>
# mirror_root = "."

# Simultaneous clone/fetch operations (env: MAX_CONCURRENCY)
# max_concurrency = 20

# Repositories per listing page (max 100)
# page_size = 100

# http_timeout_secs = 30
# http_retries = 3

# Limit for each git/cloc invocation, 0 for none
# process_timeout_secs = 1800

# git_program = "git"
# line_counter_program = "cloc"

# Branch picked when neither main nor master exists:
# "listing-order" (first listed) or "most-recent" (newest commit)
# fallback_branch = "listing-order"

# State file
# output = "repo_stats.json"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.api_url(), "https://api.github.com");
        assert_eq!(config.git_host(), "github.com");
        assert_eq!(config.max_concurrency(), 20);
        assert_eq!(config.page_size(), 100);
        assert_eq!(config.http_timeout_secs(), 30);
        assert_eq!(config.http_retries(), 3);
        assert_eq!(config.process_timeout_secs(), 1800);
        assert_eq!(config.line_counter_program(), "cloc");
        assert_eq!(config.fallback_branch(), FallbackBranch::ListingOrder);
        assert_eq!(config.output(), PathBuf::from("repo_stats.json"));
    }

    #[test]
    fn test_toml_parsing() {
        let config = PipelineConfig::from_toml_str(
            r#"
            max_concurrency = 4
            fallback_branch = "most-recent"
            mirror_root = "/srv/mirrors"
            "#,
        )
        .unwrap();
        assert_eq!(config.max_concurrency(), 4);
        assert_eq!(config.fallback_branch(), FallbackBranch::MostRecent);
        assert_eq!(config.mirror_root(), PathBuf::from("/srv/mirrors"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(PipelineConfig::from_toml_str("max_concurency = 4").is_err());
    }

    #[test]
    fn test_merge_overrides_set_fields() {
        let mut base = PipelineConfig {
            max_concurrency: Some(5),
            git_host: Some("ghe.example.com".into()),
            ..Default::default()
        };
        base.merge(PipelineConfig {
            max_concurrency: Some(8),
            ..Default::default()
        });
        assert_eq!(base.max_concurrency, Some(8));
        assert_eq!(base.git_host.as_deref(), Some("ghe.example.com"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("MAX_CONCURRENCY", "7"),
            ("ORGSTATS_API_URL", "http://localhost:9000"),
        ]
        .into_iter()
        .collect();
        let mut config = PipelineConfig {
            max_concurrency: Some(3),
            ..Default::default()
        };
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.max_concurrency(), 7);
        assert_eq!(config.api_url(), "http://localhost:9000");

        let mut config = PipelineConfig::default();
        config.apply_env(|k| (k == "MAX_CONCURRENCY").then(|| "lots".to_string()));
        assert_eq!(config.max_concurrency(), 20);
    }

    #[test]
    fn test_explicit_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(&path, "page_size = 50\n").unwrap();
        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.page_size(), 50);

        assert!(PipelineConfig::load(Some(&tmp.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_init_writes_parsable_example_once() {
        let tmp = TempDir::new().unwrap();
        let (path, created) = PipelineConfig::init_project_config(tmp.path()).unwrap();
        assert!(created);
        let parsed = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(parsed, PipelineConfig::default());

        let (_, created) = PipelineConfig::init_project_config(tmp.path()).unwrap();
        assert!(!created);
    }
}
