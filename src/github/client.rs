//! GitHub REST client: repository discovery, creation year and year-end SHA
//!
//! Listing is fail-soft (any bad page yields an empty listing, except a
//! rejected credential); per-repository lookups are fail-loud.

use super::transport::{HttpResponse, HttpTransport};
use super::RepositoryApi;
use crate::error::{PipelineError, PipelineResult};
use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Default GitHub API root
pub const DEFAULT_API_URL: &str = "https://api.github.com";

#[derive(Deserialize)]
struct RepoSummary {
    name: String,
}

#[derive(Deserialize)]
struct RepoMetadata {
    created_at: Option<String>,
}

#[derive(Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Deserialize)]
struct UserInfo {
    login: String,
}

/// Retry policy for idempotent reads
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub retries: u32,
    /// Sleep before attempt `n` is `backoff * n`
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Authenticated client for the endpoints the pipeline needs
pub struct GitHubClient<T: HttpTransport> {
    transport: T,
    api_url: String,
    token: String,
    page_size: u32,
    retry: RetryPolicy,
}

impl<T: HttpTransport> GitHubClient<T> {
    pub fn new(transport: T, api_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            transport,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            page_size: 100,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// GET with retries on transport failures, 5xx and 429
    fn get(&self, url: &str, query: &[(&str, String)]) -> PipelineResult<HttpResponse> {
        let mut attempt = 0;
        loop {
            let result = self.transport.get(url, query, &self.token);
            let retryable = match &result {
                Ok(resp) => resp.status >= 500 || resp.status == 429,
                Err(e) => e.is_retryable(),
            };
            if !retryable || attempt >= self.retry.retries {
                return result;
            }
            attempt += 1;
            debug!("Retrying GET {} (attempt {})", url, attempt + 1);
            std::thread::sleep(self.retry.backoff * attempt);
        }
    }

    /// Map auth/not-found statuses onto errors; return other responses as-is
    fn classify(resp: HttpResponse, url: &str) -> PipelineResult<HttpResponse> {
        match resp.status {
            401 => Err(PipelineError::Auth(format!("401 from {}", url))),
            404 => Err(PipelineError::NotFound(url.to_string())),
            _ => Ok(resp),
        }
    }

    fn parse<D: for<'de> Deserialize<'de>>(resp: &HttpResponse, what: &str) -> PipelineResult<D> {
        serde_json::from_str(&resp.body).map_err(|e| PipelineError::parse(what, e))
    }
}

impl<T: HttpTransport + 'static> RepositoryApi for GitHubClient<T> {
    fn authenticated_user(&self) -> PipelineResult<String> {
        let url = self.url("/user");
        let resp = self.get(&url, &[])?;
        if resp.status == 401 || resp.status == 403 {
            return Err(PipelineError::Auth(format!("{} from {}", resp.status, url)));
        }
        if !resp.is_success() {
            return Err(PipelineError::Http {
                status: resp.status,
                url,
            });
        }
        let user: UserInfo = Self::parse(&resp, "user response")?;
        Ok(user.login)
    }

    fn list_organization_repositories(&self, org: &str) -> PipelineResult<Vec<String>> {
        let url = self.url(&format!("/orgs/{}/repos", org));
        let mut names = Vec::new();
        let mut page = 1u32;

        loop {
            let query = [
                ("per_page", self.page_size.to_string()),
                ("page", page.to_string()),
            ];
            let resp = match self.get(&url, &query) {
                Ok(resp) => resp,
                Err(e) => {
                    warn!("Failed to list repositories of {} (page {}): {}", org, page, e);
                    return Ok(Vec::new());
                }
            };
            if resp.status == 401 {
                return Err(PipelineError::Auth(format!("401 from {}", url)));
            }
            if !resp.is_success() {
                warn!(
                    "Failed to list repositories of {}: HTTP {} on page {}",
                    org, resp.status, page
                );
                return Ok(Vec::new());
            }

            let repos: Vec<RepoSummary> = match Self::parse(&resp, "repository listing") {
                Ok(repos) => repos,
                Err(e) => {
                    warn!("{}", e);
                    return Ok(Vec::new());
                }
            };
            if repos.is_empty() {
                break;
            }
            debug!("Page {} of {}: {} repositories", page, org, repos.len());
            names.extend(repos.into_iter().map(|r| r.name));
            page += 1;
        }

        Ok(names)
    }

    fn resolve_creation_year(&self, org: &str, repo: &str) -> PipelineResult<i32> {
        let url = self.url(&format!("/repos/{}/{}", org, repo));
        let resp = Self::classify(self.get(&url, &[])?, &url)?;
        if !resp.is_success() {
            return Err(PipelineError::Http {
                status: resp.status,
                url,
            });
        }

        let meta: RepoMetadata = Self::parse(&resp, "repository metadata")?;
        let created_at = meta
            .created_at
            .ok_or_else(|| PipelineError::parse("repository metadata", "missing created_at"))?;
        let created = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| PipelineError::parse("created_at", e))?
            .with_timezone(&Utc);
        Ok(created.year())
    }

    fn resolve_latest_commit_sha(
        &self,
        org: &str,
        repo: &str,
        year: i32,
    ) -> PipelineResult<Option<String>> {
        let url = self.url(&format!("/repos/{}/{}/commits", org, repo));
        let query = [
            ("per_page", "1".to_string()),
            ("until", year_cutoff(year)),
        ];
        let resp = Self::classify(self.get(&url, &query)?, &url)?;

        // 409: repository exists but has no commits at all
        if resp.status == 409 {
            return Ok(None);
        }
        if !resp.is_success() {
            return Err(PipelineError::Http {
                status: resp.status,
                url,
            });
        }

        let commits: Vec<CommitRef> = Self::parse(&resp, "commit listing")?;
        Ok(commits.into_iter().next().map(|c| c.sha))
    }
}

/// Exclusive upper bound of `year`, as the API's `until` filter expects it
pub fn year_cutoff(year: i32) -> String {
    format!("{}-01-01T00:00:00Z", year + 1)
}
