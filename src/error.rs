//! Error taxonomy for the collection pipeline
//!
//! Every failure is scoped to the smallest unit that can fail (a year, then a
//! repository). Only [`PipelineError::Auth`] is fatal to a whole run; the
//! orchestrator inspects [`PipelineError::is_run_fatal`] to decide.

use thiserror::Error;

/// Errors raised by the API client, mirror manager and analyzer.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Credential rejected: {0}")]
    Auth(String),

    #[error("Network failure: {0}")]
    TransientNetwork(String),

    #[error("Unexpected HTTP status {status} for {url}")]
    Http { status: u16, url: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{program} exited with code {code:?}: {stderr}")]
    Command {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{0} not found. Please install it first.")]
    ToolMissing(String),

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("Failed to parse {what}: {detail}")]
    Parse { what: String, detail: String },

    #[error("Partial data: {0}")]
    PartialData(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn parse(what: impl Into<String>, detail: impl ToString) -> Self {
        PipelineError::Parse {
            what: what.into(),
            detail: detail.to_string(),
        }
    }

    /// Whether this failure should abort the entire run rather than one unit.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, PipelineError::Auth(_))
    }

    /// Whether the HTTP layer may retry the request that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::TransientNetwork(_))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
