//! orgstats - incremental per-year statistics for a GitHub organization
//!
//! A run discovers every repository of an organization, keeps a local mirror
//! of each, and records per calendar year the commit count, commits per
//! contributor, lines of code and commit details. Years whose newest commit
//! is unchanged since the last run are not analyzed again.

pub mod analyzer;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod github;
pub mod mirror;
pub mod models;
pub mod pipeline;
pub mod process;
pub mod reporters;
pub mod state;

pub use error::{PipelineError, PipelineResult};
