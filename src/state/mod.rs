//! Persistent per-repository, per-year statistics
//!
//! The state file is the only durable artifact of a run. It is keyed by
//! `org/repo`, then by year, and is rewritten atomically by [`StateStore::flush`].
//! Files written by older tools use different layouts; those are detected on
//! load and must be upgraded with [`migrate_file`] before a run will touch them.

mod legacy;
mod store;

pub use legacy::{detect_layout, migrate, migrate_file, Layout, MigrationReport};
pub use store::{Fingerprints, StateStore, DEFAULT_STATE_FILE};

use thiserror::Error;

/// Errors loading, migrating or writing the state file
#[derive(Error, Debug)]
pub enum StateError {
    #[error(
        "{path} uses a legacy layout ({nested} nested, {flat} flat entries); \
         run `orgstats migrate --input {path}` first"
    )]
    LegacyLayout {
        path: String,
        nested: usize,
        flat: usize,
    },

    #[error("{path} does not match the state schema: {detail}")]
    Schema { path: String, detail: String },

    #[error("Failed to access state file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StateError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StateError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Year keys are four ASCII digits
pub(crate) fn is_year_key(key: &str) -> bool {
    key.len() == 4 && key.bytes().all(|b| b.is_ascii_digit())
}
