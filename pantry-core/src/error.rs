//! Engine error types
//!
//! `SyncError` covers failures inside the reconciliation pipeline, contained
//! at the file or source level. `ValidationError` covers boundary rejections
//! that an adapter maps to a client error; when one is returned, no state has
//! been mutated.

use std::path::PathBuf;

use thiserror::Error;

/// Contained failures of one reconciliation pass
#[derive(Debug, Error)]
pub enum SyncError {
    /// Clone or update failed; the source is skipped for this pass and
    /// whatever the index already holds for it stays in place
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// The working copy directory could not be listed
    #[error("failed to read working copy {path}")]
    WorkingCopy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A manifest file did not decode as the expected shape; the file is
    /// skipped, siblings in the same source are unaffected
    #[error("failed to parse manifest {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    /// An index write failed; the sibling collection write is still attempted
    /// and nothing is rolled back
    #[error("failed to publish '{name}' to collection '{collection}': {source}")]
    Publish {
        name: String,
        collection: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Boundary rejections
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("source name must not be empty")]
    EmptyName,

    #[error("source URL '{url}' is not a valid URL")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("source URL '{url}' has no host")]
    MissingHost { url: String },

    #[error("source URL host '{host}' is not on the allow list")]
    HostNotAllowed { host: String },

    #[error("the built-in source cannot be removed")]
    BuiltinSource,

    #[error("manifest is not valid JSON: {0}")]
    MalformedManifest(#[source] serde_json::Error),
}
