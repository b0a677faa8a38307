//! Error taxonomy for a content run.
//!
//! - [`SourceError`]: an external source failed or returned unusable data.
//!   Recovered by skipping that source (or that passage).
//! - [`TransformError`]: one raw record could not be turned into a
//!   [`ContentItem`](crate::models::ContentItem). Recovered by dropping it.
//! - [`PersistError`]: the final write failed. Fatal for the run; the
//!   previously persisted batch is left in place.
//! - [`ProduceError`]: why a whole run failed, surfaced as a non-zero exit.
//! - [`ConfigError`] and [`LoadError`]: bad config file or unreadable data file.

use std::path::PathBuf;

/// An external data source failed or returned unusable data.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Transport-level failure (DNS, TLS, timeout, ...).
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote service answered with a non-success status.
    #[error("{service} returned status {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The generator answered but produced no text.
    #[error("generator returned an empty response")]
    EmptyResponse,

    /// The payload could not be parsed at all.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// A local input file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source ran but none of its sub-requests succeeded.
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// A single raw record could not be converted into a content item.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("record does not match any known shape: {0}")]
    UnknownShape(String),

    #[error("record has an empty prompt")]
    EmptyPrompt,

    #[error("record has an empty answer")]
    EmptyAnswer,

    #[error("multiple-choice record needs at least 2 options, got {0}")]
    TooFewOptions(usize),

    #[error("correct_index {index} out of range for {len} options")]
    AnswerOutOfRange { index: usize, len: usize },
}

/// The batch could not be persisted.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("cannot create output directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("background write task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Why a run did not update the persisted batch.
#[derive(Debug, thiserror::Error)]
pub enum ProduceError {
    #[error("no sources are configured")]
    NoSources,

    #[error("all {0} sources failed")]
    AllSourcesFailed(usize),

    #[error("refusing to persist an empty batch")]
    EmptyBatch,

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// A persisted batch could not be read back.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid batch file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u64),

    #[error("unrecognized batch layout")]
    UnknownLayout,
}
