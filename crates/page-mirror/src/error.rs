//! Error taxonomy for the capture pipeline.

use std::path::PathBuf;

/// Where an error is contained.
///
/// Resource errors are logged and the session keeps capturing. Rewrite errors
/// abort the document rewrite but still let teardown run. Session errors end
/// the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    Resource,
    Rewrite,
    Session,
}

/// Errors that can occur in the capture pipeline.
#[derive(thiserror::Error, Debug)]
pub enum MirrorError {
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Inline data URL has no payload: {url}")]
    MissingPayload { url: String },

    #[error("Failed to decode inline data for {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read response body for {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("DOM query `{query}` failed: {reason}")]
    Dom { query: String, reason: String },

    #[error("Document capture failed: {0}")]
    Document(String),

    #[error("Mirror root unavailable at {}: {source}", path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MirrorError {
    /// Attach a path to an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Which boundary is expected to contain this error.
    pub fn scope(&self) -> ErrorScope {
        match self {
            Self::InvalidUrl { .. }
            | Self::MissingPayload { .. }
            | Self::Decode { .. }
            | Self::Io { .. }
            | Self::Body { .. } => ErrorScope::Resource,
            Self::Dom { .. } | Self::Document(_) => ErrorScope::Rewrite,
            Self::Root { .. } => ErrorScope::Session,
        }
    }
}

/// Convenience result type.
pub type MirrorResult<T> = Result<T, MirrorError>;
