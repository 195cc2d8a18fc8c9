use std::error::Error as StdError;
use std::path::PathBuf;

use thiserror::Error;

/// Samplecut's crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Samplecut's crate-wide error type.
///
/// Variants map onto how far a failure reaches:
/// - manifest and directory errors are fatal for the whole run
/// - source errors abort the batch that shares the source
/// - export, slice and tool errors only affect a single sample
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("invalid range for sample '{output_name}': start={start}, end={end}")]
    InvalidRange {
        output_name: String,
        start: f64,
        end: f64,
    },

    #[error("required directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("failed to decode '{}': {message}", path.display())]
    Decode { path: PathBuf, message: String },

    #[error("range {start}s..{end}s starts past the end of the source ({source_secs:.3}s)")]
    SliceOutOfBounds {
        start: f64,
        end: f64,
        source_secs: f64,
    },

    #[error("failed to export '{}': {message}", path.display())]
    Export { path: PathBuf, message: String },

    #[error("external tool '{program}' timed out after {secs}s")]
    ToolTimeout { program: String, secs: u64 },

    #[error("{0}")]
    Message(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub(crate) fn export(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Export {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error invalidates every sample that shares the failing source.
    pub fn is_source_failure(&self) -> bool {
        matches!(self, Self::SourceNotFound(_) | Self::Decode { .. })
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Message(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedManifest(err.to_string())
    }
}

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Self {
        Self::Other(Box::new(err))
    }
}
