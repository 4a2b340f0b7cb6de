//! Error types for the entire application.
//!
//! We use `thiserror` for library-style errors with custom types,
//! and `anyhow` for application-level error propagation in main.rs and commands.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while decoding a capture chunk
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("I/O error reading chunk: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed record: {0}")]
    BadRecord(String),
}

impl DecodeError {
    /// Whether the build loop may skip this record and continue.
    ///
    /// Stream-level I/O failures are fatal; a single malformed record
    /// is counted and skipped.
    pub fn is_skippable(&self) -> bool {
        matches!(self, DecodeError::BadRecord(_))
    }
}

/// Errors that can occur during the batch merge
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("no capture chunks found under the given paths")]
    InputMissing,

    #[error("fatal decoder error in {path}: {source}")]
    DecodeFatal {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("I/O error writing band artifacts: {0}")]
    Io(#[from] std::io::Error),

    #[error("build cancelled")]
    Cancelled,
}

impl BuildError {
    /// Process exit code for the batch command
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildError::InputMissing => 2,
            BuildError::DecodeFatal { .. } => 3,
            BuildError::Io(_) | BuildError::Cancelled => 4,
        }
    }
}

/// Errors that can occur reading or writing persisted artifacts
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("I/O error on artifact {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt artifact {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("JSON error on artifact {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Errors surfaced by the query surface.
///
/// Invalid ranges are NOT errors: they collapse to empty, well-formed
/// responses. Only unknown bands, unreadable artifacts, and encoder
/// failures surface here.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("unknown band id: {0}")]
    NotFound(usize),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("unknown summary curve: {0}")]
    UnknownCurve(String),

    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}
