//! Error types for specenv

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the specenv Error
pub type Result<T> = std::result::Result<T, Error>;

/// specenv error types
///
/// The first four variants are fatal to a single spec file's setup only;
/// the runner records them against that file and moves on.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed environment directive in {file}:{line_number}: {line}")]
    DirectiveParse {
        file: PathBuf,
        line_number: usize,
        line: String,
    },

    #[error("Unknown environment '{name}' referenced by {file}")]
    UnknownEnvironment { name: String, file: PathBuf },

    #[error("Step #{position} ({kind}) did not signal completion within {timeout_ms} ms")]
    StepTimeout {
        kind: String,
        position: usize,
        timeout_ms: u64,
    },

    #[error("Step #{position} ({kind}) failed: {reason}")]
    PipelineExecution {
        kind: String,
        position: usize,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Whether this error is one of the per-file setup failures
    pub fn is_file_scoped(&self) -> bool {
        matches!(
            self,
            Error::DirectiveParse { .. }
                | Error::UnknownEnvironment { .. }
                | Error::StepTimeout { .. }
                | Error::PipelineExecution { .. }
        )
    }
}
