//! Error types shared by every stage of the mining pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that abort a mining run
#[derive(Debug, Error)]
pub enum MinerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O failure on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("conflicting configuration: {0}")]
    ConfigConflict(String),

    #[error("partition {partition} exceeded its time limit after {elapsed:?}")]
    Timeout { partition: usize, elapsed: Duration },

    #[error("partition {partition} stopped because another partition failed")]
    Aborted { partition: usize },
}

/// The three failure classes a caller has to distinguish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    IoFailure,
    ConfigConflict,
}

impl MinerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        MinerError::InvalidInput(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MinerError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MinerError::InvalidInput(_) => ErrorKind::InvalidInput,
            MinerError::ConfigConflict(_) => ErrorKind::ConfigConflict,
            MinerError::Io { .. } | MinerError::Timeout { .. } | MinerError::Aborted { .. } => {
                ErrorKind::IoFailure
            }
        }
    }

    /// Prefix an input error with the file it came from
    pub fn in_file(self, path: &Path) -> Self {
        match self {
            MinerError::InvalidInput(msg) => {
                MinerError::InvalidInput(format!("{}: {}", path.display(), msg))
            }
            other => other,
        }
    }

    /// True for the secondary error a partition reports after a sibling failed
    pub fn is_abort(&self) -> bool {
        matches!(self, MinerError::Aborted { .. })
    }
}

pub type Result<T> = std::result::Result<T, MinerError>;
