use std::path::PathBuf;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, FrontError>;

/// Failure of a dominance comparison. Never converted into a verdict.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("objective arity mismatch: {left} vs {right}")]
    ArityMismatch { left: usize, right: usize },

    #[error("objective vector is empty")]
    Empty,

    #[error("non-finite objective value at axis {axis}: {value}")]
    NonFinite { axis: usize, value: f64 },

    #[error("failed to run comparator `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("comparator `{program}` gave no verdict (status {status}): {stderr}")]
    NoVerdict {
        program: String,
        status: String,
        stderr: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum FrontError {
    #[error("invalid record `{record}`: {reason}")]
    InvalidRecord { record: String, reason: String },

    #[error("dominance oracle failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("cannot acquire lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {waited:?} waiting for lock {path}")]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {message}")]
    Config { path: PathBuf, message: String },
}

impl FrontError {
    pub fn invalid_record(record: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRecord {
            record: record.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable short code, used by the CLI's JSON error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRecord { .. } => "invalid_record",
            Self::Oracle(_) => "oracle_failure",
            Self::Lock { .. } | Self::LockTimeout { .. } => "lock_acquisition_failure",
            Self::Io { .. } => "io_error",
            Self::Config { .. } => "config_error",
        }
    }
}
