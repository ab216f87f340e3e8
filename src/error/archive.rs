use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("failed to open archive '{path}': {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corrupt archive '{path}': {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("archive '{path}' exceeds {limit} limit ({value} > {max})")]
    LimitExceeded {
        path: PathBuf,
        limit: &'static str,
        value: u64,
        max: u64,
    },

    #[error("failed to extract '{member}' from '{path}': {source}")]
    Extract {
        path: PathBuf,
        member: String,
        source: std::io::Error,
    },
}

impl ArchiveError {
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn limit_exceeded(path: impl Into<PathBuf>, limit: &'static str, value: u64, max: u64) -> Self {
        Self::LimitExceeded {
            path: path.into(),
            limit,
            value,
            max,
        }
    }

    pub fn extract(path: impl Into<PathBuf>, member: impl Into<String>, source: std::io::Error) -> Self {
        Self::Extract {
            path: path.into(),
            member: member.into(),
            source,
        }
    }

    /// Short machine-readable reason, used in detection signatures.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Open { .. } => "archive_open",
            Self::Corrupt { .. } => "archive_corrupt",
            Self::LimitExceeded { .. } => "archive_limit",
            Self::Extract { .. } => "archive_extract",
        }
    }
}
