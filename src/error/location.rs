use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocationError {
    #[error("failed to fingerprint '{path}': {source}")]
    Fingerprint {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read metadata of '{path}': {source}")]
    Metadata {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl LocationError {
    pub fn fingerprint(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Fingerprint {
            path: path.into(),
            source,
        }
    }

    pub fn metadata(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Metadata {
            path: path.into(),
            source,
        }
    }
}
