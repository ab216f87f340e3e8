use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("failed to remove '{path}': {source}")]
    RemoveError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to create temporary directory in '{root}': {source}")]
    TempDirError {
        root: PathBuf,
        source: std::io::Error,
    },
}

impl IoError {
    pub fn remove_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::RemoveError {
            path: path.into(),
            source,
        }
    }

    pub fn temp_dir_error(root: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::TempDirError {
            root: root.into(),
            source,
        }
    }
}
