use std::path::PathBuf;
use thiserror::Error;

/// Import enumeration failures. Callers log these and carry on.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to set parser language: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error("failed to parse '{0}'")]
    Parse(PathBuf),
}

impl ImportError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }
}
