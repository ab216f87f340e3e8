use std::path::PathBuf;
use thiserror::Error;

use super::{HandlerError, IoError, LocationError, ReportError};

/// Failures raised while traversing the location tree of one URI.
#[derive(Error, Debug)]
pub enum WalkError {
    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error("failed to walk directory at {path}: {source}")]
    DirectoryWalk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// Failures that end the scan of a single URI.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("could not find a handler for provided URI: '{uri}'")]
    NoHandler { uri: String },

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Walk(#[from] WalkError),

    #[error(transparent)]
    Report(#[from] ReportError),

    #[error("analyzer failed on '{location}': {source:#}")]
    Analyzer {
        location: String,
        source: anyhow::Error,
    },
}

impl ScanError {
    pub fn no_handler(uri: impl Into<String>) -> Self {
        Self::NoHandler { uri: uri.into() }
    }

    pub fn analyzer(location: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Analyzer {
            location: location.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_handler_display() {
        let err = ScanError::no_handler("pypi://requests");
        assert_eq!(
            err.to_string(),
            "could not find a handler for provided URI: 'pypi://requests'"
        );
    }

    #[test]
    fn test_analyzer_display_keeps_context_chain() {
        let source = anyhow::anyhow!("bad token").context("parsing setup.py");
        let err = ScanError::analyzer("pkg.zip$setup.py", source);
        assert_eq!(
            err.to_string(),
            "analyzer failed on 'pkg.zip$setup.py': parsing setup.py: bad token"
        );
    }

    #[test]
    fn test_handler_error_passes_through() {
        let err: ScanError = HandlerError::invalid_location("file:///nope").into();
        assert_eq!(
            err.to_string(),
            "invalid location provided from URI: 'file:///nope'"
        );
    }
}
