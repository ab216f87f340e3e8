use thiserror::Error;

use super::LocationError;

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("diffing is not supported by the '{scheme}' handler")]
    UnsupportedDiff { scheme: String },

    #[error("invalid location provided from URI: '{uri}'")]
    InvalidLocation { uri: String },

    #[error("failed to parse package metadata '{path}': {message}")]
    PackageMetadata { path: String, message: String },

    #[error(transparent)]
    Location(#[from] LocationError),
}

impl HandlerError {
    pub fn unsupported_diff(scheme: impl Into<String>) -> Self {
        Self::UnsupportedDiff {
            scheme: scheme.into(),
        }
    }

    pub fn invalid_location(uri: impl Into<String>) -> Self {
        Self::InvalidLocation { uri: uri.into() }
    }

    pub fn package_metadata(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PackageMetadata {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn is_unsupported_diff(&self) -> bool {
        matches!(self, Self::UnsupportedDiff { .. })
    }
}

/// A plugin declined to load. Collected as a diagnostic by the registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("feature disabled: {reason}")]
pub struct FeatureDisabled {
    pub reason: String,
}

impl FeatureDisabled {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
