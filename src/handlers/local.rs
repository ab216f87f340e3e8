//! Local filesystem handler, the default for URIs without a known scheme.

use std::iter;
use std::path::{self, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::{
    seed_metadata, DiffStream, HandlerProvider, LocationPair, LocationStream, ParsedUri,
    UriHandler,
};
use crate::config::AuditConfig;
use crate::error::{FeatureDisabled, HandlerError};
use crate::location::{Metadata, ScanLocation};
use crate::session::ScanSession;

pub const SCHEME: &str = "file";

pub fn load(_config: &AuditConfig) -> Result<Arc<dyn HandlerProvider>, FeatureDisabled> {
    Ok(Arc::new(LocalProvider))
}

#[derive(Debug)]
pub struct LocalProvider;

impl HandlerProvider for LocalProvider {
    fn scheme(&self) -> &'static str {
        SCHEME
    }

    fn is_default(&self) -> bool {
        true
    }

    fn open(&self, uri: ParsedUri, session: Arc<ScanSession>) -> Box<dyn UriHandler> {
        Box::new(LocalHandler::new(uri, session))
    }
}

#[derive(Debug)]
pub struct LocalHandler {
    uri: ParsedUri,
    path: PathBuf,
    session: Arc<ScanSession>,
}

impl LocalHandler {
    pub fn new(uri: ParsedUri, session: Arc<ScanSession>) -> Self {
        let target = PathBuf::from(uri.target());
        let path = path::absolute(&target).unwrap_or(target);
        Self { uri, path, session }
    }
}

impl UriHandler for LocalHandler {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn uri(&self) -> &ParsedUri {
        &self.uri
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("local_path", self.path.to_string_lossy().into_owned());
        metadata
    }

    fn get_paths(&mut self, metadata: Option<Metadata>) -> Result<LocationStream<'_>, HandlerError> {
        let metadata = seed_metadata(metadata, &self.metadata());
        let path = self.path.clone();
        let session = Arc::clone(&self.session);
        debug!(path = %path.display(), "resolving local path");

        Ok(Box::new(iter::once_with(move || {
            // members of a directory root render relative to it
            let strip_path = if path.is_dir() {
                path.to_string_lossy().into_owned()
            } else {
                String::new()
            };
            ScanLocation::builder(&path)
                .metadata(metadata)
                .strip_path(strip_path)
                .build(&session)
                .map_err(HandlerError::from)
        })))
    }

    fn get_diff_paths<'a>(
        &'a mut self,
        other: &'a mut dyn UriHandler,
    ) -> Result<DiffStream<'a>, HandlerError> {
        let left = self.get_paths(None)?;
        let right = other.get_paths(None)?;
        Ok(Box::new(left.zip(right).map(
            |(left, right)| -> Result<LocationPair, HandlerError> { Ok((left?, right?)) },
        )))
    }
}
