//! Handler for a local PyPI-style mirror.
//!
//! Layout under the mirror root:
//! - `json/<package>`: the package JSON document
//! - `packages/...`: release files, at the path following `/packages/` in
//!   each release URL

use serde::Deserialize;
use std::fs;
use std::path::{self, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{seed_metadata, HandlerProvider, LocationStream, ParsedUri, UriHandler};
use crate::archive::sanitize_member_path;
use crate::config::AuditConfig;
use crate::error::{FeatureDisabled, HandlerError};
use crate::location::{Metadata, ScanLocation};
use crate::session::ScanSession;

pub const SCHEME: &str = "mirror";

pub fn load(config: &AuditConfig) -> Result<Arc<dyn HandlerProvider>, FeatureDisabled> {
    let root = config
        .mirror_root
        .as_ref()
        .ok_or_else(|| FeatureDisabled::new("mirror root is not configured"))?;
    if !root.is_dir() {
        return Err(FeatureDisabled::new(format!(
            "mirror root '{}' does not exist",
            root.display()
        )));
    }
    let root = path::absolute(root).unwrap_or_else(|_| root.clone());
    Ok(Arc::new(MirrorProvider { root }))
}

#[derive(Debug)]
pub struct MirrorProvider {
    root: PathBuf,
}

impl HandlerProvider for MirrorProvider {
    fn scheme(&self) -> &'static str {
        SCHEME
    }

    fn open(&self, uri: ParsedUri, session: Arc<ScanSession>) -> Box<dyn UriHandler> {
        Box::new(MirrorHandler::new(uri, self.root.clone(), session))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageDocument {
    pub info: PackageInfo,
    #[serde(default)]
    pub urls: Vec<ReleaseFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseFile {
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub packagetype: Option<String>,
}

#[derive(Debug)]
pub struct MirrorHandler {
    uri: ParsedUri,
    package: String,
    root: PathBuf,
    session: Arc<ScanSession>,
}

impl MirrorHandler {
    pub fn new(uri: ParsedUri, root: PathBuf, session: Arc<ScanSession>) -> Self {
        let package = uri.target().trim_matches('/').to_string();
        Self {
            uri,
            package,
            root,
            session,
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    fn json_path(&self) -> PathBuf {
        self.root.join("json").join(&self.package)
    }

    pub fn document(&self) -> Result<PackageDocument, HandlerError> {
        let path = self.json_path();
        let content = fs::read_to_string(&path).map_err(|e| {
            HandlerError::package_metadata(path.to_string_lossy(), e.to_string())
        })?;
        serde_json::from_str(&content)
            .map_err(|e| HandlerError::package_metadata(path.to_string_lossy(), e.to_string()))
    }

    /// Maps a release URL onto the mirror's `packages/` tree. URLs whose
    /// remainder is absolute or climbs out with `..` map to nothing.
    fn release_path(&self, url: &str) -> Option<PathBuf> {
        let (_, rest) = url.split_once("/packages/")?;
        let rest = rest.split(['?', '#']).next().unwrap_or(rest);
        let relative = sanitize_member_path(rest)?;
        Some(self.root.join("packages").join(relative))
    }
}

impl UriHandler for MirrorHandler {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn uri(&self) -> &ParsedUri {
        &self.uri
    }

    fn exists(&self) -> bool {
        !self.package.is_empty() && self.json_path().is_file()
    }

    fn metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("package_name", self.package.clone());
        metadata
    }

    fn get_paths(&mut self, metadata: Option<Metadata>) -> Result<LocationStream<'_>, HandlerError> {
        let document = self.document()?;
        let mut base = seed_metadata(metadata, &self.metadata());
        base.insert("package_name", document.info.name.clone());
        base.insert("package_version", document.info.version.clone());
        debug!(
            package = %document.info.name,
            version = %document.info.version,
            releases = document.urls.len(),
            "resolved mirror package"
        );

        let strip_path = self.root.to_string_lossy().into_owned();
        let handler: &MirrorHandler = self;

        let stream = document.urls.into_iter().filter_map(move |release| {
            let Some(path) = handler.release_path(&release.url) else {
                warn!(release = %release.filename, url = %release.url, "release url does not map into the mirror");
                return None;
            };
            if !path.is_file() {
                warn!(release = %release.filename, path = %path.display(), "release file missing from mirror");
                return None;
            }

            let mut metadata = base.clone();
            metadata.insert("release", release.filename.clone());
            if let Some(package_type) = &release.packagetype {
                metadata.insert("package_type", package_type.clone());
            }

            Some(
                ScanLocation::builder(&path)
                    .metadata(metadata)
                    .strip_path(strip_path.clone())
                    .build(&handler.session)
                    .map_err(HandlerError::from),
            )
        });
        Ok(Box::new(stream))
    }
}
