//! Scan locations: files and directories under inspection.
//!
//! A location is built once from a path. Construction registers it with the
//! session's cleanup tracker, seeds its metadata and, for regular files,
//! fingerprints the content. Nested content is reached through
//! [`ScanLocation::create_child`], which derives depth, parent and strip
//! prefix from the containing location.

mod enrich;
pub mod fingerprint;
mod metadata;
pub mod normalize;
mod recursion;

pub use fingerprint::{detect_mime, Fingerprint};
pub use metadata::{Metadata, MetadataBuilder, PATH_SPECIFIC_KEYS};
pub use recursion::{max_depth_signature, Flow, MAX_DEPTH_REASON};

use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::cleanup::LocationId;
use crate::error::LocationError;
use crate::imports;
use crate::session::ScanSession;

const PYTHON_MIME_TYPES: &[&str] = &["text/x-python", "text/x-script.python"];

pub struct ScanLocation {
    id: LocationId,
    location: PathBuf,
    str_location: String,
    metadata: Metadata,
    cleanup: bool,
    parent: Option<String>,
    strip_path: String,
    size: Option<u64>,
    session: Arc<ScanSession>,
}

#[derive(Debug, Clone)]
pub struct LocationBuilder {
    location: PathBuf,
    metadata: Metadata,
    cleanup: bool,
    parent: Option<String>,
    strip_path: String,
}

impl LocationBuilder {
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    pub fn parent(mut self, parent: Option<String>) -> Self {
        self.parent = parent;
        self
    }

    pub fn strip_path(mut self, strip_path: impl Into<String>) -> Self {
        self.strip_path = strip_path.into();
        self
    }

    pub fn build(self, session: &Arc<ScanSession>) -> Result<ScanLocation, LocationError> {
        let str_location = self.location.to_string_lossy().into_owned();
        let location: PathBuf = self.location.components().collect();

        let id = session.tracker().register(&location, self.cleanup);

        let mut metadata = self.metadata;
        metadata.insert("path", location.to_string_lossy().into_owned());
        if !metadata.contains_key("tags") {
            metadata.insert("tags", Value::Array(Vec::new()));
        }
        if metadata.depth().is_none() {
            warn!(path = %str_location, "depth is not set for the scan location");
            metadata.set_depth(0);
        }

        let mut scan_location = ScanLocation {
            id,
            location,
            str_location,
            metadata,
            cleanup: self.cleanup,
            parent: self.parent,
            strip_path: self.strip_path,
            size: None,
            session: Arc::clone(session),
        };

        let normalized = scan_location.to_string();
        scan_location.metadata.insert("normalized_path", normalized);

        if scan_location.location.is_file() {
            scan_location.inspect_file()?;
        }

        trace!(location = %scan_location, depth = scan_location.depth(), "scan location created");
        Ok(scan_location)
    }
}

/// Overrides for [`ScanLocation::create_child`]. Unset fields use the
/// default derivation rules.
#[derive(Debug, Clone, Default)]
pub struct ChildOptions {
    parent: Option<Option<String>>,
    strip_path: Option<String>,
    cleanup: bool,
}

impl ChildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent: Option<String>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn strip_path(mut self, strip_path: impl Into<String>) -> Self {
        self.strip_path = Some(strip_path.into());
        self
    }

    pub fn cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }
}

impl ScanLocation {
    pub fn builder(location: impl AsRef<Path>) -> LocationBuilder {
        LocationBuilder {
            location: location.as_ref().to_path_buf(),
            metadata: Metadata::new(),
            cleanup: false,
            parent: None,
            strip_path: String::new(),
        }
    }

    fn inspect_file(&mut self) -> Result<(), LocationError> {
        let stat =
            fs::metadata(&self.location).map_err(|e| LocationError::metadata(&self.location, e))?;
        self.size = Some(stat.len());

        let mime = detect_mime(&self.location);
        self.metadata
            .insert("mime", mime.map(Value::String).unwrap_or(Value::Null));

        let fingerprint = Fingerprint::from_path(&self.location, self.session.config().chunk_size)
            .map_err(|e| LocationError::fingerprint(&self.location, e))?;
        fingerprint.write_to(&mut self.metadata);

        if self.session.config().find_imports
            && self.is_python_source_code()
            && !self.metadata.contains_key("no_imports")
        {
            match imports::find_imports(&self.location) {
                Ok(Some(summary)) => match serde_json::to_value(&summary) {
                    Ok(value) => {
                        self.metadata.insert("py_imports", value);
                    }
                    Err(e) => debug!(error = %e, "failed to encode imports"),
                },
                Ok(None) => {}
                Err(e) => {
                    debug!(path = %self.location.display(), error = %e, "import enumeration failed")
                }
            }
        }

        Ok(())
    }

    pub fn id(&self) -> LocationId {
        self.id
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// The path as originally given, before normalization.
    pub fn str_location(&self) -> &str {
        &self.str_location
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn cleanup(&self) -> bool {
        self.cleanup
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn strip_path(&self) -> &str {
        &self.strip_path
    }

    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub fn session(&self) -> &Arc<ScanSession> {
        &self.session
    }

    pub fn depth(&self) -> u64 {
        self.metadata.depth().unwrap_or(0)
    }

    pub fn mime(&self) -> Option<&str> {
        self.metadata.get_str("mime")
    }

    pub fn filename(&self) -> Option<&str> {
        if self.location.is_file() {
            self.location.file_name().and_then(|name| name.to_str())
        } else {
            None
        }
    }

    pub fn is_python_source_code(&self) -> bool {
        self.mime()
            .is_some_and(|mime| PYTHON_MIME_TYPES.contains(&mime))
    }

    /// Normalizes `target` against this location's strip prefix and parent.
    pub fn strip(&self, target: &str) -> String {
        normalize::strip(target, &self.strip_path, self.parent.as_deref())
    }

    /// Derives a location for `new_location`, one level deeper.
    ///
    /// Children of a directory keep the directory's parent; children of a
    /// file (an unpacked archive) report that file as their parent. A child
    /// under the temp root strips its own path for its descendants.
    pub fn create_child(
        &self,
        new_location: impl AsRef<Path>,
        options: ChildOptions,
    ) -> Result<ScanLocation, LocationError> {
        let new_location = new_location.as_ref();
        let metadata = self.metadata.for_child(self.depth() + 1);

        let parent = match options.parent {
            Some(parent) => parent,
            None if self.location.is_dir() => self.parent.clone(),
            None => Some(self.to_string()),
        };

        let strip_path = match options.strip_path {
            Some(strip_path) => strip_path,
            None if self.session.is_temporary(new_location) => {
                new_location.to_string_lossy().into_owned()
            }
            None => self.strip_path.clone(),
        };

        ScanLocation::builder(new_location)
            .metadata(metadata)
            .parent(parent)
            .strip_path(strip_path)
            .cleanup(options.cleanup)
            .build(&self.session)
    }
}

impl fmt::Display for ScanLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.strip(&self.str_location))
    }
}

impl fmt::Debug for ScanLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanLocation")
            .field("id", &self.id)
            .field("location", &self.location)
            .field("parent", &self.parent)
            .field("strip_path", &self.strip_path)
            .field("cleanup", &self.cleanup)
            .field("size", &self.size)
            .field("depth", &self.depth())
            .finish()
    }
}
