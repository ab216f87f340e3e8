//! URI handlers turn a user supplied URI into root scan locations.
//!
//! Each handler type is exposed through a [`HandlerProvider`] registered in
//! a static plugin table. The [`HandlerRegistry`] loads the table once and
//! matches URIs against the loaded providers by scheme.

pub mod local;
pub mod mirror;
mod registry;
mod uri;

pub use registry::{builtin_plugins, HandlerRegistry, PluginEntry};
pub use uri::ParsedUri;

use std::fmt;
use std::sync::Arc;

use crate::error::{HandlerError, IoError};
use crate::location::{Metadata, ScanLocation};
use crate::session::ScanSession;

/// Lazily produced root locations.
pub type LocationStream<'a> = Box<dyn Iterator<Item = Result<ScanLocation, HandlerError>> + 'a>;

/// A pair of locations compared in diff mode.
pub type LocationPair = (ScanLocation, ScanLocation);

pub type DiffStream<'a> = Box<dyn Iterator<Item = Result<LocationPair, HandlerError>> + 'a>;

pub trait UriHandler {
    fn scheme(&self) -> &str;

    fn uri(&self) -> &ParsedUri;

    /// Whether the resolved target is reachable.
    fn exists(&self) -> bool;

    /// Static metadata merged into every location this handler produces.
    fn metadata(&self) -> Metadata {
        Metadata::new()
    }

    fn get_paths(&mut self, metadata: Option<Metadata>) -> Result<LocationStream<'_>, HandlerError>;

    fn get_diff_paths<'a>(
        &'a mut self,
        _other: &'a mut dyn UriHandler,
    ) -> Result<DiffStream<'a>, HandlerError> {
        Err(HandlerError::unsupported_diff(self.scheme()))
    }

    /// Releases resources held by the handler itself.
    fn cleanup(&mut self) -> Result<(), IoError> {
        Ok(())
    }
}

pub trait HandlerProvider: fmt::Debug + Send + Sync {
    fn scheme(&self) -> &'static str;

    /// The default provider handles URIs no other scheme claims.
    fn is_default(&self) -> bool {
        false
    }

    fn is_supported(&self, uri: &ParsedUri) -> bool {
        uri.scheme() == self.scheme()
    }

    fn open(&self, uri: ParsedUri, session: Arc<ScanSession>) -> Box<dyn UriHandler>;
}

/// Merges handler metadata under the caller's and makes sure a depth is set.
pub(crate) fn seed_metadata(metadata: Option<Metadata>, handler: &Metadata) -> Metadata {
    let mut seeded = metadata.unwrap_or_default();
    for (key, value) in handler.as_map() {
        if !seeded.contains_key(key) {
            seeded.insert(key.clone(), value.clone());
        }
    }
    if seeded.depth().is_none() {
        seeded.set_depth(0);
    }
    seeded
}
