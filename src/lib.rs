/// pkgaudit core
///
/// Resolves package URIs into scan locations, fingerprints them, unpacks
/// nested archives under a depth limit, and reclaims every temporary
/// artifact once the scan ends.
pub mod archive;
pub mod cleanup;
pub mod cli;
pub mod config;
pub mod detection;
pub mod error;
pub mod handlers;
pub mod imports;
pub mod location;
pub mod logging;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod walker;

pub use config::AuditConfig;
pub use detection::{Detection, Severity, SeverityScorer};
pub use error::{Error, Result};
pub use handlers::{HandlerRegistry, ParsedUri, UriHandler};
pub use location::{ChildOptions, Flow, Metadata, ScanLocation};
pub use pipeline::{diff_uri, scan_uri, walk_uri, Analyzer, HandlerGuard, ScanOutcome};
pub use session::ScanSession;
pub use walker::{LocationWalker, ScanItem};
