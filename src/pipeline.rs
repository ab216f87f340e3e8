//! Drives one URI from resolution to cleanup.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::detection::Detection;
use crate::error::{HandlerError, IoError, ScanError};
use crate::handlers::{HandlerRegistry, LocationPair, UriHandler};
use crate::location::{Metadata, ScanLocation};
use crate::walker::{LocationWalker, ScanItem};

/// Produces detections for one location.
pub trait Analyzer {
    fn analyze(&mut self, location: &ScanLocation) -> anyhow::Result<Vec<Detection>>;
}

impl<F> Analyzer for F
where
    F: FnMut(&ScanLocation) -> anyhow::Result<Vec<Detection>>,
{
    fn analyze(&mut self, location: &ScanLocation) -> anyhow::Result<Vec<Detection>> {
        self(location)
    }
}

/// Owns a resolved handler and calls its `cleanup` exactly once.
pub struct HandlerGuard {
    handler: Box<dyn UriHandler>,
    released: bool,
}

impl HandlerGuard {
    pub fn new(handler: Box<dyn UriHandler>) -> Self {
        Self {
            handler,
            released: false,
        }
    }

    /// Runs the handler cleanup now. Dropping the guard afterwards does
    /// nothing.
    pub fn release(&mut self) -> Result<(), IoError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.handler.cleanup()
    }
}

impl Deref for HandlerGuard {
    type Target = dyn UriHandler;

    fn deref(&self) -> &Self::Target {
        self.handler.as_ref()
    }
}

impl DerefMut for HandlerGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.handler.as_mut()
    }
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(uri = %self.handler.uri(), error = %e, "handler cleanup failed");
        }
    }
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Display paths of analyzed locations, in walk order.
    pub scanned: Vec<String>,
    pub detections: Vec<Detection>,
}

fn open(registry: &HandlerRegistry, uri: &str) -> Result<HandlerGuard, ScanError> {
    let handler = registry
        .resolve(uri)
        .ok_or_else(|| ScanError::no_handler(uri))?;
    let handler = HandlerGuard::new(handler);
    if !handler.exists() {
        return Err(HandlerError::invalid_location(uri).into());
    }
    Ok(handler)
}

fn input_metadata(metadata: Option<Metadata>, handler: &dyn UriHandler) -> Metadata {
    let mut metadata = metadata.unwrap_or_default();
    let uri = handler.uri();
    metadata.insert("name", uri.raw().to_string());
    metadata.insert("uri_scheme", handler.scheme().to_string());
    metadata.insert("uri_input", uri.target());
    if metadata.depth().is_none() {
        metadata.set_depth(0);
    }
    metadata
}

/// Walks every location below `uri`, handing each item to `visit`.
pub fn walk_uri<F>(
    registry: &HandlerRegistry,
    uri: &str,
    metadata: Option<Metadata>,
    visit: F,
) -> Result<(), ScanError>
where
    F: FnMut(ScanItem) -> Result<(), ScanError>,
{
    let result = walk_handler(registry, uri, metadata, visit);
    if let Err(e) = &result {
        error!(uri, error = %e, "scan failed");
    }
    result
}

fn walk_handler<F>(
    registry: &HandlerRegistry,
    uri: &str,
    metadata: Option<Metadata>,
    mut visit: F,
) -> Result<(), ScanError>
where
    F: FnMut(ScanItem) -> Result<(), ScanError>,
{
    let mut handler = open(registry, uri)?;
    let metadata = input_metadata(metadata, &*handler);
    let session = Arc::clone(registry.session());

    let roots = handler.get_paths(Some(metadata))?;
    for item in LocationWalker::new(session, roots) {
        visit(item?)?;
    }
    Ok(())
}

/// Runs `analyzer` on every location below `uri` and collects the
/// enriched detections, including any halts raised while walking.
pub fn scan_uri(
    registry: &HandlerRegistry,
    uri: &str,
    metadata: Option<Metadata>,
    analyzer: &mut dyn Analyzer,
) -> Result<ScanOutcome, ScanError> {
    let mut outcome = ScanOutcome::default();

    walk_uri(registry, uri, metadata, |item| {
        match item {
            ScanItem::Location(location) => {
                let display = location.to_string();
                let mut detections = analyzer
                    .analyze(&location)
                    .map_err(|e| ScanError::analyzer(display.clone(), e))?;
                location.post_analysis(&mut detections);
                outcome.scanned.push(display);
                outcome.detections.extend(detections);
            }
            ScanItem::Detection(detection) => outcome.detections.push(detection),
        }
        Ok(())
    })?;

    debug!(
        uri,
        scanned = outcome.scanned.len(),
        detections = outcome.detections.len(),
        "scan finished"
    );
    Ok(outcome)
}

/// Pairs the root locations of two URIs for comparison.
pub fn diff_uri(
    registry: &HandlerRegistry,
    uri_a: &str,
    uri_b: &str,
) -> Result<Vec<LocationPair>, ScanError> {
    let (left, right) = registry
        .resolve_pair(uri_a, uri_b)
        .ok_or_else(|| ScanError::no_handler(format!("{uri_a} | {uri_b}")))?;
    let mut left = HandlerGuard::new(left);
    let mut right = HandlerGuard::new(right);

    for (handler, uri) in [(&left, uri_a), (&right, uri_b)] {
        if !handler.exists() {
            return Err(HandlerError::invalid_location(uri).into());
        }
    }

    let pairs = left
        .get_diff_paths(&mut *right)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::error::FeatureDisabled;
    use crate::handlers::{HandlerProvider, LocationStream, ParsedUri, PluginEntry};
    use crate::session::ScanSession;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    static SCAN_CLEANUPS: AtomicUsize = AtomicUsize::new(0);
    static GUARD_CLEANUPS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug)]
    struct CountingProvider;

    struct CountingHandler {
        uri: ParsedUri,
        session: Arc<ScanSession>,
        cleanups: &'static AtomicUsize,
    }

    impl HandlerProvider for CountingProvider {
        fn scheme(&self) -> &'static str {
            "counting"
        }

        fn open(&self, uri: ParsedUri, session: Arc<ScanSession>) -> Box<dyn UriHandler> {
            Box::new(CountingHandler {
                uri,
                session,
                cleanups: &SCAN_CLEANUPS,
            })
        }
    }

    impl UriHandler for CountingHandler {
        fn scheme(&self) -> &str {
            "counting"
        }

        fn uri(&self) -> &ParsedUri {
            &self.uri
        }

        fn exists(&self) -> bool {
            true
        }

        fn get_paths(
            &mut self,
            metadata: Option<Metadata>,
        ) -> Result<LocationStream<'_>, HandlerError> {
            let path = self.uri.target();
            let session = Arc::clone(&self.session);
            Ok(Box::new(std::iter::once_with(move || {
                ScanLocation::builder(path)
                    .metadata(metadata.unwrap_or_default())
                    .build(&session)
                    .map_err(HandlerError::from)
            })))
        }

        fn cleanup(&mut self) -> Result<(), IoError> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn load_counting(_: &AuditConfig) -> Result<Arc<dyn HandlerProvider>, FeatureDisabled> {
        Ok(Arc::new(CountingProvider))
    }

    fn registry(temp_dir: &TempDir) -> HandlerRegistry {
        let tmp = temp_dir.path().join("tmp");
        fs::create_dir_all(&tmp).unwrap();
        HandlerRegistry::new(ScanSession::new(AuditConfig::default().with_temp_dir(tmp)))
    }

    fn no_detections(_: &ScanLocation) -> anyhow::Result<Vec<Detection>> {
        Ok(Vec::new())
    }

    #[test]
    fn test_scan_uri_enriches_analyzer_output() {
        let temp_dir = TempDir::new().unwrap();
        let pkg = temp_dir.path().join("pkg");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(pkg.join("setup.py"), "import os\nos.system('id')\n").unwrap();
        let registry = registry(&temp_dir);

        let mut analyzer = |location: &ScanLocation| -> anyhow::Result<Vec<Detection>> {
            if location.filename() != Some("setup.py") {
                return Ok(Vec::new());
            }
            Ok(vec![Detection::new(
                "FunctionCall",
                "os.system call",
                "function_call#os.system",
            )
            .with_line_no(2)])
        };

        let outcome =
            scan_uri(&registry, pkg.to_str().unwrap(), None, &mut analyzer).unwrap();

        assert_eq!(outcome.scanned, vec!["setup.py"]);
        let detection = &outcome.detections[0];
        assert_eq!(detection.location.as_deref(), Some("setup.py"));
        assert_eq!(detection.line.as_deref(), Some("os.system('id')"));
        let metadata = detection.metadata.as_ref().unwrap();
        assert_eq!(metadata.get_str("uri_scheme"), Some("file"));
        assert_eq!(metadata.get_str("name"), Some(pkg.to_str().unwrap()));
    }

    #[test]
    fn test_missing_target_is_invalid_location() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        let err = scan_uri(&registry, "/no/such/package", None, &mut no_detections).unwrap_err();
        assert!(matches!(
            err,
            ScanError::Handler(HandlerError::InvalidLocation { .. })
        ));
    }

    #[test]
    fn test_no_handler() {
        let temp_dir = TempDir::new().unwrap();
        let config = AuditConfig {
            handlers: Some(Vec::new()),
            ..AuditConfig::default().with_temp_dir(temp_dir.path())
        };
        let registry = HandlerRegistry::new(ScanSession::new(config));

        let err = scan_uri(&registry, "/tmp", None, &mut no_detections).unwrap_err();
        assert!(matches!(err, ScanError::NoHandler { .. }));
    }

    #[test]
    fn test_handler_cleanup_runs_once_on_failure() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("a.txt");
        fs::write(&file, "a").unwrap();
        let plugins = vec![PluginEntry {
            name: "counting",
            load: load_counting,
        }];
        let config = AuditConfig::default().with_temp_dir(temp_dir.path());
        let registry = HandlerRegistry::with_plugins(ScanSession::new(config), plugins);

        let mut failing = |_: &ScanLocation| -> anyhow::Result<Vec<Detection>> {
            anyhow::bail!("analyzer exploded")
        };
        let uri = format!("counting://{}", file.display());
        let err = scan_uri(&registry, &uri, None, &mut failing).unwrap_err();

        assert!(matches!(err, ScanError::Analyzer { .. }));
        assert_eq!(SCAN_CLEANUPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_release_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let session = ScanSession::new(AuditConfig::default().with_temp_dir(temp_dir.path()));
        let handler = CountingHandler {
            uri: ParsedUri::parse("counting://x"),
            session,
            cleanups: &GUARD_CLEANUPS,
        };

        let mut guard = HandlerGuard::new(Box::new(handler));
        guard.release().unwrap();
        guard.release().unwrap();
        drop(guard);

        assert_eq!(GUARD_CLEANUPS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_diff_local_paths() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.py");
        let b = temp_dir.path().join("b.py");
        fs::write(&a, "x = 1\n").unwrap();
        fs::write(&b, "x = 2\n").unwrap();
        let registry = registry(&temp_dir);

        let pairs = diff_uri(&registry, a.to_str().unwrap(), b.to_str().unwrap()).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_ne!(
            pairs[0].0.metadata().get_str("sha256"),
            pairs[0].1.metadata().get_str("sha256")
        );
    }
}
