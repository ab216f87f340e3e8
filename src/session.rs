use std::fmt;
use std::path::{self, Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::cleanup::{CleanupGuard, CleanupTracker};
use crate::config::AuditConfig;
use crate::detection::{ConfiguredScorer, SeverityScorer};
use crate::error::IoError;

const TEMP_DIR_PREFIX: &str = "pkgaudit_";

/// Process-level context shared by the registry, handlers and locations.
pub struct ScanSession {
    config: AuditConfig,
    tracker: Arc<CleanupTracker>,
    scorer: Box<dyn SeverityScorer>,
}

impl ScanSession {
    pub fn new(config: AuditConfig) -> Arc<Self> {
        let scorer = ConfiguredScorer::new(config.severities.clone());
        Self::with_scorer(config, Box::new(scorer))
    }

    pub fn with_scorer(mut config: AuditConfig, scorer: Box<dyn SeverityScorer>) -> Arc<Self> {
        // extracted paths become strip prefixes, which must be absolute
        if let Ok(temp_dir) = path::absolute(&config.temp_dir) {
            config.temp_dir = temp_dir;
        }
        Arc::new(Self {
            config,
            tracker: Arc::new(CleanupTracker::new()),
            scorer,
        })
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<CleanupTracker> {
        &self.tracker
    }

    pub fn scorer(&self) -> &dyn SeverityScorer {
        self.scorer.as_ref()
    }

    pub fn max_depth(&self) -> u64 {
        self.config.max_depth
    }

    pub fn temp_root(&self) -> &Path {
        &self.config.temp_dir
    }

    pub fn is_temporary(&self, path: &Path) -> bool {
        path.starts_with(self.temp_root())
    }

    /// Guard that reclaims temporary artifacts when dropped.
    pub fn cleanup_guard(&self) -> CleanupGuard {
        CleanupGuard::new(Arc::clone(&self.tracker))
    }

    /// Creates a fresh directory under the temp root and flags it for
    /// cleanup before returning.
    pub fn create_temp_dir(&self) -> Result<PathBuf, IoError> {
        let root = self.temp_root();
        let dir = tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir_in(root)
            .map_err(|e| IoError::temp_dir_error(root, e))?
            .keep();
        self.tracker.flag(&dir);
        debug!(path = %dir.display(), "created temporary directory");
        Ok(dir)
    }
}

impl fmt::Debug for ScanSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanSession")
            .field("config", &self.config)
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}
