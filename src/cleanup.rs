//! Reclamation of temporary artifacts.
//!
//! Every scan location is registered in an index-based arena when it is
//! constructed. Locations created with `cleanup = true` and paths flagged
//! directly by handlers are deleted once, when the tracker is finalized at
//! shutdown. Nothing is deleted mid-scan.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::IoError;

/// Arena index of a registered scan location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocationId(usize);

impl LocationId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct TrackedLocation {
    path: PathBuf,
    cleanup: bool,
    released: bool,
}

#[derive(Debug, Default)]
struct TrackerState {
    locations: Vec<TrackedLocation>,
    flagged: BTreeSet<PathBuf>,
}

#[derive(Debug, Default)]
pub struct CleanupTracker {
    state: Mutex<TrackerState>,
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<IoError>,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.failed.is_empty()
    }
}

impl CleanupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a location to the arena. With `cleanup` the path is also flagged
    /// right away, so it is reclaimed even if construction never finishes.
    pub fn register(&self, path: &Path, cleanup: bool) -> LocationId {
        let mut state = self.state.lock();
        if cleanup {
            state.flagged.insert(path.to_path_buf());
        }
        state.locations.push(TrackedLocation {
            path: path.to_path_buf(),
            cleanup,
            released: false,
        });
        LocationId(state.locations.len() - 1)
    }

    /// Flags a path that is not (yet) tied to a location.
    pub fn flag(&self, path: impl Into<PathBuf>) {
        self.state.lock().flagged.insert(path.into());
    }

    pub fn is_flagged(&self, path: &Path) -> bool {
        self.state.lock().flagged.contains(path)
    }

    pub fn path_of(&self, id: LocationId) -> Option<PathBuf> {
        self.state
            .lock()
            .locations
            .get(id.0)
            .map(|tracked| tracked.path.clone())
    }

    pub fn tracked(&self) -> usize {
        self.state.lock().locations.len()
    }

    /// Deletes every path marked for cleanup. Idempotent: a second call
    /// finds nothing left to do.
    pub fn finalize(&self) -> CleanupReport {
        let (instance_paths, orphans) = {
            let mut state = self.state.lock();
            let TrackerState { locations, flagged } = &mut *state;

            let mut instance_paths = Vec::new();
            for tracked in locations.iter_mut() {
                if !tracked.cleanup || tracked.released {
                    continue;
                }
                flagged.remove(&tracked.path);
                tracked.released = true;
                instance_paths.push(tracked.path.clone());
            }

            (instance_paths, std::mem::take(flagged))
        };

        let mut report = CleanupReport::default();
        for path in instance_paths.into_iter().chain(orphans) {
            match remove_tree(&path) {
                Ok(true) => {
                    debug!(path = %path.display(), "removed temporary location");
                    report.removed.push(path);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove temporary location");
                    report.failed.push(e);
                }
            }
        }
        report
    }
}

/// Runs [`CleanupTracker::finalize`] when dropped.
pub struct CleanupGuard {
    tracker: Arc<CleanupTracker>,
}

impl CleanupGuard {
    pub fn new(tracker: Arc<CleanupTracker>) -> Self {
        Self { tracker }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let report = self.tracker.finalize();
        if !report.is_empty() {
            debug!(
                removed = report.removed.len(),
                failed = report.failed.len(),
                "cleanup finished"
            );
        }
    }
}

/// Returns `Ok(false)` when the path is already gone.
fn remove_tree(path: &Path) -> Result<bool, IoError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(IoError::remove_error(path, e)),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    match result {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(IoError::remove_error(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_tree(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(dir.join("nested")).unwrap();
        fs::write(dir.join("nested").join("a.txt"), b"a").unwrap();
        dir
    }

    #[test]
    fn test_register_assigns_sequential_ids() {
        let tracker = CleanupTracker::new();
        let a = tracker.register(Path::new("/x/a"), false);
        let b = tracker.register(Path::new("/x/b"), true);
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(tracker.tracked(), 2);
        assert!(!tracker.is_flagged(Path::new("/x/a")));
        assert!(tracker.is_flagged(Path::new("/x/b")));
        assert_eq!(tracker.path_of(b), Some(PathBuf::from("/x/b")));
    }

    #[test]
    fn test_finalize_removes_only_flagged() {
        let temp_dir = TempDir::new().unwrap();
        let doomed = make_tree(temp_dir.path(), "doomed");
        let kept = make_tree(temp_dir.path(), "kept");

        let tracker = CleanupTracker::new();
        tracker.register(&doomed, true);
        tracker.register(&kept, false);

        let report = tracker.finalize();
        assert_eq!(report.removed, vec![doomed.clone()]);
        assert!(!doomed.exists());
        assert!(kept.exists());

        let second = tracker.finalize();
        assert!(second.is_empty());
    }

    #[test]
    fn test_double_registration_deletes_once() {
        let temp_dir = TempDir::new().unwrap();
        let doomed = make_tree(temp_dir.path(), "doomed");

        let tracker = CleanupTracker::new();
        tracker.register(&doomed, true);
        tracker.register(&doomed, true);
        tracker.flag(&doomed);

        let report = tracker.finalize();
        assert_eq!(report.removed.len(), 1);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn test_orphan_flags_and_files() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("download.whl");
        fs::write(&file, b"wheel").unwrap();

        let tracker = CleanupTracker::new();
        tracker.flag(&file);
        tracker.flag(temp_dir.path().join("never-created"));

        let report = tracker.finalize();
        assert_eq!(report.removed, vec![file.clone()]);
        assert!(!file.exists());
    }

    #[test]
    fn test_guard_finalizes_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let doomed = make_tree(temp_dir.path(), "doomed");
        let tracker = Arc::new(CleanupTracker::new());
        tracker.register(&doomed, true);

        {
            let _guard = CleanupGuard::new(Arc::clone(&tracker));
            assert!(doomed.exists());
        }
        assert!(!doomed.exists());
    }
}
