//! Depth-first traversal below the root locations of a handler.
//!
//! Directories are expanded into their regular files. Archives are yielded
//! and then unpacked into a temporary directory whose contents are walked
//! next. Every location passes the depth check before anything else.

use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::archive::{self, ArchiveKind, SkippedMember};
use crate::detection::Detection;
use crate::error::{ArchiveError, WalkError};
use crate::handlers::LocationStream;
use crate::location::{ChildOptions, Flow, ScanLocation};
use crate::session::ScanSession;

pub const ARCHIVE_ANOMALY: &str = "ArchiveAnomaly";

#[derive(Debug)]
pub enum ScanItem {
    /// A file ready for analysis.
    Location(ScanLocation),
    /// A structural finding raised while walking.
    Detection(Detection),
}

enum Frame {
    Pending(ScanLocation),
    Directory {
        dir: ScanLocation,
        entries: walkdir::IntoIter,
    },
}

pub struct LocationWalker<'a> {
    session: Arc<ScanSession>,
    roots: LocationStream<'a>,
    stack: Vec<Frame>,
    ready: VecDeque<ScanItem>,
}

impl<'a> LocationWalker<'a> {
    pub fn new(session: Arc<ScanSession>, roots: LocationStream<'a>) -> Self {
        Self {
            session,
            roots,
            stack: Vec::new(),
            ready: VecDeque::new(),
        }
    }

    fn visit(&mut self, location: ScanLocation) -> Result<(), WalkError> {
        if let Flow::Halted(detection) = location.should_continue() {
            self.ready.push_back(ScanItem::Detection(*detection));
            return Ok(());
        }

        if location.location().is_dir() {
            let entries = WalkDir::new(location.location())
                .follow_links(false)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter();
            self.stack.push(Frame::Directory {
                dir: location,
                entries,
            });
            return Ok(());
        }

        let kind = if self.session.config().unpack_archives {
            ArchiveKind::detect(location.location(), location.mime())
        } else {
            None
        };

        let Some(kind) = kind else {
            self.ready.push_back(ScanItem::Location(location));
            return Ok(());
        };

        let (extracted, detections) = self.unpack(&location, kind)?;
        self.ready.push_back(ScanItem::Location(location));
        self.ready
            .extend(detections.into_iter().map(ScanItem::Detection));
        if let Some(extracted) = extracted {
            self.stack.push(Frame::Pending(extracted));
        }
        Ok(())
    }

    fn unpack(
        &self,
        location: &ScanLocation,
        kind: ArchiveKind,
    ) -> Result<(Option<ScanLocation>, Vec<Detection>), WalkError> {
        let dest = self.session.create_temp_dir()?;
        let limits = &self.session.config().archive;

        let mut detections = Vec::new();
        let extracted = match archive::extract(location.location(), kind, &dest, limits) {
            Ok(summary) => {
                detections.extend(
                    summary
                        .skipped
                        .iter()
                        .map(|member| anomaly_detection(location, member)),
                );
                Some(location.create_child(&dest, ChildOptions::new().cleanup(true))?)
            }
            Err(e) => {
                warn!(location = %location, error = %e, "archive was not unpacked");
                detections.push(extraction_detection(location, &e));
                None
            }
        };

        location.post_analysis(&mut detections);
        Ok((extracted, detections))
    }
}

fn anomaly_detection(location: &ScanLocation, member: &SkippedMember) -> Detection {
    let normalized = location.to_string();
    Detection::new(
        ARCHIVE_ANOMALY,
        format!(
            "Archive member was not extracted ({})",
            member.reason.as_str()
        ),
        format!(
            "archive_anomaly#{}#{}#{}",
            member.reason.as_str(),
            normalized,
            member.name
        ),
    )
    .with_location(location.str_location())
    .with_extra("reason", member.reason.as_str())
    .with_extra("member", member.name.clone())
}

fn extraction_detection(location: &ScanLocation, error: &ArchiveError) -> Detection {
    let normalized = location.to_string();
    Detection::new(
        "DataProcessing",
        error.to_string(),
        format!("data_processing#{}#{}", error.reason(), normalized),
    )
    .with_location(location.str_location())
    .with_extra("reason", error.reason())
}

impl Iterator for LocationWalker<'_> {
    type Item = Result<ScanItem, WalkError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(Ok(item));
            }

            match self.stack.pop() {
                Some(Frame::Pending(location)) => {
                    if let Err(e) = self.visit(location) {
                        return Some(Err(e));
                    }
                }
                Some(Frame::Directory { dir, mut entries }) => {
                    let entry = match entries.next() {
                        None => {
                            debug!(directory = %dir, "directory exhausted");
                            continue;
                        }
                        Some(Err(e)) => {
                            let path = dir.location().to_path_buf();
                            self.stack.push(Frame::Directory { dir, entries });
                            return Some(Err(WalkError::DirectoryWalk { path, source: e }));
                        }
                        Some(Ok(entry)) => entry,
                    };

                    if !entry.file_type().is_file() {
                        self.stack.push(Frame::Directory { dir, entries });
                        continue;
                    }

                    let options = ChildOptions::new()
                        .parent(dir.parent().map(str::to_string))
                        .strip_path(dir.strip_path());
                    let child = dir.create_child(entry.path(), options);
                    self.stack.push(Frame::Directory { dir, entries });
                    match child {
                        Ok(child) => self.stack.push(Frame::Pending(child)),
                        Err(e) => return Some(Err(e.into())),
                    }
                }
                None => match self.roots.next()? {
                    Ok(root) => self.stack.push(Frame::Pending(root)),
                    Err(e) => return Some(Err(e.into())),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::SkipReason;
    use crate::config::AuditConfig;
    use crate::location::Metadata;
    use std::fs::{self, File};
    use std::io::Write;
    use std::path::Path;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    struct Fixture {
        root: TempDir,
        session: Arc<ScanSession>,
    }

    impl Fixture {
        fn new(config: AuditConfig) -> Self {
            let root = TempDir::new().unwrap();
            fs::create_dir_all(root.path().join("data")).unwrap();
            fs::create_dir_all(root.path().join("extract")).unwrap();
            let session = ScanSession::new(config.with_temp_dir(root.path().join("extract")));
            Self { root, session }
        }

        fn data(&self) -> std::path::PathBuf {
            self.root.path().join("data")
        }

        fn walk(&self, root: &Path) -> Vec<ScanItem> {
            let mut metadata = Metadata::new();
            metadata.set_depth(0);
            let location = ScanLocation::builder(root)
                .metadata(metadata)
                .strip_path(self.data().to_string_lossy())
                .build(&self.session)
                .unwrap();
            let roots: LocationStream<'_> = Box::new(std::iter::once(Ok(location)));
            LocationWalker::new(Arc::clone(&self.session), roots)
                .collect::<Result<_, _>>()
                .unwrap()
        }
    }

    fn zip_with(path: &Path, members: &[(&str, &[u8])]) {
        let mut writer = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, data) in members {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    fn zip_bytes(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, data) in members {
            writer
                .start_file(*name, SimpleFileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn displays(items: &[ScanItem]) -> Vec<String> {
        items
            .iter()
            .filter_map(|item| match item {
                ScanItem::Location(location) => Some(location.to_string()),
                ScanItem::Detection(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_directory_is_expanded_in_name_order() {
        let fx = Fixture::new(AuditConfig::default());
        fs::create_dir_all(fx.data().join("pkg")).unwrap();
        fs::write(fx.data().join("pkg/b.txt"), "b").unwrap();
        fs::write(fx.data().join("pkg/a.txt"), "a").unwrap();
        fs::write(fx.data().join("setup.cfg"), "[metadata]").unwrap();

        let items = fx.walk(&fx.data());
        assert_eq!(displays(&items), vec!["pkg/a.txt", "pkg/b.txt", "setup.cfg"]);

        let depths: Vec<u64> = items
            .iter()
            .filter_map(|item| match item {
                ScanItem::Location(location) => Some(location.depth()),
                ScanItem::Detection(_) => None,
            })
            .collect();
        assert_eq!(depths, vec![1, 1, 1]);
    }

    #[test]
    fn test_archive_members_render_under_archive() {
        let fx = Fixture::new(AuditConfig::default());
        let archive = fx.data().join("pkg.zip");
        zip_with(
            &archive,
            &[("pkg/__init__.py", b""), ("pkg/core.py", b"import os\n")],
        );

        let items = fx.walk(&archive);
        assert_eq!(
            displays(&items),
            vec!["pkg.zip", "pkg.zip$pkg/__init__.py", "pkg.zip$pkg/core.py"]
        );

        let ScanItem::Location(member) = &items[2] else {
            panic!("expected a location");
        };
        assert_eq!(member.depth(), 2);
        assert_eq!(member.parent(), Some("pkg.zip"));
        assert!(fx.session.is_temporary(member.location()));
    }

    #[test]
    fn test_nested_archive_keeps_chain() {
        let fx = Fixture::new(AuditConfig::default());
        let inner = zip_bytes(&[("evil.py", b"exec('x')\n")]);
        let archive = fx.data().join("outer.zip");
        zip_with(&archive, &[("inner.zip", &inner)]);

        let items = fx.walk(&archive);
        assert_eq!(
            displays(&items),
            vec!["outer.zip", "outer.zip$inner.zip", "outer.zip$inner.zip$evil.py"]
        );
    }

    #[test]
    fn test_depth_limit_halts_nested_archive() {
        let fx = Fixture::new(AuditConfig::default().with_max_depth(2));
        let inner = zip_bytes(&[("evil.py", b"exec('x')\n")]);
        let archive = fx.data().join("outer.zip");
        zip_with(&archive, &[("inner.zip", &inner)]);

        let items = fx.walk(&archive);
        assert_eq!(displays(&items), vec!["outer.zip", "outer.zip$inner.zip"]);

        let halts: Vec<&Detection> = items
            .iter()
            .filter_map(|item| match item {
                ScanItem::Detection(detection) => Some(detection),
                ScanItem::Location(_) => None,
            })
            .collect();
        assert_eq!(halts.len(), 1);
        assert_eq!(halts[0].reason(), Some("max_depth"));
        assert!(halts[0].signature.starts_with("data_processing#max_depth#"));
    }

    #[test]
    fn test_skipped_member_becomes_detection() {
        let fx = Fixture::new(AuditConfig::default());
        let archive = fx.data().join("pkg.zip");
        zip_with(&archive, &[("../escape.py", b"x"), ("ok.py", b"y = 1\n")]);

        let items = fx.walk(&archive);
        let ScanItem::Detection(detection) = &items[1] else {
            panic!("expected the anomaly right after the archive");
        };
        assert_eq!(detection.detection_type, ARCHIVE_ANOMALY);
        assert_eq!(detection.reason(), Some(SkipReason::UnsafePath.as_str()));
        assert_eq!(detection.location.as_deref(), Some("pkg.zip"));
        assert_eq!(displays(&items), vec!["pkg.zip", "pkg.zip$ok.py"]);
    }

    #[test]
    fn test_corrupt_archive_is_recorded_and_walk_continues() {
        let fx = Fixture::new(AuditConfig::default());
        fs::write(fx.data().join("a.zip"), b"definitely not a zip").unwrap();
        fs::write(fx.data().join("b.txt"), b"fine").unwrap();

        let items = fx.walk(&fx.data());
        assert_eq!(displays(&items), vec!["a.zip", "b.txt"]);
        let ScanItem::Detection(detection) = &items[1] else {
            panic!("expected the extraction failure");
        };
        assert_eq!(detection.reason(), Some("archive_corrupt"));
    }

    #[test]
    fn test_unpacking_can_be_disabled() {
        let config = AuditConfig {
            unpack_archives: false,
            ..AuditConfig::default()
        };
        let fx = Fixture::new(config);
        let archive = fx.data().join("pkg.zip");
        zip_with(&archive, &[("core.py", b"")]);

        let items = fx.walk(&archive);
        assert_eq!(displays(&items), vec!["pkg.zip"]);
        assert_eq!(fx.session.tracker().finalize().removed.len(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let fx = Fixture::new(AuditConfig::default());
        let outside = fx.root.path().join("secret.txt");
        fs::write(&outside, "secret").unwrap();
        std::os::unix::fs::symlink(&outside, fx.data().join("link.txt")).unwrap();
        fs::write(fx.data().join("real.txt"), "real").unwrap();

        let items = fx.walk(&fx.data());
        assert_eq!(displays(&items), vec!["real.txt"]);
    }
}
