use pkgaudit_core::{AuditConfig, HandlerRegistry, ScanSession};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

#[allow(dead_code)]
pub fn get_test_fixture_path(kind: &str, fixture_name: Option<&str>) -> PathBuf {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(kind);
    match fixture_name {
        Some(fixture_name) => base.join(fixture_name),
        None => base,
    }
}

/// A scratch directory with a dedicated temp root for extraction.
pub struct Workspace {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("tmp")).unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        Self { dir }
    }

    pub fn temp_root(&self) -> PathBuf {
        self.dir.path().join("tmp")
    }

    pub fn data(&self) -> PathBuf {
        self.dir.path().join("data")
    }

    pub fn config(&self) -> AuditConfig {
        AuditConfig::default().with_temp_dir(self.temp_root())
    }

    pub fn session(&self) -> Arc<ScanSession> {
        ScanSession::new(self.config())
    }

    pub fn registry(&self, config: AuditConfig) -> HandlerRegistry {
        HandlerRegistry::new(ScanSession::new(config))
    }

    /// Entries left under the temp root.
    pub fn leftovers(&self) -> Vec<PathBuf> {
        fs::read_dir(self.temp_root())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect()
    }
}

#[allow(dead_code)]
pub fn zip_bytes(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for (name, data) in members {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

#[allow(dead_code)]
pub fn write_zip(path: &Path, members: &[(&str, &[u8])]) {
    let mut file = File::create(path).unwrap();
    file.write_all(&zip_bytes(members)).unwrap();
}
