use serde::Serialize;
use std::collections::BTreeSet;
use std::io::Write;

use crate::detection::Detection;
use crate::error::ReportError;
use crate::location::ScanLocation;

#[derive(Debug, Clone, Serialize)]
pub struct LocationReport {
    pub location: String,
    pub path: String,
    pub depth: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tlsh: Option<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl LocationReport {
    pub fn from_location(location: &ScanLocation) -> Self {
        let metadata = location.metadata();
        let field = |key: &str| metadata.get_str(key).map(str::to_string);

        Self {
            location: location.to_string(),
            path: location.location().to_string_lossy().into_owned(),
            depth: location.depth(),
            parent: location.parent().map(str::to_string),
            size: location.size(),
            mime: field("mime"),
            md5: field("md5"),
            sha1: field("sha1"),
            sha256: field("sha256"),
            sha512: field("sha512"),
            tlsh: field("tlsh"),
            tags: metadata.tags(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportLine {
    Location(LocationReport),
    Detection(Detection),
    Diff {
        left: LocationReport,
        right: LocationReport,
    },
}

/// Writes one JSON document per line.
pub struct ReportWriter<W: Write> {
    out: W,
    lines: usize,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, lines: 0 }
    }

    pub fn write_line(&mut self, line: &ReportLine) -> Result<(), ReportError> {
        serde_json::to_writer(&mut self.out, line)?;
        self.out.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }

    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn finish(mut self) -> Result<W, ReportError> {
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuditConfig;
    use crate::location::Metadata;
    use crate::session::ScanSession;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_location_report_carries_digests() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("abc.txt");
        fs::write(&file, "abc").unwrap();
        let session = ScanSession::new(AuditConfig::default().with_temp_dir(temp_dir.path()));
        let mut metadata = Metadata::new();
        metadata.set_depth(0);
        metadata.add_tag("sdist");
        let location = ScanLocation::builder(&file)
            .metadata(metadata)
            .strip_path(temp_dir.path().to_string_lossy())
            .build(&session)
            .unwrap();

        let report = LocationReport::from_location(&location);
        assert_eq!(report.location, "abc.txt");
        assert_eq!(report.size, Some(3));
        assert_eq!(
            report.md5.as_deref(),
            Some("900150983cd24fb0d6963f7d28e17f72")
        );
        assert!(report.tlsh.is_none());
        assert!(report.tags.contains("sdist"));
    }

    #[test]
    fn test_writer_emits_json_lines() {
        let mut writer = ReportWriter::new(Vec::new());
        let detection = Detection::new("DataProcessing", "Maximum processing depth reached", "sig");
        writer
            .write_line(&ReportLine::Detection(detection))
            .unwrap();
        assert_eq!(writer.lines(), 1);

        let out = String::from_utf8(writer.finish().unwrap()).unwrap();
        let value: serde_json::Value = serde_json::from_str(out.trim_end()).unwrap();
        assert_eq!(value["kind"], "detection");
        assert_eq!(value["detection_type"], "DataProcessing");
        assert!(out.ends_with('\n'));
    }
}
