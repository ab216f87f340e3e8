//! Bounded extraction of package archives.
//!
//! Members are written beneath a destination directory only. Paths that
//! would escape it, links, and special files are skipped and reported so the
//! caller can raise them as findings.

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};

use crate::error::ArchiveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ArchiveLimits {
    pub max_total_bytes: u64,
    pub max_entry_bytes: u64,
    pub max_entries: u64,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_total_bytes: 1024 * 1024 * 1024,
            max_entry_bytes: 256 * 1024 * 1024,
            max_entries: 100_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveKind {
    /// Recognizes an archive by file name first, then by content type.
    pub fn detect(path: &Path, mime: Option<&str>) -> Option<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            return Some(Self::TarGz);
        }
        if name.ends_with(".tar") {
            return Some(Self::Tar);
        }
        if [".zip", ".whl", ".egg", ".jar"]
            .iter()
            .any(|ext| name.ends_with(ext))
        {
            return Some(Self::Zip);
        }

        match mime? {
            "application/zip" | "application/java-archive" => Some(Self::Zip),
            "application/x-tar" => Some(Self::Tar),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    UnsafePath,
    Link,
    Special,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnsafePath => "unsafe_path",
            Self::Link => "link",
            Self::Special => "special_file",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedMember {
    pub name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Default)]
pub struct ExtractSummary {
    pub files: u64,
    pub bytes: u64,
    pub skipped: Vec<SkippedMember>,
}

/// Turns an archive member name into a relative path, or `None` when the
/// name is absolute, climbs out with `..`, or is empty.
pub fn sanitize_member_path(name: &str) -> Option<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut out = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

struct Budget<'a> {
    archive: &'a Path,
    limits: &'a ArchiveLimits,
    entries: u64,
    bytes: u64,
}

impl<'a> Budget<'a> {
    fn new(archive: &'a Path, limits: &'a ArchiveLimits) -> Self {
        Self {
            archive,
            limits,
            entries: 0,
            bytes: 0,
        }
    }

    fn admit_entry(&mut self) -> Result<(), ArchiveError> {
        self.entries += 1;
        if self.entries > self.limits.max_entries {
            return Err(ArchiveError::limit_exceeded(
                self.archive,
                "entry count",
                self.entries,
                self.limits.max_entries,
            ));
        }
        Ok(())
    }

    /// Copies one member, failing as soon as either byte limit is crossed.
    fn copy(&mut self, member: &str, reader: &mut dyn Read, dest: &Path) -> Result<u64, ArchiveError> {
        let remaining = self.limits.max_total_bytes.saturating_sub(self.bytes);
        let allowed = remaining.min(self.limits.max_entry_bytes);

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ArchiveError::extract(self.archive, member, e))?;
        }
        let mut out =
            File::create(dest).map_err(|e| ArchiveError::extract(self.archive, member, e))?;
        let written = io::copy(&mut reader.take(allowed.saturating_add(1)), &mut out)
            .map_err(|e| ArchiveError::extract(self.archive, member, e))?;

        if written > allowed {
            return Err(if allowed == self.limits.max_entry_bytes {
                ArchiveError::limit_exceeded(
                    self.archive,
                    "entry size",
                    written,
                    self.limits.max_entry_bytes,
                )
            } else {
                ArchiveError::limit_exceeded(
                    self.archive,
                    "total size",
                    self.bytes + written,
                    self.limits.max_total_bytes,
                )
            });
        }

        self.bytes += written;
        Ok(written)
    }
}

pub fn extract(
    archive: &Path,
    kind: ArchiveKind,
    dest: &Path,
    limits: &ArchiveLimits,
) -> Result<ExtractSummary, ArchiveError> {
    debug!(archive = %archive.display(), kind = kind.as_str(), dest = %dest.display(), "extracting archive");

    let file = File::open(archive).map_err(|e| ArchiveError::open(archive, e))?;
    let summary = match kind {
        ArchiveKind::Zip => extract_zip(archive, file, dest, limits)?,
        ArchiveKind::Tar => extract_tar(archive, file, dest, limits)?,
        ArchiveKind::TarGz => extract_tar(archive, GzDecoder::new(file), dest, limits)?,
    };

    debug!(
        archive = %archive.display(),
        files = summary.files,
        bytes = summary.bytes,
        skipped = summary.skipped.len(),
        "archive extracted"
    );
    Ok(summary)
}

fn is_symlink_mode(mode: u32) -> bool {
    mode & 0o170000 == 0o120000
}

fn extract_zip(
    archive: &Path,
    file: File,
    dest: &Path,
    limits: &ArchiveLimits,
) -> Result<ExtractSummary, ArchiveError> {
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| ArchiveError::corrupt(archive, e.to_string()))?;
    let mut budget = Budget::new(archive, limits);
    let mut summary = ExtractSummary::default();

    for index in 0..zip.len() {
        let mut member = zip
            .by_index(index)
            .map_err(|e| ArchiveError::corrupt(archive, e.to_string()))?;
        let name = member.name().to_string();
        budget.admit_entry()?;

        let Some(relative) = sanitize_member_path(&name) else {
            trace!(member = %name, "skipping unsafe member path");
            summary.skipped.push(SkippedMember {
                name,
                reason: SkipReason::UnsafePath,
            });
            continue;
        };

        if member.unix_mode().is_some_and(is_symlink_mode) {
            summary.skipped.push(SkippedMember {
                name,
                reason: SkipReason::Link,
            });
            continue;
        }

        let target = dest.join(&relative);
        if member.is_dir() {
            fs::create_dir_all(&target).map_err(|e| ArchiveError::extract(archive, &name, e))?;
            continue;
        }

        let written = budget.copy(&name, &mut member, &target)?;
        summary.files += 1;
        summary.bytes += written;
    }

    Ok(summary)
}

fn extract_tar<R: Read>(
    archive: &Path,
    reader: R,
    dest: &Path,
    limits: &ArchiveLimits,
) -> Result<ExtractSummary, ArchiveError> {
    let mut tar = tar::Archive::new(reader);
    let mut budget = Budget::new(archive, limits);
    let mut summary = ExtractSummary::default();

    let entries = tar
        .entries()
        .map_err(|e| ArchiveError::corrupt(archive, e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| ArchiveError::corrupt(archive, e.to_string()))?;
        let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let entry_type = entry.header().entry_type();

        // pax and GNU long-name records are folded into the following entry
        if entry_type.is_pax_global_extensions()
            || entry_type.is_pax_local_extensions()
            || entry_type.is_gnu_longname()
            || entry_type.is_gnu_longlink()
        {
            continue;
        }
        budget.admit_entry()?;

        let Some(relative) = sanitize_member_path(&name) else {
            trace!(member = %name, "skipping unsafe member path");
            summary.skipped.push(SkippedMember {
                name,
                reason: SkipReason::UnsafePath,
            });
            continue;
        };

        if entry_type.is_symlink() || entry_type.is_hard_link() {
            summary.skipped.push(SkippedMember {
                name,
                reason: SkipReason::Link,
            });
            continue;
        }

        let target = dest.join(&relative);
        if entry_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| ArchiveError::extract(archive, &name, e))?;
            continue;
        }
        if !entry_type.is_file() && !entry_type.is_contiguous() {
            summary.skipped.push(SkippedMember {
                name,
                reason: SkipReason::Special,
            });
            continue;
        }

        let written = budget.copy(&name, &mut entry, &target)?;
        summary.files += 1;
        summary.bytes += written;
    }

    Ok(summary)
}
