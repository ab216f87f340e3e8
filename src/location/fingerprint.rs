//! Content fingerprinting.
//!
//! One streaming pass feeds every digest, so memory stays bounded by the
//! chunk size whatever the file size.

use file_format::FileFormat;
use md5::Md5;
use serde::Serialize;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::Path;
use tlsh2::TlshDefaultBuilder;
use tracing::trace;

use super::Metadata;

/// TLSH is undefined below this many input bytes.
pub const TLSH_MIN_INPUT: u64 = 256;

/// Content types too vague to keep when the extension says more.
const GENERIC_MIME_TYPES: &[&str] = &[
    "text/plain",
    "application/octet-stream",
    "application/x-empty",
    "text/none",
];

/// Extensions `mime_guess` reports as plain text or not at all.
const PYTHON_EXTENSIONS: &[(&str, &str)] = &[
    ("py", "text/x-python"),
    ("pyw", "text/x-python"),
    ("pyc", "application/x-python-code"),
    ("pyo", "application/x-python-code"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    pub md5: String,
    pub sha1: String,
    pub sha256: String,
    pub sha512: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tlsh: Option<String>,
    pub size: u64,
}

impl Fingerprint {
    pub fn from_path(path: &Path, chunk_size: usize) -> io::Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file, chunk_size)
    }

    pub fn from_reader<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<Self> {
        let mut buffer = vec![0u8; chunk_size.max(1)];
        let mut md5 = Md5::new();
        let mut sha1 = Sha1::new();
        let mut sha256 = Sha256::new();
        let mut sha512 = Sha512::new();
        let mut tlsh = TlshDefaultBuilder::new();
        let mut size = 0u64;

        loop {
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            let chunk = &buffer[..read];
            md5.update(chunk);
            sha1.update(chunk);
            sha256.update(chunk);
            sha512.update(chunk);
            tlsh.update(chunk);
            size += read as u64;
        }

        let tlsh = if size < TLSH_MIN_INPUT {
            trace!(size, "input too small for tlsh");
            None
        } else {
            tlsh.build()
                .map(|hash| String::from_utf8_lossy(&hash.hash()).into_owned())
        };

        Ok(Self {
            md5: hex::encode(md5.finalize()),
            sha1: hex::encode(sha1.finalize()),
            sha256: hex::encode(sha256.finalize()),
            sha512: hex::encode(sha512.finalize()),
            tlsh,
            size,
        })
    }

    pub fn write_to(&self, metadata: &mut Metadata) {
        metadata.insert("md5", self.md5.as_str());
        metadata.insert("sha1", self.sha1.as_str());
        metadata.insert("sha256", self.sha256.as_str());
        metadata.insert("sha512", self.sha512.as_str());
        if let Some(tlsh) = &self.tlsh {
            metadata.insert("tlsh", tlsh.as_str());
        }
    }
}

/// Detects a MIME type by content, falling back to the file extension when
/// inspection only yields a generic type.
pub fn detect_mime(path: &Path) -> Option<String> {
    let inspected = FileFormat::from_file(path)
        .ok()
        .map(|format| format.media_type().to_string());

    match inspected {
        Some(mime) if !GENERIC_MIME_TYPES.contains(&mime.as_str()) => Some(mime),
        inspected => mime_from_extension(path).or(inspected),
    }
}

fn mime_from_extension(path: &Path) -> Option<String> {
    let extension = path.extension().and_then(|e| e.to_str())?.to_ascii_lowercase();
    PYTHON_EXTENSIONS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| mime.to_string())
        .or_else(|| mime_guess::from_ext(&extension).first_raw().map(str::to_string))
}
