use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::archive::ArchiveLimits;
use crate::detection::Severity;
use crate::error::ConfigError;

pub const DEFAULT_MAX_DEPTH: u64 = 5;
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AuditConfig {
    /// Locations nested deeper than this are halted with a detection.
    pub max_depth: u64,
    /// Root for temporary extraction directories.
    pub temp_dir: PathBuf,
    /// Read size used while fingerprinting.
    pub chunk_size: usize,
    pub find_imports: bool,
    pub unpack_archives: bool,
    /// Plugin names to load, in order. `None` loads every built-in plugin.
    pub handlers: Option<Vec<String>>,
    pub mirror_root: Option<PathBuf>,
    pub archive: ArchiveLimits,
    pub severities: BTreeMap<String, Severity>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            temp_dir: std::env::temp_dir(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            find_imports: true,
            unpack_archives: true,
            handlers: None,
            mirror_root: None,
            archive: ArchiveLimits::default(),
            severities: BTreeMap::new(),
        }
    }
}

impl AuditConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading config");

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::read_error(path, e.to_string()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Self = match extension {
            "json" => serde_json::from_str(&content)
                .map_err(|e| ConfigError::parse_error(path, e.to_string()))?,
            "yaml" | "yml" => serde_yaml::from_str(&content)
                .map_err(|e| ConfigError::parse_error(path, e.to_string()))?,
            _ => return Err(ConfigError::unsupported_format(extension)),
        };

        config.validate()?;
        trace!(?config, "config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::invalid_value(
                "chunk-size",
                "must be greater than zero",
            ));
        }
        if self.temp_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid_value("temp-dir", "must not be empty"));
        }
        Ok(())
    }

    pub fn with_max_depth(mut self, max_depth: u64) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn with_mirror_root(mut self, mirror_root: impl Into<PathBuf>) -> Self {
        self.mirror_root = Some(mirror_root.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AuditConfig::default();
        assert_eq!(config.max_depth, 5);
        assert_eq!(config.chunk_size, 4096);
        assert!(config.unpack_archives);
        assert!(config.handlers.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_yaml_partial() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pkgaudit.yaml");
        fs::write(
            &path,
            "max-depth: 2\nhandlers: [local]\nseverities:\n  DataProcessing: low\n",
        )
        .unwrap();

        let config = AuditConfig::load(&path).unwrap();
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.handlers, Some(vec!["local".to_string()]));
        assert_eq!(config.severities["DataProcessing"], Severity::Low);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_load_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pkgaudit.json");
        fs::write(&path, r#"{"mirror-root": "/srv/mirror", "unpack-archives": false}"#).unwrap();

        let config = AuditConfig::load(&path).unwrap();
        assert_eq!(config.mirror_root, Some(PathBuf::from("/srv/mirror")));
        assert!(!config.unpack_archives);
    }

    #[test]
    fn test_load_rejects_unknown_extension() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pkgaudit.ini");
        fs::write(&path, "max-depth = 1").unwrap();

        let err = AuditConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_validate_zero_chunk() {
        let config = AuditConfig {
            chunk_size: 0,
            ..AuditConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
