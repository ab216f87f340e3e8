//! Findings produced against a scan location.
//!
//! Analyzers live outside this crate; they hand back [`Detection`]s with only
//! the fields they know about. The owning location fills in the rest during
//! post-analysis enrichment.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::cleanup::LocationId;
use crate::location::Metadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Unknown => "unknown",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub detection_type: String,
    pub message: String,
    pub signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_no: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    pub tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip)]
    pub scan_location: Option<LocationId>,
    #[serde(skip)]
    pub metadata: Option<Metadata>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Detection {
    pub fn new(
        detection_type: impl Into<String>,
        message: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            detection_type: detection_type.into(),
            message: message.into(),
            signature: signature.into(),
            location: None,
            line_no: None,
            line: None,
            tags: BTreeSet::new(),
            severity: None,
            scan_location: None,
            metadata: None,
            extra: Map::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_line_no(mut self, line_no: usize) -> Self {
        self.line_no = Some(line_no);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Value of `extra["reason"]`, set on structural detections.
    pub fn reason(&self) -> Option<&str> {
        self.extra.get("reason").and_then(Value::as_str)
    }
}

/// Computes the severity of an enriched detection.
pub trait SeverityScorer: Send + Sync {
    fn score(&self, detection: &Detection) -> Severity;
}

/// Looks the detection type up in a configured table.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredScorer {
    by_type: BTreeMap<String, Severity>,
    fallback: Severity,
}

impl ConfiguredScorer {
    pub fn new(by_type: BTreeMap<String, Severity>) -> Self {
        Self {
            by_type,
            fallback: Severity::Unknown,
        }
    }

    pub fn with_fallback(mut self, fallback: Severity) -> Self {
        self.fallback = fallback;
        self
    }
}

impl SeverityScorer for ConfiguredScorer {
    fn score(&self, detection: &Detection) -> Severity {
        self.by_type
            .get(&detection.detection_type)
            .copied()
            .unwrap_or(self.fallback)
    }
}
