use tracing::debug;

use super::ScanLocation;
use crate::detection::Detection;

pub const MAX_DEPTH_REASON: &str = "max_depth";

/// Outcome of the recursion check for one location.
#[derive(Debug, Clone)]
pub enum Flow {
    Continue,
    /// Stop here and record the attached finding.
    Halted(Box<Detection>),
}

impl Flow {
    pub fn is_continue(&self) -> bool {
        matches!(self, Flow::Continue)
    }

    pub fn into_detection(self) -> Option<Detection> {
        match self {
            Flow::Continue => None,
            Flow::Halted(detection) => Some(*detection),
        }
    }
}

/// Signature of a depth halt. Depends only on the display path so repeated
/// runs deduplicate.
pub fn max_depth_signature(normalized_path: &str) -> String {
    format!("data_processing#{MAX_DEPTH_REASON}#{normalized_path}")
}

impl ScanLocation {
    /// Checks the configured depth limit.
    pub fn should_continue(&self) -> Flow {
        let max_depth = self.session.max_depth();
        let depth = self.depth();
        if depth <= max_depth {
            return Flow::Continue;
        }

        let normalized = self.to_string();
        debug!(location = %normalized, depth, max_depth, "maximum processing depth reached");

        let mut detections = [Detection::new(
            "DataProcessing",
            "Maximum processing depth reached",
            max_depth_signature(&normalized),
        )
        .with_location(self.str_location())
        .with_extra("reason", MAX_DEPTH_REASON)
        .with_extra("location", normalized)];

        self.post_analysis(&mut detections);
        let [detection] = detections;
        Flow::Halted(Box::new(detection))
    }
}
