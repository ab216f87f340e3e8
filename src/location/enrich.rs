use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::debug;

use super::ScanLocation;
use crate::detection::Detection;

impl ScanLocation {
    /// Fills in whatever the analyzer left unset on each detection. Fields
    /// that are already set are kept, so calling this twice is harmless.
    pub fn post_analysis(&self, detections: &mut [Detection]) {
        let wanted: BTreeSet<usize> = detections
            .iter()
            .filter(|d| d.line.is_none())
            .filter_map(|d| d.line_no)
            .collect();

        let mut lines = HashMap::new();
        if !wanted.is_empty() && self.location.is_file() {
            match lookup_lines(&self.location, &wanted) {
                Ok(found) => lines = found,
                Err(e) => {
                    debug!(path = %self.location.display(), error = %e, "failed to look up source lines")
                }
            }
        }

        let tags = self.metadata.tags();
        let scorer = self.session.scorer();

        for detection in detections.iter_mut() {
            detection.tags.extend(tags.iter().cloned());

            detection.location = Some(match detection.location.take() {
                Some(location) => self.strip(&location),
                None => self.to_string(),
            });

            if detection.scan_location.is_none() {
                detection.scan_location = Some(self.id);
            }

            if detection.line.is_none() {
                if let Some(line) = detection.line_no.and_then(|no| lines.get(&no)) {
                    detection.line = Some(line.clone());
                }
            }

            if detection.metadata.is_none() {
                detection.metadata = Some(self.metadata.clone());
            }

            if detection.severity.is_none() {
                detection.severity = Some(scorer.score(detection));
            }
        }
    }
}

/// Reads only as far as the highest requested line. Line numbers are 1-based.
pub(crate) fn lookup_lines(
    path: &Path,
    line_numbers: &BTreeSet<usize>,
) -> io::Result<HashMap<usize, String>> {
    let mut found = HashMap::with_capacity(line_numbers.len());
    let Some(&last) = line_numbers.last() else {
        return Ok(found);
    };

    let mut reader = BufReader::new(File::open(path)?);
    let mut buffer = Vec::new();
    let mut line_no = 0usize;

    while line_no < last {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            break;
        }
        line_no += 1;

        if line_numbers.contains(&line_no) {
            let text = String::from_utf8_lossy(&buffer);
            found.insert(line_no, text.trim_end_matches(['\n', '\r']).to_string());
        }
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_lookup_lines_reads_requested_only() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("setup.py");
        fs::write(&path, "import os\r\nimport sys\nos.system('id')\n").unwrap();

        let wanted: BTreeSet<usize> = [1, 3, 9].into_iter().collect();
        let lines = lookup_lines(&path, &wanted).unwrap();
        assert_eq!(lines.get(&1).map(String::as_str), Some("import os"));
        assert_eq!(lines.get(&3).map(String::as_str), Some("os.system('id')"));
        assert!(!lines.contains_key(&2));
        assert!(!lines.contains_key(&9));
    }

    #[test]
    fn test_lookup_lines_empty_request() {
        let lines = lookup_lines(Path::new("/definitely/not/here"), &BTreeSet::new()).unwrap();
        assert!(lines.is_empty());
    }
}
