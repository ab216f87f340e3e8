use thiserror::Error;

/// Failures writing the JSON-lines report.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to encode report line: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write report: {0}")]
    Write(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_display() {
        let err = ReportError::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert!(err.to_string().starts_with("failed to write report"));
    }
}
