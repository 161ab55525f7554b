//! Error taxonomy for the synthesis pipeline

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("insufficient data in {scope}: found {found} snapshot(s), need at least {needed}")]
    InsufficientData {
        scope: String,
        found: usize,
        needed: usize,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("snapshot {0} has no successor in the timeline")]
    IndexOutOfRange(String),

    #[error("input directory {} does not exist", .0.display())]
    InputDirMissing(PathBuf),

    #[error("generation service failure: {0}")]
    Service(String),

    #[error("summary rejected after {attempts} attempt(s)")]
    SummaryRejected { attempts: u32 },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Failures that belong to a single unit of work and may be skipped.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Service(_) | Self::SummaryRejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PipelineError::Service("503".into()).is_transient());
        assert!(PipelineError::SummaryRejected { attempts: 3 }.is_transient());
        assert!(!PipelineError::NotFound("action".into()).is_transient());
        assert!(!PipelineError::IndexOutOfRange("x.yaml".into()).is_transient());
    }

    #[test]
    fn test_insufficient_data_message() {
        let err = PipelineError::InsufficientData {
            scope: "keyword `craft`".into(),
            found: 1,
            needed: 2,
        };
        assert_eq!(
            err.to_string(),
            "insufficient data in keyword `craft`: found 1 snapshot(s), need at least 2"
        );
    }
}
