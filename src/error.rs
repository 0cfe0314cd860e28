// Error types. Each stage of a run has its own enum so the orchestrator
// can decide, per variant, whether a failure ends the run or only the row.

use std::path::PathBuf;
use thiserror::Error;

/// Problems resolving the run configuration. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("the {0} environment variable is not set")]
    MissingToken(&'static str),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Problems reading or validating the grades CSV.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("CSV file not found: {}", .0.display())]
    FileMissing(PathBuf),
    #[error("failed to open {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("missing user_id(s) at row(s): {0:?}")]
    MissingUserIds(Vec<usize>),
}

impl LoadError {
    /// True for the schema family (absent columns or blank identifiers).
    pub fn is_schema_error(&self) -> bool {
        matches!(self, LoadError::MissingColumns(_) | LoadError::MissingUserIds(_))
    }
}

/// Failure anywhere in the two-step comment file upload.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("file does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} request failed: {source}")]
    Request {
        stage: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{stage} returned {status}: {body}")]
    Status {
        stage: &'static str,
        status: u16,
        body: String,
    },
    #[error("{stage} response was not understood: {reason}")]
    InvalidResponse { stage: &'static str, reason: String },
    #[error("file id not returned for {}", .0.display())]
    MissingFileId(PathBuf),
}

/// Row failures that end the whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("row {row} ({user_id}) has no post flag")]
    MissingPostFlag { row: usize, user_id: String },
    #[error("upload failed for row {row} ({user_id}): {source}")]
    Upload {
        row: usize,
        user_id: String,
        #[source]
        source: UploadError,
    },
}
