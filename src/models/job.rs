use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SplitError;
use crate::models::AppConfig;

/// Upper bound on the diagnostic text stored with a failed job.
pub const ERROR_DETAIL_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// Durable record of one separation job, persisted in `jobs.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeparationJob {
    pub id: i64,
    pub owner_id: i64,
    /// Filename as the user submitted it, for display.
    pub source_name: String,
    /// Uniquified filename of the input under the uploads directory.
    pub stored_name: String,
    pub status: JobStatus,
    /// Identifiers of the produced stems (`"{id}/{stem}.wav"`); empty until
    /// the job completes.
    #[serde(default)]
    pub output_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Clamp a diagnostic string to [`ERROR_DETAIL_MAX_CHARS`] characters.
pub fn truncate_error_detail(detail: &str) -> String {
    detail.chars().take(ERROR_DETAIL_MAX_CHARS).collect()
}

/// Validate an upload before any job record is created. A rejection here
/// leaves no partial state behind.
pub fn validate_upload(config: &AppConfig, filename: &str, size: u64) -> Result<(), SplitError> {
    if !config.is_allowed_file(filename) {
        return Err(SplitError::Validation(
            "Unsupported file type".to_string(),
        ));
    }
    if size > config.max_upload_bytes {
        let max_mb = config.max_upload_bytes / (1024 * 1024);
        return Err(SplitError::Validation(format!(
            "File too large (max {max_mb} MB)"
        )));
    }
    Ok(())
}
