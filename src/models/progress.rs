use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    /// Never submitted in this process lifetime, or the process restarted
    /// since submission. Distinct from `Error`.
    Unknown,
    Queued,
    Processing,
    Completed,
    Error,
}

/// Live view of one job, held in the process-lifetime progress table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobProgress {
    pub status: ProgressStatus,
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl JobProgress {
    pub fn unknown() -> Self {
        Self {
            status: ProgressStatus::Unknown,
            percent: 0,
            error_detail: None,
        }
    }

    pub fn queued() -> Self {
        Self {
            status: ProgressStatus::Queued,
            percent: 0,
            error_detail: None,
        }
    }

    pub fn processing(percent: u8) -> Self {
        Self {
            status: ProgressStatus::Processing,
            percent,
            error_detail: None,
        }
    }

    pub fn completed() -> Self {
        Self {
            status: ProgressStatus::Completed,
            percent: 100,
            error_detail: None,
        }
    }

    pub fn error(detail: String) -> Self {
        Self {
            status: ProgressStatus::Error,
            percent: 0,
            error_detail: Some(detail),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            ProgressStatus::Completed | ProgressStatus::Error
        )
    }
}
