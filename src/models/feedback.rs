use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User feedback attached to a finished job, persisted in `feedback.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    pub id: i64,
    pub job_id: i64,
    pub user_id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
}
