use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::models::JobProgress;

/// Process-lifetime progress table: job id -> live status.
///
/// Entries exist only while this process is alive; nothing here is
/// persisted. Each runner writes only the entry for its own job id, and
/// readers never mutate. A missing entry reads as the `unknown` sentinel,
/// which is how jobs from a previous process lifetime appear.
#[derive(Default)]
pub struct ProgressTracker {
    entries: RwLock<HashMap<i64, JobProgress>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, job_id: i64, entry: JobProgress) {
        self.entries.write().await.insert(job_id, entry);
    }

    pub async fn get(&self, job_id: i64) -> JobProgress {
        self.entries
            .read()
            .await
            .get(&job_id)
            .cloned()
            .unwrap_or_else(JobProgress::unknown)
    }
}
