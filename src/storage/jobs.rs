use std::path::Path;

use anyhow::Result;
use chrono::Utc;

use crate::errors::SplitError;
use crate::models::{truncate_error_detail, JobStatus, SeparationJob};
use crate::storage::collection::JsonCollection;

/// Durable store of separation job records.
///
/// Status transitions only move forward: queued -> processing ->
/// {completed | error}. Attempts to leave a terminal state are rejected.
pub struct JobStore {
    collection: JsonCollection<SeparationJob>,
}

impl JobStore {
    pub async fn open(data_dir: &Path) -> Result<Self> {
        Ok(Self {
            collection: JsonCollection::open(data_dir, "jobs.json").await?,
        })
    }

    /// Create a queued record. The id is `previous_max_id + 1`, assigned
    /// inside the collection's critical section so concurrent submissions
    /// cannot collide.
    pub async fn create(
        &self,
        owner_id: i64,
        source_name: &str,
        stored_name: &str,
    ) -> Result<SeparationJob> {
        let source_name = source_name.to_string();
        let stored_name = stored_name.to_string();
        self.collection
            .update(move |jobs| {
                let id = jobs.iter().map(|j| j.id).max().unwrap_or(0) + 1;
                let job = SeparationJob {
                    id,
                    owner_id,
                    source_name,
                    stored_name,
                    status: JobStatus::Queued,
                    output_files: Vec::new(),
                    error_detail: None,
                    created_at: Utc::now(),
                };
                jobs.push(job.clone());
                job
            })
            .await
    }

    pub async fn get(&self, id: i64) -> Option<SeparationJob> {
        self.collection
            .read(|jobs| jobs.iter().find(|j| j.id == id).cloned())
            .await
    }

    pub async fn list_for_owner(&self, owner_id: i64) -> Vec<SeparationJob> {
        self.collection
            .read(|jobs| {
                jobs.iter()
                    .filter(|j| j.owner_id == owner_id)
                    .cloned()
                    .collect()
            })
            .await
    }

    pub async fn list_all(&self) -> Vec<SeparationJob> {
        self.collection.read(|jobs| jobs.to_vec()).await
    }

    /// Mark a queued job as processing. Persisted before the tool is
    /// invoked, so a crash mid-run leaves `processing` on disk.
    pub async fn mark_processing(&self, id: i64) -> Result<()> {
        self.transition(id, |job| {
            if job.status != JobStatus::Queued {
                return Err(SplitError::Conflict(format!(
                    "job {} is {:?}, expected queued",
                    job.id, job.status
                )));
            }
            job.status = JobStatus::Processing;
            Ok(())
        })
        .await
    }

    /// Terminal transition: rewrite the record as completed with the
    /// collected artifact list (which may be empty).
    pub async fn complete(&self, id: i64, output_files: Vec<String>) -> Result<()> {
        self.transition(id, move |job| {
            if job.status.is_terminal() {
                return Err(SplitError::Conflict(format!(
                    "job {} already terminal ({:?})",
                    job.id, job.status
                )));
            }
            job.status = JobStatus::Completed;
            job.output_files = output_files;
            job.error_detail = None;
            Ok(())
        })
        .await
    }

    /// Terminal transition: rewrite the record as errored with a diagnostic
    /// clamped to 200 characters.
    pub async fn fail(&self, id: i64, detail: &str) -> Result<()> {
        let detail = truncate_error_detail(detail);
        self.transition(id, move |job| {
            if job.status.is_terminal() {
                return Err(SplitError::Conflict(format!(
                    "job {} already terminal ({:?})",
                    job.id, job.status
                )));
            }
            job.status = JobStatus::Error;
            job.output_files = Vec::new();
            job.error_detail = Some(detail);
            Ok(())
        })
        .await
    }

    /// Records left at `processing` by a previous process. These are never
    /// reconciled automatically; the caller may surface them at startup.
    pub async fn count_stuck_processing(&self) -> usize {
        self.collection
            .read(|jobs| {
                jobs.iter()
                    .filter(|j| j.status == JobStatus::Processing)
                    .count()
            })
            .await
    }

    async fn transition(
        &self,
        id: i64,
        f: impl FnOnce(&mut SeparationJob) -> Result<(), SplitError> + Send,
    ) -> Result<()> {
        self.collection
            .update(move |jobs| match jobs.iter_mut().find(|j| j.id == id) {
                Some(job) => f(job).map_err(anyhow::Error::from),
                None => Err(SplitError::NotFound(format!("job {} not found", id)).into()),
            })
            .await?
    }
}
