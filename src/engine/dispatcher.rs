use anyhow::Result;

use crate::engine::runner::{self, RunnerDeps};
use crate::models::JobProgress;

/// Accepts new jobs and starts one runner per job without blocking the
/// submitting caller.
pub struct JobDispatcher {
    deps: RunnerDeps,
}

impl JobDispatcher {
    pub fn new(deps: RunnerDeps) -> Self {
        Self { deps }
    }

    /// Create the job record and start its runner in the background.
    ///
    /// Effect order matters: the record is durably created first, then the
    /// progress entry is seeded, then the runner task is spawned. A poller
    /// can therefore never observe a progress entry for a job whose record
    /// does not exist yet. Each submission spawns its own task; there is no
    /// concurrency limit.
    pub async fn submit(
        &self,
        owner_id: i64,
        source_name: &str,
        stored_name: &str,
    ) -> Result<i64> {
        let job = self
            .deps
            .jobs
            .create(owner_id, source_name, stored_name)
            .await?;
        let job_id = job.id;

        self.deps.progress.set(job_id, JobProgress::queued()).await;

        let deps = self.deps.clone();
        tokio::spawn(async move {
            runner::run(deps, job).await;
        });

        tracing::info!(job_id, owner_id, source_name, "job submitted");
        Ok(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::progress::ProgressTracker;
    use crate::engine::separator::{MockSeparator, SeparatorTool};
    use crate::models::{JobStatus, ProgressStatus};
    use crate::storage::JobStore;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn setup(separator: Arc<dyn SeparatorTool>) -> (JobDispatcher, RunnerDeps, TempDir) {
        let tmp = TempDir::new().expect("create temp dir");
        let data_dir = tmp.path();
        let deps = RunnerDeps {
            jobs: Arc::new(JobStore::open(data_dir).await.expect("open job store")),
            progress: Arc::new(ProgressTracker::new()),
            separator,
            uploads_dir: data_dir.join("uploads"),
            separated_dir: data_dir.join("separated"),
            scratch_dir: data_dir.join("scratch"),
            model: "htdemucs".to_string(),
        };
        for dir in [&deps.uploads_dir, &deps.separated_dir, &deps.scratch_dir] {
            tokio::fs::create_dir_all(dir).await.expect("create dir");
        }
        (JobDispatcher::new(deps.clone()), deps, tmp)
    }

    async fn stage_upload(deps: &RunnerDeps, stored_name: &str) {
        tokio::fs::write(deps.uploads_dir.join(stored_name), b"fake audio")
            .await
            .expect("write upload");
    }

    async fn wait_terminal(deps: &RunnerDeps, job_id: i64) -> ProgressStatus {
        for _ in 0..200 {
            let progress = deps.progress.get(job_id).await;
            if progress.is_terminal() {
                return progress.status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached a terminal state");
    }

    #[tokio::test]
    async fn test_submit_returns_id_with_queued_record_visible() {
        let (dispatcher, deps, _tmp) = setup(Arc::new(
            MockSeparator::with_stems("htdemucs", &["vocals"]).delayed(Duration::from_millis(150)),
        ))
        .await;
        stage_upload(&deps, "u1_song.mp3").await;

        let job_id = dispatcher
            .submit(1, "song.mp3", "u1_song.mp3")
            .await
            .expect("submit");

        // Submission already returned while the tool is still "running";
        // the record exists and the progress entry is live.
        let record = deps.jobs.get(job_id).await.expect("record exists");
        assert!(matches!(
            record.status,
            JobStatus::Queued | JobStatus::Processing
        ));
        let progress = deps.progress.get(job_id).await;
        assert_ne!(progress.status, ProgressStatus::Unknown);

        assert_eq!(wait_terminal(&deps, job_id).await, ProgressStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_submissions_get_distinct_increasing_ids() {
        let (dispatcher, deps, _tmp) =
            setup(Arc::new(MockSeparator::with_stems("htdemucs", &["vocals"]))).await;
        let dispatcher = Arc::new(dispatcher);

        let mut handles = Vec::new();
        for i in 0..12 {
            let dispatcher = Arc::clone(&dispatcher);
            let deps = deps.clone();
            handles.push(tokio::spawn(async move {
                let stored = format!("u{i}_song.mp3");
                stage_upload(&deps, &stored).await;
                dispatcher
                    .submit(1, "song.mp3", &stored)
                    .await
                    .expect("submit")
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.expect("join"));
        }
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 12, "ids must not collide");

        // Every runner reaches a terminal state, regardless of finish order.
        for id in ids {
            assert_eq!(wait_terminal(&deps, id).await, ProgressStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_observed_status_sequence_never_regresses() {
        let (dispatcher, deps, _tmp) = setup(Arc::new(
            MockSeparator::with_stems("htdemucs", &["vocals"]).delayed(Duration::from_millis(120)),
        ))
        .await;
        stage_upload(&deps, "u1_song.mp3").await;
        let job_id = dispatcher
            .submit(1, "song.mp3", "u1_song.mp3")
            .await
            .expect("submit");

        fn rank(status: ProgressStatus) -> u8 {
            match status {
                ProgressStatus::Queued => 0,
                ProgressStatus::Processing => 1,
                ProgressStatus::Completed | ProgressStatus::Error => 2,
                ProgressStatus::Unknown => panic!("submitted job read as unknown"),
            }
        }

        let mut samples = Vec::new();
        loop {
            let progress = deps.progress.get(job_id).await;
            let terminal = progress.is_terminal();
            samples.push(progress);
            if terminal {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        for pair in samples.windows(2) {
            assert!(
                rank(pair[0].status) <= rank(pair[1].status),
                "status regressed: {:?} -> {:?}",
                pair[0].status,
                pair[1].status
            );
            assert!(
                pair[0].percent <= pair[1].percent,
                "percent regressed: {} -> {}",
                pair[0].percent,
                pair[1].percent
            );
        }
    }

    #[tokio::test]
    async fn test_failed_jobs_still_terminate_out_of_order() {
        let (dispatcher, deps, _tmp) = setup(Arc::new(
            MockSeparator::with_failure("model weights not found")
                .delayed(Duration::from_millis(100)),
        ))
        .await;
        stage_upload(&deps, "u1_a.mp3").await;
        stage_upload(&deps, "u2_b.mp3").await;

        let first = dispatcher.submit(1, "a.mp3", "u1_a.mp3").await.expect("submit");
        let second = dispatcher.submit(1, "b.mp3", "u2_b.mp3").await.expect("submit");

        assert_eq!(wait_terminal(&deps, second).await, ProgressStatus::Error);
        assert_eq!(wait_terminal(&deps, first).await, ProgressStatus::Error);

        let record = deps.jobs.get(first).await.expect("record");
        assert_eq!(record.status, JobStatus::Error);
        assert_eq!(
            record.error_detail.as_deref(),
            Some("model weights not found")
        );
    }
}
