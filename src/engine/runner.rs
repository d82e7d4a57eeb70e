use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::progress::ProgressTracker;
use crate::engine::separator::{
    track_name, SeparationOutcome, SeparatorTool, STEM_EXTENSION, STEM_NAMES,
};
use crate::models::{truncate_error_detail, JobProgress, SeparationJob};
use crate::storage::JobStore;

/// Fixed diagnostic recorded when the tool exceeds its timeout.
pub const TIMEOUT_DETAIL: &str = "separation tool timed out";

/// Everything one runner needs; cloned into each spawned job task.
#[derive(Clone)]
pub struct RunnerDeps {
    pub jobs: Arc<JobStore>,
    pub progress: Arc<ProgressTracker>,
    pub separator: Arc<dyn SeparatorTool>,
    pub uploads_dir: PathBuf,
    pub separated_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub model: String,
}

/// Drive one job to a terminal state.
///
/// Progress entries for this job follow the fixed sequence
/// (processing, 10) -> (processing, 40) -> {(completed, 100) | (error, 0)};
/// the record is rewritten once, at the terminal transition. Every fault is
/// absorbed here: nothing propagates to the submission path, which has
/// already returned.
pub async fn run(deps: RunnerDeps, job: SeparationJob) {
    let job_id = job.id;
    deps.progress.set(job_id, JobProgress::processing(10)).await;

    match execute(&deps, &job).await {
        Ok(outputs) => match deps.jobs.complete(job_id, outputs.clone()).await {
            Ok(()) => {
                deps.progress.set(job_id, JobProgress::completed()).await;
                tracing::info!(job_id, stems = outputs.len(), "separation completed");
            }
            Err(e) => {
                record_failure(
                    &deps,
                    job_id,
                    format!("failed to record completion: {e:#}"),
                )
                .await;
            }
        },
        Err(detail) => record_failure(&deps, job_id, detail).await,
    }
}

async fn record_failure(deps: &RunnerDeps, job_id: i64, detail: String) {
    let detail = truncate_error_detail(&detail);
    if let Err(e) = deps.jobs.fail(job_id, &detail).await {
        tracing::error!(job_id, error = %e, "failed to record job error");
    }
    tracing::warn!(job_id, detail = %detail, "separation failed");
    deps.progress
        .set(job_id, JobProgress::error(detail))
        .await;
}

async fn execute(deps: &RunnerDeps, job: &SeparationJob) -> Result<Vec<String>, String> {
    // Persist the queued -> processing transition before the tool starts,
    // so a crash mid-run leaves `processing` on disk rather than `queued`.
    deps.jobs
        .mark_processing(job.id)
        .await
        .map_err(|e| format!("failed to mark job processing: {e:#}"))?;
    deps.progress
        .set(job.id, JobProgress::processing(40))
        .await;

    let input = deps.uploads_dir.join(&job.stored_name);
    let scratch = deps.scratch_dir.join(job.id.to_string());
    tokio::fs::create_dir_all(&scratch)
        .await
        .map_err(|e| format!("failed to create scratch directory: {e}"))?;

    let outcome = match deps.separator.separate(&input, &scratch).await {
        Ok(outcome) => outcome,
        Err(e) => {
            discard_scratch(&scratch).await;
            return Err(format!("{e:#}"));
        }
    };

    match outcome {
        SeparationOutcome::Finished => {
            let outputs = collect_stems(deps, job, &scratch).await?;
            tokio::fs::remove_dir_all(&scratch)
                .await
                .map_err(|e| format!("failed to remove scratch directory: {e}"))?;
            Ok(outputs)
        }
        SeparationOutcome::ToolFailure { detail } => {
            discard_scratch(&scratch).await;
            Err(detail)
        }
        SeparationOutcome::TimedOut => {
            discard_scratch(&scratch).await;
            Err(TIMEOUT_DETAIL.to_string())
        }
    }
}

/// Copy each stem the tool produced into the per-job output directory and
/// return the artifact identifiers. Missing stems are tolerated; the list
/// reflects only what was found, in [`STEM_NAMES`] order.
async fn collect_stems(
    deps: &RunnerDeps,
    job: &SeparationJob,
    scratch: &Path,
) -> Result<Vec<String>, String> {
    let produced = scratch
        .join(&deps.model)
        .join(track_name(&job.stored_name));
    let dest = deps.separated_dir.join(job.id.to_string());
    tokio::fs::create_dir_all(&dest)
        .await
        .map_err(|e| format!("failed to create output directory: {e}"))?;

    let mut outputs = Vec::new();
    for stem in STEM_NAMES {
        let src = produced.join(format!("{stem}.{STEM_EXTENSION}"));
        match tokio::fs::metadata(&src).await {
            Ok(_) => {
                let target = dest.join(format!("{stem}.{STEM_EXTENSION}"));
                tokio::fs::copy(&src, &target)
                    .await
                    .map_err(|e| format!("failed to copy stem '{stem}': {e}"))?;
                outputs.push(format!("{}/{stem}.{STEM_EXTENSION}", job.id));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(format!("failed to stat stem '{stem}': {e}")),
        }
    }
    Ok(outputs)
}

/// Best-effort scratch removal on failure paths; the job's diagnostic is
/// already decided, so a cleanup error is only logged.
async fn discard_scratch(scratch: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(scratch).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %scratch.display(), error = %e, "failed to remove scratch directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::separator::MockSeparator;
    use crate::models::{JobStatus, ProgressStatus};
    use tempfile::TempDir;

    struct Fixture {
        deps: RunnerDeps,
        _tmp: TempDir,
    }

    async fn setup(separator: Arc<dyn SeparatorTool>) -> Fixture {
        let tmp = TempDir::new().expect("create temp dir");
        let data_dir = tmp.path();
        let jobs = Arc::new(JobStore::open(data_dir).await.expect("open job store"));
        let deps = RunnerDeps {
            jobs,
            progress: Arc::new(ProgressTracker::new()),
            separator,
            uploads_dir: data_dir.join("uploads"),
            separated_dir: data_dir.join("separated"),
            scratch_dir: data_dir.join("scratch"),
            model: "htdemucs".to_string(),
        };
        tokio::fs::create_dir_all(&deps.uploads_dir)
            .await
            .expect("uploads dir");
        tokio::fs::create_dir_all(&deps.separated_dir)
            .await
            .expect("separated dir");
        tokio::fs::create_dir_all(&deps.scratch_dir)
            .await
            .expect("scratch dir");
        Fixture { deps, _tmp: tmp }
    }

    async fn submit_job(fixture: &Fixture) -> SeparationJob {
        let stored_name = "u1_song.mp3";
        tokio::fs::write(fixture.deps.uploads_dir.join(stored_name), b"fake audio")
            .await
            .expect("write upload");
        fixture
            .deps
            .jobs
            .create(1, "song.mp3", stored_name)
            .await
            .expect("create job")
    }

    #[tokio::test]
    async fn test_found_stems_become_artifacts_in_vocabulary_order() {
        let fixture = setup(Arc::new(MockSeparator::with_stems(
            "htdemucs",
            &["drums", "vocals"],
        )))
        .await;
        let job = submit_job(&fixture).await;

        run(fixture.deps.clone(), job.clone()).await;

        let record = fixture.deps.jobs.get(job.id).await.expect("record");
        assert_eq!(record.status, JobStatus::Completed);
        // Collection order follows the stem vocabulary, not the tool's.
        assert_eq!(
            record.output_files,
            vec![
                format!("{}/vocals.wav", job.id),
                format!("{}/drums.wav", job.id)
            ]
        );

        let progress = fixture.deps.progress.get(job.id).await;
        assert_eq!(progress.status, ProgressStatus::Completed);
        assert_eq!(progress.percent, 100);

        // Stems were copied to the per-job location; the scratch dir is gone.
        let dest = fixture.deps.separated_dir.join(job.id.to_string());
        assert!(dest.join("vocals.wav").exists());
        assert!(dest.join("drums.wav").exists());
        assert!(!fixture
            .deps
            .scratch_dir
            .join(job.id.to_string())
            .exists());
    }

    #[tokio::test]
    async fn test_zero_stems_still_completes_with_empty_list() {
        let fixture = setup(Arc::new(MockSeparator::with_stems("htdemucs", &[]))).await;
        let job = submit_job(&fixture).await;

        run(fixture.deps.clone(), job.clone()).await;

        let record = fixture.deps.jobs.get(job.id).await.expect("record");
        assert_eq!(record.status, JobStatus::Completed);
        assert!(record.output_files.is_empty());
        assert_eq!(
            fixture.deps.progress.get(job.id).await.status,
            ProgressStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_tool_failure_records_truncated_stderr() {
        let stderr = format!("disk full{}", "x".repeat(400));
        let fixture = setup(Arc::new(MockSeparator::with_failure(&stderr))).await;
        let job = submit_job(&fixture).await;

        run(fixture.deps.clone(), job.clone()).await;

        let record = fixture.deps.jobs.get(job.id).await.expect("record");
        assert_eq!(record.status, JobStatus::Error);
        let detail = record.error_detail.expect("detail");
        assert_eq!(detail, stderr.chars().take(200).collect::<String>());

        let progress = fixture.deps.progress.get(job.id).await;
        assert_eq!(progress.status, ProgressStatus::Error);
        assert_eq!(progress.percent, 0);
        assert_eq!(progress.error_detail.as_deref(), Some(detail.as_str()));
    }

    #[tokio::test]
    async fn test_timeout_becomes_terminal_error() {
        let fixture = setup(Arc::new(MockSeparator::with_timeout())).await;
        let job = submit_job(&fixture).await;

        run(fixture.deps.clone(), job.clone()).await;

        let record = fixture.deps.jobs.get(job.id).await.expect("record");
        assert_eq!(record.status, JobStatus::Error);
        assert_eq!(record.error_detail.as_deref(), Some(TIMEOUT_DETAIL));

        let progress = fixture.deps.progress.get(job.id).await;
        assert_eq!(progress.status, ProgressStatus::Error);
        assert_eq!(progress.percent, 0);
    }

    #[tokio::test]
    async fn test_spawn_io_error_becomes_terminal_error() {
        let fixture =
            setup(Arc::new(MockSeparator::with_io_error("interpreter missing"))).await;
        let job = submit_job(&fixture).await;

        run(fixture.deps.clone(), job.clone()).await;

        let record = fixture.deps.jobs.get(job.id).await.expect("record");
        assert_eq!(record.status, JobStatus::Error);
        assert!(record
            .error_detail
            .expect("detail")
            .contains("interpreter missing"));
    }

    #[tokio::test]
    async fn test_record_marked_processing_before_tool_runs() {
        // A slow mock lets us observe the on-disk state mid-run.
        let fixture = setup(Arc::new(
            MockSeparator::with_stems("htdemucs", &["vocals"])
                .delayed(std::time::Duration::from_millis(200)),
        ))
        .await;
        let job = submit_job(&fixture).await;

        let deps = fixture.deps.clone();
        let handle = tokio::spawn(run(deps, job.clone()));

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        let mid = fixture.deps.jobs.get(job.id).await.expect("record");
        assert_eq!(mid.status, JobStatus::Processing);
        let progress = fixture.deps.progress.get(job.id).await;
        assert_eq!(progress.status, ProgressStatus::Processing);
        assert_eq!(progress.percent, 40);

        handle.await.expect("join");
        let done = fixture.deps.jobs.get(job.id).await.expect("record");
        assert_eq!(done.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_terminal_progress_is_stable() {
        let fixture = setup(Arc::new(MockSeparator::with_stems("htdemucs", &["bass"]))).await;
        let job = submit_job(&fixture).await;
        run(fixture.deps.clone(), job.clone()).await;

        for _ in 0..5 {
            let progress = fixture.deps.progress.get(job.id).await;
            assert_eq!(progress.status, ProgressStatus::Completed);
            assert_eq!(progress.percent, 100);
        }
    }
}
