use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

/// Stems the separation tool can produce, in the order artifacts are
/// collected.
pub const STEM_NAMES: [&str; 4] = ["vocals", "drums", "bass", "other"];

/// Audio extension of every produced stem file.
pub const STEM_EXTENSION: &str = "wav";

/// How one tool invocation ended. I/O faults while running the tool (e.g.
/// the interpreter is missing) surface as `Err` from [`SeparatorTool`]
/// instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeparationOutcome {
    /// Exit code zero; stems (possibly none) are under the scratch dir.
    Finished,
    /// Non-zero exit; `detail` carries the tool's stderr.
    ToolFailure { detail: String },
    /// The invocation exceeded the configured timeout and was killed.
    TimedOut,
}

/// Seam around the external stem-separation tool so tests can substitute
/// a mock for the real child process.
#[async_trait]
pub trait SeparatorTool: Send + Sync {
    async fn separate(&self, input: &Path, scratch_dir: &Path) -> Result<SeparationOutcome>;
}

/// Track directory name the tool derives from the input file: the stored
/// filename minus its extension.
pub fn track_name(stored_name: &str) -> String {
    match stored_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => stored_name.to_string(),
    }
}

/// Invokes Demucs as `<program> -m demucs --out <scratch_dir> <input>`,
/// bounded by a fixed timeout.
pub struct DemucsSeparator {
    program: String,
    timeout: Duration,
}

impl DemucsSeparator {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    fn command(&self, input: &Path, scratch_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-m")
            .arg("demucs")
            .arg("--out")
            .arg(scratch_dir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl SeparatorTool for DemucsSeparator {
    async fn separate(&self, input: &Path, scratch_dir: &Path) -> Result<SeparationOutcome> {
        let child = self
            .command(input, scratch_dir)
            .spawn()
            .with_context(|| format!("failed to spawn separation tool '{}'", self.program))?;

        // On timeout the wait future is dropped and kill_on_drop reaps the
        // child; the job is reported as errored either way.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => Ok(SeparationOutcome::Finished),
            Ok(Ok(output)) => {
                let detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
                let detail = if detail.is_empty() {
                    format!("separation tool exited with {}", output.status)
                } else {
                    detail
                };
                Ok(SeparationOutcome::ToolFailure { detail })
            }
            Ok(Err(e)) => Err(e).context("failed waiting for separation tool"),
            Err(_) => Ok(SeparationOutcome::TimedOut),
        }
    }
}

/// Test double: fabricates stem files (or a failure) instead of running
/// the real tool.
pub struct MockSeparator {
    model: String,
    stems: Vec<String>,
    outcome: MockOutcome,
    delay: Option<Duration>,
}

enum MockOutcome {
    Finished,
    ToolFailure(String),
    TimedOut,
    IoError(String),
}

impl MockSeparator {
    /// Succeed, fabricating the given stems under `scratch/<model>/<track>/`.
    pub fn with_stems(model: &str, stems: &[&str]) -> Self {
        Self {
            model: model.to_string(),
            stems: stems.iter().map(|s| s.to_string()).collect(),
            outcome: MockOutcome::Finished,
            delay: None,
        }
    }

    /// Exit non-zero with the given stderr text.
    pub fn with_failure(detail: &str) -> Self {
        Self {
            model: String::new(),
            stems: Vec::new(),
            outcome: MockOutcome::ToolFailure(detail.to_string()),
            delay: None,
        }
    }

    /// Report a timeout.
    pub fn with_timeout() -> Self {
        Self {
            model: String::new(),
            stems: Vec::new(),
            outcome: MockOutcome::TimedOut,
            delay: None,
        }
    }

    /// Fail to run at all (spawn-level I/O error).
    pub fn with_io_error(detail: &str) -> Self {
        Self {
            model: String::new(),
            stems: Vec::new(),
            outcome: MockOutcome::IoError(detail.to_string()),
            delay: None,
        }
    }

    /// Sleep this long before reporting the outcome.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl SeparatorTool for MockSeparator {
    async fn separate(&self, input: &Path, scratch_dir: &Path) -> Result<SeparationOutcome> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.outcome {
            MockOutcome::Finished => {
                let stored_name = input
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let track_dir: PathBuf = scratch_dir
                    .join(&self.model)
                    .join(track_name(&stored_name));
                tokio::fs::create_dir_all(&track_dir)
                    .await
                    .context("mock: create track dir")?;
                for stem in &self.stems {
                    let path = track_dir.join(format!("{stem}.{STEM_EXTENSION}"));
                    tokio::fs::write(&path, b"RIFF mock audio")
                        .await
                        .context("mock: write stem file")?;
                }
                Ok(SeparationOutcome::Finished)
            }
            MockOutcome::ToolFailure(detail) => Ok(SeparationOutcome::ToolFailure {
                detail: detail.clone(),
            }),
            MockOutcome::TimedOut => Ok(SeparationOutcome::TimedOut),
            MockOutcome::IoError(detail) => Err(anyhow::anyhow!("{detail}")),
        }
    }
}
