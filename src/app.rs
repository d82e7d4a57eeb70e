use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::engine::{DemucsSeparator, JobDispatcher, ProgressTracker, RunnerDeps, SeparatorTool};
use crate::models::AppConfig;
use crate::server::auth::SessionStore;
use crate::server::{self, AppState};
use crate::storage::{FeedbackStore, JobStore, UserStore};

/// Resolve the data directory. If `override_dir` is Some, use it; otherwise
/// honor `STEMSPLIT_DATA_DIR`, then the platform data dir.
pub fn resolve_data_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }

    if let Ok(dir) = std::env::var("STEMSPLIT_DATA_DIR") {
        return PathBuf::from(dir);
    }

    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stemsplit")
}

/// Load `config.json` from the data directory, falling back to defaults
/// when no file exists.
pub fn load_config(data_dir: &Path) -> Result<AppConfig> {
    let path = data_dir.join("config.json");
    if path.exists() {
        let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
        let config: AppConfig =
            serde_json::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.display());
        return Ok(config);
    }
    tracing::info!("No config file found, using defaults");
    Ok(AppConfig::default())
}

/// Build the shared application state: storage, progress table, dispatcher.
///
/// Also surfaces (without reconciling) job records a previous process left
/// at `processing`: their progress entries died with that process, so
/// pollers will read them as `unknown`.
pub async fn build_state(
    mut config: AppConfig,
    data_dir: &Path,
    separator: Arc<dyn SeparatorTool>,
) -> Result<Arc<AppState>> {
    let uploads_dir = data_dir.join("uploads");
    let separated_dir = data_dir.join("separated");
    let scratch_dir = data_dir.join("scratch");
    for dir in [&uploads_dir, &separated_dir, &scratch_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let users = Arc::new(UserStore::open(data_dir).await?);
    let jobs = Arc::new(JobStore::open(data_dir).await?);
    let feedback = Arc::new(FeedbackStore::open(data_dir).await?);
    let progress = Arc::new(ProgressTracker::new());

    let stuck = jobs.count_stuck_processing().await;
    if stuck > 0 {
        tracing::warn!(
            count = stuck,
            "job records left at 'processing' by a previous run; pollers will see them as 'unknown'"
        );
    }

    let dispatcher = JobDispatcher::new(RunnerDeps {
        jobs: Arc::clone(&jobs),
        progress: Arc::clone(&progress),
        separator,
        uploads_dir: uploads_dir.clone(),
        separated_dir: separated_dir.clone(),
        scratch_dir,
        model: config.separator_model.clone(),
    });

    config.data_dir = Some(data_dir.to_path_buf());

    Ok(Arc::new(AppState {
        config: Arc::new(config),
        users,
        jobs,
        feedback,
        progress,
        dispatcher,
        sessions: SessionStore::new(),
        uploads_dir,
        separated_dir,
        start_time: Instant::now(),
    }))
}

/// Start the server: resolve directories, load config, wire the engine to
/// the real Demucs tool, and serve until interrupted.
pub async fn serve(
    host_override: Option<&str>,
    port_override: Option<u16>,
    data_dir_override: Option<&Path>,
) -> Result<()> {
    let data_dir = resolve_data_dir(data_dir_override);
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let mut config = load_config(&data_dir)?;
    if let Some(host) = host_override {
        config.host = host.to_string();
    }
    if let Some(port) = port_override {
        config.port = port;
    }

    let separator: Arc<dyn SeparatorTool> = Arc::new(DemucsSeparator::new(
        config.separator_program.clone(),
        Duration::from_secs(config.separation_timeout_secs),
    ));

    let bind_addr = format!("{}:{}", config.host, config.port);
    let state = build_state(config, &data_dir, separator).await?;
    let router = server::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    tracing::info!("Listening on http://{}", listener.local_addr()?);
    tracing::info!("Data directory: {}", data_dir.display());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                tokio::signal::ctrl_c().await.ok();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C signal");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM signal");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received Ctrl+C signal");
    }
}
