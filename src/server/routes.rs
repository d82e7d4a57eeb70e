use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::AuthUser;
use super::AppState;

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub fn error_response(status: StatusCode, error: &str, message: &str) -> impl IntoResponse {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub total_jobs: usize,
    pub version: String,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    tracing::debug!("Health check");
    let response = HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        total_jobs: state.jobs.list_all().await.len(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    (StatusCode::OK, Json(response))
}

// ---------------------------------------------------------------------------
// Upload + submission
// ---------------------------------------------------------------------------

/// Strip any path components and characters that don't belong in a stored
/// filename.
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "audio".to_string()
    } else {
        cleaned
    }
}

/// POST /api/jobs: multipart upload; creates and dispatches one job.
///
/// All rejections here happen before a job record exists (no partial state).
pub async fn upload(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut upload: Option<(String, axum::body::Bytes)> = None;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some("audio") {
                    continue;
                }
                let source_name = match field.file_name() {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ => {
                        return error_response(
                            StatusCode::BAD_REQUEST,
                            "validation_error",
                            "No file selected",
                        )
                        .into_response();
                    }
                };
                match field.bytes().await {
                    Ok(bytes) => {
                        upload = Some((source_name, bytes));
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Upload body read failed: {}", e);
                        return error_response(
                            StatusCode::BAD_REQUEST,
                            "validation_error",
                            "Failed to read uploaded file",
                        )
                        .into_response();
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Invalid multipart body: {}", e);
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    "Invalid multipart body",
                )
                .into_response();
            }
        }
    }

    let Some((source_name, data)) = upload else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "No file selected",
        )
        .into_response();
    };

    if let Err(e) = crate::models::validate_upload(&state.config, &source_name, data.len() as u64)
    {
        tracing::warn!("Upload rejected: {}", e);
        return error_response(StatusCode::BAD_REQUEST, "validation_error", &e.to_string())
            .into_response();
    }

    let stored_name = format!(
        "{}_{}",
        Uuid::new_v4().simple(),
        sanitize_filename(&source_name)
    );
    let stored_path = state.uploads_dir.join(&stored_name);
    if let Err(e) = tokio::fs::write(&stored_path, &data).await {
        tracing::error!("Failed to store upload: {}", e);
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Failed to store uploaded file",
        )
        .into_response();
    }

    match state
        .dispatcher
        .submit(user.0.id, &source_name, &stored_name)
        .await
    {
        Ok(job_id) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({
                "job_id": job_id,
                "status": "queued",
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to submit job: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                &format!("Failed to submit job: {e}"),
            )
            .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Progress + records
// ---------------------------------------------------------------------------

/// GET /api/jobs/{id}/progress: the polling endpoint.
///
/// Always answers 200: ids never submitted in this process lifetime (or
/// submitted before a restart) read as the `unknown` sentinel.
pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<i64>,
) -> impl IntoResponse {
    let progress = state.progress.get(job_id).await;
    (StatusCode::OK, Json(progress))
}

/// GET /api/jobs: the caller picks up their job records.
pub async fn list_jobs(State(state): State<Arc<AppState>>, user: AuthUser) -> impl IntoResponse {
    let jobs = state.jobs.list_for_owner(user.0.id).await;
    (StatusCode::OK, Json(jobs))
}

// ---------------------------------------------------------------------------
// Feedback
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub text: String,
}

/// POST /api/jobs/{id}/feedback
pub async fn post_feedback(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(job_id): Path<i64>,
    Json(body): Json<FeedbackRequest>,
) -> impl IntoResponse {
    let text = body.text.trim();
    if text.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "Feedback text cannot be empty",
        )
        .into_response();
    }

    let job = match state.jobs.get(job_id).await {
        Some(job) => job,
        None => {
            return error_response(
                StatusCode::NOT_FOUND,
                "not_found",
                &format!("Job with id '{job_id}' not found"),
            )
            .into_response();
        }
    };
    if job.owner_id != user.0.id && !user.0.is_admin {
        return error_response(
            StatusCode::FORBIDDEN,
            "forbidden",
            "Feedback can only be left on your own jobs",
        )
        .into_response();
    }

    match state.feedback.append(job_id, user.0.id, text).await {
        Ok(feedback) => {
            tracing::info!(job_id, user_id = user.0.id, "feedback recorded");
            (StatusCode::CREATED, Json(feedback)).into_response()
        }
        Err(e) => {
            tracing::error!("Failed to record feedback: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                &format!("Failed to record feedback: {e}"),
            )
            .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct AdminJobRow {
    pub job_id: i64,
    pub source_name: String,
    pub owner_name: String,
    pub status: crate::models::JobStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdminStats {
    pub total_users: usize,
    pub total_jobs: usize,
    pub total_feedback: usize,
}

#[derive(Debug, Serialize)]
pub struct AdminOverview {
    pub jobs: Vec<AdminJobRow>,
    pub stats: AdminStats,
}

/// GET /api/admin/overview
pub async fn admin_overview(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> impl IntoResponse {
    if !user.0.is_admin {
        return error_response(StatusCode::FORBIDDEN, "forbidden", "Admin access required")
            .into_response();
    }

    let users = state.users.list_all().await;
    let jobs = state.jobs.list_all().await;
    let feedback = state.feedback.list_all().await;

    let rows: Vec<AdminJobRow> = jobs
        .iter()
        .map(|job| {
            let owner_name = users
                .iter()
                .find(|u| u.id == job.owner_id)
                .map(|u| u.display_name())
                .unwrap_or_else(|| "unknown".to_string());
            let feedback_text = feedback
                .iter()
                .find(|f| f.job_id == job.id)
                .map(|f| f.text.clone());
            AdminJobRow {
                job_id: job.id,
                source_name: job.source_name.clone(),
                owner_name,
                status: job.status,
                created_at: job.created_at,
                feedback_text,
            }
        })
        .collect();

    let overview = AdminOverview {
        stats: AdminStats {
            total_users: users.iter().filter(|u| !u.is_admin).count(),
            total_jobs: jobs.len(),
            total_feedback: feedback.len(),
        },
        jobs: rows,
    };

    (StatusCode::OK, Json(overview)).into_response()
}
