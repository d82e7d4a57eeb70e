use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;

use super::routes::error_response;
use super::AppState;

/// GET /api/audio/{job_id}/{file}: deliver one produced stem.
///
/// Artifacts live at `separated/<job_id>/<stem>.wav`; the identifier stored
/// on the job record is exactly `{job_id}/{file}`.
pub async fn serve_stem(
    State(state): State<Arc<AppState>>,
    Path((job_id, file)): Path<(i64, String)>,
) -> impl IntoResponse {
    if file.contains('/') || file.contains('\\') || file.contains("..") {
        return error_response(StatusCode::BAD_REQUEST, "validation_error", "Invalid file name")
            .into_response();
    }

    let path = state.separated_dir.join(job_id.to_string()).join(&file);
    match tokio::fs::read(&path).await {
        Ok(data) => {
            let mime_type = mime_guess::from_path(&file)
                .first_or_octet_stream()
                .to_string();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, mime_type)],
                data,
            )
                .into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            &format!("Audio file '{job_id}/{file}' not found"),
        )
        .into_response(),
        Err(e) => {
            tracing::error!("Failed to read audio file {}: {}", path.display(), e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Failed to read audio file",
            )
            .into_response()
        }
    }
}
