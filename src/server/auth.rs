use std::collections::HashMap;
use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::routes::{error_response, ErrorResponse};
use super::AppState;
use crate::errors::SplitError;
use crate::models::User;
use crate::storage::NewUser;

pub const SESSION_COOKIE: &str = "session";

const MIN_PASSWORD_CHARS: usize = 8;

// ---------------------------------------------------------------------------
// Password hashing (Argon2id, PHC string storage)
// ---------------------------------------------------------------------------

pub fn hash_password(password: &str) -> Result<String, SplitError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| SplitError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Sessions: opaque token -> user id, process lifetime only
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, i64>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, user_id: i64) -> Uuid {
        let token = Uuid::new_v4();
        self.sessions.write().await.insert(token, user_id);
        token
    }

    pub async fn resolve(&self, token: Uuid) -> Option<i64> {
        self.sessions.read().await.get(&token).copied()
    }

    pub async fn revoke(&self, token: Uuid) {
        self.sessions.write().await.remove(&token);
    }
}

fn session_token(headers: &header::HeaderMap) -> Option<Uuid> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        if name == SESSION_COOKIE {
            Uuid::parse_str(value.trim()).ok()
        } else {
            None
        }
    })
}

fn session_cookie(token: Uuid) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Extractor for handlers that require a logged-in caller.
pub struct AuthUser(pub User);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let unauthorized = || {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "unauthorized".to_string(),
                    message: "Login required".to_string(),
                }),
            )
        };

        let token = session_token(&parts.headers).ok_or_else(unauthorized)?;
        let user_id = state
            .sessions
            .resolve(token)
            .await
            .ok_or_else(unauthorized)?;
        match state.users.get(user_id).await {
            Some(user) => Ok(AuthUser(user)),
            None => Err(unauthorized()),
        }
    }
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> impl IntoResponse {
    let first_name = body.first_name.trim();
    let last_name = body.last_name.trim();
    let email = body.email.trim();

    if first_name.is_empty() || last_name.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "First and last name are required",
        )
        .into_response();
    }
    if email.is_empty() || !email.contains('@') {
        return error_response(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "A valid email address is required",
        )
        .into_response();
    }
    if body.password.chars().count() < MIN_PASSWORD_CHARS {
        return error_response(
            StatusCode::BAD_REQUEST,
            "validation_error",
            &format!("Password must be at least {MIN_PASSWORD_CHARS} characters long"),
        )
        .into_response();
    }

    let password_hash = match hash_password(&body.password) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::error!("Registration failed: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Failed to create account",
            )
            .into_response();
        }
    };

    let is_admin = state
        .config
        .admin_email
        .as_deref()
        .is_some_and(|admin| admin.eq_ignore_ascii_case(email));

    let new_user = NewUser {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        email: email.to_string(),
        password_hash,
        is_admin,
    };

    match state.users.create(new_user).await {
        Ok(user) => {
            tracing::info!(user_id = user.id, "account created");
            let token = state.sessions.create(user.id).await;
            (
                StatusCode::CREATED,
                [(header::SET_COOKIE, session_cookie(token))],
                Json(user.view()),
            )
                .into_response()
        }
        Err(e) => {
            if let Some(SplitError::Conflict(msg)) = e.downcast_ref::<SplitError>() {
                tracing::warn!("Registration conflict: {}", msg);
                return error_response(StatusCode::CONFLICT, "conflict", msg).into_response();
            }
            tracing::error!("Registration failed: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                &format!("Failed to create account: {e}"),
            )
            .into_response()
        }
    }
}

/// POST /api/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> impl IntoResponse {
    let user = match state.users.find_by_email(body.email.trim()).await {
        Some(user) if verify_password(&body.password, &user.password_hash) => user,
        _ => {
            tracing::warn!("Failed login attempt");
            return error_response(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Incorrect email or password",
            )
            .into_response();
        }
    };

    tracing::info!(user_id = user.id, "login");
    let token = state.sessions.create(user.id).await;
    (
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(token))],
        Json(user.view()),
    )
        .into_response()
}

/// POST /api/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: header::HeaderMap,
) -> impl IntoResponse {
    if let Some(token) = session_token(&headers) {
        state.sessions.revoke(token).await;
    }
    (
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie())],
        Json(serde_json::json!({ "message": "Logged out" })),
    )
}

/// GET /api/me
pub async fn me(user: AuthUser) -> impl IntoResponse {
    Json(user.0.view())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let hash = hash_password("correct-horse-battery").expect("hash");
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct-horse-battery", &hash));
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn test_session_store_roundtrip() {
        let sessions = SessionStore::new();
        let token = sessions.create(7).await;
        assert_eq!(sessions.resolve(token).await, Some(7));

        sessions.revoke(token).await;
        assert_eq!(sessions.resolve(token).await, None);
    }

    #[tokio::test]
    async fn test_unknown_token_does_not_resolve() {
        let sessions = SessionStore::new();
        assert_eq!(sessions.resolve(Uuid::new_v4()).await, None);
    }

    #[test]
    fn test_session_token_parses_cookie_header() {
        let token = Uuid::new_v4();
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            format!("other=1; session={token}; x=2").parse().unwrap(),
        );
        assert_eq!(session_token(&headers), Some(token));
    }

    #[test]
    fn test_session_token_absent_or_malformed() {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::COOKIE, "session=not-a-uuid".parse().unwrap());
        assert_eq!(session_token(&headers), None);

        assert_eq!(session_token(&header::HeaderMap::new()), None);
    }
}
