use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};

use super::backend::{Backend, BackendError};
use super::middleware::AuthAccount;
use crate::models::api::*;

/// Every handler answers with a status and a JSON envelope.
pub type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

fn ok<T: Default>(message: &str, data: T) -> Reply<T> {
    (StatusCode::OK, Json(ApiResponse::ok(message, data)))
}

/// Map a backend failure to a status and an envelope carrying its message.
/// Hashing failures are logged and reported generically.
fn failure<T: Default>(e: BackendError) -> Reply<T> {
    let status = match &e {
        BackendError::Invalid(_) => StatusCode::BAD_REQUEST,
        BackendError::Conflict(_) => StatusCode::CONFLICT,
        BackendError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        BackendError::NotFound => StatusCode::NOT_FOUND,
        BackendError::Hash(_) => {
            tracing::error!("Internal error: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::fail("Internal server error")),
            );
        }
    };
    tracing::warn!("Request failed: {}", e);
    (status, Json(ApiResponse::fail(e.to_string())))
}

/// Run password hashing work on the blocking pool.
async fn blocking<T, F>(backend: &Backend, work: F) -> Result<T, BackendError>
where
    F: FnOnce(Backend) -> Result<T, BackendError> + Send + 'static,
    T: Send + 'static,
{
    let backend = backend.clone();
    tokio::task::spawn_blocking(move || work(backend))
        .await
        .map_err(|e| BackendError::Hash(e.to_string()))?
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Availability
// ============================================================

pub async fn check_username_availability(
    State(backend): State<Backend>,
    Json(input): Json<UsernameInput>,
) -> Reply<Empty> {
    if backend.username_available(input.username.trim()) {
        ok("Username is available", Empty {})
    } else {
        failure(BackendError::Conflict("Username is already taken".to_string()))
    }
}

pub async fn check_email_availability(
    State(backend): State<Backend>,
    Json(input): Json<EmailInput>,
) -> Reply<Empty> {
    if backend.email_available(input.email.trim()) {
        ok("Email is available", Empty {})
    } else {
        failure(BackendError::Conflict("Email is already registered".to_string()))
    }
}

// ============================================================
// Authentication
// ============================================================

pub async fn login(State(backend): State<Backend>, Json(input): Json<LoginInput>) -> Reply<AuthPayload> {
    match blocking(&backend, move |b| b.login(&input.identifier, &input.password)).await {
        Ok((user, token)) => ok(
            "Logged in",
            AuthPayload {
                user: Some(user),
                token: Some(token),
            },
        ),
        Err(e) => failure(e),
    }
}

pub async fn register(
    State(backend): State<Backend>,
    Json(input): Json<RegisterInput>,
) -> Reply<AuthPayload> {
    match blocking(&backend, move |b| {
        b.register(&input.username, &input.email, &input.password)
    })
    .await
    {
        Ok((user, token)) => (
            StatusCode::CREATED,
            Json(ApiResponse::ok(
                "Account created",
                AuthPayload {
                    user: Some(user),
                    token: Some(token),
                },
            )),
        ),
        Err(e) => failure(e),
    }
}

pub async fn send_reset_password(
    State(backend): State<Backend>,
    Json(input): Json<EmailInput>,
) -> Reply<Empty> {
    match backend.request_password_reset(&input.email) {
        Ok(()) => ok("Password reset link sent", Empty {}),
        Err(BackendError::NotFound) => failure(BackendError::Invalid(
            "No account uses that email".to_string(),
        )),
        Err(e) => failure(e),
    }
}

// ============================================================
// Profile (authenticated)
// ============================================================

pub async fn update_username(
    State(backend): State<Backend>,
    Extension(AuthAccount(id)): Extension<AuthAccount>,
    Json(input): Json<UsernameInput>,
) -> Reply<UserPayload> {
    user_reply("Username updated", backend.update_username(id, &input.username))
}

pub async fn update_email(
    State(backend): State<Backend>,
    Extension(AuthAccount(id)): Extension<AuthAccount>,
    Json(input): Json<EmailInput>,
) -> Reply<UserPayload> {
    user_reply("Email updated", backend.update_email(id, &input.email))
}

pub async fn update_password(
    State(backend): State<Backend>,
    Extension(AuthAccount(id)): Extension<AuthAccount>,
    Json(input): Json<UpdatePasswordInput>,
) -> Reply<Empty> {
    match blocking(&backend, move |b| {
        b.update_password(id, &input.current_password, &input.new_password)
    })
    .await
    {
        Ok(()) => ok("Password updated", Empty {}),
        Err(BackendError::InvalidCredentials) => failure(BackendError::Invalid(
            "Current password is incorrect".to_string(),
        )),
        Err(e) => failure(e),
    }
}

pub async fn update_avatar(
    State(backend): State<Backend>,
    Extension(AuthAccount(id)): Extension<AuthAccount>,
    Json(input): Json<UpdateAvatarInput>,
) -> Reply<AvatarPayload> {
    match backend.update_avatar(id, &input.avatar) {
        Ok(avatar) => ok(
            "Avatar updated",
            AvatarPayload {
                avatar: Some(avatar),
            },
        ),
        Err(e) => failure(e),
    }
}

pub async fn delete_user(
    State(backend): State<Backend>,
    Extension(AuthAccount(id)): Extension<AuthAccount>,
) -> Reply<Empty> {
    match backend.delete(id) {
        Ok(()) => ok("Account deleted", Empty {}),
        Err(e) => failure(e),
    }
}

// ============================================================
// Sync (authenticated)
// ============================================================

pub async fn sync_user(
    State(backend): State<Backend>,
    Extension(AuthAccount(id)): Extension<AuthAccount>,
    Json(input): Json<SyncUserInput>,
) -> Reply<UserPayload> {
    user_reply("User synced", backend.sync_user(id, input.user))
}

pub async fn sync_notes(
    State(backend): State<Backend>,
    Extension(AuthAccount(id)): Extension<AuthAccount>,
    Json(input): Json<SyncNotesInput>,
) -> Reply<NotesPayload> {
    match backend.sync_notes(id, input.notes) {
        Ok(notes) => ok("Notes synced", NotesPayload { notes: Some(notes) }),
        Err(e) => failure(e),
    }
}

fn user_reply(message: &str, result: Result<crate::models::User, BackendError>) -> Reply<UserPayload> {
    match result {
        Ok(user) => ok(message, UserPayload { user: Some(user) }),
        Err(e) => failure(e),
    }
}
