//! Bearer-token authentication for the account and sync routes.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use super::backend::Backend;
use crate::models::api::MessageResponse;

/// The account a request was authenticated as. Inserted as a request
/// extension for downstream handlers.
#[derive(Debug, Clone, Copy)]
pub struct AuthAccount(pub Uuid);

pub async fn auth_middleware(
    State(backend): State<Backend>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token);

    let Some(token) = token else {
        tracing::warn!("Missing or malformed Authorization header");
        return unauthorized("Authentication required");
    };

    match backend.account_for_token(token) {
        Some(id) => {
            request.extensions_mut().insert(AuthAccount(id));
            next.run(request).await
        }
        None => {
            tracing::warn!("Unknown bearer token");
            unauthorized("Invalid or expired token")
        }
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(MessageResponse::fail(message)),
    )
        .into_response()
}
