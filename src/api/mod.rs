//! Reference notes API.
//!
//! Serves the endpoint set the client speaks, backed by [`Backend`]. Used by
//! `memoize serve` and by the integration tests.

pub mod backend;
mod handlers;
mod middleware;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use backend::{Backend, BackendError};
pub use middleware::AuthAccount;

pub fn create_router(backend: Backend) -> Router {
    let protected = Router::new()
        .route("/user/update-username", put(handlers::update_username))
        .route("/user/update-email", put(handlers::update_email))
        .route("/user/update-password", put(handlers::update_password))
        .route("/user/update-avatar", put(handlers::update_avatar))
        .route("/user/delete-user", delete(handlers::delete_user))
        .route("/user/sync", put(handlers::sync_user))
        .route("/note/sync", put(handlers::sync_notes))
        .route_layer(from_fn_with_state(
            backend.clone(),
            middleware::auth_middleware,
        ));

    let api = Router::new()
        .route(
            "/user/check-username-availability",
            post(handlers::check_username_availability),
        )
        .route(
            "/user/check-email-availability",
            post(handlers::check_email_availability),
        )
        .route("/user/login", post(handlers::login))
        .route("/user/register", post(handlers::register))
        .route("/user/send-reset-password", post(handlers::send_reset_password))
        .route("/health", get(handlers::health))
        .merge(protected);

    Router::new()
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(backend)
}
