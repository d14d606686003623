//! Route definitions for the `/auth` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::auth;
use crate::state::AppState;

/// `/auth` routes that do their own session handling.
///
/// ```text
/// POST /auth/login      -> login
/// POST /auth/heartbeat  -> heartbeat
/// GET  /auth/session    -> validate
/// POST /auth/logout     -> logout
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/heartbeat", post(auth::heartbeat))
        .route("/auth/session", get(auth::validate))
        .route("/auth/logout", post(auth::logout))
}

/// `/auth` routes behind the session gate.
///
/// ```text
/// GET /auth/me -> me
/// ```
pub fn gated_router() -> Router<AppState> {
    Router::new().route("/auth/me", get(auth::me))
}
