use axum::routing::{delete, get};
use axum::Router;

use crate::handlers::sessions;
use crate::state::AppState;

/// Routes mounted at `/admin`. Every handler takes `RequireAdmin`.
///
/// ```text
/// GET    /accounts/{id}/sessions        -> list_for_account
/// GET    /accounts/{id}/login-attempts  -> list_login_attempts
/// DELETE /sessions/{id}                 -> revoke
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts/{id}/sessions", get(sessions::list_for_account))
        .route(
            "/accounts/{id}/login-attempts",
            get(sessions::list_login_attempts),
        )
        .route("/sessions/{id}", delete(sessions::revoke))
}
