use axum::routing::get;
use axum::Router;

use crate::handlers::sessions;
use crate::state::AppState;

/// Own-session routes.
///
/// ```text
/// GET /sessions -> list_own
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/sessions", get(sessions::list_own))
}
