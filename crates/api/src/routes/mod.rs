pub mod admin;
pub mod auth;
pub mod health;
pub mod sessions;

use axum::middleware::from_fn_with_state;
use axum::Router;

use crate::middleware::session::session_gate;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /auth/login                              login (public)
/// /auth/heartbeat                          liveness (JWT)
/// /auth/session                            validate (JWT)
/// /auth/logout                             revoke own session (JWT)
///
/// --- behind the session gate ---
/// /auth/me                                 current account
/// /sessions                                own active sessions
/// /admin/accounts/{id}/sessions            account sessions (admin)
/// /admin/accounts/{id}/login-attempts      login audit (admin)
/// /admin/sessions/{id}                     revoke (admin)
/// ```
///
/// The gate needs the state up front to build its layer.
pub fn api_routes(state: &AppState) -> Router<AppState> {
    let gated = Router::new()
        .merge(auth::gated_router())
        .merge(sessions::router())
        .nest("/admin", admin::router())
        .route_layer(from_fn_with_state(state.clone(), session_gate));

    Router::new().merge(auth::router()).merge(gated)
}
