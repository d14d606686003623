//! Session listings and operator revocation.

use axum::extract::{Path, Query, State};
use axum::Json;
use quoteflow_core::error::CoreError;
use quoteflow_core::types::DbId;
use quoteflow_db::models::login_attempt::LoginAttempt;
use quoteflow_db::repositories::{AccountRepo, LoginAttemptRepo};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireAdmin;
use crate::middleware::session::SessionUser;
use crate::response::DataResponse;
use crate::sessions::{self, SessionView};
use crate::state::AppState;

const DEFAULT_ATTEMPT_LIMIT: i64 = 50;
const MAX_ATTEMPT_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct AttemptQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/sessions
///
/// The caller's own active sessions, the current one flagged.
pub async fn list_own(
    State(state): State<AppState>,
    user: SessionUser,
) -> AppResult<Json<DataResponse<Vec<SessionView>>>> {
    let views = sessions::list_sessions(&state, user.account_id, &user.role, Some(user.session_id))
        .await?
        .into_iter()
        .filter(|v| v.active)
        .collect();
    Ok(Json(DataResponse { data: views }))
}

/// GET /api/v1/admin/accounts/{id}/sessions
///
/// Every stored session of the account, including revoked and stale ones.
/// Liveness is evaluated under the account's own role.
pub async fn list_for_account(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(account_id): Path<DbId>,
) -> AppResult<Json<DataResponse<Vec<SessionView>>>> {
    let account = AccountRepo::find_by_id(&state.pool, account_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Account",
            id: account_id,
        }))?;
    let views = sessions::list_sessions(&state, account.id, &account.role, None).await?;
    Ok(Json(DataResponse { data: views }))
}

/// DELETE /api/v1/admin/sessions/{id}
///
/// Revoke one session. Takes effect on the owner's next request.
pub async fn revoke(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(session_id): Path<DbId>,
) -> AppResult<Json<DataResponse<SessionView>>> {
    let session = sessions::revoke_by_admin(&state, admin.account_id, session_id).await?;
    Ok(Json(DataResponse {
        data: SessionView {
            current: session.id == admin.session_id,
            active: false,
            session,
        },
    }))
}

/// GET /api/v1/admin/accounts/{id}/login-attempts?limit=N
pub async fn list_login_attempts(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(account_id): Path<DbId>,
    Query(query): Query<AttemptQuery>,
) -> AppResult<Json<DataResponse<Vec<LoginAttempt>>>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ATTEMPT_LIMIT)
        .clamp(1, MAX_ATTEMPT_LIMIT);
    let attempts = LoginAttemptRepo::list_for_account(&state.pool, account_id, limit).await?;
    Ok(Json(DataResponse { data: attempts }))
}
