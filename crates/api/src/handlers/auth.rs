//! Handlers for the `/auth` resource: login, heartbeat, validate, logout, me.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use quoteflow_core::error::{CoreError, SessionRejection};
use quoteflow_core::types::DbId;
use quoteflow_db::models::login_attempt::NewLoginAttempt;
use quoteflow_db::repositories::{AccountRepo, LoginAttemptRepo};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::jwt::generate_access_token;
use crate::auth::password::{burn_verification, verify_password};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::session::{client_meta, session_token, SessionUser};
use crate::sessions;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 255))]
    pub username: String,
    #[validate(length(min = 1, max = 1024))]
    pub password: String,
    /// Client-generated session token. The server mints one when absent.
    #[validate(length(min = 1, max = 256))]
    pub session_token: Option<String>,
    /// Stable label for the client device (diagnostics only).
    #[validate(length(max = 256))]
    pub device_id: Option<String>,
}

/// Successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Attach as `x-session-token` on every later request.
    pub session_token: String,
    pub session_id: DbId,
    pub accepted: bool,
    /// The token already held an active session.
    pub renewed: bool,
    /// Sessions displaced by this login. Their owners are logged out on their
    /// next request or heartbeat.
    pub evicted: Vec<EvictedSession>,
    /// How often the client should call `/auth/heartbeat`.
    pub heartbeat_interval_secs: u64,
    /// Silence after which this session stops counting as active.
    pub session_ttl_secs: u64,
    pub account: AccountInfo,
}

#[derive(Debug, Serialize)]
pub struct EvictedSession {
    pub id: DbId,
    pub device_id: Option<String>,
}

/// Public account info.
#[derive(Debug, Serialize)]
pub struct AccountInfo {
    pub id: DbId,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub alive: bool,
}

/// Result of `GET /auth/session`.
#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SessionRejection>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub account: AccountInfo,
    pub session_id: DbId,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/auth/login
///
/// Verify credentials, then admit the session under the role's concurrency
/// limit. Every attempt is recorded in `login_attempts`.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    input
        .validate()
        .map_err(|e| AppError::Core(CoreError::Validation(e.to_string())))?;

    let mut meta = client_meta(&headers);
    if input.device_id.is_some() {
        meta.device_id = input.device_id.clone();
    }
    let mut attempt = NewLoginAttempt {
        username: input.username.clone(),
        client_address: meta.client_address.clone(),
        client_agent: meta.client_agent.clone(),
        ..Default::default()
    };

    // 1. Credentials.
    let Some(account) = AccountRepo::find_by_username(&state.pool, &input.username).await? else {
        burn_verification(&input.password);
        return reject_login(&state, attempt, "unknown_user", invalid_credentials()).await;
    };
    attempt.account_id = Some(account.id);

    if !account.is_active {
        return reject_login(
            &state,
            attempt,
            "inactive",
            AppError::Core(CoreError::Forbidden("Account is deactivated".into())),
        )
        .await;
    }

    let password_valid = verify_password(&input.password, &account.password_hash)
        .map_err(|e| AppError::InternalError(format!("Password verification error: {e}")))?;
    if !password_valid {
        return reject_login(&state, attempt, "bad_password", invalid_credentials()).await;
    }

    // 2. Admission.
    let token = input
        .session_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);
    let admission =
        match sessions::admit(
            &state,
            account.id,
            &account.role,
            token,
            meta,
            Some(attempt.clone()),
        )
        .await
        {
            Ok(admission) => admission,
            Err(AppError::Core(CoreError::SessionRejected(reason))) => {
                let detail = format!("session_{reason}");
                return reject_login(&state, attempt, &detail, reason.into()).await;
            }
            Err(e) => return Err(e),
        };

    // 3. Credential for subsequent requests.
    let access_token = generate_access_token(account.id, &account.role, &state.config.jwt)
        .map_err(|e| AppError::InternalError(format!("Token generation error: {e}")))?;

    let policy = state.config.session.role_policy(&account.role);
    Ok(Json(LoginResponse {
        access_token,
        expires_in: state.config.jwt.expires_in_secs(),
        session_token: admission.session_token,
        session_id: admission.session.id,
        accepted: true,
        renewed: admission.renewed,
        evicted: admission
            .evicted
            .into_iter()
            .map(|s| EvictedSession {
                id: s.id,
                device_id: s.device_id,
            })
            .collect(),
        heartbeat_interval_secs: state.config.session.heartbeat_interval_secs,
        session_ttl_secs: policy.ttl_secs,
        account: AccountInfo {
            id: account.id,
            username: account.username,
            role: account.role,
        },
    }))
}

/// POST /api/v1/auth/heartbeat
///
/// Answers `{"alive": false}` with 200 instead of a 401 so the client runs its
/// forced-logout path rather than a generic auth-error path.
pub async fn heartbeat(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
) -> AppResult<Json<HeartbeatResponse>> {
    let alive = match session_token(&headers)? {
        Some(token) => {
            let meta = client_meta(&headers);
            sessions::heartbeat(&state, user.account_id, &user.role, &token, &meta).await?
        }
        None => false,
    };
    Ok(Json(HeartbeatResponse { alive }))
}

/// GET /api/v1/auth/session
///
/// Reports whether the attached session is admitted, touching it if so.
/// Never mints a session.
pub async fn validate(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
) -> AppResult<Json<ValidateResponse>> {
    let Some(token) = session_token(&headers)? else {
        return Ok(Json(ValidateResponse {
            ok: false,
            reason: Some(SessionRejection::Missing),
        }));
    };
    let meta = client_meta(&headers);
    let result = sessions::validate(&state, user.account_id, &user.role, &token, &meta).await?;
    Ok(Json(ValidateResponse {
        ok: result.is_ok(),
        reason: result.err(),
    }))
}

/// POST /api/v1/auth/logout
///
/// Revoke the attached session. 204 whether or not it was still active.
pub async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let token = session_token(&headers)?
        .ok_or_else(|| AppError::BadRequest("x-session-token header required".into()))?;
    sessions::revoke_self(&state, user.account_id, &token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/auth/me
pub async fn me(State(state): State<AppState>, user: SessionUser) -> AppResult<Json<MeResponse>> {
    let account = AccountRepo::find_by_id(&state.pool, user.account_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Account",
            id: user.account_id,
        }))?;
    Ok(Json(MeResponse {
        account: AccountInfo {
            id: account.id,
            username: account.username,
            role: account.role,
        },
        session_id: user.session_id,
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn invalid_credentials() -> AppError {
    AppError::Core(CoreError::Unauthorized(
        "Invalid username or password".into(),
    ))
}

/// Record a failed attempt, then fail with `error`.
async fn reject_login<T>(
    state: &AppState,
    mut attempt: NewLoginAttempt,
    detail: &str,
    error: AppError,
) -> AppResult<T> {
    attempt.success = false;
    attempt.detail = Some(detail.to_string());
    tracing::info!(
        username = %attempt.username,
        account_id = attempt.account_id,
        detail,
        "Login rejected"
    );
    LoginAttemptRepo::record(&state.pool, &attempt).await?;
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(session_token: Option<&str>) -> LoginRequest {
        LoginRequest {
            username: "trader".into(),
            password: "pw".into(),
            session_token: session_token.map(str::to_string),
            device_id: None,
        }
    }

    #[test]
    fn login_request_bounds_token_length() {
        assert!(request(None).validate().is_ok());
        assert!(request(Some("tab-1")).validate().is_ok());
        assert!(request(Some("")).validate().is_err());
        let long = "t".repeat(257);
        assert!(request(Some(&long)).validate().is_err());
    }

    #[test]
    fn validate_response_omits_reason_on_success() {
        let ok = serde_json::to_value(ValidateResponse {
            ok: true,
            reason: None,
        })
        .expect("serializes");
        assert_eq!(ok, serde_json::json!({"ok": true}));

        let revoked = serde_json::to_value(ValidateResponse {
            ok: false,
            reason: Some(SessionRejection::Revoked),
        })
        .expect("serializes");
        assert_eq!(revoked, serde_json::json!({"ok": false, "reason": "revoked"}));
    }
}
