//! Session admission, liveness and revocation on top of [`SessionRepo`].
//!
//! Handlers and the request gate call into this module rather than the
//! repository. Role policy is resolved here.

use chrono::Utc;
use quoteflow_core::admission::is_fresh;
use quoteflow_core::error::{CoreError, SessionRejection};
use quoteflow_core::types::{DbId, Timestamp};
use quoteflow_db::models::login_attempt::NewLoginAttempt;
use quoteflow_db::models::session::{
    AccountSession, AdmitOutcome, AdmitSession, ClientMeta, RevokeReason,
};
use quoteflow_db::repositories::{AccountRepo, SessionRepo};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Longest session token accepted from a client.
pub const MAX_SESSION_TOKEN_LEN: usize = 256;

/// Result of a successful admission.
#[derive(Debug)]
pub struct Admission {
    pub session: AccountSession,
    /// The token the client must attach from now on. Equal to the requested
    /// token, or freshly minted when none was given.
    pub session_token: String,
    /// Sessions revoked to make room, oldest first.
    pub evicted: Vec<AccountSession>,
    /// `true` when the token already held an active session.
    pub renewed: bool,
}

/// Mint an opaque session token.
pub fn mint_token() -> String {
    Uuid::new_v4().to_string()
}

/// Admit `token` (or a freshly minted one) for an account.
///
/// Runs the full count-and-evict algorithm under the account's lock. A revoked
/// token is refused with [`SessionRejection::Revoked`]. `audit` is committed
/// together with the admission; a refusal writes nothing.
pub async fn admit(
    state: &AppState,
    account_id: DbId,
    role: &str,
    token: Option<String>,
    meta: ClientMeta,
    audit: Option<NewLoginAttempt>,
) -> AppResult<Admission> {
    let session_token = token.unwrap_or_else(mint_token);
    let policy = state.config.session.role_policy(role);

    let input = AdmitSession {
        account_id,
        session_token,
        meta,
        audit,
    };
    let outcome =
        SessionRepo::admit(&state.pool, &input, policy, state.config.session.retention()).await?;

    match outcome {
        AdmitOutcome::Renewed(session) => {
            tracing::debug!(account_id, session_id = session.id, "Session renewed at login");
            Ok(Admission {
                session,
                session_token: input.session_token,
                evicted: Vec::new(),
                renewed: true,
            })
        }
        AdmitOutcome::Admitted { session, evicted } => {
            for victim in &evicted {
                tracing::info!(
                    account_id,
                    role,
                    session_id = session.id,
                    evicted_session_id = victim.id,
                    evicted_device_id = victim.device_id.as_deref().unwrap_or("-"),
                    "Session evicted by newer login"
                );
            }
            tracing::info!(
                account_id,
                role,
                session_id = session.id,
                limit = policy.limit,
                "Session admitted"
            );
            Ok(Admission {
                session,
                session_token: input.session_token,
                evicted,
                renewed: false,
            })
        }
        AdmitOutcome::Refused(reason) => {
            tracing::info!(account_id, %reason, "Session admission refused");
            Err(reason.into())
        }
    }
}

/// Admit a fresh session for a request that arrived without one.
///
/// Only reached under `MissingSessionPolicy::Admit`. Leaves an audit row so
/// every silently minted session can be traced.
pub async fn self_heal(
    state: &AppState,
    account_id: DbId,
    role: &str,
    meta: ClientMeta,
) -> AppResult<Admission> {
    let account = AccountRepo::find_by_id(&state.pool, account_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::Unauthorized("Account no longer exists".into())))?;
    let audit = NewLoginAttempt {
        account_id: Some(account_id),
        username: account.username,
        success: true,
        detail: Some("self_heal".into()),
        client_address: meta.client_address.clone(),
        client_agent: meta.client_agent.clone(),
    };

    let admission = admit(state, account_id, role, None, meta, Some(audit)).await?;
    tracing::warn!(
        account_id,
        role,
        session_id = admission.session.id,
        evicted = admission.evicted.len(),
        "Request without session token; minted a new session"
    );
    Ok(admission)
}

/// Check a token and, when it is active, bump its activity.
///
/// The freshness check and the bump are one conditional statement, so a
/// session that passes here cannot have been evicted in between. On failure
/// the row is looked up once more purely to report the reason.
pub async fn validate(
    state: &AppState,
    account_id: DbId,
    role: &str,
    token: &str,
    meta: &ClientMeta,
) -> AppResult<Result<AccountSession, SessionRejection>> {
    let ttl = state.config.session.role_policy(role).ttl();

    if let Some(session) = SessionRepo::touch(&state.pool, account_id, token, ttl, meta).await? {
        return Ok(Ok(session));
    }

    let reason = match SessionRepo::find(&state.pool, account_id, token).await? {
        None => SessionRejection::Unknown,
        Some(row) if row.revoked => SessionRejection::Revoked,
        Some(_) => SessionRejection::Expired,
    };
    tracing::info!(account_id, role, %reason, "Session rejected");
    Ok(Err(reason))
}

/// Liveness signal. `false` means the client must log out.
pub async fn heartbeat(
    state: &AppState,
    account_id: DbId,
    role: &str,
    token: &str,
    meta: &ClientMeta,
) -> AppResult<bool> {
    let ttl = state.config.session.role_policy(role).ttl();
    let alive = SessionRepo::touch(&state.pool, account_id, token, ttl, meta)
        .await?
        .is_some();
    tracing::debug!(account_id, alive, "Heartbeat");
    Ok(alive)
}

/// Revoke the caller's own session. Idempotent.
pub async fn revoke_self(state: &AppState, account_id: DbId, token: &str) -> AppResult<bool> {
    let revoked = SessionRepo::revoke(&state.pool, account_id, token, RevokeReason::Logout).await?;
    if revoked {
        tracing::info!(account_id, "Session revoked by logout");
    }
    Ok(revoked)
}

/// Revoke any session by row id. Re-revoking returns the row unchanged.
pub async fn revoke_by_admin(
    state: &AppState,
    admin_id: DbId,
    session_id: DbId,
) -> AppResult<AccountSession> {
    let session = SessionRepo::revoke_by_id(&state.pool, session_id, RevokeReason::Admin)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Session",
            id: session_id,
        }))?;
    tracing::info!(
        admin_id,
        account_id = session.account_id,
        session_id,
        "Session revoked by admin"
    );
    Ok(session)
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// A session as shown to its owner or an operator. Never includes the token.
#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: AccountSession,
    /// Not revoked and heard from within the role TTL.
    pub active: bool,
    /// Whether this is the session the request was made with.
    pub current: bool,
}

/// Every stored session of an account, newest activity first, with liveness
/// evaluated under `role`'s TTL.
pub async fn list_sessions(
    state: &AppState,
    account_id: DbId,
    role: &str,
    current_session_id: Option<DbId>,
) -> AppResult<Vec<SessionView>> {
    let ttl = state.config.session.role_policy(role).ttl();
    let now: Timestamp = Utc::now();
    let rows = SessionRepo::list_for_account(&state.pool, account_id).await?;

    Ok(rows
        .into_iter()
        .map(|session| SessionView {
            active: !session.revoked && is_fresh(session.last_active_at, ttl, now),
            current: Some(session.id) == current_session_id,
            session,
        })
        .collect())
}
