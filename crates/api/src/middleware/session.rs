//! The session gate.
//!
//! Every protected request carries two things: a JWT proving identity and an
//! `x-session-token` header naming the session it acts under. The gate checks
//! that the session is still admitted (not revoked, not stale) and bumps its
//! activity in the same statement. Anything else ends the request with a 401
//! whose code tells the client why.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use quoteflow_core::error::SessionRejection;
use quoteflow_core::policy::MissingSessionPolicy;
use quoteflow_core::types::DbId;
use quoteflow_db::models::session::ClientMeta;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::sessions::{self, MAX_SESSION_TOKEN_LEN};
use crate::state::AppState;

/// Request header carrying the session token. Also set on responses when the
/// server minted a token for the caller.
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Optional client-chosen device label.
pub const DEVICE_ID_HEADER: &str = "x-device-id";

const MAX_META_LEN: usize = 512;

/// An authenticated caller whose session passed the gate.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub account_id: DbId,
    pub role: String,
    /// Row id of the admitted session.
    pub session_id: DbId,
}

impl<S: Send + Sync> FromRequestParts<S> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionUser>()
            .cloned()
            .ok_or_else(|| AppError::InternalError("route is not behind the session gate".into()))
    }
}

/// Middleware guarding every route that acts on the caller's behalf.
///
/// Mount with `axum::middleware::from_fn_with_state`.
pub async fn session_gate(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = request.into_parts();
    let user = AuthUser::from_request_parts(&mut parts, &state).await?;
    let meta = client_meta(&parts.headers);

    let (session, minted) = match session_token(&parts.headers)? {
        Some(token) => {
            let session =
                sessions::validate(&state, user.account_id, &user.role, &token, &meta).await??;
            (session, None)
        }
        None => match state.config.session.missing_policy {
            MissingSessionPolicy::Reject => {
                tracing::info!(account_id = user.account_id, "Request without session token");
                return Err(SessionRejection::Missing.into());
            }
            MissingSessionPolicy::Admit => {
                let admission =
                    sessions::self_heal(&state, user.account_id, &user.role, meta).await?;
                (admission.session, Some(admission.session_token))
            }
        },
    };

    parts.extensions.insert(SessionUser {
        account_id: user.account_id,
        role: user.role,
        session_id: session.id,
    });

    let mut response = next.run(Request::from_parts(parts, body)).await;
    if let Some(token) = minted {
        let value = HeaderValue::from_str(&token)
            .map_err(|e| AppError::InternalError(format!("Minted token is not a header: {e}")))?;
        response.headers_mut().insert(SESSION_TOKEN_HEADER, value);
    }
    Ok(response)
}

/// The caller's session token. An absent or blank header is `None`.
pub fn session_token(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let Some(value) = headers.get(SESSION_TOKEN_HEADER) else {
        return Ok(None);
    };
    let token = value
        .to_str()
        .map_err(|_| AppError::BadRequest(format!("{SESSION_TOKEN_HEADER} must be ASCII")))?
        .trim();
    if token.is_empty() {
        return Ok(None);
    }
    if token.len() > MAX_SESSION_TOKEN_LEN {
        return Err(AppError::BadRequest(format!(
            "{SESSION_TOKEN_HEADER} exceeds {MAX_SESSION_TOKEN_LEN} characters"
        )));
    }
    Ok(Some(token.to_string()))
}

/// Diagnostic metadata from request headers. Malformed values are dropped.
pub fn client_meta(headers: &HeaderMap) -> ClientMeta {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| v.chars().take(MAX_META_LEN).collect::<String>())
    };

    let client_address = header("x-forwarded-for")
        .and_then(|chain| chain.split(',').next().map(|first| first.trim().to_string()))
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"));

    ClientMeta {
        device_id: header(DEVICE_ID_HEADER),
        client_address,
        client_agent: header("user-agent"),
    }
}
