//! Account session model and DTOs.

use quoteflow_core::admission::SessionSnapshot;
use quoteflow_core::error::SessionRejection;
use quoteflow_core::types::{DbId, Timestamp};

use crate::models::login_attempt::NewLoginAttempt;
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `account_sessions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AccountSession {
    pub id: DbId,
    pub account_id: DbId,
    /// Never echoed back in listings; only the owning client knows it.
    #[serde(skip_serializing)]
    pub session_token: String,
    pub device_id: Option<String>,
    pub started_at: Timestamp,
    pub last_active_at: Timestamp,
    pub revoked: bool,
    pub revoked_at: Option<Timestamp>,
    pub revoked_reason: Option<String>,
    pub client_address: Option<String>,
    pub client_agent: Option<String>,
}

impl AccountSession {
    /// The admission-relevant view of this row, keyed by row id.
    pub fn snapshot(&self) -> SessionSnapshot<DbId> {
        SessionSnapshot {
            key: self.id,
            started_at: self.started_at,
            last_active_at: self.last_active_at,
            revoked: self.revoked,
        }
    }
}

/// Opportunistic diagnostic metadata about the calling client.
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub device_id: Option<String>,
    pub client_address: Option<String>,
    pub client_agent: Option<String>,
}

/// Input for [`SessionRepo::admit`](crate::repositories::SessionRepo::admit).
#[derive(Debug, Clone)]
pub struct AdmitSession {
    pub account_id: DbId,
    pub session_token: String,
    pub meta: ClientMeta,
    /// Audit row written in the admission transaction when the session is
    /// renewed or admitted. `success` is forced to `true`; an empty `detail`
    /// becomes `evicted:N` when the admission displaced sessions.
    pub audit: Option<NewLoginAttempt>,
}

/// Why a session was revoked. Stored in `revoked_reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeReason {
    /// Displaced by a newer login under the concurrency limit.
    Evicted,
    /// The owner logged out.
    Logout,
    /// An operator closed it.
    Admin,
}

impl RevokeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RevokeReason::Evicted => "evicted",
            RevokeReason::Logout => "logout",
            RevokeReason::Admin => "admin",
        }
    }
}

/// Result of an admission attempt.
#[derive(Debug, Clone)]
pub enum AdmitOutcome {
    /// The token already held an active session; its activity was bumped.
    Renewed(AccountSession),
    /// A session was inserted (or a stale one for the same token revived),
    /// after revoking `evicted` to make room.
    Admitted {
        session: AccountSession,
        evicted: Vec<AccountSession>,
    },
    /// The token cannot be admitted.
    Refused(SessionRejection),
}
