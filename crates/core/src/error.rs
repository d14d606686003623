use std::fmt;

use serde::Serialize;

use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The credential was valid but the attached session is not admitted.
    #[error("Session rejected: {0}")]
    SessionRejected(SessionRejection),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why the session attached to an otherwise authenticated request was refused.
///
/// Every variant is a local, final decision: the caller must discard its
/// credential and authenticate again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionRejection {
    /// No session token was supplied with the request.
    Missing,
    /// A token was supplied but no row exists for it (never admitted, or pruned).
    ///
    /// Clients see this as `expired`; only logs keep the distinction.
    #[serde(rename = "expired")]
    Unknown,
    /// The row exists but went silent for longer than the role TTL.
    Expired,
    /// The row was revoked by logout, eviction, or an operator.
    Revoked,
}

impl SessionRejection {
    /// Stable machine-readable reason string.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionRejection::Missing => "missing",
            SessionRejection::Unknown => "unknown",
            SessionRejection::Expired => "expired",
            SessionRejection::Revoked => "revoked",
        }
    }
}

impl fmt::Display for SessionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
