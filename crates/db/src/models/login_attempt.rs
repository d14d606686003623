//! Append-only login audit records.

use quoteflow_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `login_attempts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LoginAttempt {
    pub id: DbId,
    pub account_id: Option<DbId>,
    pub username: String,
    pub success: bool,
    pub detail: Option<String>,
    pub client_address: Option<String>,
    pub client_agent: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for recording one attempt.
#[derive(Debug, Clone, Default)]
pub struct NewLoginAttempt {
    pub account_id: Option<DbId>,
    pub username: String,
    pub success: bool,
    /// Short machine-readable note, e.g. `"bad_password"` or `"self_heal"`.
    pub detail: Option<String>,
    pub client_address: Option<String>,
    pub client_agent: Option<String>,
}
