//! Account model, as far as credential verification needs it.

use quoteflow_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `accounts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Account {
    pub id: DbId,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: Timestamp,
}

/// DTO for creating an account (seeding and tests).
pub struct CreateAccount {
    pub username: String,
    pub password_hash: String,
    pub role: String,
}
