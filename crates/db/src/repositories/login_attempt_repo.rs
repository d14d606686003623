//! Repository for the append-only `login_attempts` table.

use quoteflow_core::types::DbId;
use sqlx::{PgExecutor, PgPool};

use crate::models::login_attempt::{LoginAttempt, NewLoginAttempt};

const COLUMNS: &str =
    "id, account_id, username, success, detail, client_address, client_agent, created_at";

pub struct LoginAttemptRepo;

impl LoginAttemptRepo {
    /// Append one attempt. Rows are never updated or deleted.
    pub async fn record<'e>(
        executor: impl PgExecutor<'e>,
        input: &NewLoginAttempt,
    ) -> Result<LoginAttempt, sqlx::Error> {
        let query = format!(
            "INSERT INTO login_attempts
                (account_id, username, success, detail, client_address, client_agent)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LoginAttempt>(&query)
            .bind(input.account_id)
            .bind(&input.username)
            .bind(input.success)
            .bind(&input.detail)
            .bind(&input.client_address)
            .bind(&input.client_agent)
            .fetch_one(executor)
            .await
    }

    /// Most recent attempts for an account, newest first.
    pub async fn list_for_account(
        pool: &PgPool,
        account_id: DbId,
        limit: i64,
    ) -> Result<Vec<LoginAttempt>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM login_attempts
             WHERE account_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2"
        );
        sqlx::query_as::<_, LoginAttempt>(&query)
            .bind(account_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
