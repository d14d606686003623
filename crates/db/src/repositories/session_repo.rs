//! Repository for the `account_sessions` table.
//!
//! Admission is the only multi-statement operation and runs inside one
//! transaction holding a per-account advisory lock, so concurrent logins for
//! the same account observe each other's inserts and evictions. Touches and
//! revocations are single conditional `UPDATE`s and need no extra locking.
//!
//! Freshness predicates on the touch path use `clock_timestamp()` rather than
//! `NOW()`: a touch that waited on a row lock held by an admission must judge
//! freshness at the moment it proceeds, not at the moment it started,
//! otherwise it could revive a row the admission already treated as stale.

use chrono::TimeDelta;
use quoteflow_core::admission::{plan_admission, AdmissionPlan};
use quoteflow_core::policy::RolePolicy;
use quoteflow_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgExecutor, PgPool};

use crate::models::session::{AccountSession, AdmitOutcome, AdmitSession, ClientMeta, RevokeReason};
use crate::repositories::LoginAttemptRepo;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, account_id, session_token, device_id, started_at, last_active_at, \
                       revoked, revoked_at, revoked_reason, client_address, client_agent";

/// First key of the two-key advisory lock used for admissions. The second
/// key is derived from the account id.
pub const ADMISSION_LOCK_NAMESPACE: i32 = 0x5E55;

/// Convert a duration to fractional seconds for `make_interval(secs => ..)`.
fn interval_secs(d: TimeDelta) -> f64 {
    d.num_milliseconds() as f64 / 1000.0
}

/// Provides the session store operations.
pub struct SessionRepo;

impl SessionRepo {
    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Find the row for `(account, token)` regardless of its state.
    pub async fn find<'e>(
        executor: impl PgExecutor<'e>,
        account_id: DbId,
        session_token: &str,
    ) -> Result<Option<AccountSession>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM account_sessions
             WHERE account_id = $1 AND session_token = $2"
        );
        sqlx::query_as::<_, AccountSession>(&query)
            .bind(account_id)
            .bind(session_token)
            .fetch_optional(executor)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<AccountSession>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM account_sessions WHERE id = $1");
        sqlx::query_as::<_, AccountSession>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Sessions that count against the account's limit: not revoked and
    /// active within `ttl`. Oldest activity first.
    pub async fn list_active<'e>(
        executor: impl PgExecutor<'e>,
        account_id: DbId,
        ttl: TimeDelta,
    ) -> Result<Vec<AccountSession>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM account_sessions
             WHERE account_id = $1
               AND revoked = false
               AND last_active_at >= NOW() - make_interval(secs => $2)
             ORDER BY last_active_at ASC, started_at ASC, id ASC"
        );
        sqlx::query_as::<_, AccountSession>(&query)
            .bind(account_id)
            .bind(interval_secs(ttl))
            .fetch_all(executor)
            .await
    }

    /// Every stored row of an account, most recently active first.
    pub async fn list_for_account(
        pool: &PgPool,
        account_id: DbId,
    ) -> Result<Vec<AccountSession>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM account_sessions
             WHERE account_id = $1
             ORDER BY last_active_at DESC, id DESC"
        );
        sqlx::query_as::<_, AccountSession>(&query)
            .bind(account_id)
            .fetch_all(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Admission
    // -----------------------------------------------------------------------

    /// Admit `input.session_token` for its account under `policy`.
    ///
    /// Runs lookup, inline pruning, counting, eviction and insertion as one
    /// critical section per account. Rows whose last activity is older than
    /// the role TTL plus `retention` are deleted along the way.
    ///
    /// `input.audit` is recorded in the same transaction, so a failed audit
    /// insert leaves every existing session untouched.
    pub async fn admit(
        pool: &PgPool,
        input: &AdmitSession,
        policy: RolePolicy,
        retention: TimeDelta,
    ) -> Result<AdmitOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        Self::lock_account(&mut tx, input.account_id).await?;

        // NOW() is fixed for the whole transaction, so the SQL predicates
        // below and the in-memory plan agree on what "fresh" means.
        let now = sqlx::query_scalar::<_, Timestamp>("SELECT NOW()")
            .fetch_one(&mut *tx)
            .await?;

        let cutoff = policy.ttl().checked_add(&retention).unwrap_or(TimeDelta::MAX);
        let pruned = Self::prune_account(&mut tx, input.account_id, cutoff).await?;
        if pruned > 0 {
            tracing::debug!(account_id = input.account_id, pruned, "Pruned stale sessions inline");
        }

        // Prefer the locked copy of the token's own row; only a revoked (or
        // absent) row needs the separate lookup.
        let candidates = Self::lock_unrevoked(&mut tx, input.account_id).await?;
        let existing = match candidates
            .iter()
            .find(|s| s.session_token == input.session_token)
        {
            Some(row) => Some(row.clone()),
            None => Self::find(&mut *tx, input.account_id, &input.session_token).await?,
        };

        let existing_snapshot = existing.as_ref().map(AccountSession::snapshot);
        let snapshots: Vec<_> = candidates.iter().map(AccountSession::snapshot).collect();
        let plan = plan_admission(existing_snapshot.as_ref(), &snapshots, policy, now);

        let outcome = match (plan, existing) {
            (AdmissionPlan::Refuse(reason), _) => {
                tx.rollback().await?;
                return Ok(AdmitOutcome::Refused(reason));
            }
            (AdmissionPlan::Renew, Some(row)) => {
                AdmitOutcome::Renewed(Self::renew(&mut tx, row.id, &input.meta).await?)
            }
            (AdmissionPlan::Admit { evict, reactivate }, existing) => {
                let evicted = Self::evict(&mut tx, &evict).await?;
                let session = match existing {
                    Some(row) if reactivate => Self::reactivate(&mut tx, row.id, &input.meta).await?,
                    _ => Self::insert(&mut tx, input).await?,
                };
                AdmitOutcome::Admitted { session, evicted }
            }
            (AdmissionPlan::Renew, None) => {
                // plan_admission only renews an existing row.
                tx.rollback().await?;
                return Err(sqlx::Error::RowNotFound);
            }
        };

        if let Some(audit) = &input.audit {
            let mut row = audit.clone();
            row.success = true;
            if let AdmitOutcome::Admitted { evicted, .. } = &outcome {
                if row.detail.is_none() && !evicted.is_empty() {
                    row.detail = Some(format!("evicted:{}", evicted.len()));
                }
            }
            LoginAttemptRepo::record(&mut *tx, &row).await?;
        }

        tx.commit().await?;
        Ok(outcome)
    }

    /// Serialise admissions for one account until the transaction ends.
    async fn lock_account(conn: &mut PgConnection, account_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_advisory_xact_lock($1, ($2 % 2147483647)::int4)")
            .bind(ADMISSION_LOCK_NAMESPACE)
            .bind(account_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// All unrevoked rows of the account, row-locked.
    ///
    /// Freshness is filtered in memory: `FOR UPDATE` waits for in-flight
    /// touches and then returns their committed `last_active_at`.
    async fn lock_unrevoked(
        conn: &mut PgConnection,
        account_id: DbId,
    ) -> Result<Vec<AccountSession>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM account_sessions
             WHERE account_id = $1 AND revoked = false
             ORDER BY last_active_at ASC, started_at ASC, id ASC
             FOR UPDATE"
        );
        sqlx::query_as::<_, AccountSession>(&query)
            .bind(account_id)
            .fetch_all(conn)
            .await
    }

    async fn renew(
        conn: &mut PgConnection,
        id: DbId,
        meta: &ClientMeta,
    ) -> Result<AccountSession, sqlx::Error> {
        let query = format!(
            "UPDATE account_sessions
             SET last_active_at = GREATEST(last_active_at, NOW()),
                 device_id = COALESCE($2, device_id),
                 client_address = COALESCE($3, client_address),
                 client_agent = COALESCE($4, client_agent)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AccountSession>(&query)
            .bind(id)
            .bind(&meta.device_id)
            .bind(&meta.client_address)
            .bind(&meta.client_agent)
            .fetch_one(conn)
            .await
    }

    /// Bring a stale, unrevoked row back as a brand-new admission.
    async fn reactivate(
        conn: &mut PgConnection,
        id: DbId,
        meta: &ClientMeta,
    ) -> Result<AccountSession, sqlx::Error> {
        let query = format!(
            "UPDATE account_sessions
             SET started_at = NOW(),
                 last_active_at = GREATEST(last_active_at, NOW()),
                 device_id = COALESCE($2, device_id),
                 client_address = COALESCE($3, client_address),
                 client_agent = COALESCE($4, client_agent)
             WHERE id = $1 AND revoked = false
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AccountSession>(&query)
            .bind(id)
            .bind(&meta.device_id)
            .bind(&meta.client_address)
            .bind(&meta.client_agent)
            .fetch_one(conn)
            .await
    }

    async fn insert(
        conn: &mut PgConnection,
        input: &AdmitSession,
    ) -> Result<AccountSession, sqlx::Error> {
        let query = format!(
            "INSERT INTO account_sessions
                (account_id, session_token, device_id, client_address, client_agent)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AccountSession>(&query)
            .bind(input.account_id)
            .bind(&input.session_token)
            .bind(&input.meta.device_id)
            .bind(&input.meta.client_address)
            .bind(&input.meta.client_agent)
            .fetch_one(conn)
            .await
    }

    async fn evict(
        conn: &mut PgConnection,
        ids: &[DbId],
    ) -> Result<Vec<AccountSession>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "UPDATE account_sessions
             SET revoked = true, revoked_at = NOW(), revoked_reason = $2
             WHERE id = ANY($1) AND revoked = false
             RETURNING {COLUMNS}"
        );
        let mut evicted = sqlx::query_as::<_, AccountSession>(&query)
            .bind(ids)
            .bind(RevokeReason::Evicted.as_str())
            .fetch_all(conn)
            .await?;
        // RETURNING order is unspecified; report victims in eviction order.
        evicted.sort_by_key(|s| ids.iter().position(|id| *id == s.id));
        Ok(evicted)
    }

    // -----------------------------------------------------------------------
    // Liveness
    // -----------------------------------------------------------------------

    /// Renew `last_active_at` of an active session and merge client metadata.
    ///
    /// Returns `None` when the row is missing, revoked, or already stale under
    /// `ttl`; a touch never revives such a row.
    pub async fn touch(
        pool: &PgPool,
        account_id: DbId,
        session_token: &str,
        ttl: TimeDelta,
        meta: &ClientMeta,
    ) -> Result<Option<AccountSession>, sqlx::Error> {
        let query = format!(
            "UPDATE account_sessions
             SET last_active_at = GREATEST(last_active_at, clock_timestamp()),
                 device_id = COALESCE($4, device_id),
                 client_address = COALESCE($5, client_address),
                 client_agent = COALESCE($6, client_agent)
             WHERE account_id = $1
               AND session_token = $2
               AND revoked = false
               AND last_active_at >= clock_timestamp() - make_interval(secs => $3)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AccountSession>(&query)
            .bind(account_id)
            .bind(session_token)
            .bind(interval_secs(ttl))
            .bind(&meta.device_id)
            .bind(&meta.client_address)
            .bind(&meta.client_agent)
            .fetch_optional(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Revocation
    // -----------------------------------------------------------------------

    /// Revoke the session for `(account, token)`. Returns `true` if the row
    /// transitioned; revoking an already-revoked row is a no-op.
    pub async fn revoke(
        pool: &PgPool,
        account_id: DbId,
        session_token: &str,
        reason: RevokeReason,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE account_sessions
             SET revoked = true, revoked_at = NOW(), revoked_reason = $3
             WHERE account_id = $1 AND session_token = $2 AND revoked = false",
        )
        .bind(account_id)
        .bind(session_token)
        .bind(reason.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke a session by row id, returning the row (or `None` if it does
    /// not exist). The first revocation's time and reason are preserved.
    pub async fn revoke_by_id(
        pool: &PgPool,
        id: DbId,
        reason: RevokeReason,
    ) -> Result<Option<AccountSession>, sqlx::Error> {
        let query = format!(
            "UPDATE account_sessions
             SET revoked = true,
                 revoked_at = COALESCE(revoked_at, NOW()),
                 revoked_reason = COALESCE(revoked_reason, $2)
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AccountSession>(&query)
            .bind(id)
            .bind(reason.as_str())
            .fetch_optional(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Housekeeping
    // -----------------------------------------------------------------------

    /// Delete every row whose last activity is older than `older_than`.
    /// Returns the count of deleted rows.
    pub async fn prune_stale(pool: &PgPool, older_than: TimeDelta) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM account_sessions
             WHERE last_active_at < NOW() - make_interval(secs => $1)",
        )
        .bind(interval_secs(older_than))
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn prune_account(
        conn: &mut PgConnection,
        account_id: DbId,
        older_than: TimeDelta,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM account_sessions
             WHERE account_id = $1
               AND last_active_at < NOW() - make_interval(secs => $2)",
        )
        .bind(account_id)
        .bind(interval_secs(older_than))
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}
