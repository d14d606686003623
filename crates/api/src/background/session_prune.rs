//! Periodic deletion of long-dead session rows.
//!
//! Admission already prunes the account it touches. This sweep covers
//! accounts that never log in again. The cutoff is the longest role TTL plus
//! the retention window, so no row that could still be active under any role
//! is deleted, and recently revoked rows stay around long enough for a
//! client to be told "revoked" rather than "expired".

use std::time::Duration;

use chrono::TimeDelta;
use quoteflow_db::repositories::SessionRepo;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

/// Run the prune loop until `cancel` fires.
///
/// `older_than` is measured against `last_active_at`.
pub async fn run(
    pool: PgPool,
    every: Duration,
    older_than: TimeDelta,
    cancel: CancellationToken,
) {
    tracing::info!(
        interval_secs = every.as_secs(),
        older_than_secs = older_than.num_seconds(),
        "Session prune job started"
    );

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session prune job stopping");
                break;
            }
            _ = interval.tick() => {
                match SessionRepo::prune_stale(&pool, older_than).await {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, "Session prune: deleted stale rows");
                    }
                    Ok(_) => tracing::debug!("Session prune: nothing to delete"),
                    Err(e) => tracing::error!(error = %e, "Session prune failed"),
                }
            }
        }
    }
}
