//! Integration tests for the session store and admission controller.
//!
//! Exercises `SessionRepo` against a real database:
//! - Concrete limit=1, limit=2 and TTL scenarios
//! - Renewal vs. eviction
//! - Terminal revocation
//! - The bound invariant under concurrent admissions

use assert_matches::assert_matches;
use chrono::TimeDelta;
use quoteflow_core::error::SessionRejection;
use quoteflow_core::policy::RolePolicy;
use quoteflow_core::types::DbId;
use quoteflow_db::models::account::CreateAccount;
use quoteflow_db::models::session::{AccountSession, AdmitOutcome, AdmitSession, ClientMeta, RevokeReason};
use quoteflow_db::models::login_attempt::NewLoginAttempt;
use quoteflow_db::repositories::{AccountRepo, LoginAttemptRepo, SessionRepo};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const LIMIT_ONE: RolePolicy = RolePolicy::new(1, 60);
const LIMIT_TWO: RolePolicy = RolePolicy::new(2, 60);

fn retention() -> TimeDelta {
    TimeDelta::hours(1)
}

async fn create_account(pool: &PgPool, username: &str) -> DbId {
    let input = CreateAccount {
        username: username.to_string(),
        password_hash: "not-a-real-hash".to_string(),
        role: "user".to_string(),
    };
    AccountRepo::create(pool, &input)
        .await
        .expect("account creation should succeed")
        .id
}

fn admit_input(account_id: DbId, token: &str, device: &str) -> AdmitSession {
    AdmitSession {
        account_id,
        session_token: token.to_string(),
        meta: ClientMeta {
            device_id: Some(device.to_string()),
            client_address: Some("127.0.0.1".to_string()),
            client_agent: Some("integration-test".to_string()),
        },
        audit: None,
    }
}

async fn admit(pool: &PgPool, account_id: DbId, token: &str, policy: RolePolicy) -> AdmitOutcome {
    SessionRepo::admit(pool, &admit_input(account_id, token, token), policy, retention())
        .await
        .expect("admission should not hit a database error")
}

/// Admit and expect a fresh admission, returning the session and evictions.
async fn admit_new(
    pool: &PgPool,
    account_id: DbId,
    token: &str,
    policy: RolePolicy,
) -> (AccountSession, Vec<AccountSession>) {
    match admit(pool, account_id, token, policy).await {
        AdmitOutcome::Admitted { session, evicted } => (session, evicted),
        other => panic!("expected Admitted for {token}, got {other:?}"),
    }
}

/// Move a session's last activity `secs_ago` seconds into the past.
async fn age_session(pool: &PgPool, id: DbId, secs_ago: f64) {
    sqlx::query(
        "UPDATE account_sessions
         SET last_active_at = NOW() - make_interval(secs => $2),
             started_at = LEAST(started_at, NOW() - make_interval(secs => $2))
         WHERE id = $1",
    )
    .bind(id)
    .bind(secs_ago)
    .execute(pool)
    .await
    .expect("ageing a session should succeed");
}

async fn active_count(pool: &PgPool, account_id: DbId, policy: RolePolicy) -> usize {
    SessionRepo::list_active(pool, account_id, policy.ttl())
        .await
        .expect("list_active should succeed")
        .len()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

/// limit=1: a second device evicts the first, whose token is then revoked.
#[sqlx::test(migrations = "./migrations")]
async fn limit_one_second_login_evicts_first(pool: PgPool) {
    let account = create_account(&pool, "solo").await;

    let (s1, evicted) = admit_new(&pool, account, "tok-1", LIMIT_ONE).await;
    assert!(evicted.is_empty());

    let (s2, evicted) = admit_new(&pool, account, "tok-2", LIMIT_ONE).await;
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].id, s1.id);
    assert!(evicted[0].revoked);
    assert_eq!(evicted[0].revoked_reason.as_deref(), Some("evicted"));

    let active = SessionRepo::list_active(&pool, account, LIMIT_ONE.ttl()).await.unwrap();
    assert_eq!(active.iter().map(|s| s.id).collect::<Vec<_>>(), vec![s2.id]);

    // A request carrying the evicted token can no longer touch it.
    let touched = SessionRepo::touch(&pool, account, "tok-1", LIMIT_ONE.ttl(), &ClientMeta::default())
        .await
        .unwrap();
    assert!(touched.is_none());
    let row = SessionRepo::find(&pool, account, "tok-1").await.unwrap().unwrap();
    assert!(row.revoked);
}

/// limit=2: the third login evicts whichever of the first two was idle longest.
#[sqlx::test(migrations = "./migrations")]
async fn limit_two_third_login_evicts_least_recently_active(pool: PgPool) {
    let account = create_account(&pool, "duo").await;

    let (s1, _) = admit_new(&pool, account, "tok-1", LIMIT_TWO).await;
    let (s2, evicted) = admit_new(&pool, account, "tok-2", LIMIT_TWO).await;
    assert!(evicted.is_empty(), "two sessions fit under limit=2");

    // s2 started later but s1 was used more recently.
    age_session(&pool, s1.id, 10.0).await;
    age_session(&pool, s2.id, 20.0).await;

    let (_s3, evicted) = admit_new(&pool, account, "tok-3", LIMIT_TWO).await;
    assert_eq!(evicted.iter().map(|s| s.id).collect::<Vec<_>>(), vec![s2.id]);
    assert_eq!(active_count(&pool, account, LIMIT_TWO).await, 2);
}

/// TTL: a silent session leaves the active set and a new login needs no eviction.
#[sqlx::test(migrations = "./migrations")]
async fn stale_session_is_excluded_without_eviction(pool: PgPool) {
    let account = create_account(&pool, "idle").await;

    let (s1, _) = admit_new(&pool, account, "tok-1", LIMIT_ONE).await;
    age_session(&pool, s1.id, 120.0).await;

    assert_eq!(active_count(&pool, account, LIMIT_ONE).await, 0);

    let (_s2, evicted) = admit_new(&pool, account, "tok-2", LIMIT_ONE).await;
    assert!(evicted.is_empty(), "stale session must not be evicted");

    // Expired, not revoked: the row is still there with revoked = false.
    let row = SessionRepo::find(&pool, account, "tok-1").await.unwrap().unwrap();
    assert!(!row.revoked);
    let touched = SessionRepo::touch(&pool, account, "tok-1", LIMIT_ONE.ttl(), &ClientMeta::default())
        .await
        .unwrap();
    assert!(touched.is_none(), "a touch must not revive a stale session");
}

// ---------------------------------------------------------------------------
// Renewal and revocation
// ---------------------------------------------------------------------------

/// Re-admitting the same token renews it and never evicts anything.
#[sqlx::test(migrations = "./migrations")]
async fn renewal_is_not_eviction(pool: PgPool) {
    let account = create_account(&pool, "renewer").await;
    let (s1, _) = admit_new(&pool, account, "tok-1", LIMIT_TWO).await;
    let (s2, _) = admit_new(&pool, account, "tok-2", LIMIT_TWO).await;

    for _ in 0..5 {
        let outcome = admit(&pool, account, "tok-1", LIMIT_TWO).await;
        assert_matches!(outcome, AdmitOutcome::Renewed(ref s) if s.id == s1.id);
        assert_eq!(active_count(&pool, account, LIMIT_TWO).await, 2);
    }

    // Even with a policy that is now below the current count.
    let outcome = admit(&pool, account, "tok-2", LIMIT_ONE).await;
    assert_matches!(outcome, AdmitOutcome::Renewed(ref s) if s.id == s2.id);
    assert_eq!(active_count(&pool, account, LIMIT_TWO).await, 2);
}

/// Renewal merges new client metadata and keeps `last_active_at` monotonic.
#[sqlx::test(migrations = "./migrations")]
async fn renewal_merges_metadata(pool: PgPool) {
    let account = create_account(&pool, "merger").await;
    let (s1, _) = admit_new(&pool, account, "tok-1", LIMIT_ONE).await;

    let mut input = admit_input(account, "tok-1", "laptop");
    input.meta.client_agent = None;
    input.meta.client_address = Some("10.0.0.9".to_string());
    let outcome = SessionRepo::admit(&pool, &input, LIMIT_ONE, retention()).await.unwrap();

    let AdmitOutcome::Renewed(renewed) = outcome else {
        panic!("expected renewal");
    };
    assert_eq!(renewed.device_id.as_deref(), Some("laptop"));
    assert_eq!(renewed.client_address.as_deref(), Some("10.0.0.9"));
    assert_eq!(renewed.client_agent.as_deref(), Some("integration-test"));
    assert!(renewed.last_active_at >= s1.last_active_at);
}

/// Once revoked, a session stays dead: touches fail and re-admission is refused.
#[sqlx::test(migrations = "./migrations")]
async fn revocation_is_terminal(pool: PgPool) {
    let account = create_account(&pool, "revoked").await;
    admit_new(&pool, account, "tok-1", LIMIT_TWO).await;

    assert!(SessionRepo::revoke(&pool, account, "tok-1", RevokeReason::Logout).await.unwrap());
    // Idempotent: the second revoke is a no-op.
    assert!(!SessionRepo::revoke(&pool, account, "tok-1", RevokeReason::Logout).await.unwrap());

    let touched = SessionRepo::touch(&pool, account, "tok-1", LIMIT_TWO.ttl(), &ClientMeta::default())
        .await
        .unwrap();
    assert!(touched.is_none());

    let outcome = admit(&pool, account, "tok-1", LIMIT_TWO).await;
    assert_matches!(outcome, AdmitOutcome::Refused(SessionRejection::Revoked));
    assert_eq!(active_count(&pool, account, LIMIT_TWO).await, 0);
}

/// A stale token that logs in again goes through eviction like a new one.
#[sqlx::test(migrations = "./migrations")]
async fn stale_token_readmission_respects_limit(pool: PgPool) {
    let account = create_account(&pool, "comeback").await;
    let (s1, _) = admit_new(&pool, account, "tok-1", LIMIT_ONE).await;
    age_session(&pool, s1.id, 120.0).await;
    let (s2, _) = admit_new(&pool, account, "tok-2", LIMIT_ONE).await;

    let (revived, evicted) = admit_new(&pool, account, "tok-1", LIMIT_ONE).await;
    assert_eq!(revived.id, s1.id, "the stale row is reused, not duplicated");
    assert_eq!(evicted.iter().map(|s| s.id).collect::<Vec<_>>(), vec![s2.id]);
    assert_eq!(active_count(&pool, account, LIMIT_ONE).await, 1);
}

/// Admin revocation preserves the first revocation's reason.
#[sqlx::test(migrations = "./migrations")]
async fn revoke_by_id_is_idempotent(pool: PgPool) {
    let account = create_account(&pool, "operator-target").await;
    let (s1, _) = admit_new(&pool, account, "tok-1", LIMIT_ONE).await;
    admit_new(&pool, account, "tok-2", LIMIT_ONE).await; // evicts s1

    let row = SessionRepo::revoke_by_id(&pool, s1.id, RevokeReason::Admin)
        .await
        .unwrap()
        .expect("row exists");
    assert!(row.revoked);
    assert_eq!(row.revoked_reason.as_deref(), Some("evicted"));

    let missing = SessionRepo::revoke_by_id(&pool, 999_999, RevokeReason::Admin).await.unwrap();
    assert!(missing.is_none());
}

// ---------------------------------------------------------------------------
// Housekeeping
// ---------------------------------------------------------------------------

/// Pruning deletes only rows older than the cutoff, revoked or not.
#[sqlx::test(migrations = "./migrations")]
async fn prune_stale_deletes_only_old_rows(pool: PgPool) {
    let account = create_account(&pool, "pruner").await;
    let (old, _) = admit_new(&pool, account, "tok-old", LIMIT_TWO).await;
    let (fresh, _) = admit_new(&pool, account, "tok-fresh", LIMIT_TWO).await;
    age_session(&pool, old.id, 7200.0).await;

    let deleted = SessionRepo::prune_stale(&pool, TimeDelta::hours(1)).await.unwrap();
    assert_eq!(deleted, 1);
    assert!(SessionRepo::find_by_id(&pool, old.id).await.unwrap().is_none());
    assert!(SessionRepo::find_by_id(&pool, fresh.id).await.unwrap().is_some());
}

/// Admission prunes rows older than TTL + retention for the account inline.
#[sqlx::test(migrations = "./migrations")]
async fn admission_prunes_inline(pool: PgPool) {
    let account = create_account(&pool, "inline").await;
    let (old, _) = admit_new(&pool, account, "tok-old", LIMIT_TWO).await;
    age_session(&pool, old.id, 60.0 + 3600.0 + 5.0).await;

    admit_new(&pool, account, "tok-new", LIMIT_TWO).await;
    assert!(SessionRepo::find_by_id(&pool, old.id).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

/// N concurrent logins for one account never leave more than `limit` active.
#[sqlx::test(migrations = "./migrations")]
async fn concurrent_admissions_respect_bound(pool: PgPool) {
    let account = create_account(&pool, "stampede").await;

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let pool = pool.clone();
            tokio::spawn(async move {
                let input = admit_input(account, &format!("tok-{i}"), &format!("dev-{i}"));
                SessionRepo::admit(&pool, &input, LIMIT_TWO, retention()).await
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        let outcome = result.expect("task should not panic").expect("admission should succeed");
        assert_matches!(outcome, AdmitOutcome::Admitted { .. });
    }

    assert_eq!(active_count(&pool, account, LIMIT_TWO).await, 2);

    let revoked = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM account_sessions WHERE account_id = $1 AND revoked = true",
    )
    .bind(account)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(revoked, 14);
}

/// Heartbeats on one account and logins on another do not interfere.
#[sqlx::test(migrations = "./migrations")]
async fn heartbeats_do_not_cross_accounts(pool: PgPool) {
    let alice = create_account(&pool, "alice").await;
    let bob = create_account(&pool, "bob").await;
    admit_new(&pool, alice, "alice-1", LIMIT_TWO).await;
    admit_new(&pool, alice, "alice-2", LIMIT_TWO).await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let touch_pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            let token = if i % 2 == 0 { "alice-1" } else { "alice-2" };
            SessionRepo::touch(&touch_pool, alice, token, LIMIT_TWO.ttl(), &ClientMeta::default())
                .await
                .map(|s| s.is_some())
        }));
        let admit_pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            let input = admit_input(bob, &format!("bob-{i}"), "bob-device");
            SessionRepo::admit(&admit_pool, &input, LIMIT_ONE, retention())
                .await
                .map(|o| matches!(o, AdmitOutcome::Admitted { .. }))
        }));
    }
    for result in futures::future::join_all(tasks).await {
        assert!(result.unwrap().unwrap());
    }

    assert_eq!(active_count(&pool, alice, LIMIT_TWO).await, 2);
    assert_eq!(active_count(&pool, bob, LIMIT_ONE).await, 1);
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

fn audit_for(account_id: DbId) -> NewLoginAttempt {
    NewLoginAttempt {
        account_id: Some(account_id),
        username: "alice".to_string(),
        ..Default::default()
    }
}

/// The audit row commits with the admission and notes how many were evicted.
#[sqlx::test(migrations = "./migrations")]
async fn admission_records_audit_row(pool: PgPool) {
    let account = create_account(&pool, "alice").await;
    admit_new(&pool, account, "first", LIMIT_ONE).await;

    let mut input = admit_input(account, "second", "laptop");
    input.audit = Some(audit_for(account));
    let outcome = SessionRepo::admit(&pool, &input, LIMIT_ONE, retention())
        .await
        .unwrap();
    assert_matches!(outcome, AdmitOutcome::Admitted { evicted, .. } if evicted.len() == 1);

    let attempts = LoginAttemptRepo::list_for_account(&pool, account, 10)
        .await
        .unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].success);
    assert_eq!(attempts[0].detail.as_deref(), Some("evicted:1"));
}

/// A failed audit insert rolls the whole admission back: nobody is evicted.
#[sqlx::test(migrations = "./migrations")]
async fn failed_audit_leaves_sessions_untouched(pool: PgPool) {
    let account = create_account(&pool, "alice").await;
    let (first, _) = admit_new(&pool, account, "first", LIMIT_ONE).await;

    let mut input = admit_input(account, "second", "laptop");
    // No such account: the audit insert violates its foreign key.
    input.audit = Some(audit_for(DbId::MAX));
    let result = SessionRepo::admit(&pool, &input, LIMIT_ONE, retention()).await;
    assert!(result.is_err());

    let still_first = SessionRepo::find(&pool, account, "first")
        .await
        .unwrap()
        .expect("first session should remain");
    assert_eq!(still_first.id, first.id);
    assert!(!still_first.revoked);
    assert!(SessionRepo::find(&pool, account, "second")
        .await
        .unwrap()
        .is_none());
}
