//! Pure admission planning.
//!
//! Both the authoritative store and the client-side mirror feed their view of
//! an account's sessions into [`plan_admission`] and then carry out the
//! returned [`AdmissionPlan`]. The server does so while holding a per-account
//! lock, the mirror does so optimistically; the decision itself is identical.
//!
//! Sessions are identified by a generic key `K` (the row id on the server,
//! the session token in the mirror). Keys must be `Ord` so that eviction is
//! fully deterministic even when two sessions share both timestamps.

use chrono::TimeDelta;

use crate::error::SessionRejection;
use crate::policy::RolePolicy;
use crate::types::Timestamp;

/// The fields of a session that admission decisions depend on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot<K> {
    pub key: K,
    pub started_at: Timestamp,
    pub last_active_at: Timestamp,
    pub revoked: bool,
}

impl<K> SessionSnapshot<K> {
    /// Whether the session counts against the account's limit at `now`.
    pub fn is_active(&self, ttl: TimeDelta, now: Timestamp) -> bool {
        !self.revoked && is_fresh(self.last_active_at, ttl, now)
    }
}

/// `last_active_at >= now - ttl`.
///
/// A TTL too large to subtract from `now` makes every timestamp fresh.
pub fn is_fresh(last_active_at: Timestamp, ttl: TimeDelta, now: Timestamp) -> bool {
    match now.checked_sub_signed(ttl) {
        Some(cutoff) => last_active_at >= cutoff,
        None => true,
    }
}

/// Classify a lookup result for request validation.
///
/// Revocation wins over staleness: a revoked row reports `Revoked` no matter
/// how recent its last activity is.
pub fn classify<K>(
    session: Option<&SessionSnapshot<K>>,
    ttl: TimeDelta,
    now: Timestamp,
) -> Result<(), SessionRejection> {
    match session {
        None => Err(SessionRejection::Unknown),
        Some(s) if s.revoked => Err(SessionRejection::Revoked),
        Some(s) if !is_fresh(s.last_active_at, ttl, now) => Err(SessionRejection::Expired),
        Some(_) => Ok(()),
    }
}

/// What to do with an admission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionPlan<K> {
    /// The token already holds an active session: bump its activity only.
    Renew,
    /// The token belongs to a revoked session and may not come back.
    Refuse(SessionRejection),
    /// Revoke `evict` (oldest first), then admit the token. When `reactivate`
    /// is set the token's stale row is refreshed in place instead of a new
    /// row being inserted.
    Admit { evict: Vec<K>, reactivate: bool },
}

impl<K> AdmissionPlan<K> {
    pub fn evicts_anything(&self) -> bool {
        matches!(self, AdmissionPlan::Admit { evict, .. } if !evict.is_empty())
    }
}

/// Decide how to admit a token for an account.
///
/// - `existing`: the row already stored for `(account, token)`, if any.
/// - `sessions`: the account's rows. Revoked and stale entries are ignored,
///   as is the entry for `existing` itself.
///
/// A renewal is never an eviction, even when the account is above its limit
/// (for example after the limit was lowered). A stale, unrevoked row for the
/// same token is re-admitted through the full count-and-evict path so that
/// reviving it cannot push the account over its limit.
pub fn plan_admission<K: Clone + Ord>(
    existing: Option<&SessionSnapshot<K>>,
    sessions: &[SessionSnapshot<K>],
    policy: RolePolicy,
    now: Timestamp,
) -> AdmissionPlan<K> {
    let ttl = policy.ttl();

    let reactivate = match existing {
        Some(s) if s.revoked => return AdmissionPlan::Refuse(SessionRejection::Revoked),
        Some(s) if s.is_active(ttl, now) => return AdmissionPlan::Renew,
        Some(_) => true,
        None => false,
    };

    let own_key = existing.map(|s| &s.key);
    let active: Vec<&SessionSnapshot<K>> = sessions
        .iter()
        .filter(|s| Some(&s.key) != own_key)
        .filter(|s| s.is_active(ttl, now))
        .collect();

    AdmissionPlan::Admit {
        evict: select_victims(&active, policy.limit),
        reactivate,
    }
}

/// Pick the sessions to revoke so that one more fits under `limit`.
///
/// Least-recently-active first; ties go to the earliest `started_at`, then the
/// smallest key.
pub fn select_victims<K: Clone + Ord>(active: &[&SessionSnapshot<K>], limit: u32) -> Vec<K> {
    let limit = usize::try_from(limit).unwrap_or(usize::MAX).max(1);
    if active.len() < limit {
        return Vec::new();
    }
    let excess = active.len() + 1 - limit;

    let mut ordered: Vec<&SessionSnapshot<K>> = active.to_vec();
    ordered.sort_by(|a, b| {
        a.last_active_at
            .cmp(&b.last_active_at)
            .then_with(|| a.started_at.cmp(&b.started_at))
            .then_with(|| a.key.cmp(&b.key))
    });
    ordered
        .into_iter()
        .take(excess)
        .map(|s| s.key.clone())
        .collect()
}
