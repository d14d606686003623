//! Per-tab replica of the admission decision.
//!
//! All tabs of one account share a single JSON record in the [`LocalStore`]
//! listing the tokens the client believes are live. Logins run
//! [`plan_admission`] over that record exactly as the server does over its
//! table, so an eviction the server is about to make shows up locally at
//! once. The two can still disagree (tabs racing, clock skew); every such
//! disagreement resolves toward logging out.

use std::sync::Arc;

use chrono::TimeDelta;
use quoteflow_core::admission::{
    classify, is_fresh, plan_admission, AdmissionPlan, SessionSnapshot,
};
use quoteflow_core::error::SessionRejection;
use quoteflow_core::policy::RolePolicy;
use quoteflow_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;
use crate::store::LocalStore;

/// Why a tab must log out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// Another tab's login pushed this one out of the local active set.
    Evicted,
    /// No heartbeat recorded within the role TTL.
    Expired,
    /// The local record has no entry for this tab.
    Missing,
    /// The server answered a heartbeat with `alive = false`.
    ServerRejected,
}

impl From<SessionRejection> for LogoutReason {
    fn from(reason: SessionRejection) -> Self {
        match reason {
            SessionRejection::Revoked => LogoutReason::Evicted,
            SessionRejection::Expired => LogoutReason::Expired,
            SessionRejection::Missing | SessionRejection::Unknown => LogoutReason::Missing,
        }
    }
}

/// The mirror's only output. No variant grants access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    ForceLogout(LogoutReason),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MirrorRecord {
    sessions: Vec<MirrorEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MirrorEntry {
    token: String,
    started_at: Timestamp,
    last_active_at: Timestamp,
    #[serde(default)]
    evicted: bool,
}

impl MirrorEntry {
    fn snapshot(&self) -> SessionSnapshot<String> {
        SessionSnapshot {
            key: self.token.clone(),
            started_at: self.started_at,
            last_active_at: self.last_active_at,
            revoked: self.evicted,
        }
    }
}

impl MirrorRecord {
    fn entry_mut(&mut self, token: &str) -> Option<&mut MirrorEntry> {
        self.sessions.iter_mut().find(|e| e.token == token)
    }

    fn verdict(&self, token: &str, ttl: TimeDelta, now: Timestamp) -> Verdict {
        let own = self
            .sessions
            .iter()
            .find(|e| e.token == token)
            .map(MirrorEntry::snapshot);
        match classify(own.as_ref(), ttl, now) {
            Ok(()) => Verdict::Continue,
            Err(reason) => Verdict::ForceLogout(reason.into()),
        }
    }
}

/// One tab's view of its account's sessions.
#[derive(Clone)]
pub struct SessionMirror {
    store: Arc<LocalStore>,
    account_id: DbId,
    token: String,
    policy: RolePolicy,
}

impl SessionMirror {
    pub fn new(store: Arc<LocalStore>, account_id: DbId, token: String, policy: RolePolicy) -> Self {
        Self {
            store,
            account_id,
            token,
            policy,
        }
    }

    /// Store key shared by every tab of `account_id`.
    pub fn key_for(account_id: DbId) -> String {
        format!("quoteflow.sessions.{account_id}")
    }

    pub fn store_key(&self) -> String {
        Self::key_for(self.account_id)
    }

    pub fn account_id(&self) -> DbId {
        self.account_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Replay a successful server login locally.
    ///
    /// Entries that are stale under the role TTL are forgotten first, except
    /// this tab's own. Returns the plan that was applied.
    pub async fn record_login(
        &self,
        now: Timestamp,
    ) -> Result<AdmissionPlan<String>, MirrorError> {
        let ttl = self.policy.ttl();
        let token = self.token.clone();
        let policy = self.policy;

        self.store
            .update_json(&self.store_key(), move |record: Option<MirrorRecord>| {
                let mut record = record.unwrap_or_default();
                record
                    .sessions
                    .retain(|e| e.token == token || is_fresh(e.last_active_at, ttl, now));

                let snapshots: Vec<SessionSnapshot<String>> =
                    record.sessions.iter().map(MirrorEntry::snapshot).collect();
                let own = snapshots.iter().find(|s| s.key == token);
                let plan = plan_admission(own, &snapshots, policy, now);

                match &plan {
                    AdmissionPlan::Renew => {
                        if let Some(entry) = record.entry_mut(&token) {
                            entry.last_active_at = entry.last_active_at.max(now);
                        }
                    }
                    AdmissionPlan::Refuse(_) => {}
                    AdmissionPlan::Admit { evict, reactivate } => {
                        for entry in record.sessions.iter_mut() {
                            if evict.contains(&entry.token) {
                                entry.evicted = true;
                            }
                        }
                        match record.sessions.iter().position(|e| e.token == token) {
                            Some(i) if *reactivate => {
                                let entry = &mut record.sessions[i];
                                entry.started_at = now;
                                entry.last_active_at = now;
                            }
                            _ => record.sessions.push(MirrorEntry {
                                token: token.clone(),
                                started_at: now,
                                last_active_at: now,
                                evicted: false,
                            }),
                        }
                    }
                }
                (record, plan)
            })
            .await
    }

    /// Combine a server heartbeat answer with the local record.
    ///
    /// `alive = false` marks this tab evicted locally and forces logout.
    /// `alive = true` only refreshes an entry that is still active locally;
    /// it never brings back an evicted, stale or missing one.
    pub async fn record_heartbeat(
        &self,
        server_alive: bool,
        now: Timestamp,
    ) -> Result<Verdict, MirrorError> {
        let ttl = self.policy.ttl();
        let token = self.token.clone();

        self.store
            .update_json(&self.store_key(), move |record: Option<MirrorRecord>| {
                let mut record = record.unwrap_or_default();
                if !server_alive {
                    if let Some(entry) = record.entry_mut(&token) {
                        entry.evicted = true;
                    }
                    return (record, Verdict::ForceLogout(LogoutReason::ServerRejected));
                }

                let verdict = record.verdict(&token, ttl, now);
                if verdict == Verdict::Continue {
                    if let Some(entry) = record.entry_mut(&token) {
                        entry.last_active_at = entry.last_active_at.max(now);
                    }
                }
                (record, verdict)
            })
            .await
    }

    /// Re-evaluate this tab against the current local record.
    pub async fn check(&self, now: Timestamp) -> Verdict {
        let record: MirrorRecord = self
            .store
            .get_json(&self.store_key())
            .await
            .unwrap_or_default();
        record.verdict(&self.token, self.policy.ttl(), now)
    }

    /// Drop this tab's entry after an explicit logout.
    pub async fn record_logout(&self) -> Result<(), MirrorError> {
        let token = self.token.clone();
        self.store
            .update_json(&self.store_key(), move |record: Option<MirrorRecord>| {
                let mut record = record.unwrap_or_default();
                record.sessions.retain(|e| e.token != token);
                (record, ())
            })
            .await
    }
}
