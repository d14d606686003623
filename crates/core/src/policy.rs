//! Per-role session admission policy.
//!
//! The policy is a plain `{role: {limit, ttl_secs}}` table plus a fallback
//! entry for roles the table does not name. It is loaded once at startup and
//! validated before the server binds, so a misconfigured policy never reaches
//! the admission path.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::roles::{ROLE_ADMIN, ROLE_USER};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Default concurrent-session limit for the constrained role.
pub const DEFAULT_USER_LIMIT: u32 = 1;

/// Default silence tolerated for the constrained role (seconds).
pub const DEFAULT_USER_TTL_SECS: u64 = 90;

/// Default concurrent-session limit for the privileged role.
pub const DEFAULT_ADMIN_LIMIT: u32 = 2;

/// Default silence tolerated for the privileged role (8 hours).
///
/// Admin work is long-running and heartbeats may be sparse while idle.
pub const DEFAULT_ADMIN_TTL_SECS: u64 = 8 * 60 * 60;

/// Upper bound on any configured TTL (31 days).
pub const MAX_TTL_SECS: u64 = 31 * 24 * 60 * 60;

/// A TTL must cover at least this many heartbeat intervals, otherwise a
/// single delayed heartbeat expires an otherwise healthy session.
pub const MIN_HEARTBEATS_PER_TTL: u64 = 2;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("session policy is not valid JSON: {0}")]
    Parse(String),

    #[error("role '{role}' must allow at least one session")]
    ZeroLimit { role: String },

    #[error("role '{role}' TTL of {ttl_secs}s is shorter than the minimum of {min_secs}s")]
    TtlTooShort {
        role: String,
        ttl_secs: u64,
        min_secs: u64,
    },

    #[error("role '{role}' TTL of {ttl_secs}s exceeds the maximum of {max_secs}s")]
    TtlTooLong {
        role: String,
        ttl_secs: u64,
        max_secs: u64,
    },

    #[error("unknown missing-session policy '{0}' (expected 'reject' or 'admit')")]
    UnknownMissingPolicy(String),
}

// ---------------------------------------------------------------------------
// RolePolicy
// ---------------------------------------------------------------------------

/// Concurrency bound and freshness window for one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePolicy {
    /// Maximum simultaneously active sessions per account.
    pub limit: u32,
    /// Maximum silence before a session leaves the active set.
    pub ttl_secs: u64,
}

impl RolePolicy {
    pub const fn new(limit: u32, ttl_secs: u64) -> Self {
        Self { limit, ttl_secs }
    }

    /// The TTL as a signed duration suitable for timestamp arithmetic.
    pub fn ttl(&self) -> TimeDelta {
        i64::try_from(self.ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }

    fn validate(&self, role: &str, heartbeat_interval_secs: u64) -> Result<(), PolicyError> {
        if self.limit == 0 {
            return Err(PolicyError::ZeroLimit {
                role: role.to_string(),
            });
        }
        let min_secs = heartbeat_interval_secs.saturating_mul(MIN_HEARTBEATS_PER_TTL);
        if self.ttl_secs < min_secs {
            return Err(PolicyError::TtlTooShort {
                role: role.to_string(),
                ttl_secs: self.ttl_secs,
                min_secs,
            });
        }
        if self.ttl_secs > MAX_TTL_SECS {
            return Err(PolicyError::TtlTooLong {
                role: role.to_string(),
                ttl_secs: self.ttl_secs,
                max_secs: MAX_TTL_SECS,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SessionPolicy
// ---------------------------------------------------------------------------

/// The full role table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPolicy {
    /// Explicit per-role entries, keyed by role name.
    #[serde(default)]
    pub roles: HashMap<String, RolePolicy>,
    /// Applied to any role not present in `roles`.
    pub fallback: RolePolicy,
}

impl SessionPolicy {
    /// Parse a policy from its JSON configuration form.
    ///
    /// ```json
    /// {"roles": {"user": {"limit": 1, "ttl_secs": 90}},
    ///  "fallback": {"limit": 1, "ttl_secs": 90}}
    /// ```
    pub fn from_json(raw: &str) -> Result<Self, PolicyError> {
        serde_json::from_str(raw).map_err(|e| PolicyError::Parse(e.to_string()))
    }

    /// Resolve the policy for a role, falling back for unknown roles.
    pub fn for_role(&self, role: &str) -> RolePolicy {
        self.roles.get(role).copied().unwrap_or(self.fallback)
    }

    /// The longest TTL of any entry. Rows older than this are stale under
    /// every role, which makes it a safe cutoff for account-agnostic sweeps.
    pub fn max_ttl(&self) -> TimeDelta {
        self.roles
            .values()
            .chain(std::iter::once(&self.fallback))
            .map(RolePolicy::ttl)
            .max()
            .unwrap_or_else(|| self.fallback.ttl())
    }

    /// Check every entry against the heartbeat cadence clients are told to use.
    pub fn validate(&self, heartbeat_interval_secs: u64) -> Result<(), PolicyError> {
        for (role, entry) in &self.roles {
            entry.validate(role, heartbeat_interval_secs)?;
        }
        self.fallback.validate("<fallback>", heartbeat_interval_secs)
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        let user = RolePolicy::new(DEFAULT_USER_LIMIT, DEFAULT_USER_TTL_SECS);
        let roles = HashMap::from([
            (ROLE_USER.to_string(), user),
            (
                ROLE_ADMIN.to_string(),
                RolePolicy::new(DEFAULT_ADMIN_LIMIT, DEFAULT_ADMIN_TTL_SECS),
            ),
        ]);
        Self {
            roles,
            fallback: user,
        }
    }
}

// ---------------------------------------------------------------------------
// MissingSessionPolicy
// ---------------------------------------------------------------------------

/// What the request gate does with an authenticated request that carries no
/// session token at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSessionPolicy {
    /// Refuse the request with a `missing` rejection.
    #[default]
    Reject,
    /// Mint and admit a fresh session through the normal admission path,
    /// leaving an audit record behind.
    Admit,
}

impl FromStr for MissingSessionPolicy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "admit" => Ok(Self::Admit),
            other => Err(PolicyError::UnknownMissingPolicy(other.to_string())),
        }
    }
}
