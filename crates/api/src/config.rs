use chrono::TimeDelta;
use quoteflow_core::policy::{MissingSessionPolicy, PolicyError, RolePolicy, SessionPolicy};

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Access token signing configuration.
    pub jwt: JwtConfig,
    /// Session admission and liveness settings.
    pub session: SessionConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    ///
    /// Session settings are documented on [`SessionConfig::from_lookup`].
    ///
    /// # Panics
    ///
    /// Panics on any malformed value, so a misconfigured server never binds.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let jwt = JwtConfig::from_env();

        let session = SessionConfig::from_lookup(|key| std::env::var(key).ok())
            .unwrap_or_else(|e| panic!("Invalid session configuration: {e}"));

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            jwt,
            session,
        }
    }
}

// ---------------------------------------------------------------------------
// Session configuration
// ---------------------------------------------------------------------------

/// Default heartbeat cadence advertised to clients.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Default age past expiry after which session rows are deleted (1 day).
pub const DEFAULT_PRUNE_RETENTION_SECS: u64 = 24 * 60 * 60;

/// Upper bound on `SESSION_PRUNE_RETENTION_SECS` (1 year). Together with the
/// longest TTL it must stay subtractable from the database clock.
pub const MAX_PRUNE_RETENTION_SECS: u64 = 366 * 24 * 60 * 60;

/// Default interval of the background prune job (15 minutes).
pub const DEFAULT_PRUNE_INTERVAL_SECS: u64 = 15 * 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{var} of {value} exceeds the maximum of {max}")]
    TooLarge {
        var: &'static str,
        value: u64,
        max: u64,
    },

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Everything the admission path and liveness monitor need to know.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Per-role concurrency limits and TTLs.
    pub policy: SessionPolicy,
    /// How often clients are told to heartbeat.
    pub heartbeat_interval_secs: u64,
    /// Gate behavior for authenticated requests with no session token.
    pub missing_policy: MissingSessionPolicy,
    /// How long past its TTL a row is kept for audit before deletion.
    pub prune_retention_secs: u64,
    /// Background prune cadence; `0` disables the job.
    pub prune_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            policy: SessionPolicy::default(),
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            missing_policy: MissingSessionPolicy::default(),
            prune_retention_secs: DEFAULT_PRUNE_RETENTION_SECS,
            prune_interval_secs: DEFAULT_PRUNE_INTERVAL_SECS,
        }
    }
}

impl SessionConfig {
    /// Build from a key lookup (normally the process environment).
    ///
    /// | Key                               | Default                 |
    /// |-----------------------------------|-------------------------|
    /// | `SESSION_POLICY`                  | built-in role table     |
    /// | `SESSION_HEARTBEAT_INTERVAL_SECS` | `30`                    |
    /// | `SESSION_MISSING_POLICY`          | `reject`                |
    /// | `SESSION_PRUNE_RETENTION_SECS`    | `86400` (max 1 year)    |
    /// | `SESSION_PRUNE_INTERVAL_SECS`     | `900` (`0` disables)    |
    ///
    /// The policy is validated against the heartbeat interval before being
    /// returned.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let policy = match lookup("SESSION_POLICY") {
            Some(raw) if !raw.trim().is_empty() => SessionPolicy::from_json(&raw)?,
            _ => SessionPolicy::default(),
        };

        let heartbeat_interval_secs = read_u64(
            &lookup,
            "SESSION_HEARTBEAT_INTERVAL_SECS",
            DEFAULT_HEARTBEAT_INTERVAL_SECS,
        )?;
        if heartbeat_interval_secs == 0 {
            return Err(ConfigError::Zero("SESSION_HEARTBEAT_INTERVAL_SECS"));
        }

        let missing_policy = match lookup("SESSION_MISSING_POLICY") {
            Some(raw) => raw.parse()?,
            None => MissingSessionPolicy::default(),
        };

        let prune_retention_secs = read_u64(
            &lookup,
            "SESSION_PRUNE_RETENTION_SECS",
            DEFAULT_PRUNE_RETENTION_SECS,
        )?;
        if prune_retention_secs > MAX_PRUNE_RETENTION_SECS {
            return Err(ConfigError::TooLarge {
                var: "SESSION_PRUNE_RETENTION_SECS",
                value: prune_retention_secs,
                max: MAX_PRUNE_RETENTION_SECS,
            });
        }

        let config = Self {
            policy,
            heartbeat_interval_secs,
            missing_policy,
            prune_retention_secs,
            prune_interval_secs: read_u64(
                &lookup,
                "SESSION_PRUNE_INTERVAL_SECS",
                DEFAULT_PRUNE_INTERVAL_SECS,
            )?,
        };
        config.policy.validate(config.heartbeat_interval_secs)?;
        Ok(config)
    }

    pub fn role_policy(&self, role: &str) -> RolePolicy {
        self.policy.for_role(role)
    }

    pub fn retention(&self) -> TimeDelta {
        seconds(self.prune_retention_secs)
    }

    /// Rows last active before `now - prune_cutoff()` are stale under every
    /// role and past their retention window.
    pub fn prune_cutoff(&self) -> TimeDelta {
        self.policy
            .max_ttl()
            .checked_add(&self.retention())
            .unwrap_or(TimeDelta::MAX)
    }
}

fn read_u64<F>(lookup: &F, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

fn seconds(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}
