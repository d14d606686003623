//! Well-known role name constants.
//!
//! These must match the `role` values written to the `accounts` table and
//! the keys of the default session policy.

/// Privileged operator role; may close other accounts' sessions.
pub const ROLE_ADMIN: &str = "admin";
/// Regular constrained role.
pub const ROLE_USER: &str = "user";
