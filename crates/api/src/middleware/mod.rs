//! Request authentication layers.
//!
//! - [`auth::AuthUser`] -- who the caller is, from a JWT Bearer token.
//! - [`session::session_gate`] -- whether the caller's session is admitted;
//!   stores a [`session::SessionUser`] for the handler.
//! - [`rbac::RequireAdmin`] -- a gated caller with the `admin` role.

pub mod auth;
pub mod rbac;
pub mod session;
