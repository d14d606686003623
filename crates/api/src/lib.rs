//! Session admission API server library.
//!
//! Exposes config, state, error handling, the session gate and routes so the
//! binary and the integration tests build the same application.

pub mod auth;
pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod sessions;
pub mod state;
