//! Domain types and pure session-admission logic shared by the server and
//! the client-side mirror.
//!
//! Nothing in this crate touches the database or the network, so the
//! admission decision can be evaluated identically by the authoritative
//! store and by the advisory browser replica.

pub mod admission;
pub mod error;
pub mod policy;
pub mod roles;
pub mod types;
