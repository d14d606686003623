//! Row models and DTOs.
//!
//! Each submodule contains a `FromRow` entity struct matching the database
//! row and the input structs used to create or update it.

pub mod account;
pub mod login_attempt;
pub mod session;
