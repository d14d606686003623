//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod account_repo;
pub mod login_attempt_repo;
pub mod session_repo;

pub use account_repo::AccountRepo;
pub use login_attempt_repo::LoginAttemptRepo;
pub use session_repo::SessionRepo;
