//! Client-side replica of session admission.
//!
//! Each open tab of the quoting app keeps a [`SessionMirror`] over a shared
//! [`LocalStore`]. When one tab logs in and the mirror's copy of the
//! admission algorithm evicts another tab's entry, the write wakes every
//! [`TabNotifier`] and the evicted tab logs out without waiting for its next
//! server round trip.
//!
//! The mirror is advisory. It can only end a session early; it has no way to
//! admit one, and a server `alive = false` always wins.

pub mod error;
pub mod mirror;
pub mod notifier;
pub mod store;

pub use error::MirrorError;
pub use mirror::{LogoutReason, SessionMirror, Verdict};
pub use notifier::{ForcedLogout, TabNotifier};
pub use store::{LocalStore, StoreChange};
