//! Shared response envelope.
//!
//! Collection and resource endpoints answer with `{ "data": ... }`. The auth
//! endpoints return their payloads bare, since clients read tokens from the
//! top level.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
