//! Role checks on top of the session gate.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use quoteflow_core::error::CoreError;
use quoteflow_core::roles::ROLE_ADMIN;

use super::session::SessionUser;
use crate::error::AppError;

/// Requires an admitted session with the `admin` role. Rejects with 403
/// Forbidden otherwise.
///
/// ```ignore
/// async fn admin_only(RequireAdmin(user): RequireAdmin) -> AppResult<Json<()>> {
///     Ok(Json(()))
/// }
/// ```
pub struct RequireAdmin(pub SessionUser);

impl<S: Send + Sync> FromRequestParts<S> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = SessionUser::from_request_parts(parts, state).await?;
        if user.role != ROLE_ADMIN {
            return Err(AppError::Core(CoreError::Forbidden(
                "Admin role required".into(),
            )));
        }
        Ok(RequireAdmin(user))
    }
}
