//! `AppError` to HTTP response mapping, without a server.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use http_body_util::BodyExt;
use quoteflow_api::error::AppError;
use quoteflow_core::error::{CoreError, SessionRejection};

async fn error_to_response(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    (status, json)
}

#[tokio::test]
async fn not_found_error_returns_404() {
    let err = AppError::Core(CoreError::NotFound {
        entity: "Session",
        id: 42,
    });
    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
    assert_eq!(json["error"], "Session with id 42 not found");
}

#[tokio::test]
async fn session_rejections_are_401_with_distinct_codes() {
    let cases = [
        (SessionRejection::Missing, "SESSION_MISSING"),
        (SessionRejection::Unknown, "SESSION_EXPIRED"),
        (SessionRejection::Expired, "SESSION_EXPIRED"),
        (SessionRejection::Revoked, "SESSION_REVOKED"),
    ];
    for (reason, code) in cases {
        let (status, json) = error_to_response(reason.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{reason}");
        assert_eq!(json["code"], code, "{reason}");
    }
}

#[tokio::test]
async fn forbidden_error_returns_403() {
    let err = AppError::Core(CoreError::Forbidden("Admin role required".into()));
    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "FORBIDDEN");
}

#[tokio::test]
async fn unreachable_database_fails_closed_with_503() {
    for err in [sqlx::Error::PoolTimedOut, sqlx::Error::PoolClosed] {
        let (status, json) = error_to_response(AppError::Database(err)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["code"], "SERVICE_UNAVAILABLE");
    }
}

#[tokio::test]
async fn row_not_found_returns_404() {
    let (status, json) = error_to_response(AppError::Database(sqlx::Error::RowNotFound)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn internal_error_is_sanitized() {
    let err = AppError::InternalError("secret stack trace".into());
    let (status, json) = error_to_response(err).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["code"], "INTERNAL_ERROR");
    assert_eq!(json["error"], "An internal error occurred");
}

#[tokio::test]
async fn bad_request_keeps_message() {
    let (status, json) = error_to_response(AppError::BadRequest("bad header".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "bad header");
}
