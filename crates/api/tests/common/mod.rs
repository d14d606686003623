//! Shared helpers for API integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use quoteflow_core::policy::{MissingSessionPolicy, RolePolicy, SessionPolicy};
use quoteflow_core::roles::{ROLE_ADMIN, ROLE_USER};
use quoteflow_db::models::account::{Account, CreateAccount};
use quoteflow_db::repositories::AccountRepo;
use sqlx::PgPool;
use tower::ServiceExt;

use quoteflow_api::auth::jwt::JwtConfig;
use quoteflow_api::auth::password::hash_password;
use quoteflow_api::config::{ServerConfig, SessionConfig};
use quoteflow_api::router::build_app_router;
use quoteflow_api::state::AppState;

pub const PASSWORD: &str = "test_password_123!";
pub const SESSION_HEADER: &str = "x-session-token";

/// A test `ServerConfig` with the default session policy.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            access_token_expiry_mins: 60,
        },
        session: SessionConfig::default(),
    }
}

/// Same as [`test_config`] with an explicit role table.
pub fn config_with_policy(user: RolePolicy, admin: RolePolicy) -> ServerConfig {
    let mut config = test_config();
    config.session.policy = SessionPolicy {
        roles: [
            (ROLE_USER.to_string(), user),
            (ROLE_ADMIN.to_string(), admin),
        ]
        .into_iter()
        .collect(),
        fallback: user,
    };
    config
}

pub fn config_admitting_missing() -> ServerConfig {
    let mut config = test_config();
    config.session.missing_policy = MissingSessionPolicy::Admit;
    config
}

/// Full application router over `pool`, default configuration.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with(pool, test_config())
}

pub fn build_test_app_with(pool: PgPool, config: ServerConfig) -> Router {
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
    };
    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub async fn create_account(pool: &PgPool, username: &str, role: &str) -> Account {
    let input = CreateAccount {
        username: username.to_string(),
        password_hash: hash_password(PASSWORD).expect("hashing should succeed"),
        role: role.to_string(),
    };
    AccountRepo::create(pool, &input)
        .await
        .expect("account creation should succeed")
}

/// Tokens a client holds after logging in.
#[derive(Debug, Clone)]
pub struct Client {
    pub access_token: String,
    pub session_token: String,
    pub session_id: i64,
    pub login: serde_json::Value,
}

/// Log in through the API, asserting success.
pub async fn login(app: &Router, username: &str, session_token: Option<&str>) -> Client {
    let mut body = serde_json::json!({ "username": username, "password": PASSWORD });
    if let Some(token) = session_token {
        body["session_token"] = token.into();
    }
    let response = post_json(app.clone(), "/api/v1/auth/login", body).await;
    assert_eq!(response.status(), StatusCode::OK, "login should succeed");
    let json = body_json(response).await;
    Client {
        access_token: json["access_token"].as_str().expect("access_token").to_string(),
        session_token: json["session_token"].as_str().expect("session_token").to_string(),
        session_id: json["session_id"].as_i64().expect("session_id"),
        login: json,
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

pub async fn send(app: Router, request: Request<Body>) -> Response {
    app.oneshot(request).await.expect("router is infallible")
}

pub async fn get(app: Router, uri: &str) -> Response {
    let request = Request::get(uri).body(Body::empty()).expect("valid request");
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request");
    send(app, request).await
}

/// Request carrying only the JWT.
pub async fn call_auth(app: Router, method: &str, uri: &str, access_token: &str) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {access_token}"))
        .body(Body::empty())
        .expect("valid request");
    send(app, request).await
}

/// Request carrying the JWT and the client's session token.
pub async fn call_session(app: Router, method: &str, uri: &str, client: &Client) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", client.access_token))
        .header(SESSION_HEADER, &client.session_token)
        .body(Body::empty())
        .expect("valid request");
    send(app, request).await
}

/// POST /auth/heartbeat and return `alive`.
pub async fn heartbeat(app: &Router, client: &Client) -> bool {
    let response = call_session(app.clone(), "POST", "/api/v1/auth/heartbeat", client).await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["alive"]
        .as_bool()
        .expect("alive should be a bool")
}

/// Push a session's last activity `secs` into the past.
pub async fn age_session(pool: &PgPool, session_id: i64, secs: i64) {
    sqlx::query(
        "UPDATE account_sessions
         SET last_active_at = last_active_at - make_interval(secs => $2),
             started_at = started_at - make_interval(secs => $2)
         WHERE id = $1",
    )
    .bind(session_id)
    .bind(secs as f64)
    .execute(pool)
    .await
    .expect("aging should succeed");
}
