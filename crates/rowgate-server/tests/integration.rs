use axum::http::StatusCode;
use http_body_util::BodyExt;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;
use tower::ServiceExt;

use rowgate_core::config::Config;
use rowgate_core::credentials::password_digest;
use rowgate_core::session::SessionSigner;
use rowgate_server::state::AppState;

const SECRET: &str = "integration-secret";

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// Seed a file-backed SQLite store with the descriptor table, an orders
/// table, and one local user, and return its DSN.
async fn fixture() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let dsn = format!("sqlite://{}?mode=rwc", dir.path().join("api.db").display());

    let seed = SqlitePoolOptions::new().connect(&dsn).await.unwrap();
    sqlx::query(
        "CREATE TABLE api (action TEXT NOT NULL, method TEXT NOT NULL, \
         template TEXT NOT NULL, auth INTEGER)",
    )
    .execute(&seed)
    .await
    .unwrap();

    let descriptors: &[(&str, &str, &str, Option<i64>)] = &[
        ("orders", "GET", "SELECT * FROM orders WHERE id={{.id}}", None),
        (
            "profile",
            "GET",
            "SELECT {{.userID}} AS UserID, '{{.userName}}' AS UserName",
            Some(1),
        ),
        ("odd", "GET", "SELECT 1 AS one", Some(7)),
        ("broken", "GET", "SELECT {{.nope}}", None),
        ("malformed", "GET", "SELECT {{.x", None),
        ("boom", "GET", "SELECT * FROM missing_table", None),
        (
            "login",
            "POST",
            "SELECT UserID, UserName, Password, Salt FROM users WHERE LoginName='{{.loginName}}'",
            Some(0),
        ),
        (
            "connect",
            "POST",
            "SELECT UserID, UserName FROM users WHERE OpenID='{{.openid}}'",
            None,
        ),
    ];
    for &(action, method, template, auth) in descriptors {
        sqlx::query("INSERT INTO api (action, method, template, auth) VALUES (?, ?, ?, ?)")
            .bind(action)
            .bind(method)
            .bind(template)
            .bind(auth)
            .execute(&seed)
            .await
            .unwrap();
    }

    sqlx::query("CREATE TABLE orders (id INTEGER, item TEXT, note TEXT, created DATETIME)")
        .execute(&seed)
        .await
        .unwrap();
    sqlx::query("INSERT INTO orders VALUES (7, 'widget', NULL, '2024-01-02 03:04:05')")
        .execute(&seed)
        .await
        .unwrap();

    sqlx::query(
        "CREATE TABLE users (LoginName TEXT, Password TEXT, Salt TEXT, \
         UserID INTEGER, UserName TEXT, OpenID TEXT)",
    )
    .execute(&seed)
    .await
    .unwrap();
    sqlx::query("INSERT INTO users VALUES ('alice', ?, 's1', 7, 'Alice', 'bound-oid')")
        .bind(password_digest("alice", "secret123", "s1"))
        .execute(&seed)
        .await
        .unwrap();

    seed.close().await;
    (dir, dsn)
}

fn make_config(dsn: &str) -> Config {
    serde_json::from_value(json!({
        "driver": "sqlite",
        "dsn": dsn,
        "query": "SELECT template, auth FROM api WHERE action = ? AND method = ?",
        "jwtSecret": SECRET,
    }))
    .unwrap()
}

async fn app(config: Config) -> axum::Router {
    let state = AppState::new(config).await.unwrap();
    rowgate_server::build_router(state)
}

fn signer() -> SessionSigner {
    SessionSigner::new(SECRET, "rowgate", 3600)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

async fn send(
    app: axum::Router,
    request: axum::http::Request<axum::body::Body>,
) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = axum::http::Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    send(app, request).await
}

async fn get_with_auth(
    app: axum::Router,
    uri: &str,
    authorization: &str,
) -> (StatusCode, serde_json::Value) {
    let request = axum::http::Request::builder()
        .uri(uri)
        .header("authorization", authorization)
        .body(axum::body::Body::empty())
        .unwrap();
    send(app, request).await
}

async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = axum::http::Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    send(app, request).await
}

// ---------------------------------------------------------------------------
// Generic dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dispatch_renders_executes_and_normalizes() {
    let (_dir, dsn) = fixture().await;
    let (status, body) = get(app(make_config(&dsn)).await, "/api/orders?id=7").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 0);
    let row = &body["data"][0];
    assert_eq!(row["id"], json!(7));
    assert_eq!(row["item"], "widget");
    assert_eq!(row["note"], "");
    assert_eq!(row["created"], "2024-01-02 03:04:05");
}

#[tokio::test]
async fn unknown_action_is_404_with_flag_envelope() {
    let (_dir, dsn) = fixture().await;
    let (status, body) = get(app(make_config(&dsn)).await, "/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 1);
    assert_eq!(body["message"], "no such action");
}

#[tokio::test]
async fn http_code_envelope_mirrors_status() {
    let (_dir, dsn) = fixture().await;
    let mut config = make_config(&dsn);
    config.envelope = rowgate_core::config::EnvelopeStyle::HttpCode;
    let (status, body) = get(app(config).await, "/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
    assert_eq!(body["msg"], "no such action");
}

#[tokio::test]
async fn permissive_mode_does_not_404() {
    let (_dir, dsn) = fixture().await;
    let mut config = make_config(&dsn);
    config.missing_action = rowgate_core::config::MissingActionPolicy::Permissive;
    let (status, _body) = get(app(config).await, "/api/nope").await;
    assert_ne!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn template_errors_answer_200_with_flag() {
    let (_dir, dsn) = fixture().await;

    let (status, body) = get(app(make_config(&dsn)).await, "/api/broken").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 1);

    let (status, body) = get(app(make_config(&dsn)).await, "/api/malformed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 1);
}

#[tokio::test]
async fn execution_error_is_500() {
    let (_dir, dsn) = fixture().await;
    let (status, body) = get(app(make_config(&dsn)).await, "/api/boom").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "query execution failed");
}

#[tokio::test]
async fn options_preflight_is_204() {
    let (_dir, dsn) = fixture().await;
    let request = axum::http::Request::builder()
        .method("OPTIONS")
        .uri("/api/orders")
        .body(axum::body::Body::empty())
        .unwrap();
    let response = app(make_config(&dsn)).await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn descriptor_edits_take_effect_without_restart() {
    let (_dir, dsn) = fixture().await;
    let router = app(make_config(&dsn)).await;

    let (status, _body) = get(router.clone(), "/api/orders?id=7").await;
    assert_eq!(status, StatusCode::OK);

    let pool = SqlitePoolOptions::new().connect(&dsn).await.unwrap();
    sqlx::query("UPDATE api SET template = 'SELECT 99 AS id' WHERE action = 'orders'")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let (status, body) = get(router, "/api/orders?id=7").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], json!(99));
}

// ---------------------------------------------------------------------------
// Authorization gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn auth_required_without_token_is_401() {
    let (_dir, dsn) = fixture().await;
    let (status, body) = get(app(make_config(&dsn)).await, "/api/profile").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "authorization token required");
}

#[tokio::test]
async fn auth_required_with_garbage_token_is_401() {
    let (_dir, dsn) = fixture().await;
    let (status, body) =
        get_with_auth(app(make_config(&dsn)).await, "/api/profile", "Bearer junk").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid authorization token");
}

#[tokio::test]
async fn expired_token_is_401() {
    let (_dir, dsn) = fixture().await;
    let stale = SessionSigner::new(SECRET, "rowgate", -3600);
    let token = stale.issue(7, "Alice").unwrap();
    let (status, _body) = get_with_auth(
        app(make_config(&dsn)).await,
        "/api/profile",
        &format!("Bearer {token}"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn valid_token_enriches_the_bag() {
    let (_dir, dsn) = fixture().await;
    let token = signer().issue(7, "Alice").unwrap();
    let (status, body) = get_with_auth(
        app(make_config(&dsn)).await,
        "/api/profile",
        &format!("Bearer {token}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 0);
    assert_eq!(body["data"][0]["UserID"], json!(7));
    assert_eq!(body["data"][0]["UserName"], "Alice");
}

#[tokio::test]
async fn token_query_fallback_works() {
    let (_dir, dsn) = fixture().await;
    let token = signer().issue(7, "Alice").unwrap();
    let (status, body) = get(
        app(make_config(&dsn)).await,
        &format!("/api/profile?token={token}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["UserID"], json!(7));
}

#[tokio::test]
async fn unknown_auth_flag_is_403() {
    let (_dir, dsn) = fixture().await;
    let (status, body) = get(app(make_config(&dsn)).await, "/api/odd").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "unsupported authorization policy");
}

// ---------------------------------------------------------------------------
// Local login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_with_correct_password_issues_a_token() {
    let (_dir, dsn) = fixture().await;
    let (status, body) = post_json(
        app(make_config(&dsn)).await,
        "/login",
        json!({ "loginName": "alice", "password": "secret123" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 0);
    let claims = signer().verify(body["token"].as_str().unwrap()).unwrap();
    assert_eq!(claims.user_id, 7);
    assert_eq!(claims.user_name, "Alice");
    assert_eq!(body["data"][0]["UserName"], "Alice");
}

#[tokio::test]
async fn login_with_wrong_password_is_401_without_token() {
    let (_dir, dsn) = fixture().await;
    let (status, body) = post_json(
        app(make_config(&dsn)).await,
        "/login",
        json!({ "loginName": "alice", "password": "wrong" }),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 1);
    assert!(body.get("token").is_none());
}

#[tokio::test]
async fn login_with_unknown_name_is_401() {
    let (_dir, dsn) = fixture().await;
    let (status, body) = post_json(
        app(make_config(&dsn)).await,
        "/login",
        json!({ "loginName": "nobody", "password": "secret123" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "invalid login name or password");
}

#[tokio::test]
async fn login_without_credentials_is_400() {
    let (_dir, dsn) = fixture().await;
    let (status, _body) = post_json(app(make_config(&dsn)).await, "/login", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_also_dispatches_through_the_catch_all() {
    let (_dir, dsn) = fixture().await;
    let (status, body) = post_json(
        app(make_config(&dsn)).await,
        "/api/login",
        json!({ "loginName": "alice", "password": "secret123" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 0);
    assert!(body["token"].is_string());
}

// ---------------------------------------------------------------------------
// Third-party login
// ---------------------------------------------------------------------------

fn config_with_provider(dsn: &str, server: &mockito::ServerGuard) -> Config {
    let mut config = make_config(dsn);
    config.connect = serde_json::from_value(json!({
        "appId": "app-1",
        "secret": "shh",
        "authUrl": format!("{}/exchange", server.url()),
        "tokenUrl": format!("{}/token", server.url()),
        "ticketUrl": format!("{}/ticket", server.url()),
    }))
    .unwrap();
    config
}

#[tokio::test]
async fn connect_with_unbound_identity_reports_status_2() {
    let (_dir, dsn) = fixture().await;
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/exchange")
        .match_query(mockito::Matcher::Any)
        .with_body(r#"{"openid": "unbound-oid", "session_key": "sk"}"#)
        .create_async()
        .await;

    let (status, body) = post_json(
        app(config_with_provider(&dsn, &server)).await,
        "/connect",
        json!({ "code": "code-1" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 2);
    assert_eq!(body["openid"], "unbound-oid");
    assert!(body.get("token").is_none());
}

#[tokio::test]
async fn connect_with_bound_identity_issues_a_token() {
    let (_dir, dsn) = fixture().await;
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/exchange")
        .match_query(mockito::Matcher::Any)
        .with_body(r#"{"openid": "bound-oid", "session_key": "sk"}"#)
        .create_async()
        .await;

    let (status, body) = post_json(
        app(config_with_provider(&dsn, &server)).await,
        "/connect",
        json!({ "code": "code-1" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 0);
    assert_eq!(body["openid"], "bound-oid");
    let claims = signer().verify(body["token"].as_str().unwrap()).unwrap();
    assert_eq!(claims.user_id, 7);
}

#[tokio::test]
async fn connect_surfaces_provider_error_as_401() {
    let (_dir, dsn) = fixture().await;
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/exchange")
        .match_query(mockito::Matcher::Any)
        .with_body(r#"{"errcode": 40029, "errmsg": "invalid code"}"#)
        .create_async()
        .await;

    let (status, body) = post_json(
        app(config_with_provider(&dsn, &server)).await,
        "/connect",
        json!({ "code": "bad" }),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].as_str().unwrap().contains("invalid code"));
}

#[tokio::test]
async fn connect_without_code_is_400() {
    let (_dir, dsn) = fixture().await;
    let (status, body) = post_json(app(make_config(&dsn)).await, "/connect", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "missing authorization code");
}

// ---------------------------------------------------------------------------
// Signed requests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn signed_request_returns_descriptor_fields() {
    let (_dir, dsn) = fixture().await;
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/token")
        .match_query(mockito::Matcher::Any)
        .with_body(r#"{"access_token": "at-1", "expires_in": 7200}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/ticket")
        .match_query(mockito::Matcher::Any)
        .with_body(r#"{"ticket": "tkt-1", "expires_in": 7200}"#)
        .create_async()
        .await;

    let (status, body) = get(
        app(config_with_provider(&dsn, &server)).await,
        "/api/signature?url=https%3A%2F%2Fexample.com%2Fpage",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 0);
    assert_eq!(body["appId"], "app-1");
    assert_eq!(body["nonceStr"].as_str().unwrap().len(), 16);
    let signature = body["signature"].as_str().unwrap();
    assert_eq!(signature.len(), 40);
    assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
}

#[tokio::test]
async fn signed_request_without_url_is_400() {
    let (_dir, dsn) = fixture().await;
    let (status, body) = get(app(make_config(&dsn)).await, "/api/signature").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "missing url parameter");
}

#[tokio::test]
async fn signed_request_with_unconfigured_provider_is_500() {
    let (_dir, dsn) = fixture().await;
    let (status, _body) = get(app(make_config(&dsn)).await, "/api/signature?url=x").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
