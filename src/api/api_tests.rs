use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

use crate::api::{app_state::AppState, create_router};
use crate::cache::MemoryCache;
use crate::config::config::AppConfig;
use crate::jobs::MemoryBroker;
use crate::models::{SubscriptionTier, User};
use crate::security::RateLimiter;
use crate::storage::{Collection, MemoryStore};

fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.security.password_hash_iterations = 1000;
    config
}

fn build_state(config: AppConfig) -> AppState {
    let limiter = RateLimiter::in_memory(&config.security);
    AppState::build(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryBroker::new(60)),
        Arc::new(MemoryCache::new()),
        limiter,
    )
    .unwrap()
}

fn app() -> (Router, AppState) {
    let state = build_state(test_config());
    (create_router(state.clone()), state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

/// 注册并返回 access token
async fn register(app: &Router, email: &str) -> String {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/api/v1/auth/register",
            None,
            json!({ "email": email, "password": "password123", "full_name": "Ada" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_endpoints() {
    let (app, _) = app();

    let response = app.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("X-Frame-Options").unwrap(),
        "DENY"
    );

    let (status, _) = send(&app, get("/health/ready", None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get("/version", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["api_version"], "v1");
}

#[tokio::test]
async fn test_docs_serves_openapi() {
    let (app, _) = app();
    let (status, body) = send(&app, get("/docs", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["openapi"].as_str().unwrap().starts_with("3."));
    assert!(body["components"]["schemas"]["PaperResponse"].is_object());
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let (app, _) = app();

    let (status, body) = send(&app, get("/api/v1/papers", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = send(&app, get("/api/v1/auth/me", Some("not-a-jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_login_and_me() {
    let (app, _) = app();
    let token = register(&app, "ada@example.com").await;

    let (status, body) = send(&app, get("/api/v1/auth/me", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "ada@example.com");
    assert!(body.get("hashed_password").is_none());

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/auth/register",
            None,
            json!({ "email": "ada@example.com", "password": "password123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let form = Request::builder()
        .method("POST")
        .uri("/api/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("username=ada%40example.com&password=password123"))
        .unwrap();
    let (status, body) = send(&app, form).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/auth/login-json",
            None,
            json!({ "email": "ada@example.com", "password": "wrong-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_knowledge_is_scoped_to_owner() {
    let (app, _) = app();
    let owner = register(&app, "owner@example.com").await;
    let other = register(&app, "other@example.com").await;

    let (status, created) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/knowledge",
            Some(&owner),
            json!({
                "title": "Attention notes",
                "content": "Self-attention relates positions of a sequence.",
                "entry_type": "note",
                "tags": ["Transformers"]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap();

    let uri = format!("/api/v1/knowledge/{}", id);
    let (status, _) = send(&app, get(&uri, Some(&owner))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, get(&uri, Some(&other))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, get("/api/v1/knowledge/stats", Some(&owner))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_entries"], 1);
}

#[tokio::test]
async fn test_upload_validation() {
    let (app, _) = app();
    let token = register(&app, "up@example.com").await;

    let upload = |filename: &str, body: &'static [u8]| {
        Request::builder()
            .method("POST")
            .uri(format!("/api/v1/papers/upload?filename={}", filename))
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(body))
            .unwrap()
    };

    let (status, body) = send(&app, upload("paper.pdf", b"%PDF-1.4")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["size"], 8);

    let (status, _) = send(&app, upload("paper.exe", b"MZ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

fn upload_request(token: &str, filename: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(format!("/api/v1/papers/upload?filename={}", filename))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_upload_above_request_limit_within_upload_limit() {
    let (app, state) = app();
    let token = register(&app, "large@example.com").await;
    let size = 12 * 1024 * 1024;
    assert!(size > state.config.server.max_request_size);
    assert!(size < state.config.sources.upload_max_size);

    let (status, body) = send(&app, upload_request(&token, "paper.pdf", vec![b'%'; size])).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["size"], size);
}

#[tokio::test]
async fn test_upload_over_limit_is_413() {
    let mut config = test_config();
    config.sources.upload_max_size = 1024;
    let app = create_router(build_state(config));
    let token = register(&app, "huge@example.com").await;

    let (status, body) = send(&app, upload_request(&token, "paper.pdf", vec![b'%'; 2048])).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_unknown_task_is_404() {
    let (app, _) = app();
    let token = register(&app, "tasks@example.com").await;
    let (status, _) = send(&app, get("/api/v1/tasks/missing", Some(&token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_monitoring_requires_institution_and_toggles_maintenance() {
    let (app, state) = app();
    let token = register(&app, "admin@example.com").await;

    let (status, _) = send(&app, get("/api/v1/monitoring/status", Some(&token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let users: Collection<User> = Collection::new(state.store.clone());
    let mut user = state
        .auth
        .find_by_email("admin@example.com")
        .await
        .unwrap()
        .unwrap();
    user.subscription_tier = SubscriptionTier::Institution;
    users.save(&user).await.unwrap();

    let (status, body) = send(&app, get("/api/v1/monitoring/status", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queues"].as_array().unwrap().len(), 4);
    assert_eq!(body["maintenance_mode"], false);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/monitoring/maintenance",
            Some(&token),
            json!({ "enabled": true }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get("/api/v1/papers", Some(&token))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "MAINTENANCE");

    let (status, _) = send(&app, get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/api/v1/monitoring/maintenance",
            Some(&token),
            json!({ "enabled": false }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, get("/api/v1/papers", Some(&token))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_auth_rate_limit() {
    let mut config = test_config();
    config.security.rate_limit_enabled = true;
    config.security.auth_rate_limit_requests = 2;
    let app = create_router(build_state(config));

    let attempt = || {
        json_request(
            "POST",
            "/api/v1/auth/login-json",
            None,
            json!({ "email": "nobody@example.com", "password": "password123" }),
        )
    };

    for _ in 0..2 {
        let (status, _) = send(&app, attempt()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let response = app.clone().oneshot(attempt()).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}
