//! API endpoint integration tests

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tenant_host::api::ApiServerBuilder;
use tenant_host::login::LoginParams;
use tenant_host::plugins::{PluginRegistry, builtin::HelloPlugin};
use tower::ServiceExt;

mod common;
use common::{MockPlugin, RestBehavior, config, registry};

const API_KEY: &str = "test-api-key";

/// Registry with the hello plugin active
async fn hello_registry() -> PluginRegistry {
    let registry = registry();
    registry
        .register(
            Arc::new(HelloPlugin::new()),
            config(json!({"apiKey": "hunter2", "greeting": "Howdy"})),
        )
        .await
        .expect("hello should register");
    registry
}

fn build_test_router(registry: &PluginRegistry) -> Router {
    ApiServerBuilder::new(registry.clone(), registry.services().logins.clone(), 0)
        .api_key(Some(API_KEY.to_string()))
        .build()
        .router()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn admin(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {API_KEY}"))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_test_router(&registry());
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_ready_reports_degraded_plugins() {
    let registry = hello_registry().await;
    let app = build_test_router(&registry);

    let (status, body) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["plugins"]["active"], 1);

    // A second hello instance without its required key fails to register
    let _ = registry
        .register(Arc::new(HelloPlugin::new()), config(json!({})))
        .await;
    let (_, body) = send(&app, get("/ready")).await;
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["plugins"]["total"], 2);
    assert_eq!(body["plugins"]["failed"], 1);
}

#[tokio::test]
async fn test_ready_stays_ok_after_operator_unregister() {
    let registry = hello_registry().await;
    let app = build_test_router(&registry);

    let (status, _) = send(&app, admin(Method::DELETE, "/api/plugins/hello")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["plugins"]["active"], 0);
    assert_eq!(body["plugins"]["total"], 1);
    assert_eq!(body["plugins"]["failed"], 0);
}

#[tokio::test]
async fn test_restapi_dispatch() {
    let app = build_test_router(&hello_registry().await);

    let (status, body) = send(&app, get("/restapi/hello")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 1);
    assert_eq!(body["message"], "Howdy");

    let (status, body) = send(&app, get("/restapi/device/list")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 10);
}

#[tokio::test]
async fn test_restapi_login_token() {
    let registry = hello_registry().await;
    let app = build_test_router(&registry);
    let login = registry
        .services()
        .logins
        .create_login(LoginParams {
            email: "ada@example.com".to_string(),
            ..LoginParams::default()
        })
        .await
        .unwrap();

    // No login: the plugin itself rejects the write
    let request = Request::builder()
        .method(Method::POST)
        .uri("/restapi/hello/ada")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 2);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/restapi/hello/ada")
        .header("x-login-token", login.token())
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Howdy, ada!");
    assert_eq!(body["visits"], 1);

    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/restapi/hello/ada?loginToken={}", login.token()))
        .body(Body::empty())
        .unwrap();
    let (_, body) = send(&app, request).await;
    assert_eq!(body["visits"], 2);

    // One distinct visitor
    let (_, body) = send(&app, get("/restapi/hello/visits")).await;
    assert_eq!(body["visits"], 1);
}

#[tokio::test]
async fn test_restapi_rejects_unknown_token() {
    let app = build_test_router(&hello_registry().await);
    let request = Request::builder()
        .uri("/restapi/hello")
        .header("x-login-token", "not-a-token")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 2);
}

#[tokio::test]
async fn test_restapi_passes_login_to_plugin() {
    let registry = registry();
    registry
        .register(
            MockPlugin::new("users").object_type("user", RestBehavior::Claim).build(),
            config(json!({})),
        )
        .await
        .unwrap();
    let login = registry
        .services()
        .logins
        .create_login(LoginParams {
            email: "root@example.com".to_string(),
            is_admin: true,
            ..LoginParams::default()
        })
        .await
        .unwrap();
    let app = build_test_router(&registry);

    let request = Request::builder()
        .method(Method::PUT)
        .uri("/restapi/user/update/7/name")
        .header("x-login-token", login.token())
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["plugin"], "users");
    assert_eq!(body["arg1"], "update");
    assert_eq!(body["method"], "PUT");
    assert_eq!(body["login"], "root@example.com");
}

#[tokio::test]
async fn test_restapi_faults() {
    let registry = registry();
    registry
        .register(
            MockPlugin::new("crashy")
                .object_type("crash", RestBehavior::Fail)
                .object_type("file", RestBehavior::CommitThenFail)
                .build(),
            config(json!({})),
        )
        .await
        .unwrap();
    let app = build_test_router(&registry);

    let (status, body) = send(&app, get("/restapi/crash")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], 0);

    let response = app.clone().oneshot(get("/restapi/file")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers().get(header::CONNECTION).unwrap(), "close");
}

#[tokio::test]
async fn test_admin_requires_api_key() {
    let app = build_test_router(&hello_registry().await);

    let (status, body) = send(&app, get("/api/plugins")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], 36);

    let request = Request::builder()
        .uri("/api/plugins")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, admin(Method::GET, "/api/plugins")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["id"], "hello");
    assert_eq!(body[0]["state"], "active");
}

#[tokio::test]
async fn test_plugin_detail_redacts_secrets() {
    let app = build_test_router(&hello_registry().await);

    let response = app
        .clone()
        .oneshot(admin(Method::GET, "/api/plugins/hello"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(!text.contains("hunter2"));

    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["config"]["apiKey"], "********");
    assert_eq!(body["config"]["greeting"], "Howdy");
    assert_eq!(body["routes"][0]["path"], "/hello/{name}");

    let (status, body) = send(&app, admin(Method::GET, "/api/plugins/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 10);
}

#[tokio::test]
async fn test_plugin_route_and_unregister() {
    let registry = hello_registry().await;
    let app = build_test_router(&registry);

    let (status, body) = send(&app, get("/hello/ada")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Howdy, ada!");

    let (_, body) = send(&app, admin(Method::GET, "/api/session-types")).await;
    assert_eq!(body[0]["plugin"], "hello");
    assert_eq!(body[0]["name"], "hello");

    let (status, _) = send(&app, admin(Method::DELETE, "/api/plugins/hello")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get("/hello/ada")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 10);

    let (status, _) = send(&app, get("/restapi/hello")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, admin(Method::DELETE, "/api/plugins/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_host_paths_cannot_be_shadowed() {
    let registry = registry();
    let registration = registry
        .register(
            MockPlugin::new("shadow")
                .route(Method::GET, "/health")
                .route(Method::GET, "/ready")
                .build(),
            config(json!({})),
        )
        .await
        .unwrap();
    assert_eq!(registration.conflicts.len(), 2);
    let app = build_test_router(&registry);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (_, body) = send(&app, admin(Method::GET, "/api/plugins/conflicts")).await;
    let conflicts = body.as_array().unwrap();
    assert_eq!(conflicts.len(), 2);
    assert!(conflicts.iter().all(|c| c["owner"] == "host" && c["contender"] == "shadow"));

    let (_, body) = send(&app, admin(Method::GET, "/api/plugins/shadow")).await;
    assert!(body["routes"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_route_handler_panic_is_contained() {
    let registry = registry();
    registry
        .register(
            MockPlugin::new("items").route(Method::GET, "/items/{id}").build(),
            config(json!({})),
        )
        .await
        .unwrap();
    let app = build_test_router(&registry);

    let response = app.clone().oneshot(get("/items/7")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"items:7");

    let (status, body) = send(&app, get("/items/panic")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], 0);

    // Wrong method falls through to not found
    let request = Request::builder()
        .method(Method::POST)
        .uri("/items/7")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_static_mount_and_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("app.js"), "console.log('hi');").unwrap();

    let registry = registry();
    registry
        .register(
            MockPlugin::new("assets").mount(dir.path(), "/assets").build(),
            config(json!({})),
        )
        .await
        .unwrap();
    registry
        .register(
            MockPlugin::new("late").mount("/nowhere", "/assets/").build(),
            config(json!({})),
        )
        .await
        .unwrap();
    let app = build_test_router(&registry);

    let response = app.clone().oneshot(get("/assets/app.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"console.log('hi');");

    let response = app.clone().oneshot(get("/assets/missing.js")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let (_, body) = send(&app, admin(Method::GET, "/api/plugins/conflicts")).await;
    assert_eq!(body[0]["method"], "STATIC");
    assert_eq!(body[0]["owner"], "assets");
    assert_eq!(body[0]["contender"], "late");
}

#[tokio::test]
async fn test_static_dir_fallback() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
    std::fs::write(dir.path().join("style.css"), "body{}").unwrap();

    let registry = registry();
    let app = ApiServerBuilder::new(registry.clone(), registry.services().logins.clone(), 0)
        .static_dir(Some(dir.path().to_path_buf()))
        .build()
        .router();

    let response = app.clone().oneshot(get("/style.css")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Unknown paths serve the index page
    let response = app.clone().oneshot(get("/some/page")).await.unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"<h1>home</h1>");

    // Without an api key the admin endpoints are open
    let (status, _) = send(&app, get("/api/plugins")).await;
    assert_eq!(status, StatusCode::OK);
}
