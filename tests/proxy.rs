//! Reverse-proxy bridge integration tests

use std::sync::Arc;

use axum::{
    body::Body,
    extract::Request,
    http::{Method, StatusCode},
    Json, Router,
};
use harbor_gateway::{ProxyTable, ServiceManager};
use serde_json::json;
use tokio::net::TcpListener;
use tower::ServiceExt;

mod common;
use common::{body_json, build_test_router};

/// Echo every request back as JSON
async fn echo(req: Request) -> Json<serde_json::Value> {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();

    Json(json!({
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "body": String::from_utf8_lossy(&body),
        "x_trace": parts.headers.get("x-trace").and_then(|v| v.to_str().ok()),
    }))
}

/// Start an echo upstream on an ephemeral port
async fn spawn_upstream() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = Router::new().fallback(echo);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

fn router_for(prefix: &str, port: u16) -> Router {
    let mut table = ProxyTable::new();
    table.insert(prefix, port);
    build_test_router(Arc::new(ServiceManager::new()), table)
}

#[tokio::test]
async fn test_forwards_method_path_query_and_body() {
    let port = spawn_upstream().await;
    let app = router_for("foo", port);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/plugin/foo/bar/baz?x=1&y=two")
                .header("x-trace", "abc")
                .body(Body::from("payload"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["method"], "POST");
    assert_eq!(json["path"], "/bar/baz");
    assert_eq!(json["query"], "x=1&y=two");
    assert_eq!(json["body"], "payload");
    assert_eq!(json["x_trace"], "abc");
}

#[tokio::test]
async fn test_forwards_escaped_path_unmodified() {
    let port = spawn_upstream().await;
    let app = router_for("foo", port);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/plugin/foo/a%3Fb%2Fc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["path"], "/a%3Fb%2Fc");
    assert!(json["query"].is_null());
}

#[tokio::test]
async fn test_trailing_slash_forwards_to_root() {
    let port = spawn_upstream().await;
    let app = router_for("foo", port);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/plugin/foo/?page=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["method"], "GET");
    assert_eq!(json["path"], "/");
    assert_eq!(json["query"], "page=2");
}

#[tokio::test]
async fn test_streams_large_request_body() {
    let port = spawn_upstream().await;
    let app = router_for("foo", port);
    let payload = "x".repeat(256 * 1024);

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri("/plugin/foo/upload")
                .body(Body::from(payload.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["method"], "PUT");
    assert_eq!(json["body"].as_str().unwrap().len(), payload.len());
}

#[tokio::test]
async fn test_bare_prefix_reports_loaded_without_forwarding() {
    // Port 1 has no listener; a forwarded request would fail
    let app = router_for("foo", 1);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/plugin/foo")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json, json!({ "loaded": true }));
}

#[tokio::test]
async fn test_unknown_prefix_is_not_found() {
    let port = spawn_upstream().await;
    let app = router_for("foo", port);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/plugin/other/bar")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "plugin_not_found");
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    // Bind then drop to get a port with nothing listening
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let app = router_for("foo", port);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/plugin/foo/bar")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "upstream_error");
}
