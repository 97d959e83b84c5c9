mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;

#[tokio::test]
async fn test_health() {
    let app = build_test_app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, body) = send(app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = build_test_app();
    let request = Request::builder().uri("/nope").body(Body::empty()).unwrap();

    let (status, _) = send(app.router, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ws_upgrade_without_token_is_unauthorized() {
    let app = build_test_app();
    let request = Request::builder()
        .uri("/app")
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
        .body(Body::empty())
        .unwrap();

    let (status, _) = send(app.router, request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
