//! End-to-end router tests driven through `tower::ServiceExt::oneshot`
//! without binding a real socket (spec test-tooling convention).

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use buntime_core::BuntimeConfig;
use buntime_dispatch::{build_router, DispatchState};
use buntime_plugin::PluginRegistry;
use buntime_pool::Pool;

async fn empty_state(worker_dirs: Vec<std::path::PathBuf>) -> DispatchState {
    let config = BuntimeConfig::for_test(worker_dirs.clone());
    let pool = Pool::new(worker_dirs, config.pool_size);
    let plugins = PluginRegistry::load(Vec::new()).await.unwrap();
    DispatchState::new(config, pool, plugins)
}

/// The app-dispatch fallback extracts `ConnectInfo<SocketAddr>`, which is
/// normally inserted by `into_make_service_with_connect_info` — stand that
/// in for direct `oneshot` calls that bypass `serve()`.
fn with_fake_peer(mut req: Request<Body>) -> Request<Body> {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

#[tokio::test]
async fn health_is_always_ok() {
    let state = empty_state(vec![]).await;
    let router = build_router(state);

    let response = router
        .oneshot(Request::builder().uri("/_/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn ready_reflects_pool_capacity() {
    let state = empty_state(vec![]).await;
    let router = build_router(state);

    let response = router
        .oneshot(Request::builder().uri("/_/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    // An empty pool (max_size from the default config, 16) always has
    // capacity until it fills up.
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_app_is_404_with_app_not_found_code() {
    let root = tempfile::TempDir::new().unwrap();
    let state = empty_state(vec![root.path().to_path_buf()]).await;
    let router = build_router(state);

    let request = with_fake_peer(Request::builder().uri("/nope/anything").body(Body::empty()).unwrap());
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "AppNotFound");
}

#[tokio::test]
async fn admin_metrics_reports_empty_pool() {
    let state = empty_state(vec![]).await;
    let router = build_router(state);

    let response = router
        .oneshot(Request::builder().uri("/_/admin/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["live"], 0);
}

#[tokio::test]
async fn admin_config_patch_toggles_production_mode() {
    let state = empty_state(vec![]).await;
    let router = build_router(state);

    let response = router
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/_/admin/config")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"production": true}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    buntime_core::set_production_mode(false);
}
