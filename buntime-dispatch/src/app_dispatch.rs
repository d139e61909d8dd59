//! The app-dispatch fallback route: the last stop in routing precedence,
//! behind plugin and admin routes (spec §4.4).

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::{header, Request, Response};
use axum::response::IntoResponse;

use buntime_core::{AppIdent, BuntimeError};
use buntime_plugin::PluginRequest;
use buntime_resolver::{load_worker_config, resolve, ResolveError};

use crate::proxy::{proxy, proxy_websocket};
use crate::state::DispatchState;

/// `Upgrade: websocket` (case-insensitively) is what distinguishes a
/// WebSocket upgrade attempt from a normal request (spec §4.2, §4.4 step 5).
fn is_websocket_upgrade(parts: &axum::http::request::Parts) -> bool {
    parts
        .headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

pub async fn app_dispatch(
    State(state): State<DispatchState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request<Body>,
) -> Response<Body> {
    match dispatch(state, addr, req).await {
        Ok(resp) => resp,
        Err(e) => e.into_response(),
    }
}

async fn dispatch(
    state: DispatchState,
    addr: SocketAddr,
    req: Request<Body>,
) -> Result<Response<Body>, BuntimeError> {
    let (mut parts, body) = req.into_parts();

    let resolved = resolve(&state.worker_dirs, parts.uri.path()).map_err(|e| match e {
        ResolveError::UnknownApp | ResolveError::MalformedRequest => BuntimeError::AppNotFound {
            app: parts.uri.path().trim_start_matches('/').to_string(),
            range: None,
        },
        ResolveError::NoMatchingVersion => BuntimeError::AppNotFound {
            app: first_segment(parts.uri.path()),
            range: requested_range(parts.uri.path()),
        },
    })?;
    let app = AppIdent::new(resolved.name.clone(), resolved.version.clone());

    let mut plugin_req = PluginRequest {
        method: &parts.method,
        uri: &parts.uri,
        headers: &mut parts.headers,
        app: Some(resolved.name.as_str()),
    };
    if let Some(short_circuit) = state.plugins.run_on_request(&mut plugin_req).await {
        return Ok(short_circuit);
    }

    let worker_config = load_worker_config(&resolved.abs_dir).map_err(|e| BuntimeError::InvalidManifest {
        path: resolved.abs_dir.display().to_string(),
        reason: e.to_string(),
    })?;
    let deadline = Duration::from_millis(worker_config.timeout_ms);

    let lease = state.pool.acquire(app, deadline).await?;

    if is_websocket_upgrade(&parts) {
        let ws = WebSocketUpgrade::from_request_parts(&mut parts, &state)
            .await
            .map_err(|e| BuntimeError::InvalidConfig {
                key: "upgrade".to_string(),
                reason: e.to_string(),
            })?;
        let mut response = proxy_websocket(lease, ws, parts, Some(addr.to_string())).await?;
        state.plugins.run_on_response(&mut response).await;
        return Ok(response);
    }

    let req = Request::from_parts(parts, body);
    match proxy(lease, req, Some(addr.to_string())).await {
        Ok(mut response) => {
            state.plugins.run_on_response(&mut response).await;
            Ok(response)
        }
        Err(e) => Err(e),
    }
}

fn first_segment(path: &str) -> String {
    path.trim_start_matches('/').split('/').next().unwrap_or("").split('@').next().unwrap_or("").to_string()
}

fn requested_range(path: &str) -> Option<String> {
    let first = path.trim_start_matches('/').split('/').next().unwrap_or("");
    first.split_once('@').map(|(_, range)| range.to_string())
}
