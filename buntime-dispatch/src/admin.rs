//! Admin routes: install/remove app, install/remove plugin, list plugins,
//! read/patch config, metrics (spec §4.4, §6). Thin wrappers over the
//! resolver and the plugin registry, matching the spec's own framing.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use buntime_core::{set_production_mode, BuntimeError};
use buntime_resolver::{install, uninstall};

use crate::state::DispatchState;

pub fn router() -> Router<DispatchState> {
    Router::new()
        .route("/apps", post(install_app))
        .route("/apps/{name}/{version}", axum::routing::delete(remove_app))
        .route("/plugins", get(list_plugins).post(install_plugin))
        .route("/plugins/{name}/{version}", axum::routing::delete(remove_plugin))
        .route("/metrics", get(metrics))
        .route("/config", get(read_config))
        .route("/config", patch(patch_config))
}

async fn install_app(State(state): State<DispatchState>, multipart: Multipart) -> Response {
    let Some(root) = state.worker_dirs.first() else {
        return BuntimeError::InvalidConfig {
            key: "RUNTIME_WORKER_DIRS".into(),
            reason: "no worker directory configured".into(),
        }
        .into_response();
    };
    run_install(multipart, root).await
}

async fn remove_app(
    State(state): State<DispatchState>,
    Path((name, version)): Path<(String, String)>,
) -> Response {
    let Some(root) = state.worker_dirs.first() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    run_uninstall(root, &name, &version).await
}

async fn install_plugin(State(state): State<DispatchState>, multipart: Multipart) -> Response {
    let Some(root) = state.config.plugin_dirs.first() else {
        return BuntimeError::InvalidConfig {
            key: "RUNTIME_PLUGIN_DIRS".into(),
            reason: "no plugin directory configured".into(),
        }
        .into_response();
    };
    run_install(multipart, root).await
}

async fn remove_plugin(
    State(state): State<DispatchState>,
    Path((name, version)): Path<(String, String)>,
) -> Response {
    let Some(root) = state.config.plugin_dirs.first() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    run_uninstall(root, &name, &version).await
}

/// Save the upload's first field to a temp file (preserving its extension,
/// since `install()` dispatches `.tgz`/`.zip` by suffix) then install it.
async fn run_install(mut multipart: Multipart, registry_root: &std::path::Path) -> Response {
    let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "message": "no upload field" }))).into_response()
        }
        Err(e) => return (StatusCode::BAD_REQUEST, Json(json!({ "message": e.to_string() }))).into_response(),
    };
    let suffix = field
        .file_name()
        .map(archive_suffix)
        .unwrap_or(".tgz");
    let bytes = match field.bytes().await {
        Ok(b) => b,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(json!({ "message": e.to_string() }))).into_response(),
    };

    let Ok(temp) = tempfile::Builder::new().suffix(suffix).tempfile() else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };
    if tokio::fs::write(temp.path(), &bytes).await.is_err() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    match install(temp.path(), registry_root) {
        Ok(ident) => Json(json!({ "name": ident.name, "version": ident.version })).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "message": e.to_string() }))).into_response(),
    }
}

async fn run_uninstall(registry_root: &std::path::Path, name: &str, version: &str) -> Response {
    match uninstall(registry_root, name, version) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => (StatusCode::NOT_FOUND, Json(json!({ "message": e.to_string() }))).into_response(),
    }
}

fn archive_suffix(filename: &str) -> &'static str {
    if filename.ends_with(".zip") {
        ".zip"
    } else {
        ".tgz"
    }
}

async fn list_plugins(State(state): State<DispatchState>) -> Json<serde_json::Value> {
    Json(json!({ "plugins": state.plugins.names() }))
}

async fn metrics(State(state): State<DispatchState>) -> Json<serde_json::Value> {
    let m = state.pool.metrics();
    Json(json!({
        "live": m.live,
        "maxSize": m.max_size,
        "waiting": m.waiting,
        "lanes": m.lanes.iter().map(|l| json!({
            "app": l.app.name,
            "version": l.app.version,
            "ready": l.ready,
        })).collect::<Vec<_>>(),
    }))
}

async fn read_config(State(state): State<DispatchState>) -> Json<serde_json::Value> {
    Json(json!({
        "workerDirs": state.config.worker_dirs.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
        "pluginDirs": state.config.plugin_dirs.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
        "poolSize": state.config.pool_size,
        "port": state.config.port,
        "production": state.config.production,
        "delayMs": state.config.delay_ms,
    }))
}

#[derive(Debug, Deserialize)]
struct ConfigPatch {
    production: Option<bool>,
}

/// Only `production` is actually mutable at runtime: it gates error-detail
/// stripping via a process-wide atomic (spec §4.6 doesn't otherwise permit
/// runtime resizing of the pool or the search-path lists without a
/// restart).
async fn patch_config(Json(patch): Json<ConfigPatch>) -> StatusCode {
    if let Some(production) = patch.production {
        set_production_mode(production);
    }
    StatusCode::OK
}
