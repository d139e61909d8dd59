//! Error taxonomy for the Buntime runtime (spec §7).
//!
//! Every layer of the core converts its failures into a [`BuntimeError`]
//! variant; the dispatcher is the single place that maps a variant to an
//! HTTP status. Each variant carries a stable `code()` identifier and a
//! human `message()`, matching `r2e_core::error::AppError`'s split between
//! structured status mapping and free-text detail.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Whether internal detail (paths, source error text) is stripped from the
/// response body. Set once at startup from `BuntimeConfig::production`.
static PRODUCTION_MODE: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Configure whether error responses hide internal detail. Call once at
/// startup; defaults to `false` (development mode: detail is shown).
pub fn set_production_mode(production: bool) {
    PRODUCTION_MODE.store(production, std::sync::atomic::Ordering::Relaxed);
}

fn is_production() -> bool {
    PRODUCTION_MODE.load(std::sync::atomic::Ordering::Relaxed)
}

/// The error kinds a request can fail with, per spec §7.
#[derive(Debug, Clone)]
pub enum BuntimeError {
    /// The resolver found no version satisfying the requested range.
    AppNotFound { app: String, range: Option<String> },
    /// Worker creation failed (spawn error, creation-deadline timeout).
    AppUnavailable { app: String, version: String, reason: String },
    /// The acquisition deadline elapsed while waiting for a free worker.
    PoolExhausted { app: String, version: String, retry_after_secs: u64 },
    /// The worker crashed or its control channel closed mid-request.
    WorkerCrash { app: String, version: String, reason: String },
    /// The worker did not respond within the configured request timeout.
    WorkerTimeout { app: String, version: String },
    /// A plugin or install manifest was malformed.
    InvalidManifest { path: String, reason: String },
    /// A configuration value was missing or invalid.
    InvalidConfig { key: String, reason: String },
}

impl BuntimeError {
    /// Stable machine-readable identifier, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            BuntimeError::AppNotFound { .. } => "AppNotFound",
            BuntimeError::AppUnavailable { .. } => "AppUnavailable",
            BuntimeError::PoolExhausted { .. } => "PoolExhausted",
            BuntimeError::WorkerCrash { .. } => "WorkerCrash",
            BuntimeError::WorkerTimeout { .. } => "WorkerTimeout",
            BuntimeError::InvalidManifest { .. } => "InvalidManifest",
            BuntimeError::InvalidConfig { .. } => "InvalidConfig",
        }
    }

    /// The HTTP status this kind maps to (spec §7).
    pub fn status(&self) -> StatusCode {
        match self {
            BuntimeError::AppNotFound { .. } => StatusCode::NOT_FOUND,
            BuntimeError::AppUnavailable { .. } => StatusCode::BAD_GATEWAY,
            BuntimeError::PoolExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            BuntimeError::WorkerCrash { .. } => StatusCode::BAD_GATEWAY,
            BuntimeError::WorkerTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            BuntimeError::InvalidManifest { .. } => StatusCode::BAD_REQUEST,
            BuntimeError::InvalidConfig { .. } => StatusCode::BAD_REQUEST,
        }
    }

    /// `Retry-After` seconds, when the kind carries one.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            BuntimeError::PoolExhausted { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        }
    }
}

impl std::fmt::Display for BuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuntimeError::AppNotFound { app, range } => match range {
                Some(r) => write!(f, "no version of '{app}' satisfies range '{r}'"),
                None => write!(f, "no app named '{app}' is installed"),
            },
            BuntimeError::AppUnavailable { app, version, reason } => {
                write!(f, "worker for '{app}@{version}' unavailable: {reason}")
            }
            BuntimeError::PoolExhausted { app, version, .. } => {
                write!(f, "pool exhausted waiting for '{app}@{version}'")
            }
            BuntimeError::WorkerCrash { app, version, reason } => {
                write!(f, "worker for '{app}@{version}' crashed: {reason}")
            }
            BuntimeError::WorkerTimeout { app, version } => {
                write!(f, "worker for '{app}@{version}' timed out")
            }
            BuntimeError::InvalidManifest { path, reason } => {
                write!(f, "invalid manifest at '{path}': {reason}")
            }
            BuntimeError::InvalidConfig { key, reason } => {
                write!(f, "invalid config value for '{key}': {reason}")
            }
        }
    }
}

impl std::error::Error for BuntimeError {}

impl IntoResponse for BuntimeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = if is_production() {
            // Internal detail (paths, crash reasons) stays in the log only.
            tracing::error!(code, detail = %self, "request failed");
            status.canonical_reason().unwrap_or("error").to_string()
        } else {
            self.to_string()
        };

        let mut body = serde_json::json!({ "code": code, "message": message });
        if let Some(secs) = self.retry_after() {
            body["retryAfterSeconds"] = serde_json::json!(secs);
        }

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = self.retry_after() {
            if let Ok(value) = secs.to_string().parse() {
                response.headers_mut().insert("retry-after", value);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn parts(err: BuntimeError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn app_not_found_maps_to_404() {
        let (status, body) = parts(BuntimeError::AppNotFound {
            app: "hello".into(),
            range: Some("9".into()),
        })
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "AppNotFound");
    }

    #[tokio::test]
    async fn pool_exhausted_carries_retry_after() {
        let err = BuntimeError::PoolExhausted {
            app: "a".into(),
            version: "1.0.0".into(),
            retry_after_secs: 3,
        };
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.headers().get("retry-after").unwrap(), "3");
    }

    #[tokio::test]
    async fn worker_timeout_maps_to_504() {
        let (status, _) = parts(BuntimeError::WorkerTimeout {
            app: "a".into(),
            version: "1.0.0".into(),
        })
        .await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn production_mode_strips_detail() {
        set_production_mode(true);
        let (_, body) = parts(BuntimeError::AppUnavailable {
            app: "a".into(),
            version: "1.0.0".into(),
            reason: "/secret/path/leaked".into(),
        })
        .await;
        set_production_mode(false);
        assert!(!body["message"].as_str().unwrap().contains("secret"));
    }
}
