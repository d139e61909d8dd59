//! The plugin trait and its lifecycle hook arguments (spec §4.5, §9
//! "model as ... a trait/interface with default no-op implementations").

use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Response;
use http::{HeaderMap, Method, Uri};

use crate::error::PluginError;
use crate::service::ServiceRegistry;

/// Handed to every plugin's `onInit`. Carries the one piece of shared,
/// mutable-during-init state: the named service table.
pub struct PluginContext {
    pub services: Arc<ServiceRegistry>,
}

/// A per-request view passed to `onRequest`: enough for a hook to inspect
/// the request and rewrite its headers, without owning the body.
pub struct PluginRequest<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a mut HeaderMap,
    /// The resolved app name, if routing precedence already matched one
    /// (spec §4.4 step 2 runs before the `onRequest` chain).
    pub app: Option<&'a str>,
}

/// In-process extension contributing routes, request/response hooks, or
/// named services (spec glossary "Plugin"). The closed hook set —
/// `onInit`/`onServerStart`/`onRequest`/`onResponse`/`onShutdown` — is
/// fixed; every hook has a no-op default so a plugin implements only what
/// it needs.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable name, used for dependency references, diagnostics, and the
    /// admin `list plugins` endpoint.
    fn name(&self) -> &str;

    /// Load-order priority, ascending. Lower values initialize first and
    /// run `onRequest` first; `onResponse` and `onShutdown` run in the
    /// reverse order.
    fn priority(&self) -> i32 {
        0
    }

    /// URL prefix this plugin's routes are mounted under, if any.
    fn base(&self) -> Option<&str> {
        None
    }

    /// Names of other plugins that must initialize before this one.
    fn dependencies(&self) -> &[String] {
        &[]
    }

    /// Whether this plugin claims the WebSocket upgrade handler. At most
    /// one loaded plugin may return `true`.
    fn claims_websocket(&self) -> bool {
        false
    }

    /// Routes to mount under [`Plugin::base`]. `None` if this plugin
    /// contributes no routes of its own.
    fn routes(&self) -> Option<axum::Router> {
        None
    }

    /// Run once, serially in priority order, before the server starts
    /// listening. A failure here aborts startup.
    async fn on_init(&self, _ctx: &PluginContext) -> Result<(), String> {
        Ok(())
    }

    /// Run once, after the listener is bound.
    async fn on_server_start(&self, _addr: std::net::SocketAddr) {}

    /// Run per-request, serially in priority order, before worker
    /// acquisition. Returning `Some(response)` short-circuits the
    /// dispatcher's pipeline; the first hook to do so wins.
    async fn on_request(&self, _req: &mut PluginRequest<'_>) -> Option<Response> {
        None
    }

    /// Run per-request, serially in reverse priority order, once the full
    /// response is available. May observe or decorate the response but
    /// must not break streaming.
    async fn on_response(&self, _resp: &mut Response) {}

    /// Run once, in reverse priority order, during shutdown. Bounded by a
    /// per-hook deadline; a failure is logged and does not block other
    /// hooks.
    async fn on_shutdown(&self) {}
}

pub(crate) fn init_failed(plugin: &str, reason: impl std::fmt::Display) -> PluginError {
    PluginError::InitFailed { plugin: plugin.to_string(), reason: reason.to_string() }
}
