//! Plugin load order, collision checks, and lifecycle-hook fan-out
//! (spec §4.5).

use std::sync::Arc;
use std::time::Duration;

use axum::response::Response;

use crate::error::PluginError;
use crate::plugin::{init_failed, Plugin, PluginContext, PluginRequest};
use crate::service::ServiceRegistry;

/// The loaded, validated, priority-ordered plugin set. Immutable after
/// [`PluginRegistry::load`] returns (spec §5).
pub struct PluginRegistry {
    /// Sorted ascending by `priority()`.
    plugins: Vec<Box<dyn Plugin>>,
    services: Arc<ServiceRegistry>,
}

impl PluginRegistry {
    /// Sort by priority, validate dependency order / base-path uniqueness /
    /// single websocket claimant, then run every plugin's `onInit` serially
    /// in priority order. Any failure aborts before the server starts.
    pub async fn load(mut plugins: Vec<Box<dyn Plugin>>) -> Result<Self, PluginError> {
        plugins.sort_by_key(|p| p.priority());

        validate_dependencies(&plugins)?;
        validate_bases(&plugins)?;
        validate_websocket_claimants(&plugins)?;

        let services = Arc::new(ServiceRegistry::new());
        let ctx = PluginContext { services: services.clone() };
        for plugin in &plugins {
            plugin.on_init(&ctx).await.map_err(|e| init_failed(plugin.name(), e))?;
        }

        Ok(Self { plugins, services })
    }

    /// Reject a plugin `base` that exactly matches a registered app's name
    /// (spec §4.5: "detect and reject collisions with any registered app's
    /// first path segment ... if the collision is exact").
    pub fn check_app_collisions(&self, app_names: &[String]) -> Result<(), PluginError> {
        for plugin in &self.plugins {
            if let Some(base) = plugin.base() {
                let base = base.trim_start_matches('/');
                if let Some(app) = app_names.iter().find(|a| a.as_str() == base) {
                    return Err(PluginError::AppBaseCollision {
                        plugin: plugin.name().to_string(),
                        app: app.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Merge every plugin's routes under its declared `base`.
    pub fn routes(&self) -> axum::Router {
        let mut router = axum::Router::new();
        for plugin in &self.plugins {
            if let (Some(base), Some(plugin_routes)) = (plugin.base(), plugin.routes()) {
                router = router.nest(base, plugin_routes);
            }
        }
        router
    }

    pub async fn on_server_start(&self, addr: std::net::SocketAddr) {
        for plugin in &self.plugins {
            plugin.on_server_start(addr).await;
        }
    }

    /// Ascending priority order; the first hook to return `Some` wins.
    pub async fn run_on_request(&self, req: &mut PluginRequest<'_>) -> Option<Response> {
        for plugin in &self.plugins {
            if let Some(response) = plugin.on_request(req).await {
                return Some(response);
            }
        }
        None
    }

    /// Descending priority order.
    pub async fn run_on_response(&self, resp: &mut Response) {
        for plugin in self.plugins.iter().rev() {
            plugin.on_response(resp).await;
        }
    }

    /// Descending priority order, each hook bounded by `per_hook_deadline`.
    /// A hook that errors or times out is logged and does not block the
    /// rest (spec §4.5: "failures are logged and do not block others").
    pub async fn shutdown(&self, per_hook_deadline: Duration) {
        for plugin in self.plugins.iter().rev() {
            if tokio::time::timeout(per_hook_deadline, plugin.on_shutdown()).await.is_err() {
                tracing::warn!(plugin = plugin.name(), "onShutdown exceeded its deadline");
            }
        }
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }
}

fn validate_dependencies(plugins: &[Box<dyn Plugin>]) -> Result<(), PluginError> {
    for (i, plugin) in plugins.iter().enumerate() {
        for dep in plugin.dependencies() {
            match plugins.iter().position(|p| p.name() == dep) {
                Some(j) if j < i => {}
                Some(_) => {
                    return Err(PluginError::DependencyOrderViolation {
                        plugin: plugin.name().to_string(),
                        dependency: dep.clone(),
                    })
                }
                None => {
                    return Err(PluginError::MissingDependency {
                        plugin: plugin.name().to_string(),
                        dependency: dep.clone(),
                    })
                }
            }
        }
    }
    Ok(())
}

fn validate_bases(plugins: &[Box<dyn Plugin>]) -> Result<(), PluginError> {
    for i in 0..plugins.len() {
        let Some(base_i) = plugins[i].base() else { continue };
        for plugin_j in &plugins[i + 1..] {
            if plugin_j.base() == Some(base_i) {
                return Err(PluginError::DuplicateBase {
                    a: plugins[i].name().to_string(),
                    b: plugin_j.name().to_string(),
                    base: base_i.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn validate_websocket_claimants(plugins: &[Box<dyn Plugin>]) -> Result<(), PluginError> {
    let claimants: Vec<String> = plugins
        .iter()
        .filter(|p| p.claims_websocket())
        .map(|p| p.name().to_string())
        .collect();
    if claimants.len() > 1 {
        return Err(PluginError::MultipleWebsocketClaimants { plugins: claimants });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Stub {
        name: &'static str,
        priority: i32,
        base: Option<&'static str>,
        dependencies: Vec<String>,
        claims_ws: bool,
        fail_init: bool,
    }

    impl Stub {
        fn new(name: &'static str, priority: i32) -> Self {
            Self { name, priority, base: None, dependencies: vec![], claims_ws: false, fail_init: false }
        }
    }

    #[async_trait]
    impl Plugin for Stub {
        fn name(&self) -> &str {
            self.name
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn base(&self) -> Option<&str> {
            self.base
        }
        fn dependencies(&self) -> &[String] {
            &self.dependencies
        }
        fn claims_websocket(&self) -> bool {
            self.claims_ws
        }
        async fn on_init(&self, _ctx: &PluginContext) -> Result<(), String> {
            if self.fail_init {
                Err("boom".into())
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn loads_and_sorts_by_priority_ascending() {
        let plugins: Vec<Box<dyn Plugin>> = vec![
            Box::new(Stub::new("b", 10)),
            Box::new(Stub::new("a", 1)),
        ];
        let registry = PluginRegistry::load(plugins).await.unwrap();
        assert_eq!(registry.names(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn init_failure_aborts_load() {
        let mut late = Stub::new("late", 5);
        late.fail_init = true;
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(late)];
        let err = PluginRegistry::load(plugins).await.unwrap_err();
        assert!(matches!(err, PluginError::InitFailed { .. }));
    }

    #[tokio::test]
    async fn missing_dependency_is_rejected() {
        let mut p = Stub::new("p", 1);
        p.dependencies = vec!["ghost".into()];
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(p)];
        let err = PluginRegistry::load(plugins).await.unwrap_err();
        assert!(matches!(err, PluginError::MissingDependency { .. }));
    }

    #[tokio::test]
    async fn dependency_initializing_later_is_rejected() {
        let mut first = Stub::new("first", 1);
        first.dependencies = vec!["second".into()];
        let second = Stub::new("second", 5);
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(first), Box::new(second)];
        let err = PluginRegistry::load(plugins).await.unwrap_err();
        assert!(matches!(err, PluginError::DependencyOrderViolation { .. }));
    }

    #[tokio::test]
    async fn duplicate_base_is_rejected() {
        let mut a = Stub::new("a", 1);
        a.base = Some("/x");
        let mut b = Stub::new("b", 2);
        b.base = Some("/x");
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(a), Box::new(b)];
        let err = PluginRegistry::load(plugins).await.unwrap_err();
        assert!(matches!(err, PluginError::DuplicateBase { .. }));
    }

    #[tokio::test]
    async fn two_websocket_claimants_is_rejected() {
        let mut a = Stub::new("a", 1);
        a.claims_ws = true;
        let mut b = Stub::new("b", 2);
        b.claims_ws = true;
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(a), Box::new(b)];
        let err = PluginRegistry::load(plugins).await.unwrap_err();
        assert!(matches!(err, PluginError::MultipleWebsocketClaimants { .. }));
    }

    #[tokio::test]
    async fn app_collision_is_exact_match_only() {
        let mut a = Stub::new("admin", 1);
        a.base = Some("hello");
        let plugins: Vec<Box<dyn Plugin>> = vec![Box::new(a)];
        let registry = PluginRegistry::load(plugins).await.unwrap();
        let err = registry.check_app_collisions(&["hello".to_string()]).unwrap_err();
        assert!(matches!(err, PluginError::AppBaseCollision { .. }));
        assert!(registry.check_app_collisions(&["other".to_string()]).is_ok());
    }
}
