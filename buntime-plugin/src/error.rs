//! Plugin load and lifecycle errors (spec §4.5).

/// Failures that can occur loading or running the plugin set. Distinct from
/// [`buntime_core::BuntimeError`]: these are startup-time configuration
/// errors, surfaced to the supervisor rather than to an HTTP client.
#[derive(Debug, Clone)]
pub enum PluginError {
    /// `onInit` failed for the named plugin; startup aborts.
    InitFailed { plugin: String, reason: String },
    /// A plugin declared a dependency that no loaded plugin provides.
    MissingDependency { plugin: String, dependency: String },
    /// A plugin declared a dependency on one that initializes after it.
    DependencyOrderViolation { plugin: String, dependency: String },
    /// Two plugins claimed the same `base` path.
    DuplicateBase { a: String, b: String, base: String },
    /// A plugin's `base` exactly matches a registered app's first path
    /// segment; refused rather than silently letting the plugin shadow it.
    AppBaseCollision { plugin: String, app: String },
    /// More than one plugin claimed the WebSocket upgrade handler.
    MultipleWebsocketClaimants { plugins: Vec<String> },
    /// Two plugins (or a plugin and itself) registered the same service name.
    DuplicateService { name: String },
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginError::InitFailed { plugin, reason } => {
                write!(f, "plugin '{plugin}' failed onInit: {reason}")
            }
            PluginError::MissingDependency { plugin, dependency } => {
                write!(f, "plugin '{plugin}' depends on unknown plugin '{dependency}'")
            }
            PluginError::DependencyOrderViolation { plugin, dependency } => write!(
                f,
                "plugin '{plugin}' depends on '{dependency}', which initializes after it (lower priority)"
            ),
            PluginError::DuplicateBase { a, b, base } => {
                write!(f, "plugins '{a}' and '{b}' both claim base path '{base}'")
            }
            PluginError::AppBaseCollision { plugin, app } => {
                write!(f, "plugin '{plugin}' base path exactly collides with app '{app}'")
            }
            PluginError::MultipleWebsocketClaimants { plugins } => {
                write!(f, "multiple plugins claim the websocket upgrade handler: {}", plugins.join(", "))
            }
            PluginError::DuplicateService { name } => {
                write!(f, "service '{name}' is already registered")
            }
        }
    }
}

impl std::error::Error for PluginError {}
