//! Environment-driven runtime configuration (spec §4.6, §6).
//!
//! Mirrors `r2e_core::config::R2eConfig`'s error taxonomy and "fall back to
//! default with a warning for non-fatal mis-values" convention, but the
//! source of truth here is environment variables only — no YAML profile
//! files, since the runtime itself is the thing being configured, not an
//! app hosted by it.

use std::path::{Path, PathBuf};

/// Error type for configuration operations, mirroring
/// `r2e_core::config::ConfigError`.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// A required key was not set.
    NotFound(String),
    /// A key was set but could not be parsed to the expected type.
    TypeMismatch { key: String, expected: &'static str },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound(key) => write!(f, "missing required config: {key}"),
            ConfigError::TypeMismatch { key, expected } => {
                write!(f, "config '{key}' is not a valid {expected}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Runtime-wide configuration, loaded once at startup (spec §6).
#[derive(Debug, Clone)]
pub struct BuntimeConfig {
    /// PATH-style search list for app directories (`RUNTIME_WORKER_DIRS`).
    pub worker_dirs: Vec<PathBuf>,
    /// PATH-style search list for plugin directories (`RUNTIME_PLUGIN_DIRS`).
    pub plugin_dirs: Vec<PathBuf>,
    /// Hard cap on total live workers across all lanes (`RUNTIME_POOL_SIZE`).
    pub pool_size: usize,
    /// TCP port the front door listens on (`PORT`).
    pub port: u16,
    /// Whether this is a production deployment (`BUNTIME_ENV == "production"`).
    pub production: bool,
    /// Artificial per-request delay, for local testing (`DELAY_MS`).
    pub delay_ms: u64,
}

impl Default for BuntimeConfig {
    fn default() -> Self {
        Self {
            worker_dirs: Vec::new(),
            plugin_dirs: Vec::new(),
            pool_size: 16,
            port: 3000,
            production: false,
            delay_ms: 0,
        }
    }
}

impl BuntimeConfig {
    /// Load configuration from the process environment.
    ///
    /// `base_dir` is the directory relative path entries in
    /// `RUNTIME_WORKER_DIRS`/`RUNTIME_PLUGIN_DIRS` are resolved against
    /// (current working directory in production; overridable in tests).
    pub fn from_env(base_dir: &Path) -> Result<Self, ConfigError> {
        let worker_dirs = required_path_list("RUNTIME_WORKER_DIRS", base_dir)?;

        let plugin_dirs = std::env::var("RUNTIME_PLUGIN_DIRS")
            .map(|raw| split_path_list(&raw, base_dir))
            .unwrap_or_default();

        let pool_size = parse_or_default("RUNTIME_POOL_SIZE", 16usize);
        let port = parse_or_default("PORT", 3000u16);
        let delay_ms = parse_or_default("DELAY_MS", 0u64);
        let production = std::env::var("BUNTIME_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        Ok(Self {
            worker_dirs,
            plugin_dirs,
            pool_size,
            port,
            production,
            delay_ms,
        })
    }

    /// Build a config directly (useful for testing), bypassing the environment.
    pub fn for_test(worker_dirs: Vec<PathBuf>) -> Self {
        Self {
            worker_dirs,
            ..Default::default()
        }
    }
}

/// Split a PATH-style colon-separated list, resolving relative entries
/// against `base_dir`.
fn split_path_list(raw: &str, base_dir: &Path) -> Vec<PathBuf> {
    raw.split(':')
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let path = Path::new(entry);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                base_dir.join(path)
            }
        })
        .collect()
}

fn required_path_list(key: &str, base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let raw = std::env::var(key).map_err(|_| ConfigError::NotFound(key.to_string()))?;
    let dirs = split_path_list(&raw, base_dir);
    if dirs.is_empty() {
        return Err(ConfigError::NotFound(key.to_string()));
    }
    Ok(dirs)
}

/// Parse an env var, falling back to `default` with a warning on a
/// non-fatal mis-value (present but unparsable) rather than failing load.
fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "invalid config value, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn missing_worker_dirs_is_fatal() {
        std::env::remove_var("RUNTIME_WORKER_DIRS");
        let err = BuntimeConfig::from_env(Path::new("/tmp")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(k) if k == "RUNTIME_WORKER_DIRS"));
    }

    #[test]
    #[serial]
    fn relative_dirs_resolve_against_base() {
        std::env::set_var("RUNTIME_WORKER_DIRS", "apps:../more-apps");
        std::env::remove_var("RUNTIME_PLUGIN_DIRS");
        let cfg = BuntimeConfig::from_env(Path::new("/srv/buntime")).unwrap();
        assert_eq!(cfg.worker_dirs[0], PathBuf::from("/srv/buntime/apps"));
        assert_eq!(cfg.worker_dirs[1], PathBuf::from("/srv/buntime/../more-apps"));
        std::env::remove_var("RUNTIME_WORKER_DIRS");
    }

    #[test]
    #[serial]
    fn invalid_pool_size_falls_back_with_warning() {
        std::env::set_var("RUNTIME_WORKER_DIRS", "apps");
        std::env::set_var("RUNTIME_POOL_SIZE", "not-a-number");
        let cfg = BuntimeConfig::from_env(Path::new("/srv")).unwrap();
        assert_eq!(cfg.pool_size, 16);
        std::env::remove_var("RUNTIME_WORKER_DIRS");
        std::env::remove_var("RUNTIME_POOL_SIZE");
    }

    #[test]
    #[serial]
    fn production_env_is_case_insensitive() {
        std::env::set_var("RUNTIME_WORKER_DIRS", "apps");
        std::env::set_var("BUNTIME_ENV", "Production");
        let cfg = BuntimeConfig::from_env(Path::new("/srv")).unwrap();
        assert!(cfg.production);
        std::env::remove_var("RUNTIME_WORKER_DIRS");
        std::env::remove_var("BUNTIME_ENV");
    }
}
