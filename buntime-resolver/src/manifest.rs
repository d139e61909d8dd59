//! Per-app worker configuration, loaded once per worker creation from
//! `<abs_dir>/manifest.json` (spec §3, §4.3.2).

use std::path::Path;

use serde::Deserialize;

/// Worker configuration for one installed app version. Immutable once
/// loaded; exclusively owned by the worker it was loaded for.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// Relative path, from the app's version directory, to the process
    /// entrypoint.
    pub entrypoint: String,
    /// Per-request timeout, in milliseconds.
    pub timeout_ms: u64,
    /// Worker lifetime cap, in milliseconds. `0` means ephemeral: the
    /// worker is torn down immediately after each request.
    pub ttl_ms: u64,
    /// Idle-since-last-request cap, in milliseconds, before retirement.
    pub idle_timeout_ms: u64,
    /// Requests served before retirement. `0` means unbounded.
    pub max_requests: u64,
    /// Whether a missing installed version should trigger an on-demand
    /// install rather than a 404.
    pub auto_install: bool,
    /// Hint that this app should be scheduled with a smaller memory
    /// footprint budget in mind. Advisory only; enforced above this crate.
    pub low_memory: bool,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    entrypoint: String,
    #[serde(default = "default_timeout_ms")]
    timeout_ms: u64,
    #[serde(default)]
    ttl_ms: u64,
    #[serde(default)]
    idle_timeout_ms: Option<u64>,
    #[serde(default)]
    max_requests: u64,
    #[serde(default)]
    auto_install: bool,
    #[serde(default)]
    low_memory: bool,
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Errors loading or validating a worker manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    Missing,
    Unreadable(String),
    Malformed(String),
    /// `timeout_ms == 0`: a worker that never times out is rejected outright.
    ZeroTimeout,
    /// `ttl_ms > 0 && ttl_ms < timeout_ms`: a worker could be retired by TTL
    /// before a single request could ever complete.
    TtlShorterThanTimeout { ttl_ms: u64, timeout_ms: u64 },
    /// `idle_timeout_ms < timeout_ms`: idle retirement could fire before the
    /// in-flight request it's supposedly idle-during finishes.
    IdleTimeoutShorterThanTimeout { idle_timeout_ms: u64, timeout_ms: u64 },
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestError::Missing => write!(f, "manifest.json is missing"),
            ManifestError::Unreadable(e) => write!(f, "manifest.json unreadable: {e}"),
            ManifestError::Malformed(e) => write!(f, "manifest.json malformed: {e}"),
            ManifestError::ZeroTimeout => write!(f, "timeout_ms must be greater than zero"),
            ManifestError::TtlShorterThanTimeout { ttl_ms, timeout_ms } => write!(
                f,
                "ttl_ms ({ttl_ms}) must be at least timeout_ms ({timeout_ms}) when nonzero"
            ),
            ManifestError::IdleTimeoutShorterThanTimeout { idle_timeout_ms, timeout_ms } => write!(
                f,
                "idle_timeout_ms ({idle_timeout_ms}) must be at least timeout_ms ({timeout_ms})"
            ),
        }
    }
}

impl std::error::Error for ManifestError {}

/// Load and validate the worker config for the app version at `abs_dir`.
///
/// `idle_timeout_ms > ttl_ms` is not an error: it is clamped down to
/// `ttl_ms` with a warning, since a worker can never sit idle longer than
/// its own lifetime permits.
pub fn load_worker_config(abs_dir: &Path) -> Result<WorkerConfig, ManifestError> {
    let manifest_path = abs_dir.join("manifest.json");
    let raw = std::fs::read_to_string(&manifest_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ManifestError::Missing
        } else {
            ManifestError::Unreadable(e.to_string())
        }
    })?;
    let parsed: RawManifest =
        serde_json::from_str(&raw).map_err(|e| ManifestError::Malformed(e.to_string()))?;

    if parsed.timeout_ms == 0 {
        return Err(ManifestError::ZeroTimeout);
    }
    if parsed.ttl_ms > 0 && parsed.ttl_ms < parsed.timeout_ms {
        return Err(ManifestError::TtlShorterThanTimeout {
            ttl_ms: parsed.ttl_ms,
            timeout_ms: parsed.timeout_ms,
        });
    }

    let idle_timeout_ms = parsed.idle_timeout_ms.unwrap_or(parsed.timeout_ms);
    if idle_timeout_ms < parsed.timeout_ms {
        return Err(ManifestError::IdleTimeoutShorterThanTimeout {
            idle_timeout_ms,
            timeout_ms: parsed.timeout_ms,
        });
    }
    let idle_timeout_ms = if parsed.ttl_ms > 0 && idle_timeout_ms > parsed.ttl_ms {
        tracing::warn!(
            idle_timeout_ms,
            ttl_ms = parsed.ttl_ms,
            "idle_timeout_ms exceeds ttl_ms, clamping to ttl_ms"
        );
        parsed.ttl_ms
    } else {
        idle_timeout_ms
    };

    Ok(WorkerConfig {
        entrypoint: parsed.entrypoint,
        timeout_ms: parsed.timeout_ms,
        ttl_ms: parsed.ttl_ms,
        idle_timeout_ms,
        max_requests: parsed.max_requests,
        auto_install: parsed.auto_install,
        low_memory: parsed.low_memory,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_manifest(dir: &Path, body: &str) {
        std::fs::write(dir.join("manifest.json"), body).unwrap();
    }

    #[test]
    fn missing_manifest_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = load_worker_config(dir.path()).unwrap_err();
        assert_eq!(err, ManifestError::Missing);
    }

    #[test]
    fn minimal_manifest_gets_sane_defaults() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), r#"{"entrypoint": "server.js"}"#);
        let cfg = load_worker_config(dir.path()).unwrap();
        assert_eq!(cfg.entrypoint, "server.js");
        assert_eq!(cfg.timeout_ms, 30_000);
        assert_eq!(cfg.idle_timeout_ms, 30_000);
        assert_eq!(cfg.ttl_ms, 0);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), r#"{"entrypoint": "a.js", "timeout_ms": 0}"#);
        assert_eq!(load_worker_config(dir.path()).unwrap_err(), ManifestError::ZeroTimeout);
    }

    #[test]
    fn ttl_shorter_than_timeout_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            r#"{"entrypoint": "a.js", "timeout_ms": 5000, "ttl_ms": 1000}"#,
        );
        let err = load_worker_config(dir.path()).unwrap_err();
        assert_eq!(err, ManifestError::TtlShorterThanTimeout { ttl_ms: 1000, timeout_ms: 5000 });
    }

    #[test]
    fn ephemeral_ttl_zero_bypasses_ttl_timeout_check() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            r#"{"entrypoint": "a.js", "timeout_ms": 5000, "ttl_ms": 0}"#,
        );
        let cfg = load_worker_config(dir.path()).unwrap();
        assert_eq!(cfg.ttl_ms, 0);
    }

    #[test]
    fn idle_timeout_shorter_than_timeout_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            r#"{"entrypoint": "a.js", "timeout_ms": 5000, "idle_timeout_ms": 1000}"#,
        );
        let err = load_worker_config(dir.path()).unwrap_err();
        assert_eq!(
            err,
            ManifestError::IdleTimeoutShorterThanTimeout { idle_timeout_ms: 1000, timeout_ms: 5000 }
        );
    }

    #[test]
    fn idle_timeout_longer_than_ttl_is_clamped() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            r#"{"entrypoint": "a.js", "timeout_ms": 1000, "ttl_ms": 5000, "idle_timeout_ms": 9000}"#,
        );
        let cfg = load_worker_config(dir.path()).unwrap();
        assert_eq!(cfg.idle_timeout_ms, 5000);
    }

    #[test]
    fn malformed_json_is_reported() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), "not json");
        assert!(matches!(load_worker_config(dir.path()), Err(ManifestError::Malformed(_))));
    }
}
