//! App resolution and the directory-backed install registry (spec §4.1, §6).
//!
//! An "app" on disk is a directory tree rooted at one of
//! [`buntime_core::BuntimeConfig::worker_dirs`]:
//!
//! ```text
//! <workerDir>/<appName>/<semver>/manifest.json
//! <workerDir>/<appName>/<semver>/...entrypoint and app files...
//! ```
//!
//! [`resolve`] is a pure function over that layout: URL prefix in, absolute
//! directory out. Nothing here talks to a worker or the network.

mod install;
mod manifest;
mod resolve;

pub use install::{install, uninstall, InstallError};
pub use manifest::{load_worker_config, ManifestError, WorkerConfig};
pub use resolve::{resolve, ResolveError, ResolvedApp};
