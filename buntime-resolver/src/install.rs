//! Atomic install/uninstall for the directory-backed app and plugin
//! registry (spec §6): extract to a temp directory, validate the package
//! manifest, then rename into place.

use std::fs::File;
use std::path::{Path, PathBuf};

use buntime_core::AppIdent;
use serde::Deserialize;

/// Errors from installing or removing a package.
#[derive(Debug)]
pub enum InstallError {
    Io(std::io::Error),
    UnsupportedArchiveFormat(PathBuf),
    ArchiveCorrupt(String),
    InvalidManifest(String),
    AlreadyInstalled { name: String, version: String },
    NotInstalled { name: String, version: String },
}

impl std::fmt::Display for InstallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallError::Io(e) => write!(f, "io error: {e}"),
            InstallError::UnsupportedArchiveFormat(p) => {
                write!(f, "unsupported archive format: {}", p.display())
            }
            InstallError::ArchiveCorrupt(e) => write!(f, "archive corrupt: {e}"),
            InstallError::InvalidManifest(e) => write!(f, "invalid manifest: {e}"),
            InstallError::AlreadyInstalled { name, version } => {
                write!(f, "'{name}@{version}' is already installed")
            }
            InstallError::NotInstalled { name, version } => {
                write!(f, "'{name}@{version}' is not installed")
            }
        }
    }
}

impl std::error::Error for InstallError {}

impl From<std::io::Error> for InstallError {
    fn from(e: std::io::Error) -> Self {
        InstallError::Io(e)
    }
}

#[derive(Debug, Deserialize)]
struct PackageManifest {
    name: String,
    version: String,
}

/// Install a `.tar.gz`/`.tgz` or `.zip` package under `registry_root`,
/// laying it out at `registry_root/<name>/<version>/...`.
///
/// Extraction happens into a sibling temp directory first; the final
/// `rename` is the only state-visible step, so a crash mid-extract never
/// leaves a half-written version directory behind.
pub fn install(archive_path: &Path, registry_root: &Path) -> Result<AppIdent, InstallError> {
    std::fs::create_dir_all(registry_root)?;
    let staging = tempfile::Builder::new()
        .prefix(".install-")
        .tempdir_in(registry_root)?;

    extract(archive_path, staging.path())?;

    let manifest_raw = std::fs::read_to_string(staging.path().join("manifest.json"))
        .map_err(|e| InstallError::InvalidManifest(format!("manifest.json: {e}")))?;
    let manifest: PackageManifest = serde_json::from_str(&manifest_raw)
        .map_err(|e| InstallError::InvalidManifest(e.to_string()))?;
    if manifest.name.is_empty() {
        return Err(InstallError::InvalidManifest("'name' must not be empty".into()));
    }
    semver::Version::parse(&manifest.version)
        .map_err(|e| InstallError::InvalidManifest(format!("'version': {e}")))?;

    let app_dir = registry_root.join(&manifest.name);
    std::fs::create_dir_all(&app_dir)?;
    let final_dir = app_dir.join(&manifest.version);
    if final_dir.exists() {
        return Err(InstallError::AlreadyInstalled {
            name: manifest.name,
            version: manifest.version,
        });
    }

    // `into_path` disarms the TempDir's drop-cleanup; ownership passes to
    // `final_dir` via rename.
    std::fs::rename(staging.into_path(), &final_dir)?;

    Ok(AppIdent::new(manifest.name, manifest.version))
}

/// Remove an installed version. If it was the last installed version of
/// the app, the now-empty app directory is removed too.
pub fn uninstall(registry_root: &Path, name: &str, version: &str) -> Result<(), InstallError> {
    let app_dir = registry_root.join(name);
    let version_dir = app_dir.join(version);
    if !version_dir.is_dir() {
        return Err(InstallError::NotInstalled {
            name: name.to_string(),
            version: version.to_string(),
        });
    }
    std::fs::remove_dir_all(&version_dir)?;

    let remaining = std::fs::read_dir(&app_dir).map(|mut d| d.next().is_none()).unwrap_or(false);
    if remaining {
        let _ = std::fs::remove_dir(&app_dir);
    }
    Ok(())
}

fn extract(archive_path: &Path, dest: &Path) -> Result<(), InstallError> {
    let ext = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    if ext.ends_with(".tar.gz") || ext.ends_with(".tgz") {
        let file = File::open(archive_path)?;
        let gz = flate2::read::GzDecoder::new(file);
        let mut archive = tar::Archive::new(gz);
        archive
            .unpack(dest)
            .map_err(|e| InstallError::ArchiveCorrupt(e.to_string()))?;
        Ok(())
    } else if ext.ends_with(".zip") {
        let file = File::open(archive_path)?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| InstallError::ArchiveCorrupt(e.to_string()))?;
        archive
            .extract(dest)
            .map_err(|e| InstallError::ArchiveCorrupt(e.to_string()))?;
        Ok(())
    } else {
        Err(InstallError::UnsupportedArchiveFormat(archive_path.to_path_buf()))
    }
}
