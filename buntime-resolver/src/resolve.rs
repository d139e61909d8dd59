//! Pure `app[@range]` resolution against an on-disk directory layout
//! (spec §4.1).

use std::path::{Path, PathBuf};

use semver::{Version, VersionReq};

/// A resolved app: a concrete, on-disk version of a named app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedApp {
    pub name: String,
    pub version: String,
    pub abs_dir: PathBuf,
}

/// Why resolution failed. Both variants are surfaced to callers as
/// `BuntimeError::AppNotFound` — kept separate here so the dispatcher can
/// log which kind of miss it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No directory for this app name exists under any search path.
    UnknownApp,
    /// The app exists, but no installed version satisfies the range.
    NoMatchingVersion,
    /// The URL prefix was not a well-formed `name[@range]` token.
    MalformedRequest,
}

/// Resolve a URL path's leading `/app[@range]/...` segment to a concrete,
/// on-disk version.
///
/// `search_dirs` is searched in order (PATH semantics): the first directory
/// that contains a subdirectory named `name` wins, even if none of its
/// versions satisfy `range` — later search dirs are not consulted as a
/// fallback for a name that exists but has no matching version.
pub fn resolve(search_dirs: &[PathBuf], url_path: &str) -> Result<ResolvedApp, ResolveError> {
    let first_segment = url_path.trim_start_matches('/').split('/').next().unwrap_or("");
    if first_segment.is_empty() {
        return Err(ResolveError::MalformedRequest);
    }

    let (name, range) = match first_segment.split_once('@') {
        Some((n, r)) => (n, Some(r)),
        None => (first_segment, None),
    };
    if name.is_empty() || !is_valid_app_name(name) {
        return Err(ResolveError::MalformedRequest);
    }

    let app_dir = search_dirs
        .iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_dir())
        .ok_or(ResolveError::UnknownApp)?;

    let candidates = installed_versions(&app_dir);
    let range = range.map(VersionRange::parse).transpose()?;
    let chosen = pick(&candidates, range.as_ref()).ok_or(ResolveError::NoMatchingVersion)?;

    Ok(ResolvedApp {
        name: name.to_string(),
        version: chosen.to_string(),
        abs_dir: app_dir.join(chosen.to_string()),
    })
}

fn is_valid_app_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Every immediately-installed version of an app: each subdirectory of
/// `app_dir` whose name parses as a valid semver version. Non-version
/// directories (stray files, `.tmp` install-in-progress dirs) are skipped.
fn installed_versions(app_dir: &Path) -> Vec<Version> {
    let Ok(entries) = std::fs::read_dir(app_dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().and_then(|s| Version::parse(s).ok()))
        .collect()
}

/// A parsed `@range` token, per the operators the spec calls out: exact,
/// bare major, bare major.minor, and standard `^`/`~`/`>=` ranges.
enum VersionRange {
    Exact(Version),
    Req(VersionReq),
}

impl VersionRange {
    fn parse(raw: &str) -> Result<Self, ResolveError> {
        if let Ok(exact) = Version::parse(raw) {
            return Ok(VersionRange::Exact(exact));
        }
        let normalized = if is_bare_numeric_prefix(raw) {
            format!("^{raw}")
        } else {
            raw.to_string()
        };
        VersionReq::parse(&normalized)
            .map(VersionRange::Req)
            .map_err(|_| ResolveError::MalformedRequest)
    }
}

/// `"9"` or `"1.5"`: digits and at most one dot, no operator prefix. These
/// are shorthand for `^9`/`^1.5` rather than literal exact versions (an
/// exact version needs all three components).
fn is_bare_numeric_prefix(raw: &str) -> bool {
    let mut dots = 0;
    for c in raw.chars() {
        if c == '.' {
            dots += 1;
            if dots > 1 {
                return false;
            }
        } else if !c.is_ascii_digit() {
            return false;
        }
    }
    dots <= 1 && !raw.is_empty()
}

/// Does `version` satisfy `req`, treating pre-releases as eligible
/// candidates rather than excluding them the way [`VersionReq::matches`]
/// does by default? We test the requirement against the version's
/// numeric triple only; pre-release ordering is handled separately by
/// [`pick`]'s tie-break.
fn satisfies(version: &Version, req: &VersionReq) -> bool {
    let mut stripped = version.clone();
    stripped.pre = semver::Prerelease::EMPTY;
    req.matches(&stripped)
}

/// Pick the version to serve, per spec §4.1 tie-break rules: exact beats
/// any range; among range matches, pick the highest by standard semver
/// precedence (pre-release versions are ordered below their release);
/// when no range was given, prefer the highest stable version, falling
/// back to the highest pre-release only if no stable version exists.
fn pick(candidates: &[Version], range: Option<&VersionRange>) -> Option<Version> {
    match range {
        Some(VersionRange::Exact(want)) => candidates.iter().find(|v| *v == want).cloned(),
        Some(VersionRange::Req(req)) => candidates
            .iter()
            .filter(|v| satisfies(v, req))
            .max()
            .cloned(),
        None => {
            let stable = candidates.iter().filter(|v| v.pre.is_empty()).max();
            stable.or_else(|| candidates.iter().max()).cloned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout(versions: &[&str]) -> (TempDir, Vec<PathBuf>) {
        let root = TempDir::new().unwrap();
        let app_dir = root.path().join("hello");
        for v in versions {
            std::fs::create_dir_all(app_dir.join(v)).unwrap();
        }
        let search_dirs = vec![root.path().to_path_buf()];
        (root, search_dirs)
    }

    #[test]
    fn exact_version_resolves() {
        let (_root, dirs) = layout(&["1.0.0", "1.5.3", "2.0.0"]);
        let resolved = resolve(&dirs, "/hello@1.5.3").unwrap();
        assert_eq!(resolved.version, "1.5.3");
    }

    #[test]
    fn bare_major_resolves_to_highest_matching_minor_patch() {
        let (_root, dirs) = layout(&["1.0.0", "1.5.3", "2.0.0"]);
        let resolved = resolve(&dirs, "/hello@1").unwrap();
        assert_eq!(resolved.version, "1.5.3");
    }

    #[test]
    fn bare_minor_resolves() {
        let (_root, dirs) = layout(&["1.4.0", "1.5.3", "1.5.9", "2.0.0"]);
        let resolved = resolve(&dirs, "/hello@1.5").unwrap();
        assert_eq!(resolved.version, "1.5.9");
    }

    #[test]
    fn absent_range_picks_highest_stable() {
        let (_root, dirs) = layout(&["1.0.0", "2.0.0", "2.1.0-beta.1"]);
        let resolved = resolve(&dirs, "/hello").unwrap();
        assert_eq!(resolved.version, "2.0.0");
    }

    #[test]
    fn absent_range_falls_back_to_prerelease_if_no_stable() {
        let (_root, dirs) = layout(&["1.0.0-alpha.1", "1.0.0-beta.1"]);
        let resolved = resolve(&dirs, "/hello").unwrap();
        assert_eq!(resolved.version, "1.0.0-beta.1");
    }

    #[test]
    fn unknown_app_name_is_not_found() {
        let (_root, dirs) = layout(&["1.0.0"]);
        let err = resolve(&dirs, "/goodbye").unwrap_err();
        assert_eq!(err, ResolveError::UnknownApp);
    }

    #[test]
    fn known_app_no_matching_version() {
        let (_root, dirs) = layout(&["1.0.0"]);
        let err = resolve(&dirs, "/hello@9").unwrap_err();
        assert_eq!(err, ResolveError::NoMatchingVersion);
    }

    #[test]
    fn caret_and_tilde_operators_are_honored() {
        let (_root, dirs) = layout(&["1.2.3", "1.3.0", "2.0.0"]);
        assert_eq!(resolve(&dirs, "/hello@^1.2.0").unwrap().version, "1.3.0");
        assert_eq!(resolve(&dirs, "/hello@~1.2.0").unwrap().version, "1.2.3");
    }

    #[test]
    fn gte_operator_is_honored() {
        let (_root, dirs) = layout(&["1.0.0", "1.5.0", "2.0.0"]);
        assert_eq!(resolve(&dirs, "/hello@>=1.5.0").unwrap().version, "2.0.0");
    }

    #[test]
    fn non_version_directories_are_ignored() {
        let (root, dirs) = layout(&["1.0.0"]);
        std::fs::create_dir_all(root.path().join("hello").join("install.tmp.abc")).unwrap();
        let resolved = resolve(&dirs, "/hello").unwrap();
        assert_eq!(resolved.version, "1.0.0");
    }

    #[test]
    fn first_search_dir_with_matching_name_wins_even_without_matching_version() {
        let root_a = TempDir::new().unwrap();
        let root_b = TempDir::new().unwrap();
        std::fs::create_dir_all(root_a.path().join("hello").join("1.0.0")).unwrap();
        std::fs::create_dir_all(root_b.path().join("hello").join("9.0.0")).unwrap();
        let dirs = vec![root_a.path().to_path_buf(), root_b.path().to_path_buf()];
        let err = resolve(&dirs, "/hello@9").unwrap_err();
        assert_eq!(err, ResolveError::NoMatchingVersion);
    }
}
