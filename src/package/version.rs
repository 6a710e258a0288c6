//! Version extraction from package descriptors
//!
//! Source packages carry their version in two places: an optional summary
//! file (`*.obsinfo`, shared by every descriptor of the package) and one
//! descriptor per binary family (`*.spec`). Both are flat `key: value` text.

use crate::package::{Package, SOURCE_ARCH};

/// Placeholder version written into descriptors whose real version is
/// supplied by the summary file
pub const SENTINEL_VERSION: &str = "0";

/// Release used when only the shared version is known
const SHARED_RELEASE: &str = "0";

const SUMMARY_SUFFIX: &str = ".obsinfo";
const DESCRIPTOR_SUFFIX: &str = ".spec";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionRelease {
    pub version: String,
    pub release: String,
}

impl VersionRelease {
    pub fn new(version: &str, release: &str) -> Self {
        Self {
            version: version.to_string(),
            release: release.to_string(),
        }
    }
}

/// Extracts the `version` and `release` values from `key: value` text
///
/// Keys are compared case-insensitively after trimming; the first
/// occurrence of each key wins. Missing keys yield empty strings.
pub fn parse_key_values(content: &str) -> VersionRelease {
    let mut version = None;
    let mut release = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();

        if version.is_none() && key.eq_ignore_ascii_case("version") {
            version = Some(value.trim());
        } else if release.is_none() && key.eq_ignore_ascii_case("release") {
            release = Some(value.trim());
        }
    }

    VersionRelease::new(version.unwrap_or_default(), release.unwrap_or_default())
}

/// Applies the shared/specific precedence rule
///
/// - A specific version other than the sentinel wins, with its release.
/// - A sentinel specific version is used only when there is no shared version.
/// - Otherwise the shared version is used with release `"0"`.
///
/// Returns `None` when no version can be obtained at all.
pub fn resolve_version(shared: &str, specific: Option<&VersionRelease>) -> Option<VersionRelease> {
    let resolved = match specific {
        Some(s) if !s.version.is_empty() && s.version != SENTINEL_VERSION => s.clone(),
        Some(s) if s.version == SENTINEL_VERSION && shared.is_empty() => s.clone(),
        _ => VersionRelease::new(shared, SHARED_RELEASE),
    };

    (!resolved.version.is_empty()).then_some(resolved)
}

/// Builds the source package for one descriptor basename, or `None` when no
/// version is available
pub fn source_package(
    basename: &str,
    shared: &str,
    specific: Option<&VersionRelease>,
) -> Option<Package> {
    resolve_version(shared, specific).map(|resolved| Package {
        name: basename.to_string(),
        version: resolved.version,
        release: resolved.release,
        arch: SOURCE_ARCH.to_string(),
    })
}

/// Picks the summary file for `identity`: `<identity>.obsinfo` when present,
/// else the alphabetically first `*.obsinfo`
pub fn select_summary_file<'a, I>(identity: &str, files: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let preferred = format!("{identity}{SUMMARY_SUFFIX}");
    let mut candidates: Vec<&str> = files
        .into_iter()
        .filter(|file| file.ends_with(SUMMARY_SUFFIX))
        .collect();
    candidates.sort_unstable();

    candidates
        .iter()
        .find(|file| **file == preferred)
        .or_else(|| candidates.first())
        .copied()
}

pub fn descriptor_file(basename: &str) -> String {
    format!("{basename}{DESCRIPTOR_SUFFIX}")
}
