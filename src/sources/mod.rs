//! Per-stage package producers
//!
//! # Modules
//!
//! - [`fetch`]: HTTP index pages for image mirrors
//! - [`mirror`]: Installer images (`mirrorcache`)
//! - [`obs`]: Build service projects and their submit requests (`obsproject`)
//! - [`gitea`]: Package source mirrors and their pull requests (`giteaproject`)

pub mod fetch;
pub mod gitea;
pub mod mirror;
pub mod obs;

use std::collections::HashMap;

use chrono::{Days, NaiveDate};

use crate::cache::CacheLayout;
use crate::command::CommandRunner;
use crate::config::{AppConfig, RECENT_WINDOW_DAYS};
use crate::package::Package;
use crate::package::version::{parse_key_values, source_package};

pub use fetch::{HttpIndexFetcher, IndexFetcher};
pub use gitea::PullRequest;
pub use obs::ObsRequest;

/// Everything a producer needs besides its own stage settings
pub struct StageContext<'a> {
    pub config: &'a AppConfig,
    pub layout: &'a CacheLayout,
    pub runner: &'a dyn CommandRunner,
    pub fetcher: &'a dyn IndexFetcher,
    /// Bypass cached command output and index snapshots
    pub no_cache: bool,
    /// Restrict change requests to the recent window
    pub recent: bool,
    pub today: NaiveDate,
}

impl StageContext<'_> {
    /// First day still inside the `--recent` window
    pub fn recent_cutoff(&self) -> NaiveDate {
        recent_cutoff(self.today)
    }
}

/// What one stage contributed to the report
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutcome {
    /// Image the packages were read from (image mirrors only)
    pub image_url: Option<String>,
    pub packages: Vec<Package>,
    pub requests: Vec<ObsRequest>,
    pub pull_requests: Vec<PullRequest>,
}

pub fn recent_cutoff(today: NaiveDate) -> NaiveDate {
    today
        .checked_sub_days(Days::new(RECENT_WINDOW_DAYS as u64))
        .unwrap_or(NaiveDate::MIN)
}

/// Returns true if the ISO-8601 `timestamp` falls on or after `cutoff`
///
/// Timestamps without a readable date are kept.
pub fn is_recent(timestamp: &str, cutoff: NaiveDate) -> bool {
    timestamp
        .get(..10)
        .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        .is_none_or(|date| date >= cutoff)
}

/// Trimmed, non-empty lines of command output
fn non_empty_lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(str::trim).filter(|line| !line.is_empty())
}

/// Builds one source package per descriptor basename
///
/// `summary` is the content of the shared summary file, `descriptors` maps
/// basenames to the content of their descriptor files. Basenames without a
/// descriptor fall back to the shared version.
fn packages_from_descriptors(
    basenames: &[String],
    summary: Option<&str>,
    descriptors: &HashMap<&str, String>,
) -> Vec<Package> {
    let shared = summary
        .map(|content| parse_key_values(content).version)
        .unwrap_or_default();

    basenames
        .iter()
        .filter_map(|basename| {
            let specific = descriptors
                .get(basename.as_str())
                .map(|content| parse_key_values(content));
            source_package(basename, &shared, specific.as_ref())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn recent_cutoff_is_two_weeks_back() {
        assert_eq!(recent_cutoff(date("2026-02-20")), date("2026-02-06"));
    }

    #[rstest]
    #[case("2026-02-06T00:00:00Z", true)]
    #[case("2026-02-19T09:27:06Z", true)]
    #[case("2026-02-05T23:59:59Z", false)]
    #[case("", true)]
    #[case("yesterday", true)]
    fn is_recent_compares_dates(#[case] timestamp: &str, #[case] expected: bool) {
        assert_eq!(is_recent(timestamp, date("2026-02-06")), expected);
    }

    #[test]
    fn packages_from_descriptors_applies_precedence_per_basename() {
        let basenames = vec![
            "rubygem-agama-yast".to_string(),
            "agama-yast".to_string(),
            "agama-missing".to_string(),
        ];
        let summary = "name: agama\nversion: 19.pre+1452.65cb39696\nmtime: 1760000000\n";
        let descriptors = HashMap::from([
            ("rubygem-agama-yast", "Version: 0\nRelease: 0\n".to_string()),
            ("agama-yast", "Name: agama-yast\nVersion: 18.1\nRelease: 2.1\n".to_string()),
        ]);

        let packages = packages_from_descriptors(&basenames, Some(summary), &descriptors);

        assert_eq!(
            packages,
            vec![
                Package::new("rubygem-agama-yast", "19.pre+1452.65cb39696", "0", "src"),
                Package::new("agama-yast", "18.1", "2.1", "src"),
                Package::new("agama-missing", "19.pre+1452.65cb39696", "0", "src"),
            ]
        );
    }

    #[test]
    fn packages_from_descriptors_drops_versionless_packages() {
        let basenames = vec!["agama".to_string()];
        let descriptors = HashMap::from([("agama", "Summary: no version here\n".to_string())]);

        assert!(packages_from_descriptors(&basenames, None, &descriptors).is_empty());
    }
}
