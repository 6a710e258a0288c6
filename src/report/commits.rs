//! Commit table

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};

use crate::git::CommitRecord;
use crate::report::table::render_table;

const HEADERS: &[&str] = &["Source", "Commit", "Timestamp", "Description"];

pub const UNKNOWN: &str = "Unknown";
const NO_REPOSITORY: &str = "(no git configuration)";

/// Sorts by timestamp, oldest first; commits without a timestamp go last
///
/// Timestamps that do not parse sort after the parsed ones, by text.
/// Ties are broken by source, then hash, so the order is stable across runs.
pub fn sort_commits(records: &mut [CommitRecord]) {
    records.sort_by(|a, b| {
        compare_timestamps(a.commit.timestamp.as_deref(), b.commit.timestamp.as_deref())
            .then_with(|| a.source.cmp(&b.source))
            .then_with(|| a.commit.hash.cmp(&b.commit.hash))
    });
}

fn compare_timestamps(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match (parse_timestamp(a), parse_timestamp(b)) {
            (Some(a_time), Some(b_time)) => a_time.cmp(&b_time),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.cmp(b),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Parses `git show --format=%ci` output, e.g. `2025-10-14 10:11:12 +0200`
fn parse_timestamp(timestamp: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S %z").ok()
}

pub fn render_commit_table(records: &[CommitRecord]) -> String {
    let mut sorted = records.to_vec();
    sort_commits(&mut sorted);

    let rows: Vec<Vec<String>> = sorted
        .iter()
        .map(|record| {
            let description = match (&record.repository_url, &record.commit.description) {
                (None, _) => NO_REPOSITORY.to_string(),
                (Some(_), Some(description)) => description.clone(),
                (Some(_), None) => UNKNOWN.to_string(),
            };
            vec![
                record.source.clone(),
                record.link().unwrap_or_else(|| record.commit.hash.clone()),
                record
                    .commit
                    .timestamp
                    .clone()
                    .unwrap_or_else(|| UNKNOWN.to_string()),
                description,
            ]
        })
        .collect();

    render_table(HEADERS, &rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::ResolvedCommit;

    fn record(source: &str, hash: &str, timestamp: Option<&str>) -> CommitRecord {
        CommitRecord {
            source: source.to_string(),
            repository_url: Some("https://github.com/agama-project/agama".to_string()),
            commit: ResolvedCommit {
                hash: hash.to_string(),
                timestamp: timestamp.map(str::to_string),
                description: None,
            },
        }
    }

    fn timestamps(records: &[CommitRecord]) -> Vec<&str> {
        records
            .iter()
            .map(|r| r.commit.timestamp.as_deref().unwrap_or(UNKNOWN))
            .collect()
    }

    #[test]
    fn sort_commits_puts_unknown_timestamps_last() {
        let mut records = vec![
            record("agama", "aaaaaaa", Some("2024-01-02")),
            record("agama", "0000000", None),
            record("agama", "bbbbbbb", Some("2023-05-01")),
        ];

        sort_commits(&mut records);

        assert_eq!(timestamps(&records), vec!["2023-05-01", "2024-01-02", UNKNOWN]);
    }

    #[test]
    fn sort_commits_compares_instants_across_offsets() {
        let mut records = vec![
            record("agama", "aaaaaaa", Some("2025-10-14 10:00:00 +0200")),
            record("agama", "bbbbbbb", Some("2025-10-14 09:30:00 +0000")),
        ];

        sort_commits(&mut records);

        assert_eq!(records[0].commit.hash, "aaaaaaa");
    }

    #[test]
    fn sort_commits_puts_unparsed_timestamps_after_parsed_ones() {
        let mut records = vec![
            record("agama", "ccccccc", None),
            record("agama", "aaaaaaa", Some("2025-10-15 08:00:00 +0000")),
            record("agama", "bbbbbbb", Some("2024-01-01")),
            record("agama", "ddddddd", Some("2025-10-14 10:00:00 +0200")),
            record("agama", "eeeeeee", Some("2023-yesterday")),
        ];

        sort_commits(&mut records);

        assert_eq!(
            timestamps(&records),
            vec![
                "2025-10-14 10:00:00 +0200",
                "2025-10-15 08:00:00 +0000",
                "2023-yesterday",
                "2024-01-01",
                UNKNOWN,
            ]
        );
    }

    #[test]
    fn sort_commits_breaks_ties_by_source_then_hash() {
        let mut records = vec![
            record("rubygem-agama-yast", "1111111", None),
            record("agama", "2222222", None),
            record("agama", "1111111", None),
        ];

        sort_commits(&mut records);

        let order: Vec<_> = records
            .iter()
            .map(|r| (r.source.as_str(), r.commit.hash.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("agama", "1111111"),
                ("agama", "2222222"),
                ("rubygem-agama-yast", "1111111"),
            ]
        );
    }

    #[test]
    fn render_commit_table_shows_placeholders() {
        let mut resolved = record("agama", "65cb39696", Some("2025-10-14 10:11:12 +0200"));
        resolved.commit.description = Some("v18-52-g65cb39696".to_string());
        let unconfigured = CommitRecord {
            source: "libzypp".to_string(),
            repository_url: None,
            commit: ResolvedCommit::unresolved("abcdef1"),
        };

        let table = render_commit_table(&[unconfigured, resolved]);
        let lines: Vec<&str> = table.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains("https://github.com/agama-project/agama/commit/65cb39696"));
        assert!(lines[2].contains("v18-52-g65cb39696"));
        assert!(lines[3].contains("| abcdef1 "));
        assert!(lines[3].contains(UNKNOWN));
        assert!(lines[3].contains("(no git configuration)"));
    }
}
