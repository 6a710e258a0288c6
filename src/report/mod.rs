//! Markdown report assembly
//!
//! # Modules
//!
//! - [`table`]: Padded Markdown tables
//! - [`packages`]: Package tables grouped by source identity
//! - [`commits`]: Commit table ordered by timestamp

pub mod commits;
pub mod packages;
pub mod table;

use std::fmt;

use crate::git::CommitRecord;
use crate::package::matcher::SourceMapping;
use crate::sources::{ObsRequest, PullRequest, StageOutcome};

use commits::render_commit_table;
use packages::render_package_table;
use table::render_table;

const NO_PACKAGES: &str = "(No packages found)";
const NO_MATCHING_PACKAGES: &str = "(No matching packages found)";
const DESCRIPTION_WIDTH: usize = 80;

/// Results of one stage in configured order
#[derive(Debug, Clone, PartialEq)]
pub struct StageSection {
    pub name: String,
    pub outcome: StageOutcome,
    /// Set when the stage failed; the outcome is then empty
    pub error: Option<String>,
}

impl StageSection {
    pub fn completed(name: &str, outcome: StageOutcome) -> Self {
        Self {
            name: name.to_string(),
            outcome,
            error: None,
        }
    }

    pub fn failed(name: &str, error: String) -> Self {
        Self {
            name: name.to_string(),
            outcome: StageOutcome::default(),
            error: Some(error),
        }
    }
}

/// The full report; rendered as Markdown through [`fmt::Display`]
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub title: String,
    pub mapping: SourceMapping,
    pub sections: Vec<StageSection>,
    pub commits: Vec<CommitRecord>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# {}", self.title)?;

        for section in &self.sections {
            write_section(f, section, &self.mapping)?;
        }

        if !self.commits.is_empty() {
            writeln!(f, "\n## Git Commits\n")?;
            f.write_str(&render_commit_table(&self.commits))?;
        }

        Ok(())
    }
}

fn write_section(
    f: &mut fmt::Formatter<'_>,
    section: &StageSection,
    mapping: &SourceMapping,
) -> fmt::Result {
    writeln!(f, "\n## {}\n", section.name)?;

    let outcome = &section.outcome;
    if let Some(url) = &outcome.image_url {
        writeln!(f, "ISO: {}\n", url)?;
    }

    if let Some(error) = &section.error {
        writeln!(f, "(Stage failed: {})", error)?;
    } else if outcome.packages.is_empty() {
        writeln!(f, "{}", NO_PACKAGES)?;
    } else {
        match render_package_table(&outcome.packages, mapping) {
            Some(table) => f.write_str(&table)?,
            None => writeln!(f, "{}", NO_MATCHING_PACKAGES)?,
        }
    }

    if !outcome.requests.is_empty() {
        writeln!(f, "\n### Submit Requests\n")?;
        f.write_str(&render_request_table(&outcome.requests))?;
    }

    if !outcome.pull_requests.is_empty() {
        writeln!(f, "\n### Pull Requests\n")?;
        f.write_str(&render_pull_request_table(&outcome.pull_requests))?;
    }

    Ok(())
}

/// Submit requests ordered by target package, then request number
pub fn render_request_table(requests: &[ObsRequest]) -> String {
    let mut sorted: Vec<&ObsRequest> = requests.iter().collect();
    sorted.sort_by(|a, b| {
        a.target_package
            .cmp(&b.target_package)
            .then_with(|| numeric_order(&a.id, &b.id))
    });

    let rows: Vec<Vec<String>> = sorted
        .iter()
        .map(|request| {
            vec![
                request.target_package.clone(),
                request.id.clone(),
                request.state.clone(),
                format!("{}/{}", request.source_project, request.source_package),
                request.created_at.clone(),
                request.updated_at.clone(),
                summary_line(&request.description),
            ]
        })
        .collect();

    render_table(
        &["Package", "ID", "State", "Source", "Created", "Updated", "Description"],
        &rows,
    )
}

/// Pull requests ordered by package, then index
pub fn render_pull_request_table(pull_requests: &[PullRequest]) -> String {
    let mut sorted: Vec<&PullRequest> = pull_requests.iter().collect();
    sorted.sort_by(|a, b| {
        a.package
            .cmp(&b.package)
            .then_with(|| numeric_order(&a.index, &b.index))
    });

    let rows: Vec<Vec<String>> = sorted
        .iter()
        .map(|pr| {
            vec![
                pr.package.clone(),
                pr.url.clone(),
                pr.state.clone(),
                summary_line(&pr.title),
                pr.author.clone(),
                if pr.mergeable { "yes" } else { "no" }.to_string(),
                pr.updated_at.clone(),
                pr.comments.clone(),
            ]
        })
        .collect();

    render_table(
        &["Package", "Pull Request", "State", "Title", "Author", "Mergeable", "Updated", "Comments"],
        &rows,
    )
}

/// Numbers compare numerically, anything else as text after them
fn numeric_order(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// First non-empty line of `text`, shortened for a table cell
fn summary_line(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();

    if line.chars().count() <= DESCRIPTION_WIDTH {
        return line.to_string();
    }
    let mut short: String = line.chars().take(DESCRIPTION_WIDTH - 3).collect();
    short.push_str("...");
    short
}
