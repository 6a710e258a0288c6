//! Build service projects queried through `osc`
//!
//! Source versions come from the `.obsinfo` summary and `.spec`
//! descriptors of each configured package; submit requests targeting the
//! project are optionally listed.

use std::collections::{HashMap, HashSet};

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use reqwest::Url;
use tracing::{debug, error, info, warn};

use crate::command::CachedCommandRunner;
use crate::config::{BuildServiceStage, CACHE_MAX_AGE};
use crate::error::{CommandError, StageError};
use crate::package::Package;
use crate::package::version::{descriptor_file, select_summary_file};
use crate::sources::{StageContext, StageOutcome, non_empty_lines, packages_from_descriptors};

const STAGE_KIND: &str = "obsproject";
const COMMANDS_DIR: &str = "osc_commands";
const REQUESTS_DIR: &str = "osc_requests";
const OPEN_STATES: &str =
    "(state/@name='new'+or+state/@name='review'+or+state/@name='declined')";

/// A submit request as returned by the build service search API
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObsRequest {
    pub id: String,
    pub state: String,
    pub source_project: String,
    pub source_package: String,
    pub target_project: String,
    pub target_package: String,
    pub created_at: String,
    pub updated_at: String,
    pub description: String,
}

/// Project name from a project URL: its last path segment
///
/// `https://build.opensuse.org/project/show/systemsmanagement:Agama:Devel`
/// yields `systemsmanagement:Agama:Devel`.
pub fn project_name(url: &str) -> Result<String, StageError> {
    let invalid = |reason: &str| StageError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
    parsed
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
        .map(str::to_string)
        .ok_or_else(|| invalid("no project name in path"))
}

pub async fn collect(
    stage: &BuildServiceStage,
    ctx: &StageContext<'_>,
) -> Result<StageOutcome, StageError> {
    let project = project_name(&stage.url)?;
    info!("Processing OBS project: {}", project);

    let dir = ctx.layout.stage_dir(STAGE_KIND, &stage.name);
    let osc = CachedCommandRunner::new(ctx.runner, dir.join(COMMANDS_DIR), CACHE_MAX_AGE)
        .force_refresh(ctx.no_cache);

    let listing = osc.run(&["osc", "ls", &project]).await?;
    let project_packages: HashSet<&str> = non_empty_lines(&listing).collect();
    if project_packages.is_empty() {
        return Err(StageError::EmptyProject(project));
    }

    let mut outcome = StageOutcome::default();
    for identity in ctx.config.rpms.identities() {
        if !project_packages.contains(identity) {
            debug!("Package {} not found in {}", identity, project);
            continue;
        }

        let basenames = ctx.config.spec_basenames(identity);
        match package_versions(&osc, &project, identity, &basenames).await {
            Ok(packages) => outcome.packages.extend(packages),
            Err(e) => warn!("Failed to read {} in {}: {}", identity, project, e),
        }
    }

    if stage.submit_requests {
        outcome.requests = submit_requests(stage, &project, ctx).await;
    }

    Ok(outcome)
}

async fn package_versions(
    osc: &CachedCommandRunner<'_>,
    project: &str,
    identity: &str,
    basenames: &[String],
) -> Result<Vec<Package>, CommandError> {
    let listing = osc.run(&["osc", "ls", project, identity]).await?;
    let files: Vec<&str> = non_empty_lines(&listing).collect();

    let summary = match select_summary_file(identity, files.iter().copied()) {
        Some(file) => Some(osc.run(&["osc", "cat", project, identity, file]).await?),
        None => None,
    };

    let mut descriptors = HashMap::new();
    for basename in basenames {
        let file = descriptor_file(basename);
        if files.contains(&file.as_str()) {
            let content = osc.run(&["osc", "cat", project, identity, &file]).await?;
            descriptors.insert(basename.as_str(), content);
        }
    }

    Ok(packages_from_descriptors(
        basenames,
        summary.as_deref(),
        &descriptors,
    ))
}

/// Search API path for requests targeting `package` in `project`
///
/// Without `recent_since` only open and declined requests match; with it,
/// requests in any state last changed on or after that date.
pub fn request_query(project: &str, package: &str, recent_since: Option<&str>) -> String {
    let state_filter = match recent_since {
        Some(date) => format!("state/@when>='{date}'"),
        None => OPEN_STATES.to_string(),
    };

    format!(
        "/search/request?match={state_filter}+and+action/target/@project='{project}'+and+action/target/@package='{package}'"
    )
}

async fn submit_requests(
    stage: &BuildServiceStage,
    project: &str,
    ctx: &StageContext<'_>,
) -> Vec<ObsRequest> {
    info!("Processing OBS requests for project: {}", project);

    let dir = ctx.layout.stage_dir(STAGE_KIND, &stage.name);
    let osc = CachedCommandRunner::new(ctx.runner, dir.join(REQUESTS_DIR), CACHE_MAX_AGE)
        .force_refresh(ctx.no_cache);
    let since = ctx
        .recent
        .then(|| ctx.recent_cutoff().format("%Y-%m-%d").to_string());

    let mut requests = Vec::new();
    for identity in ctx.config.rpms.identities() {
        let query = request_query(project, identity, since.as_deref());
        let output = match osc.run(&["osc", "api", &query]).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Failed to fetch requests for {} in {}: {}", identity, project, e);
                continue;
            }
        };

        match parse_requests(&output) {
            Ok(found) => requests.extend(found),
            Err(e) => error!("Failed to parse requests for {}: {}", identity, e),
        }
    }

    requests
}

/// Parses a `<collection>` of `<request>` elements
///
/// Requests without an `<action>` are skipped; only the first action of a
/// request is considered.
pub fn parse_requests(xml: &str) -> Result<Vec<ObsRequest>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut requests = Vec::new();
    let mut current: Option<ObsRequest> = None;
    let mut actions = 0;
    let mut in_description = false;

    loop {
        let (element, open) = match reader.read_event()? {
            Event::Start(element) => (element, true),
            Event::Empty(element) => (element, false),
            Event::Text(text) => {
                if in_description && let Some(request) = current.as_mut() {
                    request.description.push_str(&text.unescape()?);
                }
                continue;
            }
            Event::CData(data) => {
                if in_description && let Some(request) = current.as_mut() {
                    request
                        .description
                        .push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
                continue;
            }
            Event::End(element) => {
                match element.name().as_ref() {
                    b"description" => in_description = false,
                    b"request" => {
                        if let Some(mut request) = current.take()
                            && actions > 0
                        {
                            request.description = request.description.trim().to_string();
                            requests.push(request);
                        }
                    }
                    _ => {}
                }
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        let Some(request) = current.as_mut() else {
            if open && element.name().as_ref() == b"request" {
                current = Some(ObsRequest {
                    id: attribute(&element, "id")?,
                    state: "unknown".to_string(),
                    ..Default::default()
                });
                actions = 0;
            }
            continue;
        };

        match element.name().as_ref() {
            b"state" => {
                let name = attribute(&element, "name")?;
                if !name.is_empty() {
                    request.state = name;
                }
                request.created_at = attribute(&element, "created")?;
                request.updated_at = attribute(&element, "when")?;
            }
            b"action" => actions += 1,
            b"source" if actions == 1 => {
                request.source_project = attribute(&element, "project")?;
                request.source_package = attribute(&element, "package")?;
            }
            b"target" if actions == 1 => {
                request.target_project = attribute(&element, "project")?;
                request.target_package = attribute(&element, "package")?;
            }
            b"description" => in_description = open,
            _ => {}
        }
    }

    Ok(requests)
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<String, quick_xml::Error> {
    Ok(match element.try_get_attribute(name)? {
        Some(attr) => attr.unescape_value()?.into_owned(),
        None => String::new(),
    })
}
