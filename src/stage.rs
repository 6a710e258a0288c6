//! Stage orchestration
//!
//! Runs the configured stages one after another, collects their packages
//! and change requests, then resolves every commit hash found along the way.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::cache::CacheLayout;
use crate::command::CommandRunner;
use crate::config::{AppConfig, StageConfig};
use crate::error::PreconditionError;
use crate::git::CommitResolver;
use crate::package::hash::{HashesBySource, extract_hashes, merge_hashes};
use crate::report::{Report, StageSection};
use crate::sources::{IndexFetcher, StageContext, gitea, mirror, obs};

/// Caller-supplied switches for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Stage names to run; empty runs every stage
    pub names: Vec<String>,
    pub no_cache: bool,
    pub recent: bool,
    pub today: NaiveDate,
}

impl RunOptions {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            names: Vec::new(),
            no_cache: false,
            recent: false,
            today,
        }
    }
}

pub struct StageRunner<'a> {
    config: &'a AppConfig,
    layout: &'a CacheLayout,
    runner: &'a dyn CommandRunner,
    fetcher: &'a dyn IndexFetcher,
    options: RunOptions,
}

impl<'a> StageRunner<'a> {
    pub fn new(
        config: &'a AppConfig,
        layout: &'a CacheLayout,
        runner: &'a dyn CommandRunner,
        fetcher: &'a dyn IndexFetcher,
        options: RunOptions,
    ) -> Self {
        Self {
            config,
            layout,
            runner,
            fetcher,
            options,
        }
    }

    /// Stages left after applying the name filter, in configured order
    ///
    /// `git` stages only configure commit resolution and are always kept.
    pub fn selected_stages(&self) -> Vec<&'a StageConfig> {
        let names = &self.options.names;
        for name in names {
            if !self.config.stages.iter().any(|stage| stage.name() == name) {
                warn!("No stage named '{}' in the configuration", name);
            }
        }

        let selected: Vec<&StageConfig> = self
            .config
            .stages
            .iter()
            .filter(|stage| {
                matches!(stage, StageConfig::GitSource(_))
                    || names.is_empty()
                    || names.iter().any(|name| name == stage.name())
            })
            .collect();

        if !names.is_empty()
            && !selected
                .iter()
                .any(|stage| !matches!(stage, StageConfig::GitSource(_)))
        {
            warn!("No stages match the requested names {:?}", names);
        }

        selected
    }

    /// External commands needed by the selected stages, sorted
    pub fn required_tools(&self) -> Vec<&'static str> {
        self.selected_stages()
            .into_iter()
            .flat_map(StageConfig::required_tools)
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Fails when any required command is missing from `PATH`
    pub fn check_tools(&self) -> Result<(), PreconditionError> {
        let missing = find_missing(&self.required_tools(), |tool| which::which(tool).is_ok());
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PreconditionError::MissingTools(missing))
        }
    }

    /// Runs every selected stage and assembles the report
    ///
    /// A failing stage is logged and shown as failed; the others still run.
    pub async fn run(&self) -> Report {
        let ctx = StageContext {
            config: self.config,
            layout: self.layout,
            runner: self.runner,
            fetcher: self.fetcher,
            no_cache: self.options.no_cache,
            recent: self.options.recent,
            today: self.options.today,
        };

        let mut sections = Vec::new();
        let mut hashes = HashesBySource::new();

        for stage in self.selected_stages() {
            let result = match stage {
                StageConfig::ImageMirror(s) => mirror::collect(s, &ctx).await,
                StageConfig::BuildService(s) => obs::collect(s, &ctx).await,
                StageConfig::SourceMirror(s) => gitea::collect(s, &ctx).await,
                StageConfig::GitSource(_) => continue,
            };

            match result {
                Ok(outcome) => {
                    info!(
                        "Stage {} produced {} package(s)",
                        stage.name(),
                        outcome.packages.len()
                    );
                    merge_hashes(&mut hashes, extract_hashes(&outcome.packages, &self.config.rpms));
                    sections.push(StageSection::completed(stage.name(), outcome));
                }
                Err(e) => {
                    error!("Stage {} ({}) failed: {}", stage.name(), stage.kind(), e);
                    sections.push(StageSection::failed(stage.name(), e.to_string()));
                }
            }
        }

        let commits = if hashes.is_empty() {
            Vec::new()
        } else {
            CommitResolver::new(self.runner, self.layout, self.config.git_repositories())
                .resolve(&hashes)
                .await
        };

        Report {
            title: self.config.title.clone(),
            mapping: self.config.rpms.clone(),
            sections,
            commits,
        }
    }
}

/// Tools for which `lookup` reports no executable
pub fn find_missing(tools: &[&str], lookup: impl Fn(&str) -> bool) -> Vec<String> {
    tools
        .iter()
        .filter(|tool| !lookup(tool))
        .map(|tool| tool.to_string())
        .collect()
}
