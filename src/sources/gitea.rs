//! Package sources hosted on a Gitea instance
//!
//! Each configured package is kept as a shallow, blob-less sparse checkout
//! so only the summary and descriptor files are ever downloaded. Open pull
//! requests are listed with `tea`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use reqwest::Url;
use serde::{Deserialize, Deserializer};
use tracing::{debug, error, info, warn};

use crate::cache::sanitize;
use crate::command::{CachedCommandRunner, CommandRunner};
use crate::config::{CACHE_MAX_AGE, SourceMirrorStage};
use crate::error::StageError;
use crate::package::Package;
use crate::package::version::{descriptor_file, select_summary_file};
use crate::sources::{
    StageContext, StageOutcome, is_recent, non_empty_lines, packages_from_descriptors,
};

const STAGE_KIND: &str = "giteaproject";
const TEA_COMMANDS_DIR: &str = "tea_commands";
const PR_FIELDS: &str = "index,state,author,url,title,mergeable,base,created,updated,comments";

/// A pull request as printed by `tea pr --output json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    /// Package repository the pull request belongs to
    #[serde(skip)]
    pub package: String,
    #[serde(default)]
    pub index: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub mergeable: bool,
    #[serde(default)]
    pub base: String,
    #[serde(default, rename = "created")]
    pub created_at: String,
    #[serde(default, rename = "updated")]
    pub updated_at: String,
    #[serde(default)]
    pub comments: String,
}

/// `tea` prints booleans as the strings `"true"`/`"false"`
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Bool(flag) => flag,
        serde_json::Value::String(s) => s == "true",
        _ => false,
    })
}

/// Host and organization path of a Gitea base URL
///
/// `https://src.suse.de/pool/` is host `src.suse.de`, path `pool`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiteaLocation {
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
}

impl GiteaLocation {
    pub fn parse(url: &str) -> Result<Self, StageError> {
        let parsed = Url::parse(url).map_err(|e| StageError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let host = parsed.host_str().ok_or_else(|| StageError::InvalidUrl {
            url: url.to_string(),
            reason: "no host".to_string(),
        })?;

        Ok(Self {
            host: host.to_string(),
            port: parsed.port(),
            path: parsed.path().trim_matches('/').to_string(),
        })
    }

    /// `<path>/<package>`, as `tea --repo` expects it
    pub fn repository(&self, package: &str) -> String {
        if self.path.is_empty() {
            package.to_string()
        } else {
            format!("{}/{}", self.path, package)
        }
    }

    /// `tea` login name, `host[:port]`
    pub fn login(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    /// SSH remote of a package repository
    ///
    /// scp-like remotes cannot carry a port, so a port switches to the
    /// `ssh://` form.
    pub fn remote_url(&self, package: &str) -> String {
        let repository = self.repository(package);
        match self.port {
            Some(port) => format!("ssh://gitea@{}:{}/{}.git", self.host, port, repository),
            None => format!("gitea@{}:{}.git", self.host, repository),
        }
    }
}

pub async fn collect(
    stage: &SourceMirrorStage,
    ctx: &StageContext<'_>,
) -> Result<StageOutcome, StageError> {
    info!("Processing Gitea project: {}", stage.name);

    let location = GiteaLocation::parse(&stage.url)?;
    let dir = ctx.layout.stage_dir(STAGE_KIND, &stage.name);

    let mut outcome = StageOutcome::default();
    for identity in ctx.config.rpms.identities() {
        let checkout = dir.join(sanitize(identity));
        let remote = location.remote_url(identity);
        let basenames = ctx.config.spec_basenames(identity);

        let branch = stage.branch.as_deref();
        match checkout_packages(ctx, branch, &remote, &checkout, identity, &basenames).await {
            Ok(packages) => outcome.packages.extend(packages),
            Err(e) => error!("Failed to read {} from {}: {}", identity, remote, e),
        }
    }

    if stage.submit_requests {
        outcome.pull_requests = pull_requests(stage, &location, ctx).await;
    }

    Ok(outcome)
}

async fn checkout_packages(
    ctx: &StageContext<'_>,
    branch: Option<&str>,
    remote: &str,
    checkout: &Path,
    identity: &str,
    basenames: &[String],
) -> Result<Vec<Package>, StageError> {
    if ctx.no_cache && checkout.exists() {
        debug!("Removing checkout {}", ctx.layout.display(checkout));
        fs::remove_dir_all(checkout)?;
    }

    sync_checkout(ctx.runner, remote, branch, checkout).await?;

    let path: &str = &checkout.to_string_lossy();
    let listing = ctx
        .runner
        .run(&["git", "-C", path, "ls-tree", "-r", "HEAD", "--name-only"])
        .await?;
    let files: Vec<&str> = non_empty_lines(&listing).collect();

    let summary_file = select_summary_file(identity, files.iter().copied());
    let descriptor_files: Vec<(&str, String)> = basenames
        .iter()
        .map(|basename| (basename.as_str(), descriptor_file(basename)))
        .filter(|(_, file)| files.contains(&file.as_str()))
        .collect();

    let wanted: Vec<&str> = summary_file
        .into_iter()
        .chain(descriptor_files.iter().map(|(_, file)| file.as_str()))
        .collect();
    if wanted.is_empty() {
        debug!("No summary or descriptor files for {}", identity);
        return Ok(Vec::new());
    }

    let mut argv = vec!["git", "-C", path, "sparse-checkout", "set", "--no-cone"];
    argv.extend(&wanted);
    if let Err(e) = ctx.runner.run(&argv).await {
        warn!("Failed to check out files of {}: {}", identity, e);
    }

    let read = |file: &str| {
        fs::read_to_string(checkout.join(file))
            .inspect_err(|e| warn!("Failed to read {}/{}: {}", identity, file, e))
            .ok()
    };

    let summary = summary_file.and_then(&read);
    let descriptors: HashMap<&str, String> = descriptor_files
        .iter()
        .filter_map(|(basename, file)| read(file.as_str()).map(|content| (*basename, content)))
        .collect();

    Ok(packages_from_descriptors(
        basenames,
        summary.as_deref(),
        &descriptors,
    ))
}

/// Clones the package repository or brings an existing checkout up to date
///
/// A failed update leaves the previous checkout in place.
async fn sync_checkout(
    runner: &dyn CommandRunner,
    remote: &str,
    branch: Option<&str>,
    checkout: &Path,
) -> Result<(), StageError> {
    let path: &str = &checkout.to_string_lossy();

    if checkout.exists() {
        let mut fetch = vec!["git", "-C", path, "fetch", "--depth", "1", "origin"];
        fetch.extend(branch);

        match runner.run(&fetch).await {
            Ok(_) => {
                runner
                    .run(&["git", "-C", path, "reset", "--hard", "FETCH_HEAD"])
                    .await?;
            }
            Err(e) => warn!("Failed to update {}: {}", remote, e),
        }
    } else {
        if let Some(parent) = checkout.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut clone = vec![
            "git",
            "clone",
            "--filter=blob:none",
            "--sparse",
            "--depth",
            "1",
        ];
        if let Some(branch) = branch {
            clone.extend(["--branch", branch]);
        }
        clone.extend([remote, path]);
        runner.run(&clone).await?;
    }

    runner
        .run(&["git", "-C", path, "sparse-checkout", "init", "--no-cone"])
        .await?;
    Ok(())
}

async fn pull_requests(
    stage: &SourceMirrorStage,
    location: &GiteaLocation,
    ctx: &StageContext<'_>,
) -> Vec<PullRequest> {
    info!("Processing Gitea pull requests for: {}", stage.name);

    let dir = ctx.layout.stage_dir(STAGE_KIND, &stage.name);
    let tea = CachedCommandRunner::new(ctx.runner, dir.join(TEA_COMMANDS_DIR), CACHE_MAX_AGE)
        .force_refresh(ctx.no_cache);
    let cutoff = ctx.recent.then(|| ctx.recent_cutoff());

    let mut found = Vec::new();
    let login = location.login();
    for identity in ctx.config.rpms.identities() {
        let repository = location.repository(identity);
        let mut argv = vec![
            "tea",
            "pr",
            "--login",
            login.as_str(),
            "--repo",
            repository.as_str(),
            "--output",
            "json",
            "-f",
            PR_FIELDS,
        ];
        if cutoff.is_some() {
            argv.extend(["--state", "all"]);
        }

        let output = match tea.run(&argv).await {
            Ok(output) => output,
            Err(e) => {
                error!("Tea command failed for {}: {}", repository, e);
                continue;
            }
        };

        match parse_pull_requests(&output) {
            Ok(prs) => found.extend(
                prs.into_iter()
                    .filter(|pr| keep_pull_request(pr, stage.branch.as_deref(), cutoff))
                    .map(|pr| PullRequest {
                        package: identity.to_string(),
                        ..pr
                    }),
            ),
            Err(e) => error!("Failed to decode tea output for {}: {}", repository, e),
        }
    }

    found
}

/// Parses `tea` JSON output; empty output means no pull requests
pub fn parse_pull_requests(output: &str) -> Result<Vec<PullRequest>, serde_json::Error> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(output)
}

fn keep_pull_request(pr: &PullRequest, branch: Option<&str>, cutoff: Option<NaiveDate>) -> bool {
    let on_branch = branch.is_none_or(|branch| pr.base == branch);
    let recent = cutoff.is_none_or(|cutoff| is_recent(&pr.updated_at, cutoff));
    on_branch && recent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheLayout;
    use crate::command::testing::FakeCommandRunner;
    use crate::config::{AppConfig, parse_config};
    use crate::sources::fetch::MockIndexFetcher;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const TEA_OUTPUT: &str = r#"[
        {
            "index": "14",
            "state": "open",
            "author": "Imobach Gonzalez Sosa",
            "url": "https://src.suse.de/pool/rubygem-agama-yast/pulls/14",
            "title": "Update translations",
            "mergeable": "true",
            "base": "slfo-1.2",
            "created": "2026-02-02T07:17:32Z",
            "updated": "2026-02-03T09:27:06Z",
            "comments": "4"
        },
        {
            "index": "15",
            "state": "open",
            "title": "PR for main",
            "mergeable": "false",
            "base": "slfo-main",
            "updated": "2026-02-18T10:00:00Z"
        },
        {
            "index": "16",
            "state": "merged",
            "title": "Bump version",
            "base": "slfo-1.2",
            "updated": "2026-02-19T11:00:00Z"
        }
    ]"#;

    fn stage(submit_requests: bool) -> SourceMirrorStage {
        SourceMirrorStage {
            name: "ibs-pool".to_string(),
            url: "https://src.suse.de/pool/".to_string(),
            branch: Some("slfo-1.2".to_string()),
            submit_requests,
        }
    }

    fn config() -> AppConfig {
        parse_config(
            "rpms:\n  rubygem-agama-yast:\n    - rubygem-agama-yast\nspecs:\n  rubygem-agama-yast:\n    - rubygem-agama-yast\n    - agama-yast\n",
            Path::new("config.yml"),
        )
        .unwrap()
    }

    fn context<'a>(
        config: &'a AppConfig,
        layout: &'a CacheLayout,
        runner: &'a FakeCommandRunner,
        fetcher: &'a MockIndexFetcher,
        recent: bool,
    ) -> StageContext<'a> {
        StageContext {
            config,
            layout,
            runner,
            fetcher,
            no_cache: false,
            recent,
            today: NaiveDate::from_ymd_opt(2026, 2, 20).unwrap(),
        }
    }

    fn checkout_dir(layout: &CacheLayout) -> PathBuf {
        layout
            .stage_dir(STAGE_KIND, "ibs-pool")
            .join("rubygem-agama-yast")
    }

    fn tea_command(extra: &str) -> String {
        format!(
            "tea pr --login src.suse.de --repo pool/rubygem-agama-yast --output json -f {PR_FIELDS}{extra}"
        )
    }

    #[test]
    fn location_builds_remote_and_repository() {
        let location = GiteaLocation::parse("https://src.suse.de/pool/").unwrap();

        assert_eq!(location.host, "src.suse.de");
        assert_eq!(location.port, None);
        assert_eq!(location.login(), "src.suse.de");
        assert_eq!(location.repository("agama"), "pool/agama");
        assert_eq!(location.remote_url("agama"), "gitea@src.suse.de:pool/agama.git");
    }

    #[test]
    fn location_without_path_uses_package_only() {
        let location = GiteaLocation::parse("https://gitea.example.com:3000").unwrap();

        assert_eq!(location.host, "gitea.example.com");
        assert_eq!(location.login(), "gitea.example.com:3000");
        assert_eq!(location.repository("agama"), "agama");
        assert_eq!(
            location.remote_url("agama"),
            "ssh://gitea@gitea.example.com:3000/agama.git"
        );
    }

    #[test]
    fn location_with_port_uses_ssh_url() {
        let location = GiteaLocation::parse("https://gitea.example.com:3000/pool").unwrap();

        assert_eq!(location.port, Some(3000));
        assert_eq!(
            location.remote_url("agama"),
            "ssh://gitea@gitea.example.com:3000/pool/agama.git"
        );
    }

    #[test]
    fn parse_pull_requests_reads_string_flags() {
        let prs = parse_pull_requests(TEA_OUTPUT).unwrap();

        assert_eq!(prs.len(), 3);
        assert_eq!(prs[0].index, "14");
        assert_eq!(prs[0].title, "Update translations");
        assert!(prs[0].mergeable);
        assert!(!prs[1].mergeable);
        assert_eq!(prs[1].author, "");
        assert_eq!(prs[0].updated_at, "2026-02-03T09:27:06Z");
    }

    #[test]
    fn parse_pull_requests_accepts_empty_output() {
        assert!(parse_pull_requests("\n").unwrap().is_empty());
        assert!(parse_pull_requests("not json").is_err());
    }

    #[tokio::test]
    async fn collect_updates_existing_checkout_and_reads_versions() {
        let temp_dir = TempDir::new().unwrap();
        let layout = CacheLayout::new(temp_dir.path());
        let checkout = checkout_dir(&layout);
        fs::create_dir_all(&checkout).unwrap();
        fs::write(
            checkout.join("rubygem-agama-yast.obsinfo"),
            "name: rubygem-agama-yast\nversion: 19.pre+1013.1d2e3f4a5\n",
        )
        .unwrap();
        fs::write(checkout.join("agama-yast.spec"), "Version: 18.1\nRelease: 0\n").unwrap();

        let path = checkout.display();
        let runner = FakeCommandRunner::new()
            .with_output(&format!("git -C {path} fetch --depth 1 origin slfo-1.2"), "")
            .with_output(&format!("git -C {path} reset --hard FETCH_HEAD"), "")
            .with_output(&format!("git -C {path} sparse-checkout init --no-cone"), "")
            .with_output(
                &format!("git -C {path} ls-tree -r HEAD --name-only"),
                "README.md\nagama-yast.spec\nrubygem-agama-yast.obsinfo\nrubygem-agama-yast.spec\n",
            )
            .with_output(
                &format!(
                    "git -C {path} sparse-checkout set --no-cone rubygem-agama-yast.obsinfo rubygem-agama-yast.spec agama-yast.spec"
                ),
                "",
            );
        let config = config();
        let fetcher = MockIndexFetcher::new();

        let outcome = collect(&stage(false), &context(&config, &layout, &runner, &fetcher, false))
            .await
            .unwrap();

        // rubygem-agama-yast.spec is listed but was not checked out: shared version
        assert_eq!(
            outcome.packages,
            vec![
                Package::new("rubygem-agama-yast", "19.pre+1013.1d2e3f4a5", "0", "src"),
                Package::new("agama-yast", "18.1", "0", "src"),
            ]
        );
    }

    #[tokio::test]
    async fn collect_clones_missing_checkout() {
        let temp_dir = TempDir::new().unwrap();
        let layout = CacheLayout::new(temp_dir.path());
        let checkout = checkout_dir(&layout);
        let path = checkout.display();
        let runner = FakeCommandRunner::new()
            .with_output(
                &format!(
                    "git clone --filter=blob:none --sparse --depth 1 --branch slfo-1.2 gitea@src.suse.de:pool/rubygem-agama-yast.git {path}"
                ),
                "",
            )
            .with_output(&format!("git -C {path} sparse-checkout init --no-cone"), "")
            .with_output(&format!("git -C {path} ls-tree -r HEAD --name-only"), "README.md\n");
        let config = config();
        let fetcher = MockIndexFetcher::new();

        let outcome = collect(&stage(false), &context(&config, &layout, &runner, &fetcher, false))
            .await
            .unwrap();

        assert!(outcome.packages.is_empty());
        assert_eq!(runner.calls().len(), 3);
        assert!(checkout.parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn collect_survives_clone_failure() {
        let temp_dir = TempDir::new().unwrap();
        let layout = CacheLayout::new(temp_dir.path());
        let runner = FakeCommandRunner::new();
        let config = config();
        let fetcher = MockIndexFetcher::new();

        let outcome = collect(&stage(false), &context(&config, &layout, &runner, &fetcher, false))
            .await
            .unwrap();

        assert_eq!(outcome, StageOutcome::default());
    }

    #[tokio::test]
    async fn pull_requests_are_filtered_by_branch() {
        let temp_dir = TempDir::new().unwrap();
        let layout = CacheLayout::new(temp_dir.path());
        let runner = FakeCommandRunner::new().with_output(&tea_command(""), TEA_OUTPUT);
        let config = config();
        let fetcher = MockIndexFetcher::new();

        let outcome = collect(&stage(true), &context(&config, &layout, &runner, &fetcher, false))
            .await
            .unwrap();

        let indexes: Vec<_> = outcome.pull_requests.iter().map(|pr| pr.index.as_str()).collect();
        assert_eq!(indexes, vec!["14", "16"]);
        assert!(
            outcome
                .pull_requests
                .iter()
                .all(|pr| pr.package == "rubygem-agama-yast")
        );
    }

    #[tokio::test]
    async fn pull_requests_recent_includes_all_states_within_window() {
        let temp_dir = TempDir::new().unwrap();
        let layout = CacheLayout::new(temp_dir.path());
        let runner =
            FakeCommandRunner::new().with_output(&tea_command(" --state all"), TEA_OUTPUT);
        let config = config();
        let fetcher = MockIndexFetcher::new();

        let outcome = collect(&stage(true), &context(&config, &layout, &runner, &fetcher, true))
            .await
            .unwrap();

        let indexes: Vec<_> = outcome.pull_requests.iter().map(|pr| pr.index.as_str()).collect();
        assert_eq!(indexes, vec!["16"]);
    }
}
