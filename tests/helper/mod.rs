//! Shared fakes for driving the stage runner without real tools or network
#![allow(dead_code)]

mod fetcher;
mod tools;

use std::path::Path;

use chrono::NaiveDate;

use release_checker::config::{AppConfig, parse_config};
use release_checker::stage::RunOptions;

pub use fetcher::StaticIndexFetcher;
pub use tools::FakeTools;

pub const OBS_PROJECT: &str = "systemsmanagement:Agama:Devel";
pub const IMAGE_URL: &str =
    "https://download.opensuse.org/tumbleweed/iso/agama-installer.x86_64-19.pre.0.0-openSUSE-Build12.1.iso";

pub fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("fixture {:?}: {}", path, e))
}

pub fn load_fixture_config(name: &str) -> AppConfig {
    parse_config(&fixture(name), Path::new(name)).unwrap()
}

pub fn run_options(names: &[&str]) -> RunOptions {
    RunOptions {
        names: names.iter().map(|name| name.to_string()).collect(),
        ..RunOptions::new(NaiveDate::from_ymd_opt(2025, 10, 20).unwrap())
    }
}

/// Tools answering the build service and commit lookups of `release.yml`
pub fn release_tools(mirror: &Path) -> FakeTools {
    let mirror = mirror.display();
    FakeTools::new()
        .with_image_packages(&fixture("packages.json"))
        .with_output(&format!("osc ls {OBS_PROJECT}"), "agama\nrubygem-agama-yast\nlibstorage-ng\n")
        .with_output(
            &format!("osc ls {OBS_PROJECT} agama"),
            "_service\nagama.changes\nagama.obsinfo\nagama.spec\n",
        )
        .with_output(
            &format!("osc cat {OBS_PROJECT} agama agama.obsinfo"),
            "name: agama\nversion: 19.pre+1460.abcdef12\nmtime: 1760600000\ncommit: abcdef12\n",
        )
        .with_output(
            &format!("osc cat {OBS_PROJECT} agama agama.spec"),
            "Name:           agama\nVersion:        0\nRelease:        0\n",
        )
        .with_failure(
            &format!("osc ls {OBS_PROJECT} rubygem-agama-yast"),
            "Server returned an error: HTTP Error 500",
        )
        .with_output(&format!("git -C {mirror} fetch --all --tags"), "")
        .with_output(
            &format!("git -C {mirror} show -s --format=%ci 65cb39696"),
            "2025-10-14 10:11:12 +0200\n",
        )
        .with_output(
            &format!("git -C {mirror} describe --tags 65cb39696"),
            "v18-52-g65cb39696\n",
        )
        .with_output(
            &format!("git -C {mirror} show -s --format=%ci abcdef12"),
            "2025-10-16 08:00:00 +0200\n",
        )
        .with_failure(
            &format!("git -C {mirror} describe --tags abcdef12"),
            "fatal: No tags can describe 'abcdef12'.",
        )
}
