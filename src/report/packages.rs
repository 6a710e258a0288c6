//! Package tables grouped by source identity

use std::collections::BTreeMap;

use crate::package::Package;
use crate::package::matcher::SourceMapping;
use crate::report::table::render_table;

const HEADERS: &[&str] = &["Source Name", "Name", "Version", "Release", "Arch"];

/// Packages matching each identity, sorted by name
///
/// Every configured identity gets a group, possibly empty. Packages without
/// a version are never grouped. A package matching several identities
/// appears in each of them.
pub fn group_packages<'a>(
    packages: &'a [Package],
    mapping: &'a SourceMapping,
) -> BTreeMap<&'a str, Vec<&'a Package>> {
    let mut groups: BTreeMap<&str, Vec<&Package>> = mapping
        .identities()
        .map(|identity| (identity, Vec::new()))
        .collect();

    for package in packages.iter().filter(|p| !p.version.is_empty()) {
        for identity in mapping.identities_for(&package.name) {
            if let Some(members) = groups.get_mut(identity) {
                members.push(package);
            }
        }
    }

    for members in groups.values_mut() {
        members.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.arch.cmp(&b.arch))
                .then_with(|| a.version.cmp(&b.version))
        });
    }

    groups
}

/// Table with a heading row per identity followed by its packages, or
/// `None` when no package matched any identity
pub fn render_package_table(packages: &[Package], mapping: &SourceMapping) -> Option<String> {
    let groups = group_packages(packages, mapping);
    if groups.values().all(Vec::is_empty) {
        return None;
    }

    let mut rows = Vec::new();
    for (identity, members) in &groups {
        let mut heading = vec![String::new(); HEADERS.len()];
        heading[0] = identity.to_string();
        rows.push(heading);
        for package in members {
            rows.push(vec![
                String::new(),
                package.name.clone(),
                package.version.clone(),
                package.release.clone(),
                package.arch.clone(),
            ]);
        }
    }

    Some(render_table(HEADERS, &rows))
}
