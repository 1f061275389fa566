//! Dependency checks and dependency ordering.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use semver::{Version, VersionReq};
use tracing::warn;

use billhub_core::error::AppError;
use billhub_entity::plugin::PluginStatus;

use crate::metadata::PluginMetadata;

/// What the dependency checker needs to know about an installed plugin.
#[derive(Debug, Clone)]
pub(crate) struct InstalledPlugin {
    pub version: String,
    pub status: PluginStatus,
}

/// Checks that every dependency is installed, enabled, and within its
/// declared version range.
pub(crate) fn check_dependencies(
    metadata: &PluginMetadata,
    installed: &HashMap<String, InstalledPlugin>,
) -> Result<(), AppError> {
    for (dep, range) in &metadata.dependencies {
        let Some(found) = installed.get(dep) else {
            return Err(AppError::dependency(format!("{dep} not installed"), &metadata.name));
        };
        if found.status != PluginStatus::Enabled {
            return Err(AppError::dependency(format!("{dep} not enabled"), &metadata.name));
        }
        if !satisfies(&found.version, range) {
            return Err(AppError::dependency(
                format!("{dep} {} does not satisfy {range}", found.version),
                &metadata.name,
            ));
        }
    }
    Ok(())
}

/// Whether `version` falls in `range`. Unparseable input never matches.
pub(crate) fn satisfies(version: &str, range: &str) -> bool {
    match (Version::parse(version), VersionReq::parse(range)) {
        (Ok(v), Ok(req)) => req.matches(&v),
        _ => false,
    }
}

/// Orders plugin names so every plugin comes after the dependencies it
/// declares among `plugins`. Ties break by name. Names caught in a cycle
/// are appended at the end.
pub fn dependency_order(plugins: &[PluginMetadata]) -> Vec<String> {
    let known: BTreeSet<&str> = plugins.iter().map(|p| p.name.as_str()).collect();
    let mut remaining: BTreeMap<&str, BTreeSet<&str>> = plugins
        .iter()
        .map(|p| {
            let deps = p
                .dependencies
                .keys()
                .map(String::as_str)
                .filter(|d| known.contains(d))
                .collect();
            (p.name.as_str(), deps)
        })
        .collect();

    let mut order = Vec::with_capacity(plugins.len());
    loop {
        let ready: Vec<&str> = remaining
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(name, _)| *name)
            .collect();
        if ready.is_empty() {
            break;
        }
        for name in ready {
            remaining.remove(name);
            for deps in remaining.values_mut() {
                deps.remove(name);
            }
            order.push(name.to_string());
        }
    }

    if !remaining.is_empty() {
        let cyclic: Vec<&str> = remaining.keys().copied().collect();
        warn!(plugins = ?cyclic, "Dependency cycle detected, ordering by name");
        order.extend(cyclic.into_iter().map(str::to_string));
    }

    order
}
