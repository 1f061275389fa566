//! Registration-time validation of plugin metadata and shape.

use semver::{Version, VersionReq};

use billhub_core::error::AppError;

use crate::metadata::PluginMetadata;
use crate::schema::ConfigSchema;

/// Maximum plugin name length.
const MAX_NAME_LEN: usize = 64;
/// Maximum description length.
const MAX_DESCRIPTION_LEN: usize = 1024;
/// Maximum keyword length.
const MAX_KEYWORD_LEN: usize = 32;
/// Maximum hook name length.
const MAX_HOOK_LEN: usize = 128;
/// Maximum route path length.
const MAX_ROUTE_LEN: usize = 256;

/// Everything the validator looks at for one plugin.
#[derive(Debug)]
pub(crate) struct PluginShape<'a> {
    pub metadata: &'a PluginMetadata,
    pub hooks: Vec<&'a str>,
    pub routes: Vec<&'a str>,
    pub slots: Vec<&'a str>,
    pub schema: Option<&'a ConfigSchema>,
}

/// Validates a plugin's metadata and declared hooks, routes, slots, and schema.
pub(crate) fn validate_plugin(shape: &PluginShape<'_>) -> Result<(), AppError> {
    let meta = shape.metadata;
    validate_metadata(meta)?;

    for hook in &shape.hooks {
        if !is_valid_hook_name(hook) {
            return Err(invalid(&meta.name, "hooks", format!("'{hook}' is not a valid hook name")));
        }
    }

    for route in &shape.routes {
        if !is_valid_route(route) {
            return Err(invalid(&meta.name, "routes", format!("'{route}' is not a valid route path")));
        }
    }

    for slot in &shape.slots {
        if !is_valid_slot_id(slot) {
            return Err(invalid(&meta.name, "components", format!("'{slot}' is not a valid slot id")));
        }
    }

    if let Some(schema) = shape.schema {
        let problems = schema.self_check();
        if !problems.is_empty() {
            return Err(invalid(&meta.name, "config_schema", problems.join("; ")));
        }
    }

    Ok(())
}

/// Validates plugin metadata.
pub fn validate_metadata(meta: &PluginMetadata) -> Result<(), AppError> {
    if !is_valid_plugin_name(&meta.name) {
        return Err(invalid(
            &meta.name,
            "name",
            "must be 1-64 characters of lowercase letters, digits, '-', '_' or '.', starting with a letter or digit",
        ));
    }

    if meta.version.trim().is_empty() {
        return Err(invalid(&meta.name, "version", "must not be empty"));
    }
    if let Err(e) = Version::parse(&meta.version) {
        return Err(invalid(
            &meta.name,
            "version",
            format!("'{}' is not a valid semantic version: {e}", meta.version),
        ));
    }

    if meta.description.len() > MAX_DESCRIPTION_LEN {
        return Err(invalid(
            &meta.name,
            "description",
            format!("exceeds {MAX_DESCRIPTION_LEN} characters"),
        ));
    }

    for (dep, range) in &meta.dependencies {
        if dep == &meta.name {
            return Err(invalid(&meta.name, "dependencies", "plugin cannot depend on itself"));
        }
        if !is_valid_plugin_name(dep) {
            return Err(invalid(
                &meta.name,
                "dependencies",
                format!("'{dep}' is not a valid plugin name"),
            ));
        }
        if let Err(e) = VersionReq::parse(range) {
            return Err(invalid(
                &meta.name,
                "dependencies",
                format!("'{range}' for '{dep}' is not a valid version range: {e}"),
            ));
        }
    }

    for keyword in &meta.keywords {
        if keyword.trim().is_empty() || keyword.len() > MAX_KEYWORD_LEN {
            return Err(invalid(
                &meta.name,
                "keywords",
                format!("'{keyword}' must be 1-{MAX_KEYWORD_LEN} non-blank characters"),
            ));
        }
    }

    Ok(())
}

fn invalid(plugin: &str, field: &str, reason: impl std::fmt::Display) -> AppError {
    AppError::validation(format!("Plugin '{plugin}': invalid field '{field}': {reason}"))
}

fn is_valid_plugin_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'))
}

/// Dot-separated lowercase segments, e.g. `invoice.paid`.
pub(crate) fn is_valid_hook_name(hook: &str) -> bool {
    !hook.is_empty()
        && hook.len() <= MAX_HOOK_LEN
        && hook.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        })
}

fn is_valid_route(route: &str) -> bool {
    route.starts_with('/')
        && route.len() <= MAX_ROUTE_LEN
        && !route.chars().any(|c| c.is_whitespace() || c.is_control())
}

fn is_valid_slot_id(slot: &str) -> bool {
    !slot.is_empty()
        && slot.len() <= MAX_HOOK_LEN
        && slot
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}
