//! Vite toolchain scaffolding: config file, manifest dependencies, start script.

use super::templates::{VITE_JS_CONFIG, VITE_REACT_CONFIG};
use super::ScaffoldContext;
use crate::runtime::SandboxFs;
use serde_json::{Map, Value};

pub const VITE_CONFIG_PATH: &str = "/vite.config.js";
pub const MANIFEST_PATH: &str = "/package.json";

pub const VITE_PACKAGE: &str = "vite";
pub const REACT_PLUGIN_PACKAGE: &str = "@vitejs/plugin-react";

/// Dependencies whose presence selects the React config template.
const REACT_PACKAGES: &[&str] = &["react", "react-dom"];

/// Start scripts in order of preference.
const START_SCRIPT_PRIORITY: &[&str] = &["dev", "start", "serve", "develop"];

const DEFAULT_START_SCRIPT: &str = "dev";
const DEV_SCRIPT_COMMAND: &str = "vite";

/// Pinned bundler and React plugin versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toolchain {
    pub vite: &'static str,
    pub plugin_react: &'static str,
}

pub const DEFAULT_TOOLCHAIN: Toolchain = Toolchain {
    vite: "latest",
    plugin_react: "latest",
};

/// Toolchain compatible with a React major version.
pub fn toolchain_for(react_major: Option<u32>) -> Toolchain {
    match react_major {
        Some(17) => Toolchain {
            vite: "2.9.15",
            plugin_react: "1.3.2",
        },
        Some(16) => Toolchain {
            vite: "2.8.6",
            plugin_react: "1.2.0",
        },
        _ => DEFAULT_TOOLCHAIN,
    }
}

/// Major version from a semver range such as `^17.0.2`, `~16.14` or `>=18`.
pub fn parse_major(range: &str) -> Option<u32> {
    let trimmed = range
        .trim()
        .trim_start_matches(|c: char| matches!(c, '^' | '~' | '=' | '>' | '<' | 'v' | ' '));
    let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

fn dependency<'m>(manifest: &'m Map<String, Value>, name: &str) -> Option<&'m str> {
    ["dependencies", "devDependencies"]
        .iter()
        .find_map(|section| manifest.get(*section)?.get(name)?.as_str())
}

/// React major version declared by the manifest, if any.
pub fn react_major_version(manifest: &Map<String, Value>) -> Option<u32> {
    dependency(manifest, "react").and_then(parse_major)
}

fn uses_react(manifest: &Map<String, Value>) -> bool {
    REACT_PACKAGES.iter().any(|name| dependency(manifest, name).is_some())
}

/// Read and parse `/package.json` as a JSON object.
pub async fn read_manifest(fs: &dyn SandboxFs) -> anyhow::Result<Map<String, Value>> {
    let text = fs.read_file(MANIFEST_PATH).await?;
    match serde_json::from_str(&text)? {
        Value::Object(manifest) => Ok(manifest),
        other => anyhow::bail!("package.json is not an object: {other}"),
    }
}

/// Script names declared by the manifest; empty if it cannot be read.
pub async fn manifest_script_names(fs: &dyn SandboxFs) -> Vec<String> {
    match read_manifest(fs).await {
        Ok(manifest) => manifest
            .get("scripts")
            .and_then(Value::as_object)
            .map(|scripts| scripts.keys().cloned().collect())
            .unwrap_or_default(),
        Err(e) => {
            tracing::debug!("Error reading package.json scripts: {e:#}");
            Vec::new()
        }
    }
}

/// Write a Vite config unless one exists. Picks the React template when the
/// manifest depends on React.
pub async fn ensure_vite_config(ctx: &ScaffoldContext<'_>) {
    if ctx.fs.stat(VITE_CONFIG_PATH).await.is_ok() {
        tracing::debug!("vite.config.js exists");
        return;
    }

    let react = match read_manifest(ctx.fs).await {
        Ok(manifest) => uses_react(&manifest),
        Err(e) => {
            tracing::debug!("Framework detection skipped: {e:#}");
            false
        }
    };
    let template = if react { VITE_REACT_CONFIG } else { VITE_JS_CONFIG };

    match ctx.fs.write_file(VITE_CONFIG_PATH, template).await {
        Ok(()) => tracing::info!(react, "Created vite.config.js"),
        Err(e) => tracing::warn!("Error ensuring Vite config: {e:#}"),
    }
}

/// Bring the manifest's toolchain entries and dev script in line with the
/// detected React version. Returns `true` if the manifest was rewritten and
/// dependencies need installing.
pub async fn ensure_vite_dependencies(ctx: &ScaffoldContext<'_>) -> bool {
    let mut manifest = match read_manifest(ctx.fs).await {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::warn!("Error ensuring Vite dependencies: {e:#}");
            return false;
        }
    };

    let toolchain = toolchain_for(react_major_version(&manifest));
    if !apply_toolchain(&mut manifest, toolchain) {
        tracing::debug!("Vite dependencies already satisfied");
        return false;
    }

    let text = match serde_json::to_string_pretty(&manifest) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Error serializing package.json: {e}");
            return false;
        }
    };
    match ctx.fs.write_file(MANIFEST_PATH, &text).await {
        Ok(()) => {
            tracing::info!(
                vite = toolchain.vite,
                plugin_react = toolchain.plugin_react,
                "Updated package.json with Vite toolchain"
            );
            true
        }
        Err(e) => {
            tracing::warn!("Error writing package.json: {e:#}");
            false
        }
    }
}

/// Merge the required entries into `manifest`. Returns `true` on any change.
fn apply_toolchain(manifest: &mut Map<String, Value>, toolchain: Toolchain) -> bool {
    let mut changed = false;

    for (package, version) in [
        (VITE_PACKAGE, toolchain.vite),
        (REACT_PLUGIN_PACKAGE, toolchain.plugin_react),
    ] {
        let runtime_deps = section_mut(manifest, "dependencies", &mut changed);
        if let Some(current) = runtime_deps.get(package) {
            if current.as_str() != Some(version) {
                runtime_deps.insert(package.to_string(), Value::from(version));
                changed = true;
            }
            continue;
        }

        let dev_deps = section_mut(manifest, "devDependencies", &mut changed);
        if dev_deps.get(package).and_then(Value::as_str) != Some(version) {
            dev_deps.insert(package.to_string(), Value::from(version));
            changed = true;
        }
    }

    let scripts = section_mut(manifest, "scripts", &mut changed);
    if !scripts.contains_key(DEFAULT_START_SCRIPT) {
        scripts.insert(DEFAULT_START_SCRIPT.to_string(), Value::from(DEV_SCRIPT_COMMAND));
        changed = true;
    }

    changed
}

/// The object at `manifest[name]`, created if absent. A non-object value is
/// replaced and counts as a change.
fn section_mut<'m>(
    manifest: &'m mut Map<String, Value>,
    name: &str,
    changed: &mut bool,
) -> &'m mut Map<String, Value> {
    let slot = manifest
        .entry(name.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
        *changed = true;
    }
    match slot {
        Value::Object(section) => section,
        _ => unreachable!("section was just replaced by an object"),
    }
}

/// Pick the script that starts the dev server.
pub fn choose_vite_start_script<S: AsRef<str>>(available: &[S]) -> String {
    START_SCRIPT_PRIORITY
        .iter()
        .find(|preferred| available.iter().any(|name| name.as_ref() == **preferred))
        .map(|name| name.to_string())
        .or_else(|| available.first().map(|name| name.as_ref().to_string()))
        .unwrap_or_else(|| DEFAULT_START_SCRIPT.to_string())
}
