//! Config resolution pipeline and the immutable resolved snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::alias::{Alias, aliases_from_value, inject_client_alias};
use crate::discovery::find_config_file;
use crate::env::{Command, ConfigEnv, EnvSource};
use crate::error::{ConfigError, Result};
use crate::loader::ConfigLoader;
use crate::merge::merge_config;
use crate::plugin::{Plugin, apply_config_hooks, call_config_resolved_hooks, sort_plugins};

/// SSR options: user-supplied overrides for the externalization heuristic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsrOptions {
    /// Force-include these package ids in the externalization result.
    #[serde(default)]
    pub external: Vec<String>,

    /// Force-exclude these package ids, overriding everything else.
    #[serde(default, rename = "noExternal")]
    pub no_external: Vec<String>,
}

/// How the config file should be located.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigFileSpec {
    /// Probe the conventional file names under the root.
    #[default]
    Discover,
    /// Skip config-file loading entirely.
    Disabled,
    /// Load exactly this file.
    Explicit(PathBuf),
}

/// Caller-supplied configuration layered over the file-loaded config.
#[derive(Default)]
pub struct InlineConfig {
    pub root: Option<PathBuf>,
    pub config_file: ConfigFileSpec,
    /// Mode override; falls back to the command's default mode.
    pub mode: Option<String>,
    /// Raw options merged over the file config (inline wins).
    pub options: Value,
    pub plugins: Vec<Arc<dyn Plugin>>,
}

/// The immutable configuration snapshot, produced exactly once per process
/// lifetime (or once per explicit restart). Nothing merges into it after
/// construction.
pub struct ResolvedConfig {
    /// Absolute project root.
    pub root: PathBuf,
    /// Normalized public base URL.
    pub base: String,
    pub command: Command,
    pub mode: String,
    /// Explicit production flag; threaded, never read from process state.
    pub is_production: bool,
    /// Final merged raw options.
    pub options: Value,
    /// Normalized alias chain, internal client alias first.
    pub alias: Vec<Alias>,
    pub ssr: SsrOptions,
    /// Opaque environment mapping from the external env collaborator.
    pub env: BTreeMap<String, String>,
    /// Plugins in their final [pre, normal, post] order.
    pub plugins: Vec<Arc<dyn Plugin>>,
    /// The config file that was loaded, when one was found.
    pub config_file: Option<PathBuf>,
}

impl fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("root", &self.root)
            .field("base", &self.base)
            .field("command", &self.command)
            .field("mode", &self.mode)
            .field("is_production", &self.is_production)
            .field("options", &self.options)
            .field("ssr", &self.ssr)
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name().to_string()).collect::<Vec<_>>(),
            )
            .field("config_file", &self.config_file)
            .finish_non_exhaustive()
    }
}

/// Resolve the final configuration: load the config file, layer inline
/// options, run the plugin pipeline, freeze the snapshot, notify plugins.
///
/// The whole pipeline is sequential; any failure aborts resolution and
/// nothing partial escapes.
pub async fn resolve_config(
    inline: InlineConfig,
    command: Command,
    default_mode: &str,
    env_source: &dyn EnvSource,
) -> Result<ResolvedConfig> {
    let mode = inline
        .mode
        .clone()
        .unwrap_or_else(|| default_mode.to_string());
    if mode == "local" {
        return Err(ConfigError::ReservedMode { mode });
    }
    let env = ConfigEnv::new(command, mode.clone());

    let root = absolutize(inline.root.as_deref());

    let discovered = match &inline.config_file {
        ConfigFileSpec::Disabled => None,
        ConfigFileSpec::Discover => find_config_file(&root, None),
        ConfigFileSpec::Explicit(path) => find_config_file(&root, Some(path.as_path())),
    };

    let (file_config, config_file) = match discovered {
        Some(discovered) => {
            let config_path = discovered.path.clone();
            let hook_env = env.clone();
            let value = tokio::task::spawn_blocking(move || {
                let loader = ConfigLoader::new();
                loader.load(&discovered, &hook_env)
            })
            .await
            .map_err(|e| ConfigError::eval(&config_path, format!("load task failed: {e}")))??;
            (value, Some(config_path))
        }
        None => (Value::Object(Map::new()), None),
    };

    let file_config = normalize_legacy_options(file_config);
    let merged = merge_config(&file_config, &inline.options);

    let plugins = sort_plugins(inline.plugins, command);
    let options = apply_config_hooks(&plugins, merged, &env)?;

    let base = resolve_base_url(options.get("base").and_then(Value::as_str).unwrap_or("/"));
    let is_production = mode == "production";

    let ssr = options
        .get("ssr")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    let user_aliases = options
        .get("alias")
        .map(aliases_from_value)
        .unwrap_or_default();
    let alias = inject_client_alias(user_aliases);

    let env_map = env_source.load(&mode, &root);

    let resolved = ResolvedConfig {
        root,
        base,
        command,
        mode,
        is_production,
        options,
        alias,
        ssr,
        env: env_map,
        plugins,
        config_file,
    };

    // One-way notification; the snapshot is already frozen.
    call_config_resolved_hooks(&resolved.plugins, &resolved)?;

    Ok(resolved)
}

fn absolutize(root: Option<&Path>) -> PathBuf {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    match root {
        Some(p) if p.is_absolute() => p.to_path_buf().clean(),
        Some(p) => cwd.join(p).clean(),
        None => cwd,
    }
}

/// Normalize the public base URL: external URLs keep their authority; paths
/// gain leading and trailing separators.
fn resolve_base_url(raw: &str) -> String {
    if raw.is_empty() || raw == "./" {
        return "/".to_string();
    }

    let mut base = raw.to_string();
    if !base.contains("://") && !base.starts_with('/') {
        base.insert(0, '/');
    }
    if !base.ends_with('/') {
        base.push('/');
    }
    base
}

/// Renamed options from previous majors: old name, new path.
const LEGACY_RENAMES: &[(&str, &[&str])] = &[
    ("cssPreprocessOptions", &["css", "preprocessorOptions"]),
    ("esbuildTarget", &["build", "target"]),
];

/// Eager legacy-options pass: runs once at load time, warns immediately and
/// maps old field names onto their successors. New-style values win when
/// both are present.
fn normalize_legacy_options(config: Value) -> Value {
    let Value::Object(mut map) = config else {
        return config;
    };

    'renames: for (old_name, new_path) in LEGACY_RENAMES {
        let Some(value) = map.remove(*old_name) else {
            continue;
        };
        tracing::warn!(
            "config option \"{old_name}\" is deprecated, use \"{}\" instead",
            new_path.join(".")
        );

        let mut slot = &mut map;
        for segment in &new_path[..new_path.len() - 1] {
            let entry = slot
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Some(next) = entry.as_object_mut() else {
                continue 'renames;
            };
            slot = next;
        }
        let leaf = new_path[new_path.len() - 1].to_string();
        slot.entry(leaf).or_insert(value);
    }

    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base_url_is_normalized() {
        assert_eq!(resolve_base_url("/"), "/");
        assert_eq!(resolve_base_url(""), "/");
        assert_eq!(resolve_base_url("./"), "/");
        assert_eq!(resolve_base_url("app"), "/app/");
        assert_eq!(resolve_base_url("/app"), "/app/");
        assert_eq!(resolve_base_url("https://cdn.example.com/assets"), "https://cdn.example.com/assets/");
    }

    #[test]
    fn legacy_names_map_onto_new_paths() {
        let config = json!({ "esbuildTarget": "es2019", "cssPreprocessOptions": { "scss": {} } });
        let out = normalize_legacy_options(config);
        assert_eq!(out["build"]["target"], json!("es2019"));
        assert_eq!(out["css"]["preprocessorOptions"], json!({ "scss": {} }));
        assert!(out.get("esbuildTarget").is_none());
    }

    #[test]
    fn new_style_value_wins_over_legacy() {
        let config = json!({ "esbuildTarget": "es2019", "build": { "target": "esnext" } });
        let out = normalize_legacy_options(config);
        assert_eq!(out["build"]["target"], json!("esnext"));
    }

    #[test]
    fn ssr_options_deserialize_with_renamed_field() {
        let ssr: SsrOptions =
            serde_json::from_value(json!({ "external": ["a"], "noExternal": ["b"] })).unwrap();
        assert_eq!(ssr.external, ["a"]);
        assert_eq!(ssr.no_external, ["b"]);
    }
}
