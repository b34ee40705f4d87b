//! Configuration resolution for the vite-rs engine.
//!
//! This crate owns the path from "a project directory" to "one immutable
//! resolved configuration": discovering and evaluating the user's config
//! file whatever its module format, folding plugin contributions through the
//! deep merger, and freezing the snapshot the rest of the tool consumes.
//!
//! The crate emits `tracing` events and never installs a subscriber.

pub mod alias;
pub mod discovery;
pub mod env;
pub mod error;
pub mod loader;
pub mod merge;
pub mod package_json;
pub mod plugin;
pub mod resolved;

pub use alias::{
    Alias, AliasPattern, AliasReplacement, aliases_from_value, inject_client_alias, merge_aliases,
    normalize_alias,
};
pub use discovery::{CONFIG_FILE_NAMES, DiscoveredConfig, ModuleFormat, classify, find_config_file};
pub use env::{Command, ConfigEnv, EnvSource, StaticEnv};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, TranspileFormat, transpile_config};
pub use merge::merge_config;
pub use package_json::{PackageJson, extract_package_name};
pub use plugin::{Enforce, HookResult, Plugin, sort_plugins};
pub use resolved::{
    ConfigFileSpec, InlineConfig, ResolvedConfig, SsrOptions, resolve_config,
};

/// The tool's own package name. Always excluded from SSR externalization
/// results, whatever the heuristic or the user's lists say.
pub const VITE_PACKAGE_NAME: &str = "vite";
