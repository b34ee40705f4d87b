//! Plugin lifecycle pipeline.
//!
//! Plugins expose optional capabilities as default-implemented trait methods;
//! a hook that is "not present" simply returns its neutral value. Ordering is
//! decided once, before any hook runs, and is authoritative for every later
//! hook invocation in this engine and downstream consumers.

use std::sync::Arc;

use serde_json::Value;

use crate::env::{Command, ConfigEnv};
use crate::error::{ConfigError, Result};
use crate::merge::merge_config;
use crate::resolved::ResolvedConfig;

/// Error type plugin hooks may surface; wrapped into [`ConfigError`] by the
/// pipeline with the plugin's name attached.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

pub type HookResult<T> = std::result::Result<T, HookError>;

/// Position override for a plugin relative to the normal bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enforce {
    Pre,
    Post,
}

/// A configuration-lifecycle plugin.
///
/// All hooks are optional; the defaults are neutral. Plugins are never
/// mutated after registration, so hooks take `&self`.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Ordering tag; `None` lands the plugin in the normal bucket.
    fn enforce(&self) -> Option<Enforce> {
        None
    }

    /// Restrict the plugin to one command; `None` applies to both.
    fn apply(&self) -> Option<Command> {
        None
    }

    /// Contribute partial configuration. A returned object is deep-merged
    /// onto the accumulated config; later plugins observe the result.
    fn config(&self, _config: &Value, _env: &ConfigEnv) -> HookResult<Option<Value>> {
        Ok(None)
    }

    /// One-way notification fired after the resolved snapshot is frozen.
    fn config_resolved(&self, _config: &ResolvedConfig) -> HookResult<()> {
        Ok(())
    }
}

/// Filter by `apply` and partition into the final `[pre, normal, post]`
/// order. Relative order inside each bucket is insertion order.
pub fn sort_plugins(plugins: Vec<Arc<dyn Plugin>>, command: Command) -> Vec<Arc<dyn Plugin>> {
    let applicable = plugins
        .into_iter()
        .filter(|p| p.apply().is_none_or(|cmd| cmd == command));

    let mut pre = Vec::new();
    let mut normal = Vec::new();
    let mut post = Vec::new();

    for plugin in applicable {
        match plugin.enforce() {
            Some(Enforce::Pre) => pre.push(plugin),
            None => normal.push(plugin),
            Some(Enforce::Post) => post.push(plugin),
        }
    }

    pre.extend(normal);
    pre.extend(post);
    pre
}

/// Fold each plugin's `config` hook result onto the accumulator, in order.
pub fn apply_config_hooks(
    plugins: &[Arc<dyn Plugin>],
    mut config: Value,
    env: &ConfigEnv,
) -> Result<Value> {
    for plugin in plugins {
        let partial = plugin
            .config(&config, env)
            .map_err(|e| ConfigError::PluginHook {
                plugin: plugin.name().to_string(),
                hook: "config",
                message: e.to_string(),
            })?;

        if let Some(partial) = partial {
            tracing::trace!("plugin \"{}\" contributed config", plugin.name());
            config = merge_config(&config, &partial);
        }
    }
    Ok(config)
}

/// Fire `configResolved` notifications in plugin order. No mutation is
/// permitted past this point; any hook failure aborts resolution.
pub fn call_config_resolved_hooks(
    plugins: &[Arc<dyn Plugin>],
    config: &ResolvedConfig,
) -> Result<()> {
    for plugin in plugins {
        plugin
            .config_resolved(config)
            .map_err(|e| ConfigError::PluginHook {
                plugin: plugin.name().to_string(),
                hook: "configResolved",
                message: e.to_string(),
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        name: &'static str,
        enforce: Option<Enforce>,
        apply: Option<Command>,
    }

    impl Plugin for Named {
        fn name(&self) -> &str {
            self.name
        }
        fn enforce(&self) -> Option<Enforce> {
            self.enforce
        }
        fn apply(&self) -> Option<Command> {
            self.apply
        }
    }

    fn plugin(
        name: &'static str,
        enforce: Option<Enforce>,
        apply: Option<Command>,
    ) -> Arc<dyn Plugin> {
        Arc::new(Named {
            name,
            enforce,
            apply,
        })
    }

    #[test]
    fn sorts_into_pre_normal_post() {
        let plugins = vec![
            plugin("a", None, None),
            plugin("b", Some(Enforce::Pre), None),
            plugin("c", Some(Enforce::Post), None),
            plugin("d", Some(Enforce::Pre), None),
        ];

        let sorted = sort_plugins(plugins, Command::Serve);
        let names: Vec<_> = sorted.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, ["b", "d", "a", "c"]);
    }

    #[test]
    fn apply_filter_drops_mismatched_commands() {
        let plugins = vec![
            plugin("build-only", None, Some(Command::Build)),
            plugin("serve-only", None, Some(Command::Serve)),
            plugin("both", None, None),
        ];

        let sorted = sort_plugins(plugins, Command::Serve);
        let names: Vec<_> = sorted.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, ["serve-only", "both"]);
    }
}
