//! Config-file loading.
//!
//! Two named module-loading strategies exist behind one seam: native-load
//! (the CommonJS-style host loader) and transpile-then-load (the transient
//! compile job feeding either the module evaluator or the native loader).
//! Classification picks the strategy deterministically; there is no dynamic
//! dispatch to defeat and no hidden global state.

mod esm;
mod native;
mod transpile;

pub use transpile::{TranspileFormat, transpile_config};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{Context, JsResult, JsString, JsValue, js_string};
use serde_json::Value;

use crate::discovery::DiscoveredConfig;
use crate::env::ConfigEnv;
use crate::error::{ConfigError, Result};

/// Loads user config files regardless of module format.
///
/// One instance per process; the native strategy's module cache lives here
/// so restart-driven reloads can invalidate and re-read the same path.
pub struct ConfigLoader {
    native: native::NativeLoader,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            native: native::NativeLoader::new(),
        }
    }

    /// Load and evaluate a discovered config file, returning the raw config
    /// object. Function-valued exports are invoked with the command/mode
    /// environment; a non-object result is fatal.
    pub fn load(&self, discovered: &DiscoveredConfig, env: &ConfigEnv) -> Result<Value> {
        let started = Instant::now();
        let value = self.load_inner(discovered, env)?;

        if !value.is_object() {
            return Err(ConfigError::NotAnObject {
                file: discovered.path.clone(),
            });
        }

        tracing::debug!(
            "config loaded from {} in {:.1?}",
            discovered.path.display(),
            started.elapsed()
        );
        Ok(value)
    }

    fn load_inner(&self, discovered: &DiscoveredConfig, env: &ConfigEnv) -> Result<Value> {
        let path = &discovered.path;
        let format = discovered.format;

        match (format.is_typescript, format.is_esm) {
            // Typed ESM: compile, import the transient artifact, clean up.
            (true, true) => self.load_transpiled_esm(path, env),
            // Plain ESM: evaluate directly; every load gets a fresh module
            // graph, so no stale instance can be observed.
            (false, true) => esm::evaluate_module(path, env),
            // Script dialect: native load, with the ESM-syntax fallthrough.
            (false, false) => match self.native.load(path, env) {
                Err(ConfigError::Eval { message, .. })
                    if native::is_esm_syntax_error(&message) =>
                {
                    tracing::debug!(
                        "{} contains ES module syntax, retrying as compiled module",
                        path.display()
                    );
                    self.load_transpiled_cjs(path, env)
                }
                other => other,
            },
            // Typed dialect in a script-dialect package.
            (true, false) => self.load_transpiled_cjs(path, env),
        }
    }

    fn load_transpiled_esm(&self, path: &Path, env: &ConfigEnv) -> Result<Value> {
        let source = fs::read_to_string(path)?;
        let compiled = transpile_config(path, &source, TranspileFormat::Esm)?;

        // The artifact is deleted on every exit path, including import
        // failure: the guard owns the file from the moment it is written.
        let artifact = TransientArtifact::write(path, &compiled)?;
        esm::evaluate_module(artifact.path(), env)
    }

    fn load_transpiled_cjs(&self, path: &Path, env: &ConfigEnv) -> Result<Value> {
        let source = fs::read_to_string(path)?;
        let compiled = transpile_config(path, &source, TranspileFormat::Cjs)?;

        let hook: native::ExtensionHook = Arc::new(move |_path: &Path| Ok(compiled.clone()));
        let _guard = self.native.install_extension_override(path, hook);
        self.native.load(path, env)
    }

    /// Explicitly invalidate the module-cache entry for a config path.
    pub fn invalidate(&self, path: &Path) {
        self.native.invalidate(path);
    }
}

static ARTIFACT_SEQ: AtomicU64 = AtomicU64::new(0);

/// A compiled config written next to its source with a cache-busting name.
/// Scoped acquisition: the file is removed when the guard drops.
struct TransientArtifact {
    path: PathBuf,
}

impl TransientArtifact {
    fn write(source_path: &Path, code: &str) -> Result<Self> {
        let seq = ARTIFACT_SEQ.fetch_add(1, Ordering::Relaxed);
        let file_name = format!(
            "{}.timestamp-{}-{seq}.mjs",
            source_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "vite.config".to_string()),
            std::process::id(),
        );
        let path = source_path.with_file_name(file_name);
        fs::write(&path, code)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TransientArtifact {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Invoke a function-valued config export with `{ command, mode }`.
/// Non-callable values pass through unchanged.
pub(crate) fn call_config_export(
    value: JsValue,
    env: &ConfigEnv,
    context: &mut Context,
) -> JsResult<JsValue> {
    if !value.is_callable() {
        return Ok(value);
    }

    let env_obj = ObjectInitializer::new(context)
        .property(
            js_string!("command"),
            JsString::from(env.command.as_str()),
            Attribute::all(),
        )
        .property(
            js_string!("mode"),
            JsString::from(env.mode.as_str()),
            Attribute::all(),
        )
        .build();

    let Some(func) = value.as_callable() else {
        return Ok(value);
    };
    func.call(&JsValue::undefined(), &[JsValue::from(env_obj)], context)
}

/// Convert an evaluated config value to JSON data.
pub(crate) fn json_from_js(
    value: JsValue,
    path: &Path,
    context: &mut Context,
) -> Result<Value> {
    if value.is_undefined() || value.is_null() {
        return Err(ConfigError::NotAnObject {
            file: path.to_path_buf(),
        });
    }
    value
        .to_json(context)
        .map_err(|e| ConfigError::eval(path, e.to_string()))
}
