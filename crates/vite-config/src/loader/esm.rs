//! ESM config evaluation through the engine's module graph.
//!
//! Each load spins up a fresh evaluation context, so a repeated load can
//! never observe a stale module instance; the cache-busting the host would
//! otherwise need is structural here. Relative specifiers resolve against
//! the importing file; bare specifiers go through a Node-style resolver with
//! import conditions. `.json` imports load as data modules.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use boa_engine::builtins::promise::PromiseState;
use boa_engine::module::{Module, ModuleLoader, Referrer};
use boa_engine::property::Attribute;
use boa_engine::{Context, JsNativeError, JsResult, JsString, Source, js_string};
use oxc_resolver::{ResolveOptions, Resolver};
use path_clean::PathClean;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::env::ConfigEnv;
use crate::error::{ConfigError, Result};

use super::{call_config_export, json_from_js};

struct ConfigModuleLoader {
    base: PathBuf,
    resolver: Resolver,
    modules: RefCell<FxHashMap<PathBuf, Module>>,
}

impl ConfigModuleLoader {
    fn new(base: PathBuf) -> Self {
        Self {
            base,
            resolver: Resolver::new(ResolveOptions {
                condition_names: vec!["node".into(), "import".into()],
                main_fields: vec!["module".into(), "main".into()],
                extensions: vec![".mjs".into(), ".js".into(), ".json".into()],
                ..ResolveOptions::default()
            }),
            modules: RefCell::new(FxHashMap::default()),
        }
    }

    fn resolve_specifier(&self, referrer: &Referrer, specifier: &str) -> Option<PathBuf> {
        let base_dir = referrer
            .path()
            .and_then(Path::parent)
            .unwrap_or(&self.base)
            .to_path_buf();

        if specifier.starts_with('.') || specifier.starts_with('/') {
            let joined = if Path::new(specifier).is_absolute() {
                PathBuf::from(specifier)
            } else {
                base_dir.join(specifier)
            }
            .clean();

            let mut candidates = vec![joined.clone()];
            for ext in [".mjs", ".js", ".ts", ".json"] {
                candidates.push(PathBuf::from(format!("{}{ext}", joined.display())));
            }
            candidates.into_iter().find(|c| c.is_file())
        } else {
            self.resolver
                .resolve(&base_dir, specifier)
                .ok()
                .map(|resolution| resolution.path().to_path_buf())
        }
    }

    fn load_module(&self, path: &Path, context: &mut Context) -> JsResult<Module> {
        if let Some(module) = self.modules.borrow().get(path) {
            return Ok(module.clone());
        }

        let module = if path.extension().and_then(|e| e.to_str()) == Some("json") {
            let text = fs::read_to_string(path).map_err(|e| {
                JsNativeError::typ()
                    .with_message(format!("Cannot read '{}': {e}", path.display()))
            })?;
            let synthesized = format!("export default {text};");
            Module::parse(Source::from_bytes(synthesized.as_bytes()), None, context)?
        } else if path.extension().and_then(|e| e.to_str()) == Some("ts") {
            // Relative typed-dialect imports compile through the same job as
            // the entry file.
            let text = fs::read_to_string(path).map_err(|e| {
                JsNativeError::typ()
                    .with_message(format!("Cannot read '{}': {e}", path.display()))
            })?;
            let compiled = super::transpile_config(path, &text, super::TranspileFormat::Esm)
                .map_err(|e| JsNativeError::syntax().with_message(e.to_string()))?;
            Module::parse(Source::from_bytes(compiled.as_bytes()), None, context)?
        } else {
            let source = Source::from_filepath(path).map_err(|e| {
                JsNativeError::typ()
                    .with_message(format!("Cannot read '{}': {e}", path.display()))
            })?;
            Module::parse(source, None, context)?
        };

        self.modules
            .borrow_mut()
            .insert(path.to_path_buf(), module.clone());
        Ok(module)
    }
}

impl ModuleLoader for ConfigModuleLoader {
    fn load_imported_module(
        &self,
        referrer: Referrer,
        specifier: JsString,
        finish_load: Box<dyn FnOnce(JsResult<Module>, &mut Context)>,
        context: &mut Context,
    ) {
        let spec = specifier.to_std_string_escaped();
        let result = match self.resolve_specifier(&referrer, &spec) {
            Some(path) => self.load_module(&path, context),
            None => Err(JsNativeError::typ()
                .with_message(format!("Failed to resolve module specifier \"{spec}\""))
                .into()),
        };
        finish_load(result, context);
    }
}

/// Evaluate an ESM config file and hand back its (invoked) default export
/// as JSON data.
pub(crate) fn evaluate_module(path: &Path, env: &ConfigEnv) -> Result<Value> {
    let base = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let loader = Rc::new(ConfigModuleLoader::new(base));

    let mut context = Context::builder()
        .module_loader(loader)
        .build()
        .map_err(|e| ConfigError::eval(path, e.to_string()))?;

    let console = boa_runtime::Console::init(&mut context);
    context
        .register_global_property(js_string!("console"), console, Attribute::all())
        .map_err(|e| ConfigError::eval(path, e.to_string()))?;

    let source = Source::from_filepath(path)?;
    let module = Module::parse(source, None, &mut context)
        .map_err(|e| ConfigError::eval(path, e.to_string()))?;

    let promise = module.load_link_evaluate(&mut context);
    context.run_jobs();

    match promise.state() {
        PromiseState::Fulfilled(_) => {}
        PromiseState::Rejected(reason) => {
            return Err(ConfigError::eval(path, format!("{}", reason.display())));
        }
        PromiseState::Pending => {
            return Err(ConfigError::eval(path, "module evaluation did not complete"));
        }
    }

    let namespace = module.namespace(&mut context);
    let default = namespace
        .get(js_string!("default"), &mut context)
        .map_err(|e| ConfigError::eval(path, e.to_string()))?;
    if default.is_undefined() {
        return Err(ConfigError::eval(path, "config file must have a default export"));
    }

    let value = call_config_export(default, env, &mut context)
        .map_err(|e| ConfigError::eval(path, e.to_string()))?;
    json_from_js(value, path, &mut context)
}
