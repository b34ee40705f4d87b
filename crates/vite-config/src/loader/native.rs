//! Native (CommonJS-style) module loading.
//!
//! Models the host module system a script-dialect config file expects:
//! sources evaluate inside the classic `(exports, module, require, ...)`
//! wrapper, `require` resolves relative ids against the requiring file and
//! bare ids through a Node-style resolver, and the loader keeps a module
//! cache whose entry for the config path is explicitly invalidated before
//! every load attempt.
//!
//! The per-path extension-override seam is how the typed-dialect fallback
//! substitutes compiled output for one exact file without leaking to any
//! other file: the override is installed behind a guard and removed when the
//! guard drops.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{
    Context, JsNativeError, JsObject, JsResult, JsString, JsValue, NativeFunction, Source,
    js_string,
};
use oxc_allocator::Allocator;
use oxc_ast::ast::Statement;
use oxc_parser::Parser;
use oxc_resolver::{ResolveOptions, Resolver};
use oxc_span::SourceType;
use path_clean::PathClean;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::env::ConfigEnv;
use crate::error::{ConfigError, Result};

use super::{call_config_export, json_from_js};

/// The fixed set of message markers that identify "this looks like ES-module
/// syntax" failures. A native-load failure matching one of these falls
/// through to the transpile-then-load strategy; anything else is fatal.
pub(crate) const ESM_SYNTAX_MARKERS: &[&str] = &[
    "Cannot use import statement",
    "Unexpected token 'export'",
    "Cannot use 'import.meta'",
];

pub(crate) fn is_esm_syntax_error(message: &str) -> bool {
    ESM_SYNTAX_MARKERS.iter().any(|m| message.contains(m))
}

/// Produces evaluable script source for one exact file path.
pub(crate) type ExtensionHook = Arc<dyn Fn(&Path) -> Result<String> + Send + Sync>;

/// The native loader. One instance lives for the process; its module cache
/// spans loads and is invalidated per path to guarantee idempotent reloads.
pub(crate) struct NativeLoader {
    resolver: Arc<Resolver>,
    cache: Mutex<FxHashMap<PathBuf, Value>>,
    overrides: Mutex<FxHashMap<PathBuf, ExtensionHook>>,
}

impl NativeLoader {
    pub fn new() -> Self {
        Self {
            resolver: Arc::new(Resolver::new(ResolveOptions {
                condition_names: vec!["node".into(), "require".into()],
                main_fields: vec!["main".into()],
                extensions: vec![".js".into(), ".cjs".into(), ".json".into()],
                ..ResolveOptions::default()
            })),
            cache: Mutex::new(FxHashMap::default()),
            overrides: Mutex::new(FxHashMap::default()),
        }
    }

    /// Drop any cached entry for `path`.
    pub fn invalidate(&self, path: &Path) {
        let canonical = path.to_path_buf().clean();
        self.cache.lock().expect("cache lock").remove(&canonical);
    }

    /// Install an extension-loader substitution for one exact path. The
    /// returned guard restores the original loader when dropped, on every
    /// exit path.
    pub fn install_extension_override(
        &self,
        path: &Path,
        hook: ExtensionHook,
    ) -> ExtensionOverrideGuard<'_> {
        let canonical = path.to_path_buf().clean();
        self.overrides
            .lock()
            .expect("override lock")
            .insert(canonical.clone(), hook);
        ExtensionOverrideGuard {
            loader: self,
            path: canonical,
        }
    }

    /// Load `path` as a CommonJS-style module and hand back its (invoked)
    /// export as JSON data.
    pub fn load(&self, path: &Path, env: &ConfigEnv) -> Result<Value> {
        let canonical = path.to_path_buf().clean();
        // Invalidate before every attempt so reloads observe disk state.
        self.invalidate(&canonical);

        let state = RequireState {
            stack: Vec::new(),
            registry: FxHashMap::default(),
            overrides: self.overrides.lock().expect("override lock").clone(),
            resolver: Arc::clone(&self.resolver),
        };
        REQUIRE_STATE.with(|slot| *slot.borrow_mut() = Some(state));
        let _reset = StateReset;

        let mut context = Context::default();
        init_runtime_globals(&mut context).map_err(|e| ConfigError::eval(&canonical, e.to_string()))?;

        let exports = require_module(&canonical, &mut context)
            .map_err(|e| ConfigError::eval(&canonical, e.to_string()))?;
        let value = unwrap_exports(exports, &mut context)
            .map_err(|e| ConfigError::eval(&canonical, e.to_string()))?;
        let value = call_config_export(value, env, &mut context)
            .map_err(|e| ConfigError::eval(&canonical, e.to_string()))?;

        let json = json_from_js(value, &canonical, &mut context)?;
        self.cache
            .lock()
            .expect("cache lock")
            .insert(canonical, json.clone());
        Ok(json)
    }
}

/// Removes a per-path extension override when dropped.
pub(crate) struct ExtensionOverrideGuard<'a> {
    loader: &'a NativeLoader,
    path: PathBuf,
}

impl Drop for ExtensionOverrideGuard<'_> {
    fn drop(&mut self) {
        self.loader
            .overrides
            .lock()
            .expect("override lock")
            .remove(&self.path);
    }
}

struct RequireState {
    /// Paths of modules currently being evaluated; the last entry is the
    /// requiring file for relative resolution.
    stack: Vec<PathBuf>,
    /// Modules registered this evaluation, keyed by path. Registration
    /// happens before the body runs so require cycles resolve.
    registry: FxHashMap<PathBuf, JsObject>,
    overrides: FxHashMap<PathBuf, ExtensionHook>,
    resolver: Arc<Resolver>,
}

thread_local! {
    static REQUIRE_STATE: RefCell<Option<RequireState>> = const { RefCell::new(None) };
}

struct StateReset;

impl Drop for StateReset {
    fn drop(&mut self) {
        REQUIRE_STATE.with(|slot| *slot.borrow_mut() = None);
    }
}

fn init_runtime_globals(context: &mut Context) -> JsResult<()> {
    let console = boa_runtime::Console::init(context);
    context.register_global_property(js_string!("console"), console, Attribute::all())?;
    context.register_global_callable(
        js_string!("require"),
        1,
        NativeFunction::from_fn_ptr(require_fn),
    )?;
    Ok(())
}

fn require_fn(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let specifier = args
        .first()
        .cloned()
        .unwrap_or_default()
        .to_string(context)?
        .to_std_string_escaped();

    let base_dir = REQUIRE_STATE.with(|slot| {
        slot.borrow()
            .as_ref()
            .and_then(|s| s.stack.last())
            .and_then(|p| p.parent())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    });

    let resolved = resolve_require(&specifier, &base_dir)?;
    require_module(&resolved, context)
}

fn resolve_require(specifier: &str, base_dir: &Path) -> JsResult<PathBuf> {
    if specifier.starts_with('.') || specifier.starts_with('/') {
        let joined = if Path::new(specifier).is_absolute() {
            PathBuf::from(specifier)
        } else {
            base_dir.join(specifier)
        }
        .clean();

        let mut candidates = vec![joined.clone()];
        for ext in [".js", ".cjs", ".ts", ".json"] {
            candidates.push(PathBuf::from(format!("{}{ext}", joined.display())));
        }
        candidates.push(joined.join("index.js"));

        if let Some(found) = candidates.into_iter().find(|c| c.is_file()) {
            return Ok(found);
        }
    } else {
        let resolver = REQUIRE_STATE.with(|slot| {
            slot.borrow()
                .as_ref()
                .map(|s| Arc::clone(&s.resolver))
        });
        if let Some(resolver) = resolver {
            if let Ok(resolution) = resolver.resolve(base_dir, specifier) {
                return Ok(resolution.path().to_path_buf());
            }
        }
    }

    Err(JsNativeError::typ()
        .with_message(format!("Cannot find module '{specifier}'"))
        .into())
}

/// Load a module through the registry, evaluating it on first sight.
fn require_module(path: &Path, context: &mut Context) -> JsResult<JsValue> {
    let canonical = path.to_path_buf().clean();

    let cached = REQUIRE_STATE.with(|slot| {
        slot.borrow()
            .as_ref()
            .and_then(|s| s.registry.get(&canonical).cloned())
    });
    if let Some(module_obj) = cached {
        return module_obj.get(js_string!("exports"), context);
    }

    if canonical.extension().and_then(|e| e.to_str()) == Some("json") {
        let text = fs::read_to_string(&canonical).map_err(|e| {
            JsNativeError::typ().with_message(format!("Cannot read '{}': {e}", canonical.display()))
        })?;
        let parsed: Value = serde_json::from_str(&text).map_err(|e| {
            JsNativeError::syntax()
                .with_message(format!("Invalid JSON in '{}': {e}", canonical.display()))
        })?;
        return JsValue::from_json(&parsed, context);
    }

    let hook = REQUIRE_STATE.with(|slot| {
        slot.borrow()
            .as_ref()
            .and_then(|s| s.overrides.get(&canonical).cloned())
    });
    let source = match hook {
        Some(hook) => hook(&canonical)
            .map_err(|e| JsNativeError::typ().with_message(e.to_string()))?,
        None if canonical.extension().and_then(|e| e.to_str()) == Some("ts") => {
            // Relative typed-dialect requires compile through the same job
            // as the entry file.
            let text = fs::read_to_string(&canonical).map_err(|e| {
                JsNativeError::typ()
                    .with_message(format!("Cannot read '{}': {e}", canonical.display()))
            })?;
            super::transpile_config(&canonical, &text, super::TranspileFormat::Cjs)
                .map_err(|e| JsNativeError::syntax().with_message(e.to_string()))?
        }
        None => default_script_source(&canonical)?,
    };

    let exports_obj = JsObject::with_object_proto(context.intrinsics());
    let module_obj = ObjectInitializer::new(context)
        .property(js_string!("exports"), exports_obj, Attribute::all())
        .build();

    REQUIRE_STATE.with(|slot| {
        if let Some(state) = slot.borrow_mut().as_mut() {
            state.registry.insert(canonical.clone(), module_obj.clone());
            state.stack.push(canonical.clone());
        }
    });

    let result = eval_wrapped(&canonical, &source, &module_obj, context);

    REQUIRE_STATE.with(|slot| {
        if let Some(state) = slot.borrow_mut().as_mut() {
            state.stack.pop();
            if result.is_err() {
                state.registry.remove(&canonical);
            }
        }
    });
    result?;

    module_obj.get(js_string!("exports"), context)
}

/// Evaluate a script body inside the CommonJS function wrapper.
fn eval_wrapped(
    path: &Path,
    source: &str,
    module_obj: &JsObject,
    context: &mut Context,
) -> JsResult<()> {
    let wrapper =
        format!("(function (exports, module, require, __filename, __dirname) {{\n{source}\n}})");
    let func = context.eval(Source::from_bytes(wrapper.as_bytes()))?;
    let Some(func_obj) = func.as_callable() else {
        return Err(JsNativeError::typ()
            .with_message("module wrapper did not evaluate to a function")
            .into());
    };

    let require = context
        .global_object()
        .get(js_string!("require"), context)?;
    let exports = module_obj.get(js_string!("exports"), context)?;
    let filename = JsValue::from(JsString::from(path.to_string_lossy().as_ref()));
    let dirname = JsValue::from(JsString::from(
        path.parent()
            .unwrap_or_else(|| Path::new("."))
            .to_string_lossy()
            .as_ref(),
    ));

    func_obj.call(
        &JsValue::undefined(),
        &[
            exports,
            JsValue::from(module_obj.clone()),
            require,
            filename,
            dirname,
        ],
        context,
    )?;
    Ok(())
}

/// Read a script source, first verifying it really is script-dialect.
///
/// Sources that only parse as ES modules produce the canonical host error
/// messages the fallthrough matcher keys on.
fn default_script_source(path: &Path) -> JsResult<String> {
    let source = fs::read_to_string(path).map_err(|e| {
        JsNativeError::typ().with_message(format!("Cannot read '{}': {e}", path.display()))
    })?;

    match precheck_script_syntax(&source) {
        Ok(()) => Ok(source),
        Err(message) => Err(JsNativeError::syntax().with_message(message).into()),
    }
}

fn precheck_script_syntax(source: &str) -> std::result::Result<(), String> {
    let allocator = Allocator::default();

    let script = Parser::new(&allocator, source, SourceType::cjs()).parse();
    if script.errors.is_empty() {
        return Ok(());
    }

    let module = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if module.errors.is_empty() {
        for stmt in &module.program.body {
            match stmt {
                Statement::ImportDeclaration(_) => {
                    return Err("Cannot use import statement outside a module".into());
                }
                Statement::ExportNamedDeclaration(_)
                | Statement::ExportDefaultDeclaration(_)
                | Statement::ExportAllDeclaration(_) => {
                    return Err("Unexpected token 'export'".into());
                }
                _ => {}
            }
        }
        if source.contains("import.meta") {
            return Err("Cannot use 'import.meta' outside a module".into());
        }
    }

    Err(script
        .errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; "))
}

/// Follow the `__esModule` interop convention: compiled modules hand their
/// config through `exports.default`.
fn unwrap_exports(exports: JsValue, context: &mut Context) -> JsResult<JsValue> {
    if let Some(obj) = exports.as_object() {
        let es_module = obj.get(js_string!("__esModule"), context)?;
        if es_module.to_boolean() {
            let default = obj.get(js_string!("default"), context)?;
            if !default.is_undefined() {
                return Ok(default);
            }
        }
    }
    Ok(exports)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn esm_marker_matching() {
        assert!(is_esm_syntax_error(
            "Cannot use import statement outside a module"
        ));
        assert!(is_esm_syntax_error("Unexpected token 'export'"));
        assert!(!is_esm_syntax_error("ReferenceError: foo is not defined"));
    }

    #[test]
    fn precheck_flags_module_only_syntax() {
        let err = precheck_script_syntax("export default { a: 1 };").unwrap_err();
        assert!(is_esm_syntax_error(&err));

        let err = precheck_script_syntax("import x from 'y';\nmodule.exports = x;").unwrap_err();
        assert!(is_esm_syntax_error(&err));
    }

    #[test]
    fn precheck_accepts_plain_scripts() {
        assert!(precheck_script_syntax("module.exports = { a: 1 };").is_ok());
    }

    #[test]
    fn precheck_reports_genuine_syntax_errors_verbatim() {
        let err = precheck_script_syntax("module.exports = {").unwrap_err();
        assert!(!is_esm_syntax_error(&err));
    }
}
