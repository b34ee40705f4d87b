//! The externalization heuristic.
//!
//! For SSR, a dependency either stays inside the bundler's analyzable module
//! graph or is loaded through the host's native loader at runtime because it
//! is authored as CommonJS. Classification is best-effort: an unresolvable
//! candidate is skipped, not reported, and a missed classification surfaces
//! later as an SSR runtime load failure outside this crate.

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use oxc_resolver::{ResolveOptions, Resolver};
use regex::Regex;
use rustc_hash::FxHashSet;

use vite_config::{PackageJson, SsrOptions, VITE_PACKAGE_NAME, extract_package_name};

/// CommonJS markers: export-object reference, dot/bracket export assignment,
/// or a require call.
static CJS_CONTENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bmodule\.exports\b|\bexports[.\[]|\brequire\s*\(").expect("static pattern")
});

/// Plain or module script extensions; anything else is not safely loadable
/// through the native require mechanism.
static JS_EXTENSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.[mc]?js$").expect("static pattern"));

struct SsrResolvers {
    /// "Does this package expose an analyzable entry" - module-first.
    esm: Resolver,
    /// "What file would the host's require mechanism load" - main-first.
    cjs: Resolver,
}

impl SsrResolvers {
    fn new() -> Self {
        Self {
            esm: Resolver::new(ResolveOptions {
                condition_names: vec!["node".into(), "import".into()],
                main_fields: vec!["module".into(), "main".into()],
                extensions: vec![".mjs".into(), ".js".into(), ".json".into()],
                ..ResolveOptions::default()
            }),
            cjs: Resolver::new(ResolveOptions {
                condition_names: vec!["node".into(), "require".into()],
                main_fields: vec!["main".into()],
                extensions: vec![".js".into(), ".cjs".into(), ".json".into()],
                ..ResolveOptions::default()
            }),
        }
    }
}

/// Compute the externalization set for a project.
///
/// The heuristic walk seeds from the project manifest and the known imports,
/// then the user's lists override it: `external` ids are always added,
/// `no_external` ids always removed, and the tool's own package name never
/// appears in the result.
pub fn resolve_ssr_externals(
    root: &Path,
    known_imports: &[String],
    ssr: &SsrOptions,
) -> Vec<String> {
    let mut externals = FxHashSet::default();
    let mut seen_roots = FxHashSet::default();
    let resolvers = SsrResolvers::new();

    collect_externals(
        root,
        known_imports,
        &mut externals,
        &mut seen_roots,
        &resolvers,
    );

    for id in &ssr.external {
        externals.insert(id.clone());
    }
    for id in &ssr.no_external {
        externals.remove(id);
    }
    externals.remove(VITE_PACKAGE_NAME);

    let mut result: Vec<String> = externals.into_iter().collect();
    result.sort();
    result
}

/// One pass of the recursive walk. `externals` is shared across recursive
/// calls and doubles as the memoization set; `seen_roots` bounds recursion
/// into linked package directories.
fn collect_externals(
    root: &Path,
    known_imports: &[String],
    externals: &mut FxHashSet<String>,
    seen_roots: &mut FxHashSet<PathBuf>,
    resolvers: &SsrResolvers,
) {
    if !seen_roots.insert(root.to_path_buf()) {
        return;
    }

    let manifest = root.join("package.json");
    if !manifest.is_file() {
        return;
    }
    let Ok(pkg) = PackageJson::from_path(&manifest) else {
        return;
    };

    // Dev-only tooling is assumed never meant to ship in the SSR bundle.
    for id in pkg.dev_dependencies.keys() {
        externals.insert(id.clone());
    }

    let mut candidates: Vec<String> = known_imports
        .iter()
        .map(|import| extract_package_name(import).to_string())
        .collect();
    candidates.extend(pkg.dependencies.keys().cloned());

    for id in candidates {
        if externals.contains(&id) {
            continue;
        }

        let esm_entry = resolvers
            .esm
            .resolve(root, &id)
            .ok()
            .map(|r| r.path().to_path_buf());
        let cjs_entry = resolvers
            .cjs
            .resolve(root, &id)
            .ok()
            .map(|r| r.path().to_path_buf());

        // The native loader cannot find it: skip and let the import stay in
        // the module graph.
        let Some(cjs_entry) = cjs_entry else {
            continue;
        };

        // No analyzable entry at all, but require resolves one.
        let Some(esm_entry) = esm_entry else {
            tracing::debug!("externalizing {id} (require-only entry)");
            externals.insert(id);
            continue;
        };

        if !within_node_modules(&esm_entry) {
            // Linked or workspace package: not externalized itself, but its
            // own CommonJS dependencies are, transitively.
            if let Some(pkg_root) = nearest_package_dir(&esm_entry) {
                tracing::debug!("descending into linked package {}", pkg_root.display());
                collect_externals(&pkg_root, known_imports, externals, seen_roots, resolvers);
            }
            continue;
        }

        if esm_entry != cjs_entry {
            // Dual package with a distinct CommonJS entry.
            tracing::debug!("externalizing {id} (split entry points)");
            externals.insert(id);
            continue;
        }

        let entry_str = esm_entry.to_string_lossy();
        if !JS_EXTENSION_RE.is_match(&entry_str) {
            continue;
        }

        match fs::read_to_string(&esm_entry) {
            Ok(content) if CJS_CONTENT_RE.is_match(&content) => {
                tracing::debug!("externalizing {id} (CommonJS entry content)");
                externals.insert(id);
            }
            // Unreadable or marker-free: presumed pure ESM.
            _ => {}
        }
    }
}

fn within_node_modules(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str() == "node_modules")
}

fn nearest_package_dir(entry: &Path) -> Option<PathBuf> {
    let mut current = entry.parent()?.to_path_buf();
    loop {
        if current.join("package.json").is_file() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Runtime matcher used by the SSR module loader to pick require-vs-bundle
/// per import.
///
/// True when `import_id` exactly equals a listed id, or is a deep import of
/// one and its tail has no extension or a plain script extension. Deep
/// imports into non-script subpaths (a stylesheet inside a package, say)
/// are never externalized even when the owning package is.
pub fn should_externalize_for_ssr(import_id: &str, externals: &[String]) -> bool {
    externals.iter().any(|external| {
        if import_id == external {
            return true;
        }
        if !import_id.starts_with(external.as_str())
            || import_id.as_bytes().get(external.len()) != Some(&b'/')
        {
            return false;
        }
        let has_extension = Path::new(import_id).extension().is_some();
        !has_extension || JS_EXTENSION_RE.is_match(import_id)
    })
}
