//! SSR dependency externalization for the vite-rs engine.
//!
//! Decides, per installed dependency, whether it can stay inside the
//! bundler's analyzable module graph at SSR time or must bypass it and load
//! through the host's native module loader because it is authored as
//! CommonJS. The decision is a recursive heuristic walk over package
//! manifests and entry files, overridden by the user's `ssr.external` /
//! `ssr.noExternal` lists.

mod externals;

pub use externals::{resolve_ssr_externals, should_externalize_for_ssr};

use vite_config::ResolvedConfig;

/// Compute the externalization set for a resolved configuration.
///
/// Thin wrapper over [`resolve_ssr_externals`] wiring in the project root
/// and SSR options from the snapshot. Safe to invoke repeatedly; results
/// are memoized only within one call graph.
pub fn cjs_ssr_externals(config: &ResolvedConfig, known_imports: &[String]) -> Vec<String> {
    resolve_ssr_externals(&config.root, known_imports, &config.ssr)
}
