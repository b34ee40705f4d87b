//! Config file discovery and module-format classification.
//!
//! Discovery probes conventional file names in a fixed order; finding nothing
//! is not an error. Classification decides which loading strategy applies
//! before anything is read or compiled.

use std::path::{Path, PathBuf};

use crate::package_json::PackageJson;

/// Probe order for implicit discovery. Exact names are part of the contract.
pub const CONFIG_FILE_NAMES: [&str; 3] = ["vite.config.js", "vite.config.mjs", "vite.config.ts"];

/// A discovered config file together with its format classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredConfig {
    /// Absolute path of the config file.
    pub path: PathBuf,
    pub format: ModuleFormat,
}

/// Module-format classification of a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleFormat {
    /// Whether the file participates in the native ES module graph.
    pub is_esm: bool,
    /// Whether the file is in the typed dialect and requires compilation.
    pub is_typescript: bool,
}

/// Locate the config file for `root`.
///
/// An explicit path wins and is only absolutized; otherwise the conventional
/// names are probed in order and the first existing file is used. `None`
/// means no config file exists, which callers treat as an empty config.
pub fn find_config_file(root: &Path, explicit: Option<&Path>) -> Option<DiscoveredConfig> {
    let path = match explicit {
        Some(p) => {
            let abs = if p.is_absolute() {
                p.to_path_buf()
            } else {
                root.join(p)
            };
            abs.is_file().then_some(abs)?
        }
        None => CONFIG_FILE_NAMES
            .iter()
            .map(|name| root.join(name))
            .find(|p| p.is_file())?,
    };

    let format = classify(&path);
    tracing::debug!(
        "using config file {} (esm: {}, typescript: {})",
        path.display(),
        format.is_esm,
        format.is_typescript
    );
    Some(DiscoveredConfig { path, format })
}

/// Classify a config file's module format.
///
/// `.mjs` always forces ESM and `.ts` always requires compilation; for plain
/// `.js` the nearest package.json's `"type"` field decides.
pub fn classify(path: &Path) -> ModuleFormat {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let is_typescript = ext == "ts";
    let is_esm = match ext {
        "mjs" => true,
        _ => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            match PackageJson::find_from_dir(dir) {
                Some(Ok(pkg)) => pkg.is_esm(),
                // Unreadable or absent manifest: assume a script-dialect host
                _ => false,
            }
        }
    };

    ModuleFormat {
        is_esm,
        is_typescript,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn probes_in_fixed_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("vite.config.mjs"), "export default {}").unwrap();
        fs::write(dir.path().join("vite.config.ts"), "export default {}").unwrap();

        let found = find_config_file(dir.path(), None).unwrap();
        assert!(found.path.ends_with("vite.config.mjs"));

        fs::write(dir.path().join("vite.config.js"), "module.exports = {}").unwrap();
        let found = find_config_file(dir.path(), None).unwrap();
        assert!(found.path.ends_with("vite.config.js"));
    }

    #[test]
    fn discovery_miss_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(find_config_file(dir.path(), None).is_none());
    }

    #[test]
    fn explicit_path_is_absolutized() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("custom.config.js"), "module.exports = {}").unwrap();

        let found = find_config_file(dir.path(), Some(Path::new("custom.config.js"))).unwrap();
        assert!(found.path.is_absolute());
        assert!(found.path.ends_with("custom.config.js"));
    }

    #[test]
    fn mjs_forces_esm_and_ts_forces_compilation() {
        let dir = TempDir::new().unwrap();
        // package.json says commonjs, .mjs overrides it
        fs::write(dir.path().join("package.json"), r#"{"type":"commonjs"}"#).unwrap();

        let fmt = classify(&dir.path().join("vite.config.mjs"));
        assert!(fmt.is_esm);
        assert!(!fmt.is_typescript);

        let fmt = classify(&dir.path().join("vite.config.ts"));
        assert!(fmt.is_typescript);
        assert!(!fmt.is_esm);
    }

    #[test]
    fn package_type_module_marks_js_as_esm() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"type":"module"}"#).unwrap();

        let fmt = classify(&dir.path().join("vite.config.js"));
        assert!(fmt.is_esm);
    }
}
