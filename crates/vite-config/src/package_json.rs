//! Package manifest parsing.
//!
//! Only the fields this engine consumes are modeled: `name`, `type`,
//! `dependencies` and `devDependencies`. Everything else in package.json is
//! ignored.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Parsed package.json, reduced to the dependency-related fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    pub name: Option<String>,

    /// The `"type"` field; `"module"` marks the package as ESM.
    #[serde(default, rename = "type")]
    pub module_type: Option<String>,

    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: BTreeMap<String, String>,

    /// File path this was loaded from.
    #[serde(skip)]
    pub path: PathBuf,
}

impl PackageJson {
    /// Load a package.json from an exact path.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut pkg: PackageJson =
            serde_json::from_str(&content).map_err(|e| ConfigError::PackageJson {
                file: path.to_path_buf(),
                message: e.to_string(),
            })?;
        pkg.path = path.to_path_buf();
        Ok(pkg)
    }

    /// Find the nearest package.json, searching upward from `start_dir`.
    ///
    /// Returns `None` when no manifest exists anywhere up the tree; callers
    /// treat that as "no package context", not as an error.
    pub fn find_from_dir(start_dir: &Path) -> Option<Result<Self>> {
        let mut current = start_dir.to_path_buf();
        loop {
            let candidate = current.join("package.json");
            if candidate.is_file() {
                return Some(Self::from_path(&candidate));
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Whether the `"type"` field declares native ES modules.
    pub fn is_esm(&self) -> bool {
        self.module_type.as_deref() == Some("module")
    }
}

/// Extract the base package name from an npm import specifier.
///
/// Handles scoped packages:
/// - `@foo/bar` -> `@foo/bar`
/// - `@foo/bar/baz` -> `@foo/bar`
/// - `lodash` -> `lodash`
/// - `lodash/fp` -> `lodash`
pub fn extract_package_name(specifier: &str) -> &str {
    if specifier.is_empty() {
        return specifier;
    }

    if specifier.starts_with('@') {
        if let Some(first_slash) = specifier.find('/') {
            if let Some(second_slash) = specifier[first_slash + 1..].find('/') {
                return &specifier[..first_slash + 1 + second_slash];
            }
        }
        return specifier;
    }

    match specifier.find('/') {
        Some(idx) => &specifier[..idx],
        None => specifier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parses_dependency_fields() {
        let json = r#"{
            "name": "fixture",
            "type": "module",
            "dependencies": { "react": "^18.0.0" },
            "devDependencies": { "mocha": "^10.0.0" }
        }"#;

        let pkg: PackageJson = serde_json::from_str(json).unwrap();
        assert_eq!(pkg.name.as_deref(), Some("fixture"));
        assert!(pkg.is_esm());
        assert!(pkg.dependencies.contains_key("react"));
        assert!(pkg.dev_dependencies.contains_key("mocha"));
    }

    #[test]
    fn find_from_dir_walks_upward() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("package.json"), r#"{"name":"up"}"#).unwrap();
        let nested = dir.path().join("src").join("deep");
        std::fs::create_dir_all(&nested).unwrap();

        let pkg = PackageJson::find_from_dir(&nested).unwrap().unwrap();
        assert_eq!(pkg.name.as_deref(), Some("up"));
    }

    #[test]
    fn find_from_dir_misses_cleanly() {
        let dir = TempDir::new().unwrap();
        assert!(PackageJson::find_from_dir(dir.path()).is_none());
    }

    #[test]
    fn extracts_package_names() {
        assert_eq!(extract_package_name("@babel/core"), "@babel/core");
        assert_eq!(extract_package_name("@babel/core/lib/index"), "@babel/core");
        assert_eq!(extract_package_name("lodash"), "lodash");
        assert_eq!(extract_package_name("lodash/fp"), "lodash");
        assert_eq!(extract_package_name(""), "");
        assert_eq!(extract_package_name("@org"), "@org");
    }
}
