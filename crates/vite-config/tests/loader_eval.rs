//! Config-file evaluation across the four loading strategies.

use std::fs;
use std::path::Path;

use serde_json::json;
use tempfile::TempDir;
use vite_config::{Command, ConfigEnv, ConfigError, ConfigLoader, find_config_file};

fn dev_env() -> ConfigEnv {
    ConfigEnv::new(Command::Serve, "development")
}

fn write_project(dir: &Path, package_json: &str, config_name: &str, config_source: &str) {
    fs::write(dir.join("package.json"), package_json).unwrap();
    fs::write(dir.join(config_name), config_source).unwrap();
}

fn load(dir: &Path) -> Result<serde_json::Value, ConfigError> {
    let discovered = find_config_file(dir, None).expect("config file present");
    ConfigLoader::new().load(&discovered, &dev_env())
}

fn no_artifacts_left(dir: &Path) -> bool {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .all(|e| !e.file_name().to_string_lossy().contains(".timestamp-"))
}

#[test]
fn loads_commonjs_config() {
    let dir = TempDir::new().unwrap();
    write_project(
        dir.path(),
        r#"{"name":"fixture"}"#,
        "vite.config.js",
        "module.exports = { base: \"/app/\", server: { port: 3000 } };\n",
    );

    let value = load(dir.path()).unwrap();
    assert_eq!(value["base"], json!("/app/"));
    assert_eq!(value["server"]["port"], json!(3000));
}

#[test]
fn loads_esm_config_from_mjs() {
    let dir = TempDir::new().unwrap();
    write_project(
        dir.path(),
        r#"{"name":"fixture"}"#,
        "vite.config.mjs",
        "export default { mode: \"custom\", alias: [{ find: \"@\", replacement: \"/src\" }] };\n",
    );

    let value = load(dir.path()).unwrap();
    assert_eq!(value["mode"], json!("custom"));
    assert_eq!(value["alias"][0]["find"], json!("@"));
}

#[test]
fn loads_esm_config_from_type_module_package() {
    let dir = TempDir::new().unwrap();
    write_project(
        dir.path(),
        r#"{"name":"fixture","type":"module"}"#,
        "vite.config.js",
        "export default { base: \"/esm/\" };\n",
    );

    let value = load(dir.path()).unwrap();
    assert_eq!(value["base"], json!("/esm/"));
}

#[test]
fn invokes_function_configs_with_command_and_mode() {
    let dir = TempDir::new().unwrap();
    write_project(
        dir.path(),
        r#"{"name":"fixture"}"#,
        "vite.config.mjs",
        "export default ({ command, mode }) => ({ seen: command + \":\" + mode });\n",
    );

    let value = load(dir.path()).unwrap();
    assert_eq!(value["seen"], json!("serve:development"));
}

#[test]
fn loads_typescript_config_in_esm_package() {
    let dir = TempDir::new().unwrap();
    write_project(
        dir.path(),
        r#"{"name":"fixture","type":"module"}"#,
        "vite.config.ts",
        "const port: number = 4000;\nexport default { server: { port } };\n",
    );

    let value = load(dir.path()).unwrap();
    assert_eq!(value["server"]["port"], json!(4000));
    assert!(no_artifacts_left(dir.path()));
}

#[test]
fn loads_typescript_config_in_commonjs_package() {
    let dir = TempDir::new().unwrap();
    write_project(
        dir.path(),
        r#"{"name":"fixture"}"#,
        "vite.config.ts",
        "interface ServerOptions { port: number }\n\
         const server: ServerOptions = { port: 4100 };\n\
         export default { server };\n",
    );

    let value = load(dir.path()).unwrap();
    assert_eq!(value["server"]["port"], json!(4100));
}

#[test]
fn falls_through_when_script_config_uses_esm_syntax() {
    let dir = TempDir::new().unwrap();
    // .js file, no "type": "module" - classified as script dialect, but the
    // content is ESM. The native load fails with an ESM-syntax error and the
    // loader retries through the compile path.
    write_project(
        dir.path(),
        r#"{"name":"fixture"}"#,
        "vite.config.js",
        "export default { fellThrough: true };\n",
    );

    let value = load(dir.path()).unwrap();
    assert_eq!(value["fellThrough"], json!(true));
}

#[test]
fn genuine_syntax_errors_are_fatal() {
    let dir = TempDir::new().unwrap();
    write_project(
        dir.path(),
        r#"{"name":"fixture"}"#,
        "vite.config.js",
        "module.exports = {\n",
    );

    let err = load(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Eval { .. } | ConfigError::Parse { .. }));
    // The offending absolute path travels with the error.
    assert!(err.to_string().contains("vite.config.js"));
}

#[test]
fn non_object_config_result_is_fatal() {
    let dir = TempDir::new().unwrap();
    write_project(
        dir.path(),
        r#"{"name":"fixture"}"#,
        "vite.config.js",
        "module.exports = 42;\n",
    );

    let err = load(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::NotAnObject { .. }));
}

#[test]
fn transient_artifact_is_removed_even_when_evaluation_fails() {
    let dir = TempDir::new().unwrap();
    write_project(
        dir.path(),
        r#"{"name":"fixture","type":"module"}"#,
        "vite.config.ts",
        "throw new Error(\"config exploded\");\nexport default {};\n",
    );

    let err = load(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Eval { .. }));
    assert!(no_artifacts_left(dir.path()));
}

#[test]
fn relative_require_resolves_against_the_config_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("extra.js"), "module.exports = { port: 9000 };\n").unwrap();
    write_project(
        dir.path(),
        r#"{"name":"fixture"}"#,
        "vite.config.js",
        "const extra = require(\"./extra.js\");\nmodule.exports = { server: extra };\n",
    );

    let value = load(dir.path()).unwrap();
    assert_eq!(value["server"]["port"], json!(9000));
}

#[test]
fn json_imports_load_as_data() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("meta.json"), r#"{"version":"1.2.3"}"#).unwrap();
    write_project(
        dir.path(),
        r#"{"name":"fixture"}"#,
        "vite.config.js",
        "const meta = require(\"./meta.json\");\nmodule.exports = { version: meta.version };\n",
    );

    let value = load(dir.path()).unwrap();
    assert_eq!(value["version"], json!("1.2.3"));
}

#[test]
fn esm_config_can_import_relative_modules() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("shared.mjs"),
        "export const base = \"/shared/\";\n",
    )
    .unwrap();
    write_project(
        dir.path(),
        r#"{"name":"fixture"}"#,
        "vite.config.mjs",
        "import { base } from \"./shared.mjs\";\nexport default { base };\n",
    );

    let value = load(dir.path()).unwrap();
    assert_eq!(value["base"], json!("/shared/"));
}

#[test]
fn typescript_config_can_import_relative_typescript() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("port.ts"),
        "export const port: number = 4321;\n",
    )
    .unwrap();
    write_project(
        dir.path(),
        r#"{"name":"fixture","type":"module"}"#,
        "vite.config.ts",
        "import { port } from \"./port.ts\";\nexport default { server: { port } };\n",
    );

    let value = load(dir.path()).unwrap();
    assert_eq!(value["server"]["port"], json!(4321));
    assert!(no_artifacts_left(dir.path()));
}

#[test]
fn reload_is_idempotent_and_observes_edits() {
    let dir = TempDir::new().unwrap();
    write_project(
        dir.path(),
        r#"{"name":"fixture"}"#,
        "vite.config.js",
        "module.exports = { generation: 1 };\n",
    );

    let loader = ConfigLoader::new();
    let discovered = find_config_file(dir.path(), None).unwrap();

    let first = loader.load(&discovered, &dev_env()).unwrap();
    let second = loader.load(&discovered, &dev_env()).unwrap();
    assert_eq!(first, second);

    fs::write(
        dir.path().join("vite.config.js"),
        "module.exports = { generation: 2 };\n",
    )
    .unwrap();
    loader.invalidate(&discovered.path);

    let third = loader.load(&discovered, &dev_env()).unwrap();
    assert_eq!(third["generation"], json!(2));
}
