//! The transient compile job used for typed-dialect config files.
//!
//! Runs as a self-contained transform with no shared module state: parse,
//! strip types, regenerate. Non-relative imports (and `.json` imports) are
//! left in place for the module loader to resolve at evaluation time; the
//! compile itself never touches them.
//!
//! Two output flavors exist: plain ESM (type stripping only) for the module
//! evaluator, and a CommonJS-style script for the native loader. The CJS
//! lowering rewrites top-level import/export forms by span splicing the
//! generated source rather than rebuilding the AST.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingPatternKind, Declaration, ExportDefaultDeclarationKind, ImportDeclarationSpecifier,
    Statement,
};
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::{GetSpan, SourceType};
use oxc_transformer::{TransformOptions, Transformer};

use crate::error::{ConfigError, Result};

/// Output flavor of the compile job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranspileFormat {
    /// Plain ESM output for dynamic module evaluation.
    Esm,
    /// CommonJS-style script output for the native loader.
    Cjs,
}

/// Compile a config source to the requested flavor.
pub fn transpile_config(path: &Path, source: &str, format: TranspileFormat) -> Result<String> {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::ts());

    let parsed = Parser::new(&allocator, source, source_type).parse();
    if !parsed.errors.is_empty() {
        return Err(ConfigError::parse(path, join_diagnostics(&parsed.errors)));
    }

    let mut program = parsed.program;
    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();

    let transformed = Transformer::new(&allocator, path, &TransformOptions::default())
        .build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        return Err(ConfigError::parse(
            path,
            join_diagnostics(&transformed.errors),
        ));
    }

    let code = Codegen::new().build(&program).code;

    match format {
        TranspileFormat::Esm => Ok(code),
        TranspileFormat::Cjs => lower_to_cjs(path, &code),
    }
}

fn join_diagnostics<D: std::fmt::Display>(errors: &[D]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// Rewrite top-level module syntax into CommonJS form.
///
/// Only the forms a config file can reasonably contain are handled: import
/// declarations, `export default`, named exports (with and without a source
/// clause) and `export *`. Nested module syntax is a parse error anyway.
fn lower_to_cjs(path: &Path, code: &str) -> Result<String> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, code, SourceType::mjs()).parse();
    if !parsed.errors.is_empty() {
        return Err(ConfigError::parse(path, join_diagnostics(&parsed.errors)));
    }

    let mut edits: Vec<Edit> = Vec::new();
    let mut temp_counter = 0usize;
    let mut next_temp = || {
        temp_counter += 1;
        format!("__vite_import_{temp_counter}")
    };

    for stmt in &parsed.program.body {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                let span = decl.span();
                let source = decl.source.value.as_str();
                let mut lines = Vec::new();

                match decl.specifiers.as_ref().map(|s| s.as_slice()) {
                    None | Some([]) => {
                        lines.push(format!("require({source:?});"));
                    }
                    Some(specifiers) => {
                        let temp = next_temp();
                        lines.push(format!("const {temp} = require({source:?});"));

                        let mut named = Vec::new();
                        for spec in specifiers {
                            match spec {
                                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                                    lines.push(format!(
                                        "const {} = __viteInterop({temp});",
                                        s.local.name
                                    ));
                                }
                                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                                    lines.push(format!("const {} = {temp};", s.local.name));
                                }
                                ImportDeclarationSpecifier::ImportSpecifier(s) => {
                                    let imported = s.imported.name().to_string();
                                    if imported == s.local.name.as_str() {
                                        named.push(imported);
                                    } else {
                                        named.push(format!("{imported}: {}", s.local.name));
                                    }
                                }
                            }
                        }
                        if !named.is_empty() {
                            lines.push(format!("const {{ {} }} = {temp};", named.join(", ")));
                        }
                    }
                }

                edits.push(Edit {
                    start: span.start as usize,
                    end: span.end as usize,
                    text: lines.join("\n"),
                });
            }

            Statement::ExportDefaultDeclaration(decl) => {
                let span = decl.span();
                let text = if let Some(expr) = decl.declaration.as_expression() {
                    let expr_text = &code[expr.span().start as usize..expr.span().end as usize];
                    format!("exports.default = {expr_text};")
                } else {
                    match &decl.declaration {
                        ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                            let body =
                                &code[func.span().start as usize..func.span().end as usize];
                            match &func.id {
                                Some(id) => format!("{body}\nexports.default = {};", id.name),
                                None => format!("exports.default = ({body});"),
                            }
                        }
                        ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                            let body =
                                &code[class.span().start as usize..class.span().end as usize];
                            match &class.id {
                                Some(id) => format!("{body}\nexports.default = {};", id.name),
                                None => format!("exports.default = ({body});"),
                            }
                        }
                        _ => continue,
                    }
                };
                edits.push(Edit {
                    start: span.start as usize,
                    end: span.end as usize,
                    text,
                });
            }

            Statement::ExportNamedDeclaration(decl) => {
                let span = decl.span();
                let mut lines = Vec::new();

                if let Some(declaration) = &decl.declaration {
                    let decl_span = declaration.span();
                    let body = &code[decl_span.start as usize..decl_span.end as usize];
                    lines.push(body.to_string());
                    for name in declared_names(declaration) {
                        lines.push(format!("exports.{name} = {name};"));
                    }
                } else if let Some(source) = &decl.source {
                    let temp = next_temp();
                    lines.push(format!("const {temp} = require({:?});", source.value.as_str()));
                    for spec in &decl.specifiers {
                        lines.push(format!(
                            "exports.{} = {temp}.{};",
                            spec.exported.name(),
                            spec.local.name()
                        ));
                    }
                } else {
                    for spec in &decl.specifiers {
                        lines.push(format!(
                            "exports.{} = {};",
                            spec.exported.name(),
                            spec.local.name()
                        ));
                    }
                }

                edits.push(Edit {
                    start: span.start as usize,
                    end: span.end as usize,
                    text: lines.join("\n"),
                });
            }

            Statement::ExportAllDeclaration(decl) => {
                let span = decl.span();
                edits.push(Edit {
                    start: span.start as usize,
                    end: span.end as usize,
                    text: format!(
                        "Object.assign(exports, require({:?}));",
                        decl.source.value.as_str()
                    ),
                });
            }

            _ => {}
        }
    }

    let mut out = String::with_capacity(code.len() + 256);
    out.push_str("\"use strict\";\n");
    out.push_str("Object.defineProperty(exports, \"__esModule\", { value: true });\n");
    out.push_str("const __viteInterop = (m) => m && m.__esModule ? m.default : m;\n");

    edits.sort_by_key(|e| e.start);
    let mut cursor = 0usize;
    for edit in &edits {
        out.push_str(&code[cursor..edit.start]);
        out.push_str(&edit.text);
        cursor = edit.end;
    }
    out.push_str(&code[cursor..]);

    Ok(out)
}

fn declared_names<'a>(declaration: &'a Declaration<'a>) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(var) => var
            .declarations
            .iter()
            .filter_map(|d| match &d.id.kind {
                BindingPatternKind::BindingIdentifier(ident) => Some(ident.name.to_string()),
                _ => None,
            })
            .collect(),
        Declaration::FunctionDeclaration(func) => {
            func.id.iter().map(|id| id.name.to_string()).collect()
        }
        Declaration::ClassDeclaration(class) => {
            class.id.iter().map(|id| id.name.to_string()).collect()
        }
        _ => Vec::new(),
    }
}
