//! AST-based extraction for the TypeScript/JavaScript family.
//!
//! One pre-order pass over the tree-sitter tree records imports, exports,
//! functions (declarations and function-valued bindings), classes with their
//! methods, interfaces, and type aliases. A node counts as exported when an
//! `export_statement` encloses it, or when a local `export { name }` list
//! names it.

use std::collections::HashSet;

use tree_sitter::Node;

use super::{normalize_type_name, ExtractOptions, Extractor};
use crate::indexer::parser::{parse_source, Dialect};
use crate::models::{
    normalize_signature, Accessibility, ExportFact, ExportKind, ExtractedFacts, FactKind,
    ImportFact, Parameter, StructuralFact,
};

const EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "jsx", "mjs", "cjs"];

const FUNCTION_VALUE_KINDS: &[&str] = &[
    "arrow_function",
    "function_expression",
    "function",
    "generator_function",
];

const CLASS_KINDS: &[&str] = &["class_declaration", "abstract_class_declaration", "class"];

#[derive(Clone, Copy, Debug, Default)]
pub struct TypeScriptExtractor;

impl Extractor for TypeScriptExtractor {
    fn language(&self) -> &'static str {
        "typescript"
    }

    fn extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    fn extract(&self, source: &str, options: &ExtractOptions) -> ExtractedFacts {
        let dialect = Dialect::for_extension(&options.extension);
        let tree = match parse_source(source, dialect) {
            Some(tree) => tree,
            None => return ExtractedFacts::default(),
        };
        let mut walker = Walker {
            src: source.as_bytes(),
            options,
            facts: ExtractedFacts::default(),
            local_exports: HashSet::new(),
        };
        walker.walk(tree.root_node());
        walker.finish()
    }
}

struct Walker<'a> {
    src: &'a [u8],
    options: &'a ExtractOptions,
    facts: ExtractedFacts,
    /// Names listed in `export { ... }` without a `from` clause.
    local_exports: HashSet<String>,
}

fn line_of(row: usize) -> u32 {
    row as u32 + 1
}

fn has_child_kind(node: Node<'_>, kind: &str) -> bool {
    (0..node.child_count())
        .filter_map(|i| node.child(i))
        .any(|c| c.kind() == kind)
}

fn child_of_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    (0..node.child_count())
        .filter_map(|i| node.child(i))
        .find(|c| c.kind() == kind)
}

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    (0..node.named_child_count())
        .filter_map(|i| node.named_child(i))
        .collect()
}

fn is_exported(node: Node<'_>) -> bool {
    let mut current = node.parent();
    while let Some(n) = current {
        if n.kind() == "export_statement" {
            return true;
        }
        current = n.parent();
    }
    false
}

fn strip_quotes(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

fn clean_jsdoc(raw: &str) -> Option<String> {
    let body = raw.trim().strip_prefix("/**")?.strip_suffix("*/")?;
    let lines: Vec<&str> = body
        .lines()
        .map(|l| {
            let t = l.trim();
            t.strip_prefix('*').map(str::trim).unwrap_or(t)
        })
        .collect();
    let joined = lines.join("\n");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl<'a> Walker<'a> {
    fn text(&self, node: Node<'_>) -> &'a str {
        node.utf8_text(self.src).unwrap_or("")
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        let end = end.min(self.src.len());
        if start >= end {
            return "";
        }
        std::str::from_utf8(&self.src[start..end]).unwrap_or("")
    }

    /// Text from the start of `node` up to its body, whitespace-normalized.
    fn header(&self, node: Node<'_>, from: Node<'_>) -> String {
        let end = node
            .child_by_field_name("body")
            .map(|b| b.start_byte())
            .unwrap_or_else(|| node.end_byte());
        let raw = self.slice(from.start_byte(), end);
        normalize_signature(raw.trim().trim_end_matches(['{', ';']).trim_end())
    }

    fn walk(&mut self, root: Node<'_>) {
        // Explicit stack: deeply nested input must not exhaust the call stack.
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            self.visit(node);
            let count = node.child_count();
            for i in (0..count).rev() {
                if let Some(child) = node.child(i) {
                    stack.push(child);
                }
            }
        }
    }

    fn visit(&mut self, node: Node<'_>) {
        match node.kind() {
            "import_statement" => self.visit_import(node),
            "export_statement" => self.visit_export(node),
            "call_expression" => self.visit_call(node),
            "function_declaration" | "generator_function_declaration" => {
                self.visit_function_declaration(node)
            }
            "variable_declarator" => self.visit_declarator(node),
            "class_declaration" | "abstract_class_declaration" => self.visit_class(node),
            "method_definition" => self.visit_method(node),
            "interface_declaration" => self.visit_interface(node),
            "type_alias_declaration" => self.visit_type_alias(node),
            "jsx_element" | "jsx_self_closing_element" => {
                self.facts.language_features.jsx = true
            }
            "decorator" => self.facts.language_features.decorators = true,
            "type_parameters" | "type_arguments" => {
                self.facts.language_features.generics = true
            }
            "optional_chain" => self.facts.language_features.optional_chaining = true,
            "type_annotation" => self.facts.language_features.type_annotations = true,
            _ => {}
        }
    }

    // -- imports / exports ----------------------------------------------------

    fn visit_import(&mut self, node: Node<'_>) {
        let source = match node.child_by_field_name("source") {
            Some(s) => strip_quotes(self.text(s)),
            None => return,
        };
        let mut import = ImportFact {
            source,
            type_only: has_child_kind(node, "type"),
            line: line_of(node.start_position().row),
            ..ImportFact::default()
        };
        if let Some(clause) = child_of_kind(node, "import_clause") {
            for part in named_children(clause) {
                match part.kind() {
                    "identifier" => import.default_import = Some(self.text(part).to_string()),
                    "namespace_import" => {
                        import.namespace = named_children(part)
                            .into_iter()
                            .find(|n| n.kind() == "identifier")
                            .map(|n| self.text(n).to_string());
                    }
                    "named_imports" => {
                        for spec in named_children(part) {
                            if spec.kind() != "import_specifier" {
                                continue;
                            }
                            if let Some(name) = spec.child_by_field_name("name") {
                                import.named.push(self.text(name).to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        self.facts.imports.push(import);
    }

    /// `require("x")` and dynamic `import("x")` with a literal specifier.
    fn visit_call(&mut self, node: Node<'_>) {
        let function = match node.child_by_field_name("function") {
            Some(f) => f,
            None => return,
        };
        let is_require = function.kind() == "identifier" && self.text(function) == "require";
        if !is_require && function.kind() != "import" {
            return;
        }
        let first_arg = node
            .child_by_field_name("arguments")
            .and_then(|args| named_children(args).into_iter().next());
        if let Some(arg) = first_arg.filter(|a| a.kind() == "string") {
            self.facts.imports.push(ImportFact {
                source: strip_quotes(self.text(arg)),
                line: line_of(node.start_position().row),
                ..ImportFact::default()
            });
        }
    }

    fn visit_export(&mut self, node: Node<'_>) {
        let line = line_of(node.start_position().row);
        let source = node
            .child_by_field_name("source")
            .map(|s| strip_quotes(self.text(s)));

        if has_child_kind(node, "default") {
            let name = node
                .child_by_field_name("declaration")
                .and_then(|d| d.child_by_field_name("name"))
                .or_else(|| {
                    node.child_by_field_name("value")
                        .filter(|v| v.kind() == "identifier")
                })
                .map(|n| self.text(n).to_string())
                .unwrap_or_else(|| "default".to_string());
            self.facts.exports.push(ExportFact {
                name,
                kind: ExportKind::Default,
                source: None,
                line,
            });
            return;
        }

        if let Some(declaration) = node.child_by_field_name("declaration") {
            let mut names = Vec::new();
            if matches!(declaration.kind(), "lexical_declaration" | "variable_declaration") {
                for declarator in named_children(declaration) {
                    if let Some(name) = declarator
                        .child_by_field_name("name")
                        .filter(|n| n.kind() == "identifier")
                    {
                        names.push(self.text(name).to_string());
                    }
                }
            } else if let Some(name) = declaration.child_by_field_name("name") {
                names.push(self.text(name).to_string());
            }
            for name in names {
                self.facts.exports.push(ExportFact {
                    name,
                    kind: ExportKind::Named,
                    source: None,
                    line,
                });
            }
            return;
        }

        if let Some(clause) = child_of_kind(node, "export_clause") {
            for spec in named_children(clause) {
                if spec.kind() != "export_specifier" {
                    continue;
                }
                let local = match spec.child_by_field_name("name") {
                    Some(n) => self.text(n).to_string(),
                    None => continue,
                };
                let exported = spec
                    .child_by_field_name("alias")
                    .map(|a| self.text(a).to_string())
                    .unwrap_or_else(|| local.clone());
                if source.is_none() {
                    self.local_exports.insert(local);
                }
                self.facts.exports.push(ExportFact {
                    name: exported,
                    kind: if source.is_some() {
                        ExportKind::ReExport
                    } else {
                        ExportKind::Named
                    },
                    source: source.clone(),
                    line,
                });
            }
            return;
        }

        if let Some(ns) = child_of_kind(node, "namespace_export") {
            let name = named_children(ns)
                .into_iter()
                .next()
                .map(|n| self.text(n).to_string())
                .unwrap_or_else(|| "*".to_string());
            self.facts.exports.push(ExportFact {
                name,
                kind: ExportKind::ReExport,
                source,
                line,
            });
        } else if has_child_kind(node, "*") {
            self.facts.exports.push(ExportFact {
                name: "*".to_string(),
                kind: ExportKind::All,
                source,
                line,
            });
        }
    }

    // -- declarations ---------------------------------------------------------

    /// Leading `/** ... */` comment directly above `anchor`.
    fn doc_comment(&self, anchor: Node<'_>) -> Option<String> {
        if !self.options.include_doc_comments {
            return None;
        }
        let mut anchor = anchor;
        while let Some(parent) = anchor.parent() {
            if matches!(
                parent.kind(),
                "export_statement" | "lexical_declaration" | "variable_declaration"
            ) {
                anchor = parent;
            } else {
                break;
            }
        }
        let prev = anchor.prev_sibling()?;
        if prev.kind() != "comment" {
            return None;
        }
        if prev.end_position().row + 1 < anchor.start_position().row {
            return None;
        }
        clean_jsdoc(self.text(prev))
    }

    fn parameters(&self, function: Node<'_>) -> Vec<Parameter> {
        if let Some(single) = function.child_by_field_name("parameter") {
            return vec![Parameter::named(self.text(single))];
        }
        let list = match function.child_by_field_name("parameters") {
            Some(p) => p,
            None => return Vec::new(),
        };
        let mut params = Vec::new();
        for param in named_children(list) {
            match param.kind() {
                "required_parameter" | "optional_parameter" => {
                    let pattern = match param.child_by_field_name("pattern") {
                        Some(p) => p,
                        None => continue,
                    };
                    if pattern.kind() == "this" {
                        continue;
                    }
                    // Parameter properties (`private readonly x: T`) unwrap to the bare name.
                    let name = self.text(pattern).trim_start_matches("...").to_string();
                    let default_value = param
                        .child_by_field_name("value")
                        .map(|v| normalize_signature(self.text(v)));
                    params.push(Parameter {
                        name,
                        type_annotation: param
                            .child_by_field_name("type")
                            .and_then(|t| normalize_type_name(Some(self.text(t)))),
                        optional: param.kind() == "optional_parameter" || default_value.is_some(),
                        default_value,
                    });
                }
                "identifier" | "object_pattern" | "array_pattern" => {
                    params.push(Parameter::named(self.text(param)));
                }
                "rest_pattern" => {
                    params.push(Parameter::named(
                        self.text(param).trim_start_matches("...").to_string(),
                    ));
                }
                "assignment_pattern" => {
                    let name = param
                        .child_by_field_name("left")
                        .map(|l| self.text(l).to_string())
                        .unwrap_or_default();
                    params.push(Parameter {
                        name,
                        type_annotation: None,
                        optional: true,
                        default_value: param
                            .child_by_field_name("right")
                            .map(|r| normalize_signature(self.text(r))),
                    });
                }
                _ => {}
            }
        }
        params
    }

    fn return_type(&self, function: Node<'_>) -> Option<String> {
        function
            .child_by_field_name("return_type")
            .and_then(|t| normalize_type_name(Some(self.text(t))))
    }

    fn push_fact(&mut self, fact: StructuralFact) {
        if fact.kind == FactKind::Class {
            self.facts.language_features.classes = true;
        }
        if fact.is_async {
            self.facts.language_features.async_functions = true;
        }
        self.facts.functions.push(fact);
    }

    fn visit_function_declaration(&mut self, node: Node<'_>) {
        let name = match node.child_by_field_name("name") {
            Some(n) => self.text(n).to_string(),
            None => return,
        };
        let fact = StructuralFact {
            signature: self.header(node, node),
            doc_comment: self.doc_comment(node),
            parameters: Some(self.parameters(node)),
            return_type: self.return_type(node),
            exported: is_exported(node),
            is_async: has_child_kind(node, "async"),
            ..StructuralFact::new(
                name,
                FactKind::Function,
                line_of(node.start_position().row),
                line_of(node.end_position().row),
            )
        };
        self.push_fact(fact);
    }

    fn visit_declarator(&mut self, node: Node<'_>) {
        let value = match node.child_by_field_name("value") {
            Some(v) if FUNCTION_VALUE_KINDS.contains(&v.kind()) => v,
            _ => return,
        };
        let name = match node.child_by_field_name("name") {
            Some(n) if n.kind() == "identifier" => self.text(n).to_string(),
            _ => return,
        };
        let body_start = value
            .child_by_field_name("body")
            .map(|b| b.start_byte())
            .unwrap_or_else(|| value.end_byte());
        let raw = self.slice(node.start_byte(), body_start);
        let signature = normalize_signature(raw.trim().trim_end_matches("=>").trim_end());
        let fact = StructuralFact {
            signature,
            doc_comment: self.doc_comment(node),
            parameters: Some(self.parameters(value)),
            return_type: self.return_type(value),
            exported: is_exported(node),
            is_async: has_child_kind(value, "async"),
            ..StructuralFact::new(
                name,
                FactKind::Function,
                line_of(node.start_position().row),
                line_of(node.end_position().row),
            )
        };
        self.push_fact(fact);
    }

    fn visit_class(&mut self, node: Node<'_>) {
        let name = match node.child_by_field_name("name") {
            Some(n) => self.text(n).to_string(),
            None => return,
        };
        let fact = StructuralFact {
            signature: self.header(node, node),
            doc_comment: self.doc_comment(node),
            exported: is_exported(node),
            ..StructuralFact::new(
                name,
                FactKind::Class,
                line_of(node.start_position().row),
                line_of(node.end_position().row),
            )
        };
        self.push_fact(fact);
    }

    fn enclosing_class_name(&self, method: Node<'_>) -> Option<String> {
        let body = method.parent().filter(|p| p.kind() == "class_body")?;
        let class = body.parent().filter(|c| CLASS_KINDS.contains(&c.kind()))?;
        if let Some(name) = class.child_by_field_name("name") {
            return Some(self.text(name).to_string());
        }
        // `const Foo = class { ... }`
        class
            .parent()
            .filter(|p| p.kind() == "variable_declarator")
            .and_then(|p| p.child_by_field_name("name"))
            .map(|n| self.text(n).to_string())
    }

    fn visit_method(&mut self, node: Node<'_>) {
        let class_name = match self.enclosing_class_name(node) {
            Some(c) => c,
            None => return,
        };
        let method_name = match node.child_by_field_name("name") {
            Some(n) => self.text(n).to_string(),
            None => return,
        };
        let accessibility = match child_of_kind(node, "accessibility_modifier") {
            Some(m) => match self.text(m) {
                "private" => Accessibility::Private,
                "protected" => Accessibility::Protected,
                _ => Accessibility::Public,
            },
            None if method_name.starts_with('#') => Accessibility::Private,
            None => Accessibility::Public,
        };
        // Decorators sit inside the method node; start the signature after them.
        let sig_start = (0..node.child_count())
            .filter_map(|i| node.child(i))
            .find(|c| c.kind() != "decorator" && c.kind() != "comment")
            .unwrap_or(node);
        let fact = StructuralFact {
            signature: self.header(node, sig_start),
            doc_comment: self.doc_comment(node),
            parameters: Some(self.parameters(node)),
            return_type: self.return_type(node),
            exported: is_exported(node),
            is_async: has_child_kind(node, "async"),
            accessibility: Some(accessibility),
            ..StructuralFact::new(
                format!("{class_name}.{method_name}"),
                FactKind::Method,
                line_of(node.start_position().row),
                line_of(node.end_position().row),
            )
        };
        self.push_fact(fact);
    }

    fn visit_interface(&mut self, node: Node<'_>) {
        let name = match node.child_by_field_name("name") {
            Some(n) => self.text(n).to_string(),
            None => return,
        };
        let fact = StructuralFact {
            signature: self.header(node, node),
            doc_comment: self.doc_comment(node),
            exported: is_exported(node),
            ..StructuralFact::new(
                name,
                FactKind::Interface,
                line_of(node.start_position().row),
                line_of(node.end_position().row),
            )
        };
        self.push_fact(fact);
    }

    fn visit_type_alias(&mut self, node: Node<'_>) {
        let name = match node.child_by_field_name("name") {
            Some(n) => self.text(n).to_string(),
            None => return,
        };
        let signature = normalize_signature(self.text(node).trim().trim_end_matches(';'));
        let fact = StructuralFact {
            signature,
            doc_comment: self.doc_comment(node),
            exported: is_exported(node),
            ..StructuralFact::new(
                name,
                FactKind::TypeAlias,
                line_of(node.start_position().row),
                line_of(node.end_position().row),
            )
        };
        self.push_fact(fact);
    }

    fn finish(mut self) -> ExtractedFacts {
        if !self.local_exports.is_empty() {
            let exported_classes: HashSet<String> = self
                .facts
                .functions
                .iter()
                .filter(|f| f.kind == FactKind::Class && self.local_exports.contains(&f.name))
                .map(|f| f.name.clone())
                .collect();
            for fact in &mut self.facts.functions {
                let owner = match fact.kind {
                    FactKind::Method => fact.name.split('.').next().unwrap_or(""),
                    _ => fact.name.as_str(),
                };
                if self.local_exports.contains(owner)
                    && (fact.kind != FactKind::Method || exported_classes.contains(owner))
                {
                    fact.exported = true;
                }
            }
        }
        self.facts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(src: &str, ext: &str) -> ExtractedFacts {
        TypeScriptExtractor.extract(src, &ExtractOptions::for_extension(ext))
    }

    #[test]
    fn test_exported_class_with_async_method() {
        let facts = extract("export class Foo { async bar(x: number) {} }", "ts");
        assert_eq!(facts.functions.len(), 2);

        let class = &facts.functions[0];
        assert_eq!(class.name, "Foo");
        assert_eq!(class.kind, FactKind::Class);
        assert!(class.exported);

        let method = &facts.functions[1];
        assert_eq!(method.name, "Foo.bar");
        assert_eq!(method.kind, FactKind::Method);
        assert!(method.is_async);
        assert!(method.exported);
        assert_eq!(method.signature, "async bar(x: number)");
        let params = method.parameters.as_ref().unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].name, "x");
        assert_eq!(params[0].type_annotation.as_deref(), Some("number"));
        assert!(facts.language_features.classes);
        assert!(facts.language_features.async_functions);
    }

    #[test]
    fn test_imports_default_named_namespace() {
        let src = "\
import React from 'react';
import { useState, useEffect as effect } from \"react\";
import * as path from 'path';
import type { Config } from './config';
import './side-effect';
const fs = require('fs');
";
        let facts = extract(src, "tsx");
        assert_eq!(facts.imports.len(), 6);
        assert_eq!(facts.imports[0].source, "react");
        assert_eq!(facts.imports[0].default_import.as_deref(), Some("React"));
        assert_eq!(facts.imports[1].named, vec!["useState", "useEffect"]);
        assert_eq!(facts.imports[2].namespace.as_deref(), Some("path"));
        assert!(facts.imports[3].type_only);
        assert_eq!(facts.imports[3].source, "./config");
        assert_eq!(facts.imports[4].source, "./side-effect");
        assert_eq!(facts.imports[5].source, "fs");
        assert_eq!(facts.imports[5].line, 6);
    }

    #[test]
    fn test_arrow_binding_and_function_declaration() {
        let src = "\
/** Adds numbers. */
export const add = (a: number, b = 2): number => a + b;

function helper(items?: string[]) {
  return items;
}
";
        let facts = extract(src, "ts");
        assert_eq!(facts.functions.len(), 2);

        let add = &facts.functions[0];
        assert_eq!(add.name, "add");
        assert_eq!(add.kind, FactKind::Function);
        assert!(add.exported);
        assert_eq!(add.doc_comment.as_deref(), Some("Adds numbers."));
        assert_eq!(add.return_type.as_deref(), Some("number"));
        let params = add.parameters.as_ref().unwrap();
        assert_eq!(params[0].name, "a");
        assert!(!params[0].optional);
        assert_eq!(params[1].name, "b");
        assert!(params[1].optional);
        assert_eq!(params[1].default_value.as_deref(), Some("2"));
        assert_eq!(add.start_line, 2);

        let helper = &facts.functions[1];
        assert_eq!(helper.name, "helper");
        assert!(!helper.exported);
        assert_eq!(helper.start_line, 4);
        assert_eq!(helper.end_line, 6);
        assert!(helper.parameters.as_ref().unwrap()[0].optional);
    }

    #[test]
    fn test_constructor_parameter_properties_and_modifiers() {
        let src = "\
class Service {
  constructor(private readonly repo: Repo, public name: string) {}
  protected load(): void {}
  #secret() {}
}
";
        let facts = extract(src, "ts");
        let ctor = facts
            .functions
            .iter()
            .find(|f| f.name == "Service.constructor")
            .unwrap();
        let names: Vec<&str> = ctor
            .parameters
            .as_ref()
            .unwrap()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["repo", "name"]);

        let load = facts.functions.iter().find(|f| f.name == "Service.load").unwrap();
        assert_eq!(load.accessibility, Some(Accessibility::Protected));
        assert_eq!(load.return_type.as_deref(), Some("void"));
        assert!(!load.exported);

        let secret = facts.functions.iter().find(|f| f.name == "Service.#secret").unwrap();
        assert_eq!(secret.accessibility, Some(Accessibility::Private));
    }

    #[test]
    fn test_interfaces_type_aliases_and_exports() {
        let src = "\
export interface Config<T> {
  value: T;
}
type Id = string | number;
function local() {}
export { local, Id as Identifier };
export * from './all';
export { x as y } from './re';
export default Config;
";
        let facts = extract(src, "ts");
        let iface = &facts.functions[0];
        assert_eq!(iface.kind, FactKind::Interface);
        assert!(iface.exported);
        assert_eq!(iface.signature, "interface Config<T>");

        let alias = facts.functions.iter().find(|f| f.name == "Id").unwrap();
        assert_eq!(alias.kind, FactKind::TypeAlias);
        assert_eq!(alias.signature, "type Id = string | number");
        assert!(alias.exported);

        let local = facts.functions.iter().find(|f| f.name == "local").unwrap();
        assert!(local.exported);

        let kinds: Vec<(String, ExportKind)> = facts
            .exports
            .iter()
            .map(|e| (e.name.clone(), e.kind))
            .collect();
        assert!(kinds.contains(&("Config".to_string(), ExportKind::Named)));
        assert!(kinds.contains(&("local".to_string(), ExportKind::Named)));
        assert!(kinds.contains(&("Identifier".to_string(), ExportKind::Named)));
        assert!(kinds.contains(&("*".to_string(), ExportKind::All)));
        assert!(kinds.contains(&("y".to_string(), ExportKind::ReExport)));
        assert!(kinds.contains(&("Config".to_string(), ExportKind::Default)));
        assert!(facts.language_features.generics);
    }

    #[test]
    fn test_language_features_jsx_and_optional_chaining() {
        let src = "\
@Component()
class View {}
export const App = () => <div>{user?.name}</div>;
";
        let facts = extract(src, "tsx");
        assert!(facts.language_features.jsx);
        assert!(facts.language_features.optional_chaining);
        assert!(facts.language_features.decorators);
    }

    #[test]
    fn test_signatures_are_whitespace_normalized() {
        let a = extract("function  f(a:   number,\n   b: string)  {}", "ts");
        let b = extract("function f(a: number, b: string) {}", "ts");
        assert_eq!(a.functions[0].signature, b.functions[0].signature);
    }

    #[test]
    fn test_garbage_input_never_panics() {
        for src in ["", "}}}{{{", "class { (", "export default", "\u{0}\u{1}", "import from;"] {
            let facts = extract(src, "tsx");
            for fact in &facts.functions {
                assert!(fact.start_line >= 1 && fact.end_line >= fact.start_line);
            }
        }
    }

    #[test]
    fn test_object_literal_methods_are_not_class_methods() {
        let facts = extract("const api = { get() { return 1; } };", "js");
        assert!(facts.functions.iter().all(|f| f.kind != FactKind::Method));
    }
}
