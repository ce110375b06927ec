//! Heuristic line-scanning extraction for Go.
//!
//! Functions, methods (`Recv.Name`), type declarations and imports are
//! matched per line; a declaration's extent runs to the line where its
//! braces balance.

use std::sync::LazyLock;

use regex::Regex;

use super::{normalize_type_name, split_top_level, ExtractOptions, Extractor};
use crate::models::{
    normalize_signature, Accessibility, ExportFact, ExportKind, ExtractedFacts, FactKind,
    ImportFact, Parameter, StructuralFact,
};

const EXTENSIONS: &[&str] = &["go"];

static IMPORT_SINGLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*import\s+(?:([A-Za-z_.][A-Za-z0-9_]*)\s+)?"([^"]+)""#).unwrap()
});

static IMPORT_BLOCK_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s*\(").unwrap());

static IMPORT_BLOCK_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*(?:([A-Za-z_.][A-Za-z0-9_]*)\s+)?"([^"]+)""#).unwrap());

static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^type\s+([A-Za-z_][A-Za-z0-9_]*)\s*(\[[^\]]*\])?\s*(=\s*)?([A-Za-z_*\[]\S*)?")
        .unwrap()
});

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^func\s+([A-Za-z_][A-Za-z0-9_]*)\s*(\[[^\]]*\])?\s*\(").unwrap()
});

static METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^func\s*\(([^)]*)\)\s*([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap()
});

#[derive(Clone, Copy, Debug, Default)]
pub struct GoExtractor;

impl Extractor for GoExtractor {
    fn language(&self) -> &'static str {
        "go"
    }

    fn extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    fn extract(&self, source: &str, options: &ExtractOptions) -> ExtractedFacts {
        go_facts(source, options)
    }
}

/// Exported names start with an uppercase letter.
fn go_accessibility(name: &str) -> Accessibility {
    if name.starts_with(|c: char| c.is_uppercase()) {
        Accessibility::Public
    } else {
        Accessibility::Private
    }
}

/// Index of the `)` matching the `(` at `open`.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (idx, ch) in text[open..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Go groups names before a shared type (`a, b int`); untyped names take
/// the type of the next typed parameter.
fn go_parameters(raw: &str) -> Vec<Parameter> {
    let mut params: Vec<Parameter> = Vec::new();
    let mut pending: Vec<usize> = Vec::new();
    for chunk in split_top_level(raw, ',') {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        let mut parts = chunk.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or("").trim_start_matches("...").to_string();
        let type_annotation = normalize_type_name(parts.next());
        if type_annotation.is_some() {
            for idx in pending.drain(..) {
                params[idx].type_annotation = type_annotation.clone();
            }
        } else {
            pending.push(params.len());
        }
        params.push(Parameter {
            name,
            type_annotation,
            optional: false,
            default_value: None,
        });
    }
    params
}

/// Last line (0-based) of a declaration starting at `start`.
fn brace_end(lines: &[&str], start: usize) -> usize {
    let mut depth = 0i32;
    let mut opened = false;
    for (idx, line) in lines.iter().enumerate().skip(start) {
        let code = line.split("//").next().unwrap_or("");
        let mut in_string = false;
        for ch in code.chars() {
            match ch {
                '"' | '`' => in_string = !in_string,
                '{' if !in_string => {
                    depth += 1;
                    opened = true;
                }
                '}' if !in_string => depth -= 1,
                _ => {}
            }
        }
        if !opened || depth <= 0 {
            return idx;
        }
    }
    lines.len().saturating_sub(1)
}

/// Consecutive `//` comment lines directly above `start`.
fn leading_comment(lines: &[&str], start: usize) -> Option<String> {
    let mut collected = Vec::new();
    let mut idx = start;
    while idx > 0 {
        idx -= 1;
        match lines[idx].trim().strip_prefix("//") {
            Some(text) => collected.push(text.trim()),
            None => break,
        }
    }
    if collected.is_empty() {
        return None;
    }
    collected.reverse();
    Some(collected.join("\n"))
}

/// Header text up to the opening brace of the body.
fn header_text(lines: &[&str], start: usize, end: usize) -> String {
    let joined = lines[start..=end].join("\n");
    let head = joined.split('{').next().unwrap_or(&joined);
    normalize_signature(head.trim())
}

fn go_facts(source: &str, options: &ExtractOptions) -> ExtractedFacts {
    let lines: Vec<&str> = source.lines().collect();
    let mut facts = ExtractedFacts::default();
    let mut import_block = false;
    let mut idx = 0usize;

    while idx < lines.len() {
        let line = lines[idx];
        let line_no = idx as u32 + 1;

        if IMPORT_BLOCK_START_RE.is_match(line) {
            import_block = true;
            idx += 1;
            continue;
        }
        if import_block {
            if line.trim() == ")" {
                import_block = false;
            } else if let Some(caps) = IMPORT_BLOCK_LINE_RE.captures(line) {
                facts.imports.push(import_fact(&caps, line_no));
            }
            idx += 1;
            continue;
        }
        if let Some(caps) = IMPORT_SINGLE_RE.captures(line) {
            facts.imports.push(import_fact(&caps, line_no));
            idx += 1;
            continue;
        }

        let doc = || {
            if options.include_doc_comments {
                leading_comment(&lines, idx)
            } else {
                None
            }
        };

        if let Some(caps) = TYPE_RE.captures(line) {
            let name = caps[1].to_string();
            let underlying = caps.get(4).map(|m| m.as_str()).unwrap_or("");
            let kind = if underlying.starts_with("struct") {
                facts.language_features.classes = true;
                FactKind::Class
            } else if underlying.starts_with("interface") {
                FactKind::Interface
            } else {
                FactKind::TypeAlias
            };
            if caps.get(2).is_some() {
                facts.language_features.generics = true;
            }
            let end = brace_end(&lines, idx);
            let accessibility = go_accessibility(&name);
            let exported = accessibility == Accessibility::Public;
            if exported {
                facts.exports.push(ExportFact {
                    name: name.clone(),
                    kind: ExportKind::Named,
                    source: None,
                    line: line_no,
                });
            }
            facts.functions.push(StructuralFact {
                signature: header_text(&lines, idx, idx),
                doc_comment: doc(),
                exported,
                accessibility: Some(accessibility),
                ..StructuralFact::new(name, kind, line_no, end as u32 + 1)
            });
            idx += 1;
            continue;
        }

        let (receiver, name, params_open) = if let Some(caps) = METHOD_RE.captures(line) {
            let receiver = caps[1]
                .split_whitespace()
                .last()
                .map(|r| r.trim_start_matches('*'))
                .map(|r| r.split('[').next().unwrap_or(r).to_string())
                .unwrap_or_else(|| "Receiver".to_string());
            let open = caps.get(0).map(|m| m.end() - 1).unwrap_or(0);
            (Some(receiver), caps[2].to_string(), open)
        } else if let Some(caps) = FUNCTION_RE.captures(line) {
            if caps.get(2).is_some() {
                facts.language_features.generics = true;
            }
            let open = caps.get(0).map(|m| m.end() - 1).unwrap_or(0);
            (None, caps[1].to_string(), open)
        } else {
            idx += 1;
            continue;
        };

        let end = brace_end(&lines, idx);
        let header = header_text(&lines, idx, end);
        let (parameters, return_type) = match matching_paren(line, params_open) {
            Some(close) => {
                let rest = line[close + 1..].split('{').next().unwrap_or("").trim();
                (
                    go_parameters(&line[params_open + 1..close]),
                    normalize_type_name(Some(rest)),
                )
            }
            None => (Vec::new(), None),
        };
        if parameters.iter().any(|p| p.type_annotation.is_some()) {
            facts.language_features.type_annotations = true;
        }
        let accessibility = go_accessibility(&name);
        let (kind, qualified, exported) = match receiver {
            Some(recv) => {
                let exported =
                    accessibility == Accessibility::Public && go_accessibility(&recv) == Accessibility::Public;
                (FactKind::Method, format!("{recv}.{name}"), exported)
            }
            None => {
                let exported = accessibility == Accessibility::Public;
                if exported {
                    facts.exports.push(ExportFact {
                        name: name.clone(),
                        kind: ExportKind::Named,
                        source: None,
                        line: line_no,
                    });
                }
                (FactKind::Function, name, exported)
            }
        };
        facts.functions.push(StructuralFact {
            signature: header,
            doc_comment: doc(),
            parameters: Some(parameters),
            return_type,
            exported,
            accessibility: Some(accessibility),
            ..StructuralFact::new(qualified, kind, line_no, end as u32 + 1)
        });
        idx = end + 1;
    }

    facts
}

fn import_fact(caps: &regex::Captures<'_>, line: u32) -> ImportFact {
    let alias = caps.get(1).map(|m| m.as_str().to_string());
    let (default_import, namespace) = match alias.as_deref() {
        Some(".") => (None, Some(".".to_string())),
        Some("_") | None => (None, None),
        Some(_) => (alias, None),
    };
    ImportFact {
        source: caps[2].to_string(),
        default_import,
        namespace,
        line,
        ..ImportFact::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(src: &str) -> ExtractedFacts {
        GoExtractor.extract(src, &ExtractOptions::for_extension("go"))
    }

    #[test]
    fn test_imports_single_and_block() {
        let src = "\
package main

import \"fmt\"
import (
\tlog \"github.com/sirupsen/logrus\"
\t\"./local\"
\t_ \"embed\"
)
";
        let facts = extract(src);
        let sources: Vec<&str> = facts.imports.iter().map(|i| i.source.as_str()).collect();
        assert_eq!(sources, vec!["fmt", "github.com/sirupsen/logrus", "./local", "embed"]);
        assert_eq!(facts.imports[1].default_import.as_deref(), Some("log"));
        assert_eq!(facts.imports[0].line, 3);
    }

    #[test]
    fn test_functions_methods_and_types() {
        let src = "\
package store

// Store keeps rows.
type Store struct {
\trows []Row
}

type reader interface {
\tRead() error
}

type ID = string

// Get returns one row.
func (s *Store) Get(id, key string, limit int) (Row, error) {
\treturn Row{}, nil
}

func helper() {}
";
        let facts = extract(src);
        let names: Vec<&str> = facts.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["Store", "reader", "ID", "Store.Get", "helper"]);

        let store = &facts.functions[0];
        assert_eq!(store.kind, FactKind::Class);
        assert_eq!((store.start_line, store.end_line), (4, 6));
        assert_eq!(store.doc_comment.as_deref(), Some("Store keeps rows."));
        assert!(store.exported);

        let reader = &facts.functions[1];
        assert_eq!(reader.kind, FactKind::Interface);
        assert!(!reader.exported);
        assert_eq!(facts.functions[2].kind, FactKind::TypeAlias);

        let get = &facts.functions[3];
        assert_eq!(get.kind, FactKind::Method);
        assert!(get.exported);
        assert_eq!((get.start_line, get.end_line), (15, 17));
        assert_eq!(get.return_type.as_deref(), Some("(Row, error)"));
        assert_eq!(get.signature, "func (s *Store) Get(id, key string, limit int) (Row, error)");
        let params = get.parameters.as_ref().unwrap();
        assert_eq!(params.len(), 3);
        assert_eq!(params[0].type_annotation.as_deref(), Some("string"));
        assert_eq!(params[2].type_annotation.as_deref(), Some("int"));

        let helper = &facts.functions[4];
        assert_eq!(helper.accessibility, Some(Accessibility::Private));
        assert_eq!(helper.end_line, helper.start_line);

        let exported: Vec<&str> = facts.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(exported, vec!["Store", "ID"]);
    }

    #[test]
    fn test_generic_function() {
        let facts = extract("func Map[T any](xs []T) []T {\n\treturn xs\n}\n");
        assert!(facts.language_features.generics);
        assert_eq!(facts.functions[0].name, "Map");
        assert_eq!(facts.functions[0].end_line, 3);
    }
}
