//! Heuristic line-scanning extraction for Python.
//!
//! A single pass over the lines recognizes `import` / `from ... import`,
//! `def` / `async def` and `class` headers. Block extent is indentation
//! based: a block ends at the last non-blank line before the next line
//! indented at or left of its header. Continuation lines, backslashes and
//! multi-line strings that happen to dedent are not accounted for.

use std::sync::LazyLock;

use regex::Regex;

use super::{normalize_type_name, split_top_level, ExtractOptions, Extractor};
use crate::models::{
    normalize_signature, Accessibility, ExportFact, ExportKind, ExtractedFacts, FactKind,
    ImportFact, Parameter, StructuralFact,
};

const EXTENSIONS: &[&str] = &["py", "pyi"];

/// Upper bound on lines joined while looking for the end of a header.
const MAX_HEADER_LINES: usize = 64;

static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*import\s+(.+?)\s*(?:#.*)?$").unwrap());

static FROM_IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*from\s+([A-Za-z0-9_.]+)\s+import\s+(.+?)\s*(?:#.*)?$").unwrap()
});

static DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*)(async\s+)?def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap()
});

static CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)class\s+([A-Za-z_][A-Za-z0-9_]*)\b").unwrap());

static DECORATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*@\S").unwrap());

static DOCSTRING_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s*[rRuU]?("""|''')"#).unwrap());

#[derive(Clone, Copy, Debug, Default)]
pub struct PythonExtractor;

impl Extractor for PythonExtractor {
    fn language(&self) -> &'static str {
        "python"
    }

    fn extensions(&self) -> &'static [&'static str] {
        EXTENSIONS
    }

    fn extract(&self, source: &str, options: &ExtractOptions) -> ExtractedFacts {
        python_facts(source, options)
    }
}

/// Python naming convention: `__x` (not dunder) is private, `_x` protected.
pub fn python_accessibility(name: &str) -> Accessibility {
    if name.starts_with("__") && !name.ends_with("__") {
        Accessibility::Private
    } else if name.starts_with('_') && !name.starts_with("__") {
        Accessibility::Protected
    } else {
        Accessibility::Public
    }
}

#[derive(Debug)]
enum ScopeKind {
    Class { qualified: String, exported: bool },
    Function,
}

#[derive(Debug)]
struct Scope {
    indent: usize,
    /// 0-based index of the last line of the block.
    end: usize,
    kind: ScopeKind,
}

/// A `def` or `class` header, possibly spanning several lines.
struct Header {
    /// Text up to (not including) the terminating `:`.
    text: String,
    /// Parameter list between the outermost parentheses, if any.
    params: Option<String>,
    /// Text between the closing parenthesis and the `:`.
    tail: String,
    /// 0-based index of the line holding the `:`.
    end_line: usize,
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Join lines from `start` until the header's parentheses balance and a
/// top-level `:` closes it.
fn read_header(lines: &[&str], start: usize) -> Option<Header> {
    let mut text = String::new();
    let last = (start + MAX_HEADER_LINES).min(lines.len());
    for (idx, line) in lines.iter().enumerate().take(last).skip(start) {
        if idx > start {
            text.push('\n');
        }
        text.push_str(line);
        if let Some(header) = split_header(&text, idx) {
            return Some(header);
        }
    }
    None
}

fn split_header(text: &str, end_line: usize) -> Option<Header> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut open: Option<usize> = None;
    let mut close: Option<usize> = None;
    for (idx, ch) in text.char_indices() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '#' if depth == 0 => return None,
            '(' | '[' | '{' => {
                if depth == 0 && ch == '(' && open.is_none() {
                    open = Some(idx);
                }
                depth += 1;
            }
            ')' | ']' | '}' => {
                depth -= 1;
                if depth == 0 && ch == ')' && close.is_none() && open.is_some() {
                    close = Some(idx);
                }
            }
            ':' if depth == 0 => {
                let params = match (open, close) {
                    (Some(o), Some(c)) => Some(text[o + 1..c].to_string()),
                    _ => None,
                };
                let tail = close
                    .map(|c| text[c + 1..idx].to_string())
                    .unwrap_or_default();
                return Some(Header {
                    text: text[..idx].to_string(),
                    params,
                    tail,
                    end_line,
                });
            }
            _ => {}
        }
    }
    None
}

/// Last line (0-based) of the block opened by a header at `indent` whose
/// `:` sits on `header_end`.
fn block_end(lines: &[&str], indent: usize, header_end: usize) -> usize {
    let mut end = header_end;
    for (idx, line) in lines.iter().enumerate().skip(header_end + 1) {
        if is_blank(line) {
            continue;
        }
        if indent_of(line) <= indent {
            break;
        }
        end = idx;
    }
    end
}

/// Triple-quoted string as the first statement after the header.
fn docstring(lines: &[&str], header_end: usize, block_end: usize) -> Option<String> {
    if block_end <= header_end {
        return None;
    }
    let first = (header_end + 1..=block_end).find(|&i| !is_blank(lines[i]))?;
    let line = lines[first].trim();
    let caps = DOCSTRING_OPEN_RE.captures(line)?;
    let delim = caps.get(1)?.as_str();
    let after_open = &line[caps.get(0)?.end()..];

    if let Some(pos) = after_open.find(delim) {
        return Some(after_open[..pos].trim().to_string());
    }
    let mut parts = vec![after_open.trim().to_string()];
    for line in lines.iter().take(block_end + 1).skip(first + 1) {
        let trimmed = line.trim();
        if let Some(pos) = trimmed.find(delim) {
            parts.push(trimmed[..pos].trim().to_string());
            let doc = parts.join("\n");
            return Some(doc.trim().to_string());
        }
        parts.push(trimmed.to_string());
    }
    None
}

fn parse_parameters(raw: &str, drop_receiver: bool) -> Vec<Parameter> {
    let mut params = Vec::new();
    for (index, chunk) in split_top_level(raw, ',').into_iter().enumerate() {
        let chunk = chunk.trim();
        if chunk.is_empty() || chunk == "*" || chunk == "/" {
            continue;
        }
        let mut pieces = split_top_level(chunk, '=').into_iter();
        let head = pieces.next().unwrap_or("").trim();
        let rest: Vec<&str> = pieces.collect();
        let default_value = if rest.is_empty() {
            None
        } else {
            Some(normalize_signature(&rest.join("=")))
        };

        let mut typed = split_top_level(head, ':').into_iter();
        let name = typed
            .next()
            .unwrap_or("")
            .trim()
            .trim_start_matches('*')
            .to_string();
        let type_annotation = normalize_type_name(typed.next());

        if index == 0 && drop_receiver && (name == "self" || name == "cls") {
            continue;
        }
        params.push(Parameter {
            name,
            type_annotation,
            optional: default_value.is_some(),
            default_value,
        });
    }
    params
}

fn python_facts(source: &str, options: &ExtractOptions) -> ExtractedFacts {
    let lines: Vec<&str> = source.lines().collect();
    let mut facts = ExtractedFacts::default();
    let mut scopes: Vec<Scope> = Vec::new();
    let mut idx = 0usize;

    while idx < lines.len() {
        let line = lines[idx];
        let line_no = idx as u32 + 1;

        if DECORATOR_RE.is_match(line) {
            facts.language_features.decorators = true;
            idx += 1;
            continue;
        }

        if let Some(caps) = FROM_IMPORT_RE.captures(line) {
            let module = caps[1].to_string();
            let mut names = caps[2].to_string();
            // Parenthesized lists may continue over several lines.
            if names.starts_with('(') && !names.contains(')') {
                while idx + 1 < lines.len() {
                    idx += 1;
                    let next = lines[idx].split('#').next().unwrap_or("");
                    names.push(' ');
                    names.push_str(next.trim());
                    if next.contains(')') {
                        break;
                    }
                }
            }
            let named = names
                .trim_matches(|c| c == '(' || c == ')' || c == ' ')
                .split(',')
                .filter_map(|n| n.split_whitespace().next())
                .map(|n| n.trim_matches(|c| c == '(' || c == ')').to_string())
                .filter(|n| !n.is_empty())
                .collect();
            facts.imports.push(ImportFact {
                source: module,
                named,
                line: line_no,
                ..ImportFact::default()
            });
            idx += 1;
            continue;
        }

        if let Some(caps) = IMPORT_RE.captures(line) {
            for item in caps[1].split(',') {
                let mut words = item.split_whitespace();
                let module = match words.next() {
                    Some(m) => m.to_string(),
                    None => continue,
                };
                let alias = match (words.next(), words.next()) {
                    (Some("as"), Some(alias)) => Some(alias.to_string()),
                    _ => None,
                };
                facts.imports.push(ImportFact {
                    source: module,
                    namespace: alias,
                    line: line_no,
                    ..ImportFact::default()
                });
            }
            idx += 1;
            continue;
        }

        let def_caps = DEF_RE.captures(line);
        let class_caps = if def_caps.is_none() {
            CLASS_RE.captures(line)
        } else {
            None
        };
        if def_caps.is_none() && class_caps.is_none() {
            idx += 1;
            continue;
        }

        let indent = indent_of(line);
        while scopes
            .last()
            .is_some_and(|s| s.indent >= indent || s.end < idx)
        {
            scopes.pop();
        }
        let header = match read_header(&lines, idx) {
            Some(h) => h,
            None => {
                idx += 1;
                continue;
            }
        };
        let end = block_end(&lines, indent, header.end_line);
        let doc = if options.include_doc_comments {
            docstring(&lines, header.end_line, end)
        } else {
            None
        };
        let top_level = scopes.is_empty() && indent == 0;
        let enclosing_class = match scopes.last() {
            Some(Scope {
                kind: ScopeKind::Class { qualified, exported },
                ..
            }) => Some((qualified.clone(), *exported)),
            _ => None,
        };

        if let Some(caps) = def_caps {
            let name = caps[3].to_string();
            let is_async = caps.get(2).is_some();
            let accessibility = python_accessibility(&name);
            let (kind, qualified, exported) = match &enclosing_class {
                Some((class, class_exported)) => (
                    FactKind::Method,
                    format!("{class}.{name}"),
                    *class_exported && accessibility == Accessibility::Public,
                ),
                None => (FactKind::Function, name.clone(), top_level && !name.starts_with('_')),
            };
            let parameters = parse_parameters(
                header.params.as_deref().unwrap_or(""),
                kind == FactKind::Method,
            );
            let return_type =
                normalize_type_name(header.tail.trim().strip_prefix("->").map(str::trim));
            if return_type.is_some() || parameters.iter().any(|p| p.type_annotation.is_some()) {
                facts.language_features.type_annotations = true;
            }
            if is_async {
                facts.language_features.async_functions = true;
            }
            if top_level && exported {
                facts.exports.push(ExportFact {
                    name: name.clone(),
                    kind: ExportKind::Named,
                    source: None,
                    line: line_no,
                });
            }
            facts.functions.push(StructuralFact {
                signature: normalize_signature(header.text.trim()),
                doc_comment: doc,
                parameters: Some(parameters),
                return_type,
                exported,
                is_async,
                accessibility: Some(accessibility),
                ..StructuralFact::new(qualified, kind, line_no, end as u32 + 1)
            });
            scopes.push(Scope {
                indent,
                end,
                kind: ScopeKind::Function,
            });
        } else if let Some(caps) = class_caps {
            let name = caps[2].to_string();
            let accessibility = python_accessibility(&name);
            let (qualified, exported) = match &enclosing_class {
                Some((outer, outer_exported)) => (
                    format!("{outer}.{name}"),
                    *outer_exported && accessibility == Accessibility::Public,
                ),
                None => (name.clone(), top_level && !name.starts_with('_')),
            };
            facts.language_features.classes = true;
            if top_level && exported {
                facts.exports.push(ExportFact {
                    name: name.clone(),
                    kind: ExportKind::Named,
                    source: None,
                    line: line_no,
                });
            }
            facts.functions.push(StructuralFact {
                signature: normalize_signature(header.text.trim()),
                doc_comment: doc,
                exported,
                accessibility: Some(accessibility),
                ..StructuralFact::new(qualified.clone(), FactKind::Class, line_no, end as u32 + 1)
            });
            scopes.push(Scope {
                indent,
                end,
                kind: ScopeKind::Class {
                    qualified,
                    exported,
                },
            });
        }
        // Resume after the header so nested definitions are still visited.
        idx = header.end_line + 1;
    }

    facts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(src: &str) -> ExtractedFacts {
        PythonExtractor.extract(src, &ExtractOptions::for_extension("py"))
    }

    #[test]
    fn test_private_helper_with_docstring() {
        let facts = extract("def _helper(x, y=1):\n    \"\"\"doc\"\"\"\n    return x\n");
        assert_eq!(facts.functions.len(), 1);
        let f = &facts.functions[0];
        assert_eq!(f.name, "_helper");
        assert_eq!(f.kind, FactKind::Function);
        assert!(!f.exported);
        assert_eq!(f.doc_comment.as_deref(), Some("doc"));
        assert_eq!(f.signature, "def _helper(x, y=1)");
        assert_eq!(f.accessibility, Some(Accessibility::Protected));
        assert_eq!((f.start_line, f.end_line), (1, 3));

        let params = f.parameters.as_ref().unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "x");
        assert!(!params[0].optional);
        assert_eq!(params[1].name, "y");
        assert!(params[1].optional);
        assert_eq!(params[1].default_value.as_deref(), Some("1"));
        assert!(facts.exports.is_empty());
    }

    #[test]
    fn test_class_methods_and_accessibility() {
        let src = "\
class Repo:
    \"\"\"Stores things.

    Second paragraph.
    \"\"\"

    def __init__(self, path: str):
        self.path = path

    async def load(self, key: str) -> bytes:
        return b''

    def __secret(self):
        pass

def main():
    pass
";
        let facts = extract(src);
        let names: Vec<&str> = facts.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Repo", "Repo.__init__", "Repo.load", "Repo.__secret", "main"]
        );

        let class = &facts.functions[0];
        assert_eq!(class.kind, FactKind::Class);
        assert!(class.exported);
        assert_eq!((class.start_line, class.end_line), (1, 14));
        assert_eq!(
            class.doc_comment.as_deref(),
            Some("Stores things.\n\nSecond paragraph.")
        );

        let init = &facts.functions[1];
        assert_eq!(init.kind, FactKind::Method);
        assert_eq!(init.accessibility, Some(Accessibility::Public));
        let params = init.parameters.as_ref().unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].type_annotation.as_deref(), Some("str"));

        let load = &facts.functions[2];
        assert!(load.is_async);
        assert!(load.exported);
        assert_eq!(load.return_type.as_deref(), Some("bytes"));

        let secret = &facts.functions[3];
        assert_eq!(secret.accessibility, Some(Accessibility::Private));
        assert!(!secret.exported);

        let main = &facts.functions[4];
        assert_eq!(main.kind, FactKind::Function);
        assert!(main.exported);
        assert_eq!(main.start_line, 16);

        assert!(facts.language_features.classes);
        assert!(facts.language_features.async_functions);
        assert!(facts.language_features.type_annotations);
        let exported: Vec<&str> = facts.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(exported, vec!["Repo", "main"]);
    }

    #[test]
    fn test_imports() {
        let src = "\
import os
import numpy as np, sys
from . import sibling
from .models import (
    User,
    Group as G,
)
from typing import Dict, List  # comment
";
        let facts = extract(src);
        let sources: Vec<&str> = facts.imports.iter().map(|i| i.source.as_str()).collect();
        assert_eq!(sources, vec!["os", "numpy", "sys", ".", ".models", "typing"]);
        assert_eq!(facts.imports[1].namespace.as_deref(), Some("np"));
        assert_eq!(facts.imports[4].named, vec!["User", "Group"]);
        assert_eq!(facts.imports[4].line, 4);
        assert_eq!(facts.imports[5].named, vec!["Dict", "List"]);
    }

    #[test]
    fn test_multiline_header_and_keyword_only_params() {
        let src = "\
def build(
    name: str,
    *args,
    flag: bool = False,
    **kwargs,
) -> Dict[str, int]:
    return {}
";
        let facts = extract(src);
        let f = &facts.functions[0];
        assert_eq!((f.start_line, f.end_line), (1, 7));
        assert_eq!(f.return_type.as_deref(), Some("Dict[str, int]"));
        let names: Vec<&str> = f
            .parameters
            .as_ref()
            .unwrap()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["name", "args", "flag", "kwargs"]);
        assert_eq!(
            f.parameters.as_ref().unwrap()[2].default_value.as_deref(),
            Some("False")
        );
    }

    #[test]
    fn test_nested_function_is_not_method_or_exported() {
        let src = "\
class A:
    pass

if True:
    def later():
        def inner():
            pass
";
        let facts = extract(src);
        let later = facts.functions.iter().find(|f| f.name == "later").unwrap();
        assert_eq!(later.kind, FactKind::Function);
        assert!(!later.exported);
        let inner = facts.functions.iter().find(|f| f.name == "inner").unwrap();
        assert_eq!(inner.kind, FactKind::Function);
    }

    #[test]
    fn test_decorators_and_one_liners() {
        let src = "@dataclass\nclass Point: x: int = 0\n\ndef f(): return 1\n";
        let facts = extract(src);
        assert!(facts.language_features.decorators);
        assert_eq!(facts.functions.len(), 2);
        assert_eq!(facts.functions[0].end_line, 2);
        assert_eq!(facts.functions[1].start_line, 4);
        assert_eq!(facts.functions[1].end_line, 4);
    }

    #[test]
    fn test_accessibility_convention() {
        assert_eq!(python_accessibility("__mangled"), Accessibility::Private);
        assert_eq!(python_accessibility("_internal"), Accessibility::Protected);
        assert_eq!(python_accessibility("__init__"), Accessibility::Public);
        assert_eq!(python_accessibility("public"), Accessibility::Public);
    }

    #[test]
    fn test_malformed_input_is_partial_not_fatal() {
        let facts = extract("def broken(:\n\x00\nclass\n   def ok(self):\n pass");
        for fact in &facts.functions {
            assert!(fact.end_line >= fact.start_line);
        }
    }
}
