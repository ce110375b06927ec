//! Per-language structural-fact extractors.
//!
//! Each extractor is a stateless strategy behind the [`Extractor`] trait:
//! `typescript` walks a tree-sitter AST, `python` and `go` scan lines with
//! regexes. Extractors are total: malformed input yields partial or empty
//! facts, never an error.

pub mod go;
pub mod python;
pub mod typescript;

pub use go::GoExtractor;
pub use python::PythonExtractor;
pub use typescript::TypeScriptExtractor;

use crate::models::ExtractedFacts;

/// Per-call extraction knobs.
#[derive(Clone, Debug)]
pub struct ExtractOptions {
    /// Extension of the file being extracted, lowercased, without the dot.
    /// Selects the grammar dialect where an extractor has more than one.
    pub extension: String,
    pub include_doc_comments: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            extension: String::new(),
            include_doc_comments: true,
        }
    }
}

impl ExtractOptions {
    pub fn for_extension(extension: &str) -> Self {
        Self {
            extension: normalize_extension(extension),
            ..Self::default()
        }
    }
}

pub trait Extractor: Send + Sync {
    /// Language name reported for diagnostics.
    fn language(&self) -> &'static str;

    /// Extensions (lowercase, no dot) this extractor handles.
    fn extensions(&self) -> &'static [&'static str];

    fn supports(&self, extension: &str) -> bool {
        let ext = normalize_extension(extension);
        self.extensions().iter().any(|e| *e == ext)
    }

    fn extract(&self, source: &str, options: &ExtractOptions) -> ExtractedFacts;
}

pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

/// Normalize a type name: drop a leading `:` or `->`, trailing `;`/`:`, and
/// collapse whitespace. Returns `None` if nothing is left.
pub fn normalize_type_name(type_name: Option<&str>) -> Option<String> {
    let raw = type_name?.trim();
    let raw = raw
        .strip_prefix("->")
        .or_else(|| raw.strip_prefix(':'))
        .unwrap_or(raw);
    let normalized = raw.trim().trim_end_matches([';', ':', '{']).trim();
    if normalized.is_empty() {
        None
    } else {
        Some(crate::models::normalize_signature(normalized))
    }
}

/// Split `input` on `sep`, ignoring separators nested in brackets or quotes.
pub fn split_top_level(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0usize;

    for (idx, ch) in input.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' | '`' => quote = Some(ch),
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' | '>' => depth = (depth - 1).max(0),
            c if c == sep && depth == 0 => {
                parts.push(&input[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_type_name_trims() {
        assert_eq!(
            normalize_type_name(Some("  string; ")),
            Some("string".to_string())
        );
        assert_eq!(
            normalize_type_name(Some(": Promise<  User >")),
            Some("Promise< User >".to_string())
        );
        assert_eq!(normalize_type_name(Some("-> int")), Some("int".to_string()));
    }

    #[test]
    fn test_normalize_type_name_empty() {
        assert_eq!(normalize_type_name(None), None);
        assert_eq!(normalize_type_name(Some("  ")), None);
    }

    #[test]
    fn test_split_top_level_respects_nesting() {
        let parts = split_top_level("a, b: Dict[str, int] = {}, c='x,y'", ',');
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].trim(), "b: Dict[str, int] = {}");
        assert_eq!(parts[2].trim(), "c='x,y'");
    }

    #[test]
    fn test_supports_normalizes_extension() {
        let ext = PythonExtractor;
        assert!(ext.supports(".PY"));
        assert!(!ext.supports("rb"));
    }
}
