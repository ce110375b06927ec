//! tree-sitter parsing for the AST-based extractors.

use tracing::warn;

/// Grammar variant used for a TypeScript-family file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    /// Plain `.ts` / `.mts` / `.cts`. Angle-bracket casts are legal, JSX is not.
    TypeScript,
    /// `.tsx` and the JavaScript family, which may carry JSX.
    Tsx,
}

impl Dialect {
    pub fn for_extension(extension: &str) -> Dialect {
        match extension.trim_start_matches('.').to_lowercase().as_str() {
            "ts" | "mts" | "cts" => Dialect::TypeScript,
            _ => Dialect::Tsx,
        }
    }

    fn language(&self) -> tree_sitter::Language {
        match self {
            Dialect::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Dialect::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
        }
    }
}

/// Parse `source` with the grammar for `dialect`.
///
/// Syntax errors still yield a tree (with `ERROR` nodes); `None` means the
/// parser could not run at all.
pub fn parse_source(source: &str, dialect: Dialect) -> Option<tree_sitter::Tree> {
    let mut parser = tree_sitter::Parser::new();
    if let Err(err) = parser.set_language(&dialect.language()) {
        warn!(?dialect, error = %err, "failed to load tree-sitter grammar");
        return None;
    }
    parser.parse(source.as_bytes(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_for_extension() {
        assert_eq!(Dialect::for_extension("ts"), Dialect::TypeScript);
        assert_eq!(Dialect::for_extension(".MTS"), Dialect::TypeScript);
        assert_eq!(Dialect::for_extension("tsx"), Dialect::Tsx);
        assert_eq!(Dialect::for_extension("jsx"), Dialect::Tsx);
        assert_eq!(Dialect::for_extension("js"), Dialect::Tsx);
    }

    #[test]
    fn test_parse_source_tolerates_garbage() {
        let tree = parse_source("function (((( {", Dialect::TypeScript).unwrap();
        assert!(tree.root_node().has_error());
    }

    #[test]
    fn test_tsx_dialect_accepts_jsx() {
        let source = "const App = () => <div className=\"x\">{name}</div>;";
        let tree = parse_source(source, Dialect::Tsx).unwrap();
        assert!(!tree.root_node().has_error());
    }
}
