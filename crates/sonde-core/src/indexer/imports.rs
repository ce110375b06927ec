//! Turn extracted import records into dependency edges.
//!
//! Edges are drafted without cross-file resolution: an import that points
//! into the repository (a relative specifier) is kept with no target and no
//! external label so a later pass can resolve it; everything else is an
//! external dependency labelled with its package root.

use crate::models::{ImportFact, NewDependencyEdge};

pub const IMPORT_EDGE_KIND: &str = "import";

/// Whether `specifier` refers to a file inside the same repository.
pub fn is_relative_specifier(language: &str, specifier: &str) -> bool {
    match language {
        "python" => specifier.starts_with('.'),
        "go" => specifier.starts_with("./") || specifier.starts_with("../"),
        _ => specifier.starts_with('.') || specifier.starts_with('/'),
    }
}

/// Package root used as the external label, e.g. `@scope/pkg` for
/// `@scope/pkg/sub` or `os` for `os.path`. Go import paths are kept whole.
pub fn external_label(language: &str, specifier: &str) -> String {
    match language {
        "python" => specifier.split('.').next().unwrap_or(specifier).to_string(),
        "go" => specifier.to_string(),
        _ => {
            let mut parts = specifier.split('/');
            match (parts.next(), parts.next()) {
                (Some(scope), Some(name)) if scope.starts_with('@') => format!("{scope}/{name}"),
                (Some(first), _) => first.to_string(),
                _ => specifier.to_string(),
            }
        }
    }
}

/// One edge per import of a stored file.
pub fn draft_edges(
    repository_id: &str,
    source_file_id: i64,
    language: &str,
    imports: &[ImportFact],
) -> Vec<NewDependencyEdge> {
    imports
        .iter()
        .filter(|import| !import.source.trim().is_empty())
        .map(|import| {
            let specifier = import.source.trim();
            let external_target = if is_relative_specifier(language, specifier) {
                None
            } else {
                Some(external_label(language, specifier))
            };
            NewDependencyEdge {
                repository_id: repository_id.to_string(),
                source_file_id,
                target_file_id: None,
                external_target,
                kind: IMPORT_EDGE_KIND.to_string(),
                specifier: specifier.to_string(),
                line: import.line,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(source: &str, line: u32) -> ImportFact {
        ImportFact {
            source: source.to_string(),
            line,
            ..ImportFact::default()
        }
    }

    #[test]
    fn test_relative_imports_are_deferred() {
        let edges = draft_edges(
            "repo",
            7,
            "typescript",
            &[import("./util", 1), import("../lib/index", 2)],
        );
        assert_eq!(edges.len(), 2);
        for edge in &edges {
            assert_eq!(edge.target_file_id, None);
            assert_eq!(edge.external_target, None);
            assert_eq!(edge.source_file_id, 7);
            assert_eq!(edge.kind, "import");
        }
        assert_eq!(edges[1].specifier, "../lib/index");
        assert_eq!(edges[1].line, 2);
    }

    #[test]
    fn test_external_imports_are_labelled() {
        let edges = draft_edges(
            "repo",
            1,
            "typescript",
            &[import("@scope/pkg/deep", 1), import("lodash/fp", 2), import("react", 3)],
        );
        let labels: Vec<Option<&str>> = edges
            .iter()
            .map(|e| e.external_target.as_deref())
            .collect();
        assert_eq!(labels, vec![Some("@scope/pkg"), Some("lodash"), Some("react")]);
        assert_eq!(edges[0].specifier, "@scope/pkg/deep");
    }

    #[test]
    fn test_language_specific_relativity() {
        assert!(is_relative_specifier("python", ".models"));
        assert!(!is_relative_specifier("python", "os.path"));
        assert_eq!(external_label("python", "os.path"), "os");
        assert!(is_relative_specifier("go", "./internal"));
        assert!(!is_relative_specifier("go", "github.com/x/y"));
        assert_eq!(external_label("go", "github.com/x/y"), "github.com/x/y");
    }

    #[test]
    fn test_blank_specifiers_are_dropped() {
        assert!(draft_edges("repo", 1, "python", &[import("  ", 1)]).is_empty());
    }
}
