//! Maps file extensions to extraction strategies.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

use crate::indexer::extractors::{
    normalize_extension, ExtractOptions, Extractor, GoExtractor, PythonExtractor,
    TypeScriptExtractor,
};
use crate::models::ExtractedFacts;

/// Ordered set of extractors; the first one supporting an extension wins.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractorRegistry {
    /// Registry with the built-in TypeScript/JavaScript, Python and Go extractors.
    pub fn new() -> Self {
        Self::with_extractors(vec![
            Box::new(TypeScriptExtractor),
            Box::new(PythonExtractor),
            Box::new(GoExtractor),
        ])
    }

    pub fn with_extractors(extractors: Vec<Box<dyn Extractor>>) -> Self {
        Self { extractors }
    }

    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.extractor_for(extension).is_some()
    }

    pub fn extractor_for(&self, extension: &str) -> Option<&dyn Extractor> {
        let ext = normalize_extension(extension);
        self.extractors
            .iter()
            .find(|e| e.supports(&ext))
            .map(|e| e.as_ref())
    }

    /// Every extension some registered extractor handles.
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut all: Vec<&'static str> = self
            .extractors
            .iter()
            .flat_map(|e| e.extensions().iter().copied())
            .collect();
        all.sort_unstable();
        all.dedup();
        all
    }

    /// Extract facts from `source`, or `None` when no extractor handles the
    /// extension or the extractor panicked.
    pub fn extract_for(&self, extension: &str, source: &str) -> Option<ExtractedFacts> {
        let extractor = self.extractor_for(extension)?;
        let options = ExtractOptions::for_extension(extension);
        match catch_unwind(AssertUnwindSafe(|| extractor.extract(source, &options))) {
            Ok(facts) => Some(facts),
            Err(_) => {
                warn!(
                    extension = %options.extension,
                    language = extractor.language(),
                    "extractor panicked; skipping file"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Exploding;

    impl Extractor for Exploding {
        fn language(&self) -> &'static str {
            "boom"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &["boom"]
        }

        fn extract(&self, _source: &str, _options: &ExtractOptions) -> ExtractedFacts {
            panic!("extractor bug")
        }
    }

    #[test]
    fn test_builtin_extensions() {
        let registry = ExtractorRegistry::new();
        for ext in ["ts", ".tsx", "JS", "mjs", "py", "go"] {
            assert!(registry.supports(ext), "{ext}");
        }
        assert!(!registry.supports("rs"));
        assert!(!registry.supports(""));
        assert_eq!(registry.extractor_for("py").map(|e| e.language()), Some("python"));
    }

    #[test]
    fn test_unsupported_extension_yields_none() {
        let registry = ExtractorRegistry::new();
        assert!(registry.extract_for("rb", "def x; end").is_none());
    }

    #[test]
    fn test_panicking_extractor_is_contained() {
        let registry = ExtractorRegistry::with_extractors(vec![Box::new(Exploding)]);
        assert!(registry.supports("boom"));
        assert!(registry.extract_for("boom", "anything").is_none());
    }

    #[test]
    fn test_first_registered_wins() {
        let mut registry = ExtractorRegistry::new();
        registry.register(Box::new(Exploding));
        let facts = registry.extract_for("py", "def f():\n    pass\n").unwrap();
        assert_eq!(facts.functions.len(), 1);
        assert!(registry.supported_extensions().contains(&"boom"));
    }
}
