//! File discovery over a materialized repository.
//!
//! Walks the tree, prunes ignored directories, drops ignored/empty/oversized
//! files and files with no known language, and aggregates per-language stats.

use std::path::{Component, Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::DiscoveryConfig;
use crate::errors::{SondeError, SondeResult};
use crate::models::LanguageBreakdown;

pub const UNKNOWN_LANGUAGE: &str = "unknown";

const LANGUAGE_BY_EXTENSION: &[(&str, &str)] = &[
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("mts", "typescript"),
    ("cts", "typescript"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("py", "python"),
    ("pyi", "python"),
    ("go", "go"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("kts", "kotlin"),
    ("scala", "scala"),
    ("rs", "rust"),
    ("c", "c"),
    ("h", "c"),
    ("cc", "cpp"),
    ("cpp", "cpp"),
    ("cxx", "cpp"),
    ("hpp", "cpp"),
    ("hh", "cpp"),
    ("cs", "csharp"),
    ("rb", "ruby"),
    ("php", "php"),
    ("swift", "swift"),
    ("dart", "dart"),
    ("lua", "lua"),
    ("ex", "elixir"),
    ("exs", "elixir"),
    ("hs", "haskell"),
    ("sh", "shell"),
    ("bash", "shell"),
    ("zsh", "shell"),
    ("sql", "sql"),
    ("html", "html"),
    ("htm", "html"),
    ("css", "css"),
    ("scss", "scss"),
    ("less", "less"),
    ("vue", "vue"),
    ("svelte", "svelte"),
    ("json", "json"),
    ("yml", "yaml"),
    ("yaml", "yaml"),
    ("toml", "toml"),
    ("xml", "xml"),
    ("md", "markdown"),
    ("mdx", "markdown"),
];

/// Directory names pruned wherever they appear in the tree.
const IGNORED_DIRS: &[&str] = &[
    // VCS
    ".git",
    ".hg",
    ".svn",
    // dependencies
    "node_modules",
    "bower_components",
    "vendor",
    ".venv",
    "venv",
    // build output
    "dist",
    "build",
    "out",
    "target",
    ".next",
    ".nuxt",
    "coverage",
    // caches
    "__pycache__",
    ".pytest_cache",
    ".mypy_cache",
    ".ruff_cache",
    ".tox",
    ".cache",
    ".gradle",
    // IDE
    ".idea",
    ".vscode",
];

/// Generated, binary, and lock-file patterns (gitignore syntax).
const IGNORED_FILE_PATTERNS: &[&str] = &[
    "*.min.js",
    "*.min.css",
    "*.map",
    "*.lock",
    "package-lock.json",
    "npm-shrinkwrap.json",
    "pnpm-lock.yaml",
    "*.pyc",
    "*.pyo",
    "*.class",
    "*.jar",
    "*.o",
    "*.a",
    "*.so",
    "*.dylib",
    "*.dll",
    "*.exe",
    "*.wasm",
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.bmp",
    "*.ico",
    "*.webp",
    "*.pdf",
    "*.zip",
    "*.tar",
    "*.gz",
    "*.tgz",
    "*.7z",
    "*.woff",
    "*.woff2",
    "*.ttf",
    "*.eot",
    "*.mp3",
    "*.mp4",
    "*.mov",
    ".DS_Store",
    "Thumbs.db",
];

/// One discovered file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Absolute (root-joined) path.
    pub path: PathBuf,
    /// Repo-relative POSIX path.
    pub relative_path: String,
    pub language: String,
    pub size: u64,
    /// Lowercased, without the leading dot.
    pub extension: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryStats {
    pub total_files: usize,
    pub total_size: u64,
    pub languages: LanguageBreakdown,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResult {
    pub files: Vec<FileInfo>,
    pub stats: DiscoveryStats,
}

/// Lowercased extension without the dot, or `""` when the file has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Map an extension (with or without the leading dot) to a language name.
pub fn language_for_extension(extension: &str) -> Option<&'static str> {
    let ext = extension.trim_start_matches('.').to_lowercase();
    LANGUAGE_BY_EXTENSION
        .iter()
        .find(|(e, _)| *e == ext.as_str())
        .map(|(_, lang)| *lang)
}

fn to_posix_rel_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(os) => Some(os.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn build_file_rules() -> Gitignore {
    let mut builder = GitignoreBuilder::new("");
    for pattern in IGNORED_FILE_PATTERNS {
        if let Err(err) = builder.add_line(None, pattern) {
            warn!(pattern, error = %err, "skipping invalid ignore pattern");
        }
    }
    builder.build().unwrap_or_else(|err| {
        warn!(error = %err, "failed to build file ignore rules");
        Gitignore::empty()
    })
}

/// Discovery engine with its ignore rules compiled once.
pub struct FileDiscovery {
    config: DiscoveryConfig,
    file_rules: Gitignore,
}

impl Default for FileDiscovery {
    fn default() -> Self {
        Self::new(DiscoveryConfig::default())
    }
}

impl FileDiscovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config,
            file_rules: build_file_rules(),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    fn is_ignored_dir(name: &str) -> bool {
        IGNORED_DIRS.contains(&name)
    }

    fn is_ignored_file(&self, rel_path: &str) -> bool {
        self.file_rules.matched(rel_path, false).is_ignore()
    }

    /// Walk `root` and return the surviving files plus aggregate stats.
    ///
    /// Entries are visited in file-name order, so the language breakdown's
    /// insertion order is stable across runs.
    pub fn discover(&self, root: &Path) -> SondeResult<DiscoveryResult> {
        if let Err(err) = std::fs::read_dir(root) {
            return Err(SondeError::Discovery {
                root: root.to_path_buf(),
                reason: err.to_string(),
            });
        }

        let mut result = DiscoveryResult::default();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !(entry.depth() > 0
                    && entry.file_type().is_dir()
                    && Self::is_ignored_dir(&entry.file_name().to_string_lossy()))
            });

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(err) if err.depth() == 0 => {
                    return Err(SondeError::Discovery {
                        root: root.to_path_buf(),
                        reason: err.to_string(),
                    });
                }
                Err(err) => {
                    warn!(error = %err, "skipping unreadable entry during discovery");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative_path = to_posix_rel_path(root, path);
            if self.is_ignored_file(&relative_path) {
                continue;
            }

            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(err) => {
                    warn!(path = %relative_path, error = %err, "failed to stat file, skipping");
                    continue;
                }
            };
            if size == 0 {
                debug!(path = %relative_path, "skipping empty file");
                continue;
            }
            if size > self.config.max_file_size {
                debug!(path = %relative_path, size, "skipping oversized file");
                continue;
            }

            let extension = extension_of(path);
            let language = match language_for_extension(&extension) {
                Some(lang) => lang,
                None => continue,
            };

            result.stats.total_files += 1;
            result.stats.total_size += size;
            *result
                .stats
                .languages
                .entry(language.to_string())
                .or_insert(0) += 1;
            result.files.push(FileInfo {
                path: path.to_path_buf(),
                relative_path,
                language: language.to_string(),
                size,
                extension,
            });
        }

        debug!(
            root = %root.display(),
            files = result.stats.total_files,
            bytes = result.stats.total_size,
            "discovery finished"
        );
        Ok(result)
    }
}

/// Discover with default settings.
pub fn discover(root: &Path) -> SondeResult<DiscoveryResult> {
    FileDiscovery::default().discover(root)
}

/// The language with the highest file count, or `"unknown"` for an empty breakdown.
///
/// Ties go to the language that appears first in the breakdown's insertion
/// order (first encountered during discovery).
pub fn primary_language(breakdown: &LanguageBreakdown) -> String {
    let mut best: Option<(&str, usize)> = None;
    for (language, count) in breakdown {
        match best {
            Some((_, best_count)) if *count <= best_count => {}
            _ => best = Some((language.as_str(), *count)),
        }
    }
    best.map(|(lang, _)| lang.to_string())
        .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string())
}

/// Read a file as UTF-8 text. Binary or undecodable content is a read error.
pub fn read_content(path: &Path) -> SondeResult<String> {
    let bytes = std::fs::read(path).map_err(|e| SondeError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if bytes.contains(&0) {
        return Err(SondeError::Read {
            path: path.to_path_buf(),
            reason: "binary content (NUL byte)".to_string(),
        });
    }
    String::from_utf8(bytes).map_err(|e| SondeError::Read {
        path: path.to_path_buf(),
        reason: format!("not valid UTF-8: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_discover_filters_ignored_empty_and_binary() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let mut src = String::new();
        for i in 0..10 {
            src.push_str(&format!("export function f{i}() {{ return {i}; }}\n"));
        }
        write(root, "src/a.ts", src.as_bytes());
        write(root, "node_modules/x.js", b"module.exports = 1;\n");
        write(root, "img.png", &[0x89, b'P', b'N', b'G']);
        write(root, "empty.ts", b"");

        let result = discover(root).unwrap();
        assert_eq!(result.files.len(), 1);
        let file = &result.files[0];
        assert_eq!(file.relative_path, "src/a.ts");
        assert_eq!(file.language, "typescript");
        assert_eq!(file.extension, "ts");
        assert_eq!(result.stats.total_files, 1);
        assert_eq!(result.stats.total_size, src.len() as u64);
        assert_eq!(result.stats.languages.get("typescript"), Some(&1));
    }

    #[test]
    fn test_discover_respects_max_file_size() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "small.py", b"x = 1\n");
        write(dir.path(), "big.py", &vec![b'a'; 64]);

        let engine = FileDiscovery::new(DiscoveryConfig { max_file_size: 32 });
        let result = engine.discover(dir.path()).unwrap();
        assert_eq!(result.files.len(), 1);
        for file in &result.files {
            assert!(file.size > 0 && file.size <= 32);
            assert_ne!(file.language, UNKNOWN_LANGUAGE);
        }
    }

    #[test]
    fn test_discover_skips_unknown_languages_and_lockfiles() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.weird", b"???\n");
        write(dir.path(), "yarn.lock", b"lock\n");
        write(dir.path(), "package-lock.json", b"{}\n");
        write(dir.path(), "bundle.min.js", b"var a=1;\n");
        write(dir.path(), "main.go", b"package main\n");

        let result = discover(dir.path()).unwrap();
        let paths: Vec<&str> = result.files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, vec!["main.go"]);
    }

    #[test]
    fn test_discover_missing_root_is_discovery_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        match discover(&missing) {
            Err(SondeError::Discovery { root, .. }) => assert_eq!(root, missing),
            other => panic!("expected discovery error, got {other:?}"),
        }
    }

    #[test]
    fn test_primary_language_empty_is_unknown() {
        assert_eq!(primary_language(&LanguageBreakdown::new()), "unknown");
    }

    #[test]
    fn test_primary_language_tie_goes_to_first_encountered() {
        let mut breakdown = LanguageBreakdown::new();
        breakdown.insert("python".to_string(), 5);
        breakdown.insert("go".to_string(), 5);
        assert_eq!(primary_language(&breakdown), "python");
        assert_eq!(primary_language(&breakdown), "python");

        breakdown.insert("rust".to_string(), 6);
        assert_eq!(primary_language(&breakdown), "rust");
    }

    #[test]
    fn test_language_for_extension_accepts_dotted_form() {
        assert_eq!(language_for_extension(".TSX"), Some("typescript"));
        assert_eq!(language_for_extension("py"), Some("python"));
        assert_eq!(language_for_extension("exe"), None);
    }

    #[test]
    fn test_read_content_rejects_binary() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "bad.py", &[0xff, 0xfe, 0x00, 0x01]);
        write(dir.path(), "good.py", b"print('hi')\n");

        assert!(matches!(
            read_content(&dir.path().join("bad.py")),
            Err(SondeError::Read { .. })
        ));
        assert_eq!(
            read_content(&dir.path().join("good.py")).unwrap(),
            "print('hi')\n"
        );
    }
}
