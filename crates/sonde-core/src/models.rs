//! Shared typed models used across extraction, storage, and the job pipeline.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Per-language file counts, in first-encountered order.
pub type LanguageBreakdown = IndexMap<String, usize>;

/// Collapse runs of whitespace and trim, so logically identical signatures
/// compare equal regardless of formatting.
pub fn normalize_signature(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// SHA-256 hex digest of a text body.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Number of physical lines in `content`; a trailing newline does not open a new line.
pub fn line_count(content: &str) -> u32 {
    if content.is_empty() {
        return 0;
    }
    let newlines = content.bytes().filter(|b| *b == b'\n').count() as u32;
    if content.ends_with('\n') {
        newlines
    } else {
        newlines + 1
    }
}

// ---------------------------------------------------------------------------
// Structural facts
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    Function,
    Method,
    Class,
    Interface,
    TypeAlias,
}

impl FactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactKind::Function => "function",
            FactKind::Method => "method",
            FactKind::Class => "class",
            FactKind::Interface => "interface",
            FactKind::TypeAlias => "type_alias",
        }
    }
}

impl fmt::Display for FactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "function" => Ok(FactKind::Function),
            "method" => Ok(FactKind::Method),
            "class" => Ok(FactKind::Class),
            "interface" => Ok(FactKind::Interface),
            "type_alias" => Ok(FactKind::TypeAlias),
            other => Err(format!("unknown fact kind: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    Public,
    Protected,
    Private,
}

impl Accessibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Accessibility::Public => "public",
            Accessibility::Protected => "protected",
            Accessibility::Private => "private",
        }
    }
}

impl FromStr for Accessibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Accessibility::Public),
            "protected" => Ok(Accessibility::Protected),
            "private" => Ok(Accessibility::Private),
            other => Err(format!("unknown accessibility: {other}")),
        }
    }
}

/// A single parameter of a function or method.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_annotation: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl Parameter {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A function/method/class/type-level unit extracted from one file.
///
/// Lines are 1-based and inclusive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralFact {
    pub name: String,
    pub kind: FactKind,
    pub signature: String,
    pub doc_comment: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub parameters: Option<Vec<Parameter>>,
    pub return_type: Option<String>,
    pub exported: bool,
    pub is_async: bool,
    pub accessibility: Option<Accessibility>,
}

impl StructuralFact {
    /// A fact with only the identifying fields set; the rest take neutral values.
    pub fn new(name: impl Into<String>, kind: FactKind, start_line: u32, end_line: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            signature: String::new(),
            doc_comment: None,
            start_line,
            end_line,
            parameters: None,
            return_type: None,
            exported: false,
            is_async: false,
            accessibility: None,
        }
    }
}

/// One import statement. `source` is the raw module specifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFact {
    pub source: String,
    pub default_import: Option<String>,
    pub named: Vec<String>,
    pub namespace: Option<String>,
    pub type_only: bool,
    pub line: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    Named,
    Default,
    /// `export { x } from "./y"`
    ReExport,
    /// `export * from "./y"`
    All,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFact {
    pub name: String,
    pub kind: ExportKind,
    pub source: Option<String>,
    pub line: u32,
}

/// Syntax features observed in a file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageFeatures {
    pub async_functions: bool,
    pub classes: bool,
    pub decorators: bool,
    pub generics: bool,
    pub jsx: bool,
    pub optional_chaining: bool,
    pub type_annotations: bool,
}

/// Everything an extractor reports for one file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFacts {
    pub functions: Vec<StructuralFact>,
    pub imports: Vec<ImportFact>,
    pub exports: Vec<ExportFact>,
    pub language_features: LanguageFeatures,
}

impl ExtractedFacts {
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.imports.is_empty() && self.exports.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// A file record ready for insertion; storage assigns the id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFileRecord {
    pub repository_id: String,
    pub path: String,
    pub file_name: String,
    pub extension: String,
    pub language: Option<String>,
    pub size_bytes: u64,
    pub content: Option<String>,
    pub content_hash: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub repository_id: String,
    pub path: String,
    pub file_name: String,
    pub extension: String,
    pub language: Option<String>,
    pub size_bytes: u64,
    pub content: Option<String>,
    pub content_hash: Option<String>,
}

impl FileRecord {
    pub fn from_new(id: i64, record: NewFileRecord) -> Self {
        Self {
            id,
            repository_id: record.repository_id,
            path: record.path,
            file_name: record.file_name,
            extension: record.extension,
            language: record.language,
            size_bytes: record.size_bytes,
            content: record.content,
            content_hash: record.content_hash,
        }
    }

    pub fn line_count(&self) -> u32 {
        self.content.as_deref().map(line_count).unwrap_or(0)
    }
}

/// A structural fact as stored, tied to its file and repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFact {
    pub id: i64,
    pub file_id: i64,
    pub repository_id: String,
    #[serde(flatten)]
    pub fact: StructuralFact,
}

/// Import relationship awaiting insertion. A `None` target means the edge is
/// either external (`external_target` set) or not yet resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDependencyEdge {
    pub repository_id: String,
    pub source_file_id: i64,
    pub target_file_id: Option<i64>,
    pub external_target: Option<String>,
    pub kind: String,
    pub specifier: String,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub id: i64,
    pub repository_id: String,
    pub source_file_id: i64,
    pub target_file_id: Option<i64>,
    pub external_target: Option<String>,
    pub kind: String,
    pub specifier: String,
    pub line: u32,
}

impl DependencyEdge {
    pub fn from_new(id: i64, edge: NewDependencyEdge) -> Self {
        Self {
            id,
            repository_id: edge.repository_id,
            source_file_id: edge.source_file_id,
            target_file_id: edge.target_file_id,
            external_target: edge.external_target,
            kind: edge.kind,
            specifier: edge.specifier,
            line: edge.line,
        }
    }
}

// ---------------------------------------------------------------------------
// Repository aggregate
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RepositoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryStatus::Pending => "pending",
            RepositoryStatus::Processing => "processing",
            RepositoryStatus::Completed => "completed",
            RepositoryStatus::Failed => "failed",
        }
    }
}

impl FromStr for RepositoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RepositoryStatus::Pending),
            "processing" => Ok(RepositoryStatus::Processing),
            "completed" => Ok(RepositoryStatus::Completed),
            "failed" => Ok(RepositoryStatus::Failed),
            other => Err(format!("unknown repository status: {other}")),
        }
    }
}

/// Partial write-back to a repository record; `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryUpdate {
    pub status: Option<RepositoryStatus>,
    pub storage_path: Option<String>,
    pub primary_language: Option<String>,
    pub total_files: Option<usize>,
    pub total_size: Option<u64>,
    pub language_breakdown: Option<LanguageBreakdown>,
    pub error_message: Option<String>,
}

impl RepositoryUpdate {
    pub fn status(status: RepositoryStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(RepositoryStatus::Failed),
            error_message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub id: String,
    pub status: RepositoryStatus,
    pub storage_path: Option<String>,
    pub primary_language: Option<String>,
    pub total_files: usize,
    pub total_size: u64,
    pub language_breakdown: LanguageBreakdown,
    pub error_message: Option<String>,
}

impl RepositoryRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: RepositoryStatus::Pending,
            storage_path: None,
            primary_language: None,
            total_files: 0,
            total_size: 0,
            language_breakdown: LanguageBreakdown::new(),
            error_message: None,
        }
    }

    pub fn apply(&mut self, update: &RepositoryUpdate) {
        if let Some(status) = update.status {
            self.status = status;
            // A fresh run starts without the previous failure's message.
            if status != RepositoryStatus::Failed {
                self.error_message = None;
            }
        }
        if let Some(path) = &update.storage_path {
            self.storage_path = Some(path.clone());
        }
        if let Some(lang) = &update.primary_language {
            self.primary_language = Some(lang.clone());
        }
        if let Some(total) = update.total_files {
            self.total_files = total;
        }
        if let Some(size) = update.total_size {
            self.total_size = size;
        }
        if let Some(breakdown) = &update.language_breakdown {
            self.language_breakdown = breakdown.clone();
        }
        if let Some(message) = &update.error_message {
            self.error_message = Some(message.clone());
        }
    }
}
