//! The `analyze_repository` job: materialize, discover, persist files,
//! extract facts, then write the aggregate back to the repository record.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rayon::prelude::*;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::acquire::{Materializer, RepositorySource};
use crate::config::{DiscoveryConfig, PipelineConfig};
use crate::errors::{SondeError, SondeResult};
use crate::indexer::filesystem::{
    primary_language, read_content, DiscoveryResult, FileDiscovery, FileInfo, UNKNOWN_LANGUAGE,
};
use crate::indexer::imports::draft_edges;
use crate::indexer::registry::ExtractorRegistry;
use crate::jobs::{JobContext, JobHandler, JobSnapshot, Orchestrator};
use crate::models::{
    content_hash, FileRecord, NewDependencyEdge, NewFileRecord, RepositoryRecord,
    RepositoryStatus, RepositoryUpdate, StructuralFact,
};
use crate::store::Storage;

pub const ANALYZE_REPOSITORY: &str = "analyze_repository";

const MATERIALIZED: i64 = 30;
const DISCOVERED: i64 = 40;
const FILES_PERSISTED: i64 = 70;
const FACTS_PERSISTED: i64 = 95;

/// Outcome of extracting and persisting one file.
#[derive(Debug, Default)]
struct ParseOutcome {
    facts: usize,
    edges: usize,
    storage_error: Option<String>,
}

/// Per-job totals, merged into the job payload as the stages finish.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnalysisTotals {
    pub files_discovered: usize,
    pub files_persisted: usize,
    pub files_parsed: usize,
    pub facts_persisted: usize,
    pub edges_persisted: usize,
}

pub struct AnalyzeRepositoryHandler {
    store: Arc<dyn Storage>,
    materializer: Arc<dyn Materializer>,
    registry: Arc<ExtractorRegistry>,
    discovery: Arc<FileDiscovery>,
    config: PipelineConfig,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl AnalyzeRepositoryHandler {
    pub fn new(
        store: Arc<dyn Storage>,
        materializer: Arc<dyn Materializer>,
        registry: Arc<ExtractorRegistry>,
        discovery: DiscoveryConfig,
        config: PipelineConfig,
    ) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parse_workers.max(1))
            .thread_name(|i| format!("sonde-parse-{i}"))
            .build()
            .map_err(|e| warn!(error = %e, "parse pool unavailable; extracting sequentially"))
            .ok()
            .map(Arc::new);
        Self {
            store,
            materializer,
            registry,
            discovery: Arc::new(FileDiscovery::new(discovery)),
            config,
            pool,
        }
    }

    /// Register this handler under [`ANALYZE_REPOSITORY`].
    pub fn register(self, orchestrator: &Orchestrator) {
        orchestrator.register_handler(ANALYZE_REPOSITORY, Arc::new(self));
    }

    async fn with_store<T, F>(&self, f: F) -> SondeResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Storage) -> SondeResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref())).await?
    }

    async fn run(&self, job: &JobSnapshot, ctx: &JobContext) -> SondeResult<RepositoryRecord> {
        let repository_id = job.repository_id.clone();
        let mut totals = AnalysisTotals::default();

        let rid = repository_id.clone();
        self.with_store(move |s| {
            s.update_repository(&rid, &RepositoryUpdate::status(RepositoryStatus::Processing))
        })
        .await?;

        let source = RepositorySource::from_payload(&job.data)?;
        let root = self.materializer.materialize(&repository_id, &source).await?;
        ctx.progress_with(
            MATERIALIZED,
            json!({ "storage_path": root.display().to_string() }),
        );

        let discovery = Arc::clone(&self.discovery);
        let walk_root = root.clone();
        let discovered: DiscoveryResult =
            tokio::task::spawn_blocking(move || discovery.discover(&walk_root)).await??;
        totals.files_discovered = discovered.files.len();
        ctx.progress_with(
            DISCOVERED,
            json!({ "files_discovered": totals.files_discovered }),
        );

        let rid = repository_id.clone();
        let cleared = self
            .with_store(move |s| s.clear_repository_files(&rid))
            .await?;
        if cleared > 0 {
            debug!(repository_id = %repository_id, cleared, "replaced previous analysis");
        }

        let stored = self
            .persist_files(&repository_id, &discovered.files, ctx, &mut totals)
            .await?;
        self.parse_files(&repository_id, stored, ctx, &mut totals)
            .await?;

        let stats = discovered.stats;
        let update = RepositoryUpdate {
            status: Some(RepositoryStatus::Completed),
            storage_path: Some(root.display().to_string()),
            primary_language: Some(primary_language(&stats.languages)),
            total_files: Some(stats.total_files),
            total_size: Some(stats.total_size),
            language_breakdown: Some(stats.languages),
            error_message: None,
        };
        let rid = repository_id.clone();
        let record = self
            .with_store(move |s| s.update_repository(&rid, &update))
            .await?;
        info!(
            job_id = %job.id,
            repository_id = %repository_id,
            files = totals.files_persisted,
            facts = totals.facts_persisted,
            edges = totals.edges_persisted,
            primary_language = record.primary_language.as_deref().unwrap_or(UNKNOWN_LANGUAGE),
            "analysis completed"
        );
        Ok(record)
    }

    /// Read and insert discovered files batch by batch. Unreadable files are
    /// logged and left out; the batch still goes in.
    async fn persist_files(
        &self,
        repository_id: &str,
        files: &[FileInfo],
        ctx: &JobContext,
        totals: &mut AnalysisTotals,
    ) -> SondeResult<Vec<FileRecord>> {
        let mut stored = Vec::with_capacity(files.len());
        if files.is_empty() {
            ctx.progress_with(FILES_PERSISTED, json!({ "files_persisted": 0 }));
            return Ok(stored);
        }

        let batch_size = self.config.batch_size.max(1);
        let mut done = 0usize;
        for batch in files.chunks(batch_size) {
            let count = batch.len();
            let batch = batch.to_vec();
            let rid = repository_id.to_string();
            let inserted = self
                .with_store(move |s| {
                    let records: Vec<NewFileRecord> = batch
                        .iter()
                        .filter_map(|file| new_file_record(&rid, file))
                        .collect();
                    if records.is_empty() {
                        return Ok(Vec::new());
                    }
                    s.insert_files(records)
                })
                .await?;

            done += count;
            totals.files_persisted += inserted.len();
            stored.extend(inserted);
            ctx.progress_with(
                scaled(DISCOVERED, FILES_PERSISTED, done, files.len()),
                json!({ "files_persisted": totals.files_persisted }),
            );
        }
        Ok(stored)
    }

    /// Extract facts for every stored file an extractor supports, in parallel
    /// within a batch. A storage failure on one file does not stop the rest;
    /// the first such failure fails the job once the stage is over.
    async fn parse_files(
        &self,
        repository_id: &str,
        stored: Vec<FileRecord>,
        ctx: &JobContext,
        totals: &mut AnalysisTotals,
    ) -> SondeResult<()> {
        let parseable: Vec<FileRecord> = stored
            .into_iter()
            .filter(|f| self.registry.supports(&f.extension))
            .collect();
        if parseable.is_empty() {
            ctx.progress(FACTS_PERSISTED);
            return Ok(());
        }

        let total = parseable.len();
        let batch_size = self.config.batch_size.max(1);
        let mut first_failure: Option<String> = None;
        let mut done = 0usize;

        for batch in parseable.chunks(batch_size) {
            let batch = batch.to_vec();
            let registry = Arc::clone(&self.registry);
            let pool = self.pool.clone();
            let store = Arc::clone(&self.store);
            let outcomes: Vec<ParseOutcome> = tokio::task::spawn_blocking(move || {
                let work = |file: &FileRecord| parse_and_persist(store.as_ref(), &registry, file);
                match pool {
                    Some(pool) => pool.install(|| batch.par_iter().map(work).collect::<Vec<_>>()),
                    None => batch.iter().map(work).collect::<Vec<_>>(),
                }
            })
            .await?;

            done += outcomes.len();
            for outcome in outcomes {
                totals.files_parsed += 1;
                totals.facts_persisted += outcome.facts;
                totals.edges_persisted += outcome.edges;
                if first_failure.is_none() {
                    first_failure = outcome.storage_error;
                }
            }
            ctx.progress_with(
                scaled(FILES_PERSISTED, FACTS_PERSISTED, done, total),
                json!({
                    "files_parsed": totals.files_parsed,
                    "facts_persisted": totals.facts_persisted,
                    "edges_persisted": totals.edges_persisted,
                }),
            );
        }

        match first_failure {
            Some(message) => {
                error!(repository_id = %repository_id, error = %message, "fact persistence failed");
                Err(SondeError::Storage(message))
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl JobHandler for AnalyzeRepositoryHandler {
    async fn handle(&self, job: JobSnapshot, ctx: JobContext) -> SondeResult<()> {
        match self.run(&job, &ctx).await {
            Ok(_) => Ok(()),
            Err(err) => {
                let message = err.to_string();
                error!(
                    job_id = %job.id,
                    repository_id = %job.repository_id,
                    error = %message,
                    "analysis failed"
                );
                let rid = job.repository_id.clone();
                if let Err(write_back) = self
                    .with_store(move |s| s.update_repository(&rid, &RepositoryUpdate::failed(message)))
                    .await
                {
                    warn!(
                        repository_id = %job.repository_id,
                        error = %write_back,
                        "could not record failure on repository"
                    );
                }
                Err(err)
            }
        }
    }
}

/// Map `done / total` onto `[from, to]`.
fn scaled(from: i64, to: i64, done: usize, total: usize) -> i64 {
    if total == 0 {
        return to;
    }
    from + ((to - from) * done as i64) / total as i64
}

fn new_file_record(repository_id: &str, file: &FileInfo) -> Option<NewFileRecord> {
    let content = match read_content(&file.path) {
        Ok(content) => content,
        Err(err) => {
            warn!(path = %file.relative_path, error = %err, "skipping unreadable file");
            return None;
        }
    };
    Some(NewFileRecord {
        repository_id: repository_id.to_string(),
        path: file.relative_path.clone(),
        file_name: file_name_of(&file.path, &file.relative_path),
        extension: file.extension.clone(),
        language: Some(file.language.clone()),
        size_bytes: file.size,
        content_hash: Some(content_hash(&content)),
        content: Some(content),
    })
}

fn file_name_of(path: &Path, relative: &str) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| relative.rsplit('/').next().unwrap_or(relative).to_string())
}

/// Drop facts whose line range does not fit inside the file.
fn sanitize_facts(facts: Vec<StructuralFact>, line_count: u32, path: &str) -> Vec<StructuralFact> {
    facts
        .into_iter()
        .filter(|fact| {
            let ok = fact.start_line >= 1
                && fact.start_line <= fact.end_line
                && fact.end_line <= line_count;
            if !ok {
                debug!(
                    path,
                    name = %fact.name,
                    start = fact.start_line,
                    end = fact.end_line,
                    line_count,
                    "dropping fact with out-of-range lines"
                );
            }
            ok
        })
        .collect()
}

fn parse_and_persist(
    store: &dyn Storage,
    registry: &ExtractorRegistry,
    file: &FileRecord,
) -> ParseOutcome {
    let Some(content) = file.content.as_deref() else {
        return ParseOutcome::default();
    };
    let Some(extractor) = registry.extractor_for(&file.extension) else {
        return ParseOutcome::default();
    };
    let Some(extracted) = registry.extract_for(&file.extension, content) else {
        return ParseOutcome::default();
    };

    let facts = sanitize_facts(extracted.functions, file.line_count(), &file.path);
    let edges: Vec<NewDependencyEdge> = draft_edges(
        &file.repository_id,
        file.id,
        extractor.language(),
        &extracted.imports,
    );
    match store.replace_file_facts(file, &facts, &edges) {
        Ok(()) => ParseOutcome {
            facts: facts.len(),
            edges: edges.len(),
            storage_error: None,
        },
        Err(err) => {
            warn!(path = %file.path, error = %err, "failed to persist facts");
            ParseOutcome {
                storage_error: Some(err.to_string()),
                ..ParseOutcome::default()
            }
        }
    }
}

/// Convenience for callers that hold a path rather than a payload.
pub fn local_payload(path: impl Into<PathBuf>) -> serde_json::Value {
    json!({ "source": "local", "path": path.into() })
}
