//! Sonde core library: repository analysis behind a bounded job queue.
//!
//! A repository is materialized (cloned, extracted, or used in place), its
//! source files are discovered and persisted, and per-language extractors
//! turn them into structural facts and import edges. The whole run is one
//! `analyze_repository` job driven by the [`jobs::Orchestrator`].

pub mod acquire;
pub mod config;
pub mod errors;
pub mod indexer;
pub mod jobs;
pub mod models;
pub mod store;

pub use acquire::{Materializer, RepositorySource, WorkspaceMaterializer};
pub use config::SondeConfig;
pub use errors::{SondeError, SondeResult};
pub use indexer::filesystem::{discover, read_content, DiscoveryResult, FileDiscovery};
pub use indexer::pipeline::{AnalyzeRepositoryHandler, ANALYZE_REPOSITORY};
pub use indexer::registry::ExtractorRegistry;
pub use jobs::{JobEvent, JobSnapshot, JobSpec, JobStatus, Orchestrator};
pub use store::{MemoryStore, SqliteStore, Storage};
