//! Persistence for repositories, files, structural facts and dependency edges.
//!
//! [`Storage`] is synchronous; async callers run it on the blocking pool.
//! Deleting a repository cascades to its files, and deleting a file cascades
//! to its facts and outgoing edges (edges pointing at it lose their target).

pub mod database;
pub mod memory;
pub mod schema;

pub use database::SqliteStore;
pub use memory::MemoryStore;

use crate::errors::SondeResult;
use crate::models::{
    DependencyEdge, FileRecord, NewDependencyEdge, NewFileRecord, RepositoryRecord,
    RepositoryUpdate, StoredFact, StructuralFact,
};

pub trait Storage: Send + Sync {
    /// Insert a batch of files. The repository must already exist.
    fn insert_files(&self, files: Vec<NewFileRecord>) -> SondeResult<Vec<FileRecord>>;

    fn files_for_repository(&self, repository_id: &str) -> SondeResult<Vec<FileRecord>>;

    /// Remove every file of a repository (and, by cascade, their facts and
    /// edges). Returns the number of files removed.
    fn clear_repository_files(&self, repository_id: &str) -> SondeResult<usize>;

    /// Atomically replace the facts and outgoing edges of one file.
    fn replace_file_facts(
        &self,
        file: &FileRecord,
        facts: &[StructuralFact],
        edges: &[NewDependencyEdge],
    ) -> SondeResult<()>;

    fn facts_for_file(&self, file_id: i64) -> SondeResult<Vec<StoredFact>>;

    fn facts_for_repository(&self, repository_id: &str) -> SondeResult<Vec<StoredFact>>;

    fn edges_for_repository(&self, repository_id: &str) -> SondeResult<Vec<DependencyEdge>>;

    /// Apply a partial update, creating the repository record if needed.
    fn update_repository(
        &self,
        repository_id: &str,
        update: &RepositoryUpdate,
    ) -> SondeResult<RepositoryRecord>;

    fn repository(&self, repository_id: &str) -> SondeResult<Option<RepositoryRecord>>;

    /// Returns `false` when no such repository existed.
    fn delete_repository(&self, repository_id: &str) -> SondeResult<bool>;
}

/// Edges must originate from the file being written, inside its repository.
pub(crate) fn check_edges(file: &FileRecord, edges: &[NewDependencyEdge]) -> SondeResult<()> {
    for edge in edges {
        if edge.source_file_id != file.id || edge.repository_id != file.repository_id {
            return Err(crate::errors::SondeError::Storage(format!(
                "edge {:?} does not originate from file {} in repository {}",
                edge.specifier, file.id, file.repository_id
            )));
        }
    }
    Ok(())
}
