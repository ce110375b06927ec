//! In-process [`Storage`] backend, used by tests and one-shot CLI runs.

use std::collections::HashSet;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::errors::{SondeError, SondeResult};
use crate::models::{
    DependencyEdge, FileRecord, NewDependencyEdge, NewFileRecord, RepositoryRecord,
    RepositoryUpdate, StoredFact, StructuralFact,
};
use crate::store::{check_edges, Storage};

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    repositories: IndexMap<String, RepositoryRecord>,
    files: IndexMap<i64, FileRecord>,
    facts: Vec<StoredFact>,
    edges: Vec<DependencyEdge>,
}

impl MemoryState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn remove_files(&mut self, ids: &[i64]) {
        for id in ids {
            self.files.shift_remove(id);
        }
        self.facts.retain(|f| !ids.contains(&f.file_id));
        self.edges.retain(|e| !ids.contains(&e.source_file_id));
        for edge in &mut self.edges {
            if edge.target_file_id.is_some_and(|t| ids.contains(&t)) {
                edge.target_file_id = None;
            }
        }
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStore {
    fn insert_files(&self, files: Vec<NewFileRecord>) -> SondeResult<Vec<FileRecord>> {
        let mut state = self.state.write();
        {
            let repositories: HashSet<&str> =
                files.iter().map(|f| f.repository_id.as_str()).collect();
            let mut taken: HashSet<(&str, &str)> = state
                .files
                .values()
                .filter(|f| repositories.contains(f.repository_id.as_str()))
                .map(|f| (f.repository_id.as_str(), f.path.as_str()))
                .collect();
            for file in &files {
                if !state.repositories.contains_key(&file.repository_id) {
                    return Err(SondeError::Storage(format!(
                        "unknown repository {}",
                        file.repository_id
                    )));
                }
                if !taken.insert((file.repository_id.as_str(), file.path.as_str())) {
                    return Err(SondeError::Storage(format!(
                        "file {} already stored for repository {}",
                        file.path, file.repository_id
                    )));
                }
            }
        }
        let mut stored = Vec::with_capacity(files.len());
        for file in files {
            let id = state.allocate_id();
            let record = FileRecord::from_new(id, file);
            state.files.insert(id, record.clone());
            stored.push(record);
        }
        Ok(stored)
    }

    fn files_for_repository(&self, repository_id: &str) -> SondeResult<Vec<FileRecord>> {
        let state = self.state.read();
        Ok(state
            .files
            .values()
            .filter(|f| f.repository_id == repository_id)
            .cloned()
            .collect())
    }

    fn clear_repository_files(&self, repository_id: &str) -> SondeResult<usize> {
        let mut state = self.state.write();
        let ids: Vec<i64> = state
            .files
            .values()
            .filter(|f| f.repository_id == repository_id)
            .map(|f| f.id)
            .collect();
        state.remove_files(&ids);
        Ok(ids.len())
    }

    fn replace_file_facts(
        &self,
        file: &FileRecord,
        facts: &[StructuralFact],
        edges: &[NewDependencyEdge],
    ) -> SondeResult<()> {
        check_edges(file, edges)?;
        let mut state = self.state.write();
        if !state.files.contains_key(&file.id) {
            return Err(SondeError::Storage(format!("unknown file {}", file.id)));
        }
        state.facts.retain(|f| f.file_id != file.id);
        state.edges.retain(|e| e.source_file_id != file.id);
        for fact in facts {
            let id = state.allocate_id();
            state.facts.push(StoredFact {
                id,
                file_id: file.id,
                repository_id: file.repository_id.clone(),
                fact: fact.clone(),
            });
        }
        for edge in edges {
            let id = state.allocate_id();
            state.edges.push(DependencyEdge::from_new(id, edge.clone()));
        }
        Ok(())
    }

    fn facts_for_file(&self, file_id: i64) -> SondeResult<Vec<StoredFact>> {
        let state = self.state.read();
        Ok(state
            .facts
            .iter()
            .filter(|f| f.file_id == file_id)
            .cloned()
            .collect())
    }

    fn facts_for_repository(&self, repository_id: &str) -> SondeResult<Vec<StoredFact>> {
        let state = self.state.read();
        Ok(state
            .facts
            .iter()
            .filter(|f| f.repository_id == repository_id)
            .cloned()
            .collect())
    }

    fn edges_for_repository(&self, repository_id: &str) -> SondeResult<Vec<DependencyEdge>> {
        let state = self.state.read();
        Ok(state
            .edges
            .iter()
            .filter(|e| e.repository_id == repository_id)
            .cloned()
            .collect())
    }

    fn update_repository(
        &self,
        repository_id: &str,
        update: &RepositoryUpdate,
    ) -> SondeResult<RepositoryRecord> {
        let mut state = self.state.write();
        let record = state
            .repositories
            .entry(repository_id.to_string())
            .or_insert_with(|| RepositoryRecord::new(repository_id));
        record.apply(update);
        Ok(record.clone())
    }

    fn repository(&self, repository_id: &str) -> SondeResult<Option<RepositoryRecord>> {
        Ok(self.state.read().repositories.get(repository_id).cloned())
    }

    fn delete_repository(&self, repository_id: &str) -> SondeResult<bool> {
        let mut state = self.state.write();
        if state.repositories.shift_remove(repository_id).is_none() {
            return Ok(false);
        }
        let ids: Vec<i64> = state
            .files
            .values()
            .filter(|f| f.repository_id == repository_id)
            .map(|f| f.id)
            .collect();
        state.remove_files(&ids);
        state.edges.retain(|e| e.repository_id != repository_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FactKind, RepositoryStatus};

    fn new_file(repo: &str, path: &str) -> NewFileRecord {
        NewFileRecord {
            repository_id: repo.to_string(),
            path: path.to_string(),
            file_name: path.rsplit('/').next().unwrap_or(path).to_string(),
            extension: "ts".to_string(),
            language: Some("typescript".to_string()),
            size_bytes: 3,
            content: Some("x\ny".to_string()),
            content_hash: None,
        }
    }

    fn edge(file: &FileRecord, specifier: &str) -> NewDependencyEdge {
        NewDependencyEdge {
            repository_id: file.repository_id.clone(),
            source_file_id: file.id,
            target_file_id: None,
            external_target: Some(specifier.to_string()),
            kind: "import".to_string(),
            specifier: specifier.to_string(),
            line: 1,
        }
    }

    #[test]
    fn test_insert_requires_repository() {
        let store = MemoryStore::new();
        assert!(store.insert_files(vec![new_file("r", "a.ts")]).is_err());
        store
            .update_repository("r", &RepositoryUpdate::status(RepositoryStatus::Processing))
            .unwrap();
        let files = store.insert_files(vec![new_file("r", "a.ts")]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].line_count(), 2);
    }

    #[test]
    fn test_duplicate_path_rejects_whole_batch() {
        let store = MemoryStore::new();
        store.update_repository("r", &RepositoryUpdate::default()).unwrap();
        store.update_repository("s", &RepositoryUpdate::default()).unwrap();
        store.insert_files(vec![new_file("r", "a.ts")]).unwrap();

        let err = store
            .insert_files(vec![new_file("r", "b.ts"), new_file("r", "b.ts")])
            .unwrap_err();
        assert!(err.to_string().contains("b.ts"), "{err}");
        let err = store
            .insert_files(vec![new_file("r", "c.ts"), new_file("r", "a.ts")])
            .unwrap_err();
        assert!(err.to_string().contains("a.ts"), "{err}");
        assert_eq!(store.files_for_repository("r").unwrap().len(), 1);

        // Same path under another repository is fine.
        store
            .insert_files(vec![new_file("s", "a.ts"), new_file("s", "b.ts")])
            .unwrap();
        assert_eq!(store.files_for_repository("s").unwrap().len(), 2);
    }

    #[test]
    fn test_replace_file_facts_is_idempotent() {
        let store = MemoryStore::new();
        store.update_repository("r", &RepositoryUpdate::default()).unwrap();
        let file = store.insert_files(vec![new_file("r", "a.ts")]).unwrap().remove(0);
        let facts = vec![StructuralFact::new("f", FactKind::Function, 1, 2)];
        store.replace_file_facts(&file, &facts, &[edge(&file, "react")]).unwrap();
        store.replace_file_facts(&file, &facts, &[edge(&file, "react")]).unwrap();
        assert_eq!(store.facts_for_file(file.id).unwrap().len(), 1);
        assert_eq!(store.edges_for_repository("r").unwrap().len(), 1);
    }

    #[test]
    fn test_foreign_edge_is_rejected() {
        let store = MemoryStore::new();
        store.update_repository("r", &RepositoryUpdate::default()).unwrap();
        let file = store.insert_files(vec![new_file("r", "a.ts")]).unwrap().remove(0);
        let mut bad = edge(&file, "x");
        bad.repository_id = "other".to_string();
        assert!(store.replace_file_facts(&file, &[], &[bad]).is_err());
    }

    #[test]
    fn test_delete_repository_cascades() {
        let store = MemoryStore::new();
        store.update_repository("r", &RepositoryUpdate::default()).unwrap();
        store.update_repository("keep", &RepositoryUpdate::default()).unwrap();
        let file = store.insert_files(vec![new_file("r", "a.ts")]).unwrap().remove(0);
        let kept = store.insert_files(vec![new_file("keep", "b.ts")]).unwrap().remove(0);
        let fact = StructuralFact::new("f", FactKind::Function, 1, 1);
        store.replace_file_facts(&file, &[fact.clone()], &[edge(&file, "x")]).unwrap();
        store.replace_file_facts(&kept, &[fact], &[]).unwrap();

        assert!(store.delete_repository("r").unwrap());
        assert!(!store.delete_repository("r").unwrap());
        assert!(store.files_for_repository("r").unwrap().is_empty());
        assert!(store.facts_for_file(file.id).unwrap().is_empty());
        assert!(store.edges_for_repository("r").unwrap().is_empty());
        assert_eq!(store.facts_for_repository("keep").unwrap().len(), 1);
    }

    #[test]
    fn test_update_repository_merges_fields() {
        let store = MemoryStore::new();
        store
            .update_repository("r", &RepositoryUpdate::failed("boom"))
            .unwrap();
        let record = store
            .update_repository("r", &RepositoryUpdate::status(RepositoryStatus::Processing))
            .unwrap();
        assert_eq!(record.status, RepositoryStatus::Processing);
        assert_eq!(record.error_message, None);
        assert_eq!(store.repository("r").unwrap().unwrap(), record);
        assert!(store.repository("missing").unwrap().is_none());
    }
}
