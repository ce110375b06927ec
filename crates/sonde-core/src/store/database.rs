//! SQLite [`Storage`] backend.
//!
//! Each public method opens its own connection, so the store is trivially
//! `Send + Sync` and safe to call from several blocking tasks at once.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use crate::errors::{SondeError, SondeResult};
use crate::models::{
    Accessibility, DependencyEdge, FactKind, FileRecord, LanguageBreakdown, NewDependencyEdge,
    NewFileRecord, Parameter, RepositoryRecord, RepositoryStatus, RepositoryUpdate, StoredFact,
    StructuralFact,
};
use crate::store::{check_edges, schema, Storage};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    if raw == "~" || raw.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            let mut expanded = PathBuf::from(home);
            if raw.len() > 2 {
                expanded.push(&raw[2..]);
            }
            return expanded;
        }
    }
    path.to_path_buf()
}

fn decode_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

const FILE_COLUMNS: &str =
    "id, repository_id, path, file_name, extension, language, size_bytes, content, content_hash";

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        path: row.get(2)?,
        file_name: row.get(3)?,
        extension: row.get(4)?,
        language: row.get(5)?,
        size_bytes: row.get::<_, i64>(6)?.max(0) as u64,
        content: row.get(7)?,
        content_hash: row.get(8)?,
    })
}

const FACT_COLUMNS: &str = "id, file_id, repository_id, name, kind, signature, doc_comment, \
     start_line, end_line, parameters_json, return_type, exported, is_async, accessibility";

fn fact_from_row(row: &Row<'_>) -> rusqlite::Result<StoredFact> {
    let kind: String = row.get(4)?;
    let kind = FactKind::from_str(&kind).map_err(|e| decode_error(4, e))?;
    let parameters: Option<String> = row.get(9)?;
    let parameters = match parameters {
        Some(json) => Some(
            serde_json::from_str::<Vec<Parameter>>(&json)
                .map_err(|e| decode_error(9, e.to_string()))?,
        ),
        None => None,
    };
    let accessibility: Option<String> = row.get(13)?;
    let accessibility = match accessibility {
        Some(a) => Some(Accessibility::from_str(&a).map_err(|e| decode_error(13, e))?),
        None => None,
    };
    Ok(StoredFact {
        id: row.get(0)?,
        file_id: row.get(1)?,
        repository_id: row.get(2)?,
        fact: StructuralFact {
            name: row.get(3)?,
            kind,
            signature: row.get(5)?,
            doc_comment: row.get(6)?,
            start_line: row.get(7)?,
            end_line: row.get(8)?,
            parameters,
            return_type: row.get(10)?,
            exported: row.get(11)?,
            is_async: row.get(12)?,
            accessibility,
        },
    })
}

const EDGE_COLUMNS: &str =
    "id, repository_id, source_file_id, target_file_id, external_target, kind, specifier, line";

fn edge_from_row(row: &Row<'_>) -> rusqlite::Result<DependencyEdge> {
    Ok(DependencyEdge {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        source_file_id: row.get(2)?,
        target_file_id: row.get(3)?,
        external_target: row.get(4)?,
        kind: row.get(5)?,
        specifier: row.get(6)?,
        line: row.get(7)?,
    })
}

const REPOSITORY_COLUMNS: &str = "id, status, storage_path, primary_language, total_files, \
     total_size, language_breakdown, error_message";

fn repository_from_row(row: &Row<'_>) -> rusqlite::Result<RepositoryRecord> {
    let status: String = row.get(1)?;
    let breakdown: String = row.get(6)?;
    Ok(RepositoryRecord {
        id: row.get(0)?,
        status: RepositoryStatus::from_str(&status).map_err(|e| decode_error(1, e))?,
        storage_path: row.get(2)?,
        primary_language: row.get(3)?,
        total_files: row.get::<_, i64>(4)?.max(0) as usize,
        total_size: row.get::<_, i64>(5)?.max(0) as u64,
        language_breakdown: serde_json::from_str::<LanguageBreakdown>(&breakdown)
            .map_err(|e| decode_error(6, e.to_string()))?,
        error_message: row.get(7)?,
    })
}

/// SQLite-backed store.
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path` and bring its
    /// schema up to date.
    pub fn open(db_path: impl AsRef<Path>) -> SondeResult<Self> {
        let expanded = expand_tilde(db_path.as_ref());
        let resolved = if expanded.is_absolute() {
            expanded
        } else {
            std::env::current_dir()?.join(expanded)
        };
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self { db_path: resolved };
        store.init_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> SondeResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(conn)
    }

    /// Write transactions take the write lock up front. A deferred one that
    /// reads first would fail with SQLITE_BUSY on upgrade instead of waiting
    /// out the busy timeout.
    fn begin_write(conn: &mut Connection) -> SondeResult<Transaction<'_>> {
        Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    fn init_schema(&self) -> SondeResult<()> {
        let conn = self.connect()?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        schema::apply_schema(&conn)
    }
}

impl Storage for SqliteStore {
    fn insert_files(&self, files: Vec<NewFileRecord>) -> SondeResult<Vec<FileRecord>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connect()?;
        let tx = Self::begin_write(&mut conn)?;
        let mut stored = Vec::with_capacity(files.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO files (repository_id, path, file_name, extension, language, \
                     size_bytes, content, content_hash) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            )?;
            for file in files {
                stmt.execute(params![
                    file.repository_id,
                    file.path,
                    file.file_name,
                    file.extension,
                    file.language,
                    file.size_bytes as i64,
                    file.content,
                    file.content_hash,
                ])?;
                stored.push(FileRecord::from_new(tx.last_insert_rowid(), file));
            }
        }
        tx.commit()?;
        Ok(stored)
    }

    fn files_for_repository(&self, repository_id: &str) -> SondeResult<Vec<FileRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE repository_id = ?1 ORDER BY id;"
        ))?;
        let rows = stmt
            .query_map(params![repository_id], file_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn clear_repository_files(&self, repository_id: &str) -> SondeResult<usize> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM files WHERE repository_id = ?1;",
            params![repository_id],
        )?;
        Ok(removed)
    }

    fn replace_file_facts(
        &self,
        file: &FileRecord,
        facts: &[StructuralFact],
        edges: &[NewDependencyEdge],
    ) -> SondeResult<()> {
        check_edges(file, edges)?;
        let mut conn = self.connect()?;
        let tx = Self::begin_write(&mut conn)?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT id FROM files WHERE id = ?1;",
                params![file.id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(SondeError::Storage(format!("unknown file {}", file.id)));
        }
        tx.execute(
            "DELETE FROM structural_facts WHERE file_id = ?1;",
            params![file.id],
        )?;
        tx.execute(
            "DELETE FROM dependency_edges WHERE source_file_id = ?1;",
            params![file.id],
        )?;
        {
            let mut insert_fact = tx.prepare(
                "INSERT INTO structural_facts (file_id, repository_id, name, kind, signature, \
                     doc_comment, start_line, end_line, parameters_json, return_type, exported, \
                     is_async, accessibility) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13);",
            )?;
            for fact in facts {
                let parameters = fact
                    .parameters
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?;
                insert_fact.execute(params![
                    file.id,
                    file.repository_id,
                    fact.name,
                    fact.kind.as_str(),
                    fact.signature,
                    fact.doc_comment,
                    fact.start_line,
                    fact.end_line,
                    parameters,
                    fact.return_type,
                    fact.exported,
                    fact.is_async,
                    fact.accessibility.map(|a| a.as_str()),
                ])?;
            }
            let mut insert_edge = tx.prepare(
                "INSERT INTO dependency_edges (repository_id, source_file_id, target_file_id, \
                     external_target, kind, specifier, line) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            )?;
            for edge in edges {
                insert_edge.execute(params![
                    edge.repository_id,
                    edge.source_file_id,
                    edge.target_file_id,
                    edge.external_target,
                    edge.kind,
                    edge.specifier,
                    edge.line,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn facts_for_file(&self, file_id: i64) -> SondeResult<Vec<StoredFact>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {FACT_COLUMNS} FROM structural_facts WHERE file_id = ?1 ORDER BY id;"
        ))?;
        let rows = stmt
            .query_map(params![file_id], fact_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn facts_for_repository(&self, repository_id: &str) -> SondeResult<Vec<StoredFact>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {FACT_COLUMNS} FROM structural_facts WHERE repository_id = ?1 ORDER BY id;"
        ))?;
        let rows = stmt
            .query_map(params![repository_id], fact_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn edges_for_repository(&self, repository_id: &str) -> SondeResult<Vec<DependencyEdge>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM dependency_edges WHERE repository_id = ?1 ORDER BY id;"
        ))?;
        let rows = stmt
            .query_map(params![repository_id], edge_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn update_repository(
        &self,
        repository_id: &str,
        update: &RepositoryUpdate,
    ) -> SondeResult<RepositoryRecord> {
        let mut conn = self.connect()?;
        let tx = Self::begin_write(&mut conn)?;
        let current = tx
            .query_row(
                &format!("SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE id = ?1;"),
                params![repository_id],
                repository_from_row,
            )
            .optional()?;
        let mut record = current.unwrap_or_else(|| RepositoryRecord::new(repository_id));
        record.apply(update);
        tx.execute(
            "INSERT INTO repositories (id, status, storage_path, primary_language, total_files, \
                 total_size, language_breakdown, error_message, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, CURRENT_TIMESTAMP) \
             ON CONFLICT(id) DO UPDATE SET \
                 status = excluded.status, \
                 storage_path = excluded.storage_path, \
                 primary_language = excluded.primary_language, \
                 total_files = excluded.total_files, \
                 total_size = excluded.total_size, \
                 language_breakdown = excluded.language_breakdown, \
                 error_message = excluded.error_message, \
                 updated_at = CURRENT_TIMESTAMP;",
            params![
                record.id,
                record.status.as_str(),
                record.storage_path,
                record.primary_language,
                record.total_files as i64,
                record.total_size as i64,
                serde_json::to_string(&record.language_breakdown)?,
                record.error_message,
            ],
        )?;
        tx.commit()?;
        Ok(record)
    }

    fn repository(&self, repository_id: &str) -> SondeResult<Option<RepositoryRecord>> {
        let conn = self.connect()?;
        let record = conn
            .query_row(
                &format!("SELECT {REPOSITORY_COLUMNS} FROM repositories WHERE id = ?1;"),
                params![repository_id],
                repository_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn delete_repository(&self, repository_id: &str) -> SondeResult<bool> {
        let conn = self.connect()?;
        let removed = conn.execute(
            "DELETE FROM repositories WHERE id = ?1;",
            params![repository_id],
        )?;
        Ok(removed > 0)
    }
}
