//! SQLite schema DDL and version stamp.

use rusqlite::Connection;

use crate::errors::{SondeError, SondeResult};

/// Layout version written to `store_meta`. Opening a database stamped with a
/// newer version is refused.
pub const SCHEMA_VERSION: i32 = 1;

/// Core DDL, replayable on an already-initialised database.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    // ── tables ──────────────────────────────────────────────────────────
    "CREATE TABLE IF NOT EXISTS store_meta (
        key TEXT PRIMARY KEY,
        value TEXT
    );",
    "CREATE TABLE IF NOT EXISTS repositories (
        id TEXT PRIMARY KEY,
        status TEXT NOT NULL DEFAULT 'pending',
        storage_path TEXT,
        primary_language TEXT,
        total_files INTEGER NOT NULL DEFAULT 0,
        total_size INTEGER NOT NULL DEFAULT 0,
        language_breakdown TEXT NOT NULL DEFAULT '{}',
        error_message TEXT,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP,
        updated_at TEXT DEFAULT CURRENT_TIMESTAMP
    );",
    "CREATE TABLE IF NOT EXISTS files (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        repository_id TEXT NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
        path TEXT NOT NULL,
        file_name TEXT NOT NULL,
        extension TEXT NOT NULL,
        language TEXT,
        size_bytes INTEGER NOT NULL,
        content TEXT,
        content_hash TEXT,
        UNIQUE(repository_id, path)
    );",
    "CREATE TABLE IF NOT EXISTS structural_facts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
        repository_id TEXT NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        kind TEXT NOT NULL,
        signature TEXT NOT NULL,
        doc_comment TEXT,
        start_line INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        parameters_json TEXT,
        return_type TEXT,
        exported INTEGER NOT NULL DEFAULT 0,
        is_async INTEGER NOT NULL DEFAULT 0,
        accessibility TEXT
    );",
    "CREATE TABLE IF NOT EXISTS dependency_edges (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        repository_id TEXT NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
        source_file_id INTEGER NOT NULL REFERENCES files(id) ON DELETE CASCADE,
        target_file_id INTEGER REFERENCES files(id) ON DELETE SET NULL,
        external_target TEXT,
        kind TEXT NOT NULL,
        specifier TEXT NOT NULL,
        line INTEGER NOT NULL
    );",
    // ── indexes ─────────────────────────────────────────────────────────
    "CREATE INDEX IF NOT EXISTS idx_files_repository ON files(repository_id);",
    "CREATE INDEX IF NOT EXISTS idx_facts_file ON structural_facts(file_id);",
    "CREATE INDEX IF NOT EXISTS idx_facts_repository ON structural_facts(repository_id);",
    "CREATE INDEX IF NOT EXISTS idx_edges_repository ON dependency_edges(repository_id);",
    "CREATE INDEX IF NOT EXISTS idx_edges_source ON dependency_edges(source_file_id);",
];

/// Create any missing tables and indexes, then stamp [`SCHEMA_VERSION`].
pub fn apply_schema(conn: &Connection) -> SondeResult<()> {
    let stored = get_schema_version(conn);
    if stored > SCHEMA_VERSION {
        return Err(SondeError::Storage(format!(
            "database schema version {stored} is newer than supported version {SCHEMA_VERSION}"
        )));
    }
    for stmt in SCHEMA_STATEMENTS {
        conn.execute_batch(stmt)?;
    }
    if stored < SCHEMA_VERSION {
        set_schema_version(conn, SCHEMA_VERSION)?;
    }
    Ok(())
}

/// Stored schema version; 0 when absent or unparseable.
pub fn get_schema_version(conn: &Connection) -> i32 {
    let result: Result<String, _> = conn.query_row(
        "SELECT value FROM store_meta WHERE key = 'schema_version';",
        [],
        |row| row.get(0),
    );
    match result {
        Ok(v) => v.parse::<i32>().unwrap_or(0),
        Err(_) => 0,
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> SondeResult<()> {
    conn.execute(
        "INSERT INTO store_meta(key, value) \
         VALUES('schema_version', ?1) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
        rusqlite::params![version.to_string()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        apply_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn apply_stamps_version() {
        let conn = fresh();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn apply_twice_is_a_no_op() {
        let conn = fresh();
        conn.execute_batch("INSERT INTO repositories(id) VALUES ('r');").unwrap();
        apply_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
        let repos: i64 = conn
            .query_row("SELECT COUNT(*) FROM repositories;", [], |r| r.get(0))
            .unwrap();
        assert_eq!(repos, 1);
    }

    #[test]
    fn newer_database_is_refused() {
        let conn = fresh();
        set_schema_version(&conn, SCHEMA_VERSION + 1).unwrap();
        let err = apply_schema(&conn).unwrap_err();
        assert!(matches!(err, SondeError::Storage(_)), "{err}");
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION + 1);
    }

    #[test]
    fn cascade_from_repository_to_facts() {
        let conn = fresh();
        conn.execute_batch(
            "INSERT INTO repositories(id) VALUES ('r');
             INSERT INTO files(repository_id, path, file_name, extension, size_bytes)
                 VALUES ('r', 'a.ts', 'a.ts', 'ts', 1);
             INSERT INTO structural_facts(file_id, repository_id, name, kind, signature, start_line, end_line)
                 VALUES (1, 'r', 'f', 'function', 'function f()', 1, 1);
             DELETE FROM repositories WHERE id = 'r';",
        )
        .unwrap();
        let facts: i64 = conn
            .query_row("SELECT COUNT(*) FROM structural_facts;", [], |r| r.get(0))
            .unwrap();
        assert_eq!(facts, 0);
    }
}
