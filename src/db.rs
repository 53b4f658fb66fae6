//! Database connection management, migrations, and error types.
//!
//! This module handles all SQLite connection setup (WAL mode, foreign keys,
//! busy timeout), schema versioning via embedded migrations, and the unified
//! error type for the entire crate.

use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the wiki.
///
/// Storage failures wrap the underlying library error; the remaining variants
/// are domain failures that callers are expected to match on.
#[derive(Debug, Error)]
pub enum WikiError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// I/O operation failed (directory creation, reading uploads, etc).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A history snapshot could not be serialized or read back.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Requested entity was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input provided by the user or caller.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A caller-supplied slug is not already in canonical form.
    #[error(
        "Invalid slug '{0}': slugs must be lowercase, have no leading or trailing \
         whitespace, and contain only word characters, spaces, and -.,'\"/!@$%&*()"
    )]
    InvalidSlug(String),

    /// A page name normalizes to an empty slug.
    #[error("Invalid page name '{0}'")]
    InvalidName(String),

    /// A page already occupies the requested slug.
    #[error("The page '{0}' already exists")]
    PageExists(String),

    /// A redirect would point a slug at the page that already owns it.
    #[error("Redirect from '{0}' would point to itself")]
    RedirectToSelf(String),
}

/// Resolves the database path from an optional override.
///
/// Falls back to `~/.wikipages/wiki.db` when no override is given. Kept
/// separate from [`db_path`] so the resolution can be tested without touching
/// the process environment.
pub fn db_path_from(override_path: Option<String>) -> Result<PathBuf, WikiError> {
    let path = match override_path {
        Some(p) => PathBuf::from(p),
        None => {
            let home = dirs::home_dir().ok_or_else(|| {
                WikiError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Could not determine home directory",
                ))
            })?;
            home.join(".wikipages").join("wiki.db")
        }
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    Ok(path)
}

/// Returns the path to the SQLite database file.
///
/// Resolution order:
/// 1. `WIKI_PATH` environment variable (if set)
/// 2. `~/.wikipages/wiki.db` (default)
///
/// Creates the parent directory if it doesn't exist.
pub fn db_path() -> Result<PathBuf, WikiError> {
    db_path_from(std::env::var("WIKI_PATH").ok())
}

/// Opens a SQLite connection to the default database with proper settings.
pub fn open_connection() -> Result<Connection, WikiError> {
    let path = db_path()?;
    open_connection_at(&path)
}

/// Opens a SQLite connection at the specified path.
///
/// - **WAL mode**: concurrent readers with serialized writers
/// - **Foreign keys**: required, redirects and tag sets cascade on page deletion
/// - **Busy timeout**: 5 seconds
pub fn open_connection_at(path: &std::path::Path) -> Result<Connection, WikiError> {
    let conn = Connection::open(path)?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;

    Ok(conn)
}

/// Opens a migrated in-memory database with foreign keys enabled.
///
/// Used by tests and by callers that want a throwaway wiki.
pub fn open_in_memory() -> Result<Connection, WikiError> {
    let mut conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    run_migrations(&mut conn)?;
    Ok(conn)
}

/// Runs all pending database migrations.
///
/// Reads the current version from `schema_meta` (0 for a fresh database) and
/// applies each embedded migration with a higher version, each in its own
/// transaction. Every migration updates `schema_meta.version` itself.
pub fn run_migrations(conn: &mut Connection) -> Result<(), WikiError> {
    let current_version: i64 = conn
        .query_row("SELECT version FROM schema_meta LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    let migrations: Vec<(i64, &str)> = vec![
        (1, include_str!("../migrations/001_initial.sql")),
        (2, include_str!("../migrations/002_tags.sql")),
        (3, include_str!("../migrations/003_history.sql")),
    ];

    for (target_version, sql) in migrations {
        if target_version > current_version {
            log::debug!("applying schema migration {}", target_version);
            let tx = conn.transaction()?;
            tx.execute_batch(sql)?;
            tx.commit()?;
        }
    }

    Ok(())
}

/// True when `err` is a SQLite UNIQUE or PRIMARY KEY violation. Foreign key
/// and NOT NULL failures are not included.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_path_respects_override() {
        let custom_path = std::env::temp_dir().join("custom_wiki_test.db");

        let result = db_path_from(Some(custom_path.to_string_lossy().into_owned()))
            .expect("db_path_from should succeed");

        assert_eq!(result, custom_path);
    }

    #[test]
    fn test_db_path_falls_back_to_default() {
        let result = db_path_from(None).expect("db_path_from should succeed with default");

        assert!(result.to_string_lossy().contains(".wikipages"));
        assert!(result.to_string_lossy().ends_with("wiki.db"));
    }

    #[test]
    fn test_migration_creates_tables_from_scratch() {
        let conn = open_in_memory().expect("Migrations should succeed");

        let version: i64 = conn
            .query_row("SELECT version FROM schema_meta", [], |row| row.get(0))
            .expect("schema_meta should exist");
        assert_eq!(version, 3);

        let table_names: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("Failed to prepare query")
            .query_map([], |row| row.get(0))
            .expect("Failed to query tables")
            .collect::<Result<Vec<_>, _>>()
            .expect("Failed to collect table names");

        for table in [
            "schema_meta",
            "regions",
            "pages",
            "page_files",
            "redirects",
            "page_tag_sets",
            "page_tags",
            "versions",
        ] {
            assert!(table_names.contains(&table.to_string()), "missing table {}", table);
        }
    }

    #[test]
    fn test_migration_is_idempotent() {
        let mut conn = open_in_memory().expect("First migration should succeed");

        run_migrations(&mut conn).expect("Second migration should succeed");

        let version: i64 = conn
            .query_row("SELECT version FROM schema_meta", [], |row| row.get(0))
            .expect("schema_meta should exist after second migration");
        assert_eq!(version, 3);

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM pages", [], |row| row.get(0))
            .expect("Should be able to query pages table");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_open_connection_at_configures_correctly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("config.db");

        let conn = open_connection_at(&db_path).expect("Should open connection");

        let journal_mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .expect("Should query journal_mode");
        assert_eq!(journal_mode.to_lowercase(), "wal");

        let foreign_keys: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .expect("Should query foreign_keys");
        assert_eq!(foreign_keys, 1);
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            WikiError::PageExists("Baz".into()).to_string(),
            "The page 'Baz' already exists"
        );
        assert_eq!(
            WikiError::RedirectToSelf("foo".into()).to_string(),
            "Redirect from 'foo' would point to itself"
        );
    }
}
